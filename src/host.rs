//! Host service: every operation the editor front-end can ask for.
//!
//! Owns the workspace root (switchable at runtime), the open-tab session
//! and handles to the execution channel and target launcher. One instance
//! is created at startup and shared behind an `Arc`.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::channel::{ChannelState, ExecutionChannel};
use crate::error::{RelayError, Result};
use crate::launcher::TargetLauncher;
use crate::session::{EditorSession, SessionStore, DEFAULT_SCRIPT};
use crate::transport::protocol::{HostRequest, HostResponse, ResponseData, TabInfo};
use crate::workspace::{sort_for_display, WorkspaceEntry, WorkspaceIndex};

/// A file's contents together with where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub file: String,
    pub contents: String,
    pub resolved_path: PathBuf,
}

pub struct HostService {
    index: WorkspaceIndex,
    root: RwLock<PathBuf>,
    channel: Arc<ExecutionChannel>,
    editor: Mutex<EditorSession>,
    store: SessionStore,
    launcher: Arc<dyn TargetLauncher>,
}

impl HostService {
    pub fn new(
        index: WorkspaceIndex,
        root: PathBuf,
        channel: Arc<ExecutionChannel>,
        store: SessionStore,
        launcher: Arc<dyn TargetLauncher>,
    ) -> Self {
        Self {
            index,
            root: RwLock::new(root),
            channel,
            editor: Mutex::new(EditorSession::new()),
            store,
            launcher,
        }
    }

    pub async fn workspace_root(&self) -> PathBuf {
        self.root.read().await.clone()
    }

    /// Dispatch one protocol request. Errors become failure responses.
    pub async fn handle(&self, request: HostRequest) -> HostResponse {
        debug!(?request, "Handling request");
        match self.dispatch(request).await {
            Ok(Some(data)) => HostResponse::ok(data),
            Ok(None) => HostResponse::ack(),
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Request failed");
                HostResponse::failure(&e)
            }
        }
    }

    async fn dispatch(&self, request: HostRequest) -> Result<Option<ResponseData>> {
        let data = match request {
            HostRequest::ListFiles { root } => ResponseData::Files {
                entries: self.list_files(root.as_deref()).await?,
            },
            HostRequest::GetFile { name } => file_data(self.get_file(&name).await?),
            HostRequest::OpenFile { path } => file_data(self.open_file(path).await?),
            HostRequest::SaveFile { file, contents } => ResponseData::Saved {
                resolved_path: self.save_file(&file, &contents).await?,
            },
            HostRequest::SaveFileAs {
                file,
                path,
                contents,
            } => ResponseData::Saved {
                resolved_path: self.save_file_as(file.as_deref(), path, &contents).await?,
            },
            HostRequest::RenameFile { old_name, new_name } => {
                let (file, resolved_path) = self.rename_file(&old_name, &new_name).await?;
                ResponseData::Renamed {
                    file,
                    resolved_path,
                }
            }
            HostRequest::OpenFolder { path } => ResponseData::Workspace {
                root: self.open_folder(&path).await?,
            },
            HostRequest::NewTab { contents } => ResponseData::Tab {
                file: self.new_tab(contents).await,
            },
            HostRequest::UpdateTab { file, contents } => {
                self.editor.lock().await.update(&file, contents)?;
                return Ok(None);
            }
            HostRequest::CloseTab { file } => {
                self.editor.lock().await.close(&file)?;
                return Ok(None);
            }
            HostRequest::SwitchTab { file } => {
                self.editor.lock().await.switch(&file)?;
                return Ok(None);
            }
            HostRequest::ListTabs => ResponseData::Tabs {
                tabs: self.list_tabs().await,
            },
            HostRequest::Execute { script } => {
                self.execute(script).await?;
                return Ok(None);
            }
            HostRequest::Status => self.status().await,
            HostRequest::LaunchTarget => ResponseData::Launched {
                pid: self.launcher.launch().await?,
            },
            HostRequest::SaveSession => {
                self.save_session().await?;
                return Ok(None);
            }
            HostRequest::Shutdown => return Ok(None),
        };
        Ok(Some(data))
    }

    /// Script tree below `relative_root` (the workspace root if absent),
    /// in display order. `relative_root` may not leave the workspace.
    pub async fn list_files(&self, relative_root: Option<&str>) -> Result<Vec<WorkspaceEntry>> {
        let root = self.workspace_root().await;
        let dir = match relative_root {
            Some(relative) => {
                let relative = Path::new(relative);
                let inside = relative
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
                if !inside {
                    return Err(RelayError::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("{} is outside the workspace", relative.display()),
                    )));
                }
                root.join(relative)
            }
            None => root,
        };

        let mut entries = self.index.list_entries(&dir).await;
        sort_for_display(&mut entries);
        Ok(entries)
    }

    /// Resolve `name` anywhere in the workspace, read it and open its tab.
    ///
    /// A tab that is already open keeps its edits and those are returned
    /// instead of the file on disk.
    pub async fn get_file(&self, name: &str) -> Result<FileContents> {
        let root = self.workspace_root().await;
        let path = self
            .index
            .find_file(&root, name)
            .await
            .ok_or_else(|| RelayError::NotFound(name.to_string()))?;
        let contents = self.index.read_file(&path).await?;

        Ok(self.open_tab(name.to_string(), contents, path).await)
    }

    /// Open a file the user picked. `None` means the picker was cancelled.
    pub async fn open_file(&self, choice: Option<PathBuf>) -> Result<FileContents> {
        let path = choice.ok_or(RelayError::DialogCancelled)?;
        let contents = self.index.read_file(&path).await?;
        let file = base_name(&path)?;

        Ok(self.open_tab(file, contents, path).await)
    }

    async fn open_tab(&self, file: String, contents: String, path: PathBuf) -> FileContents {
        let mut editor = self.editor.lock().await;
        let contents = if editor.open(file.clone(), contents.clone(), Some(path.clone())) {
            contents
        } else {
            editor
                .get(&file)
                .map_or(contents, |tab| tab.contents.clone())
        };

        FileContents {
            file,
            contents,
            resolved_path: path,
        }
    }

    /// Save `file` where it came from.
    ///
    /// Fails with `NotFound` when the file has no known location yet; the
    /// editor then asks the user for one and calls `save_file_as`.
    pub async fn save_file(&self, file: &str, contents: &str) -> Result<PathBuf> {
        let known = self
            .editor
            .lock()
            .await
            .get(file)
            .and_then(|tab| tab.path.clone());

        let path = match known {
            Some(path) => path,
            None => {
                let root = self.workspace_root().await;
                self.index
                    .find_file(&root, file)
                    .await
                    .ok_or_else(|| RelayError::NotFound(file.to_string()))?
            }
        };

        self.index.write_file(&path, contents).await?;
        self.editor.lock().await.mark_saved(file, contents, path.clone());
        info!(file, path = %path.display(), "Saved");
        Ok(path)
    }

    /// Save to a path the user picked. `None` means the picker was cancelled.
    pub async fn save_file_as(
        &self,
        file: Option<&str>,
        choice: Option<PathBuf>,
        contents: &str,
    ) -> Result<PathBuf> {
        let path = choice.ok_or(RelayError::DialogCancelled)?;
        self.index.write_file(&path, contents).await?;

        if let Some(file) = file {
            self.editor.lock().await.mark_saved(file, contents, path.clone());
        }
        info!(path = %path.display(), "Saved as");
        Ok(path)
    }

    /// Rename a workspace file and its tab.
    ///
    /// A new name without an extension keeps the old one. An open tab that
    /// has never been saved is renamed without touching the filesystem.
    pub async fn rename_file(
        &self,
        old_name: &str,
        new_name: &str,
    ) -> Result<(String, Option<PathBuf>)> {
        let new_name = with_extension_of(old_name, new_name);

        if self.editor.lock().await.would_collide(old_name, &new_name) {
            return Err(RelayError::Tab(format!(
                "a tab named {new_name:?} is already open"
            )));
        }

        let root = self.workspace_root().await;
        let new_path = match self.index.rename_file(&root, old_name, &new_name).await {
            Ok(path) => Some(path),
            Err(RelayError::NotFound(_)) if self.is_unsaved_tab(old_name).await => None,
            Err(e) => return Err(e),
        };

        self.editor
            .lock()
            .await
            .rename(old_name, &new_name, new_path.clone())?;

        info!(from = old_name, to = %new_name, "Renamed");
        Ok((new_name, new_path))
    }

    async fn is_unsaved_tab(&self, file: &str) -> bool {
        self.editor
            .lock()
            .await
            .get(file)
            .is_some_and(|tab| tab.path.is_none())
    }

    /// Switch the workspace root. Tabs stay open but forget where their
    /// files live.
    pub async fn open_folder(&self, path: &Path) -> Result<PathBuf> {
        let is_dir = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(RelayError::NotFound(path.display().to_string()));
        }

        *self.root.write().await = path.to_path_buf();
        self.editor.lock().await.forget_paths();

        info!(root = %path.display(), "Workspace root changed");
        Ok(path.to_path_buf())
    }

    pub async fn new_tab(&self, contents: Option<String>) -> String {
        self.editor
            .lock()
            .await
            .new_untitled(contents.unwrap_or_else(|| DEFAULT_SCRIPT.to_string()))
    }

    pub async fn list_tabs(&self) -> Vec<TabInfo> {
        let editor = self.editor.lock().await;
        let active = editor.active().map(|tab| tab.file.clone());
        editor
            .tabs()
            .iter()
            .map(|tab| TabInfo {
                file: tab.file.clone(),
                path: tab.path.clone(),
                active: active.as_deref() == Some(tab.file.as_str()),
            })
            .collect()
    }

    /// Send `script`, or the active tab's contents, to the execution target.
    pub async fn execute(&self, script: Option<String>) -> Result<()> {
        let script = match script {
            Some(script) => script,
            None => self
                .editor
                .lock()
                .await
                .active()
                .map(|tab| tab.contents.clone())
                .ok_or_else(|| RelayError::Tab("no active tab".into()))?,
        };

        self.channel.send_exec(&script).await
    }

    async fn status(&self) -> ResponseData {
        let (connected, peer) = match self.channel.state().await {
            ChannelState::Idle => (false, None),
            ChannelState::Connected { peer, addr } => (true, Some(format!("{peer} ({addr})"))),
        };
        ResponseData::Status {
            connected,
            peer,
            workspace: self.workspace_root().await,
        }
    }

    /// Persist the open tabs.
    pub async fn save_session(&self) -> Result<()> {
        let records = self.editor.lock().await.records();
        self.store
            .save(&records)
            .await
            .map_err(|e| RelayError::Io(std::io::Error::other(format!("{e:#}"))))
    }

    /// Replay the saved session. A fresh session gets one untitled tab.
    pub async fn restore_session(&self) {
        let records = match self.store.load().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable session file");
                Vec::new()
            }
        };

        let mut editor = self.editor.lock().await;
        *editor = EditorSession::restore(records);
        if editor.is_empty() {
            editor.new_untitled(DEFAULT_SCRIPT.to_string());
        }
        info!(tabs = editor.tabs().len(), path = %self.store.path().display(), "Session restored");
    }

    /// Start the background autosave task.
    ///
    /// Returns a `JoinHandle` that runs until aborted, saving the session
    /// every `interval`, or `None` without spawning when `interval` is zero.
    pub fn start_autosave(
        self: &Arc<Self>,
        interval: Duration,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if interval.is_zero() {
            info!("Session autosave disabled");
            return None;
        }
        let host = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // First tick is immediate, skip it
            loop {
                ticker.tick().await;
                if let Err(e) = host.save_session().await {
                    warn!(error = %e, "Session autosave failed");
                }
            }
        }))
    }
}

fn file_data(contents: FileContents) -> ResponseData {
    ResponseData::File {
        file: contents.file,
        contents: contents.contents,
        resolved_path: contents.resolved_path,
    }
}

fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| RelayError::NotFound(path.display().to_string()))
}

/// `new` unchanged if it has an extension, otherwise `new` plus `old`'s.
fn with_extension_of(old: &str, new: &str) -> String {
    let new = new.trim();
    if Path::new(new).extension().is_some() {
        return new.to_string();
    }
    match Path::new(old).extension() {
        Some(ext) => format!("{new}.{}", ext.to_string_lossy()),
        None => new.to_string(),
    }
}
