//! Workspace file index.
//!
//! Presents a workspace root as a filtered, pruned tree of script files and
//! resolves individual files by base name. Nothing is cached: every call
//! walks the filesystem again.

use std::io;
use std::path::{Path, PathBuf};

use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{RelayError, Result};

/// One node of the file browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkspaceEntry {
    File {
        name: String,
    },
    #[serde(rename = "folder")]
    Directory {
        name: String,
        #[serde(rename = "files")]
        children: Vec<WorkspaceEntry>,
    },
}

impl WorkspaceEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::File { name } | Self::Directory { name, .. } => name,
        }
    }

    pub const fn is_directory(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }
}

/// Sort entries the way the file browser shows them: directories first,
/// then files, each group by name. Applied recursively.
pub fn sort_for_display(entries: &mut [WorkspaceEntry]) {
    entries.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name().cmp(b.name()))
    });
    for entry in entries {
        if let WorkspaceEntry::Directory { children, .. } = entry {
            sort_for_display(children);
        }
    }
}

/// Filesystem-backed index over a workspace root.
#[derive(Debug, Clone)]
pub struct WorkspaceIndex {
    extensions: Vec<String>,
}

impl Default for WorkspaceIndex {
    fn default() -> Self {
        Self::new(vec![".lua".into(), ".luau".into(), ".txt".into()])
    }
}

impl WorkspaceIndex {
    /// Create an index that accepts files ending in any of `extensions`.
    pub const fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    /// Whether `name` counts as a script file.
    pub fn is_script(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// List the script tree under `root`.
    ///
    /// Directories with no qualifying file anywhere below them are pruned.
    /// An unreadable root yields an empty listing.
    #[instrument(skip(self, root), fields(root = %root.display()))]
    pub async fn list_entries(&self, root: &Path) -> Vec<WorkspaceEntry> {
        match self.walk(root.to_path_buf()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to read workspace directory");
                Vec::new()
            }
        }
    }

    fn walk(&self, dir: PathBuf) -> BoxFuture<'_, io::Result<Vec<WorkspaceEntry>>> {
        async move {
            let mut read_dir = tokio::fs::read_dir(&dir).await?;
            let mut entries = Vec::new();

            while let Some(dirent) = read_dir.next_entry().await? {
                let name = dirent.file_name().to_string_lossy().into_owned();
                let file_type = dirent.file_type().await?;

                if file_type.is_dir() {
                    let children = match self.walk(dirent.path()).await {
                        Ok(children) => children,
                        Err(e) => {
                            warn!(path = %dirent.path().display(), error = %e, "Skipping unreadable directory");
                            continue;
                        }
                    };
                    if !children.is_empty() {
                        entries.push(WorkspaceEntry::Directory { name, children });
                    }
                } else if self.is_script(&name) {
                    entries.push(WorkspaceEntry::File { name });
                }
            }

            Ok(entries)
        }
        .boxed()
    }

    /// Depth-first search for the first file named exactly `file_name`.
    #[instrument(skip(self, root), fields(root = %root.display()))]
    pub async fn find_file(&self, root: &Path, file_name: &str) -> Option<PathBuf> {
        match find_in(root.to_path_buf(), file_name).await {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, "Search aborted");
                None
            }
        }
    }

    /// Read a whole file as UTF-8 text.
    pub async fn read_file(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| not_found_or_io(e, path))
    }

    /// Overwrite `path` with `contents`, creating parent directories.
    ///
    /// The data goes to a sibling temp file first and is renamed into place,
    /// so a failed write never truncates the existing file.
    #[instrument(skip(self, path, contents), fields(path = %path.display(), len = contents.len()))]
    pub async fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| invalid_name(&path.to_string_lossy()))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp, contents).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("File written");
        Ok(())
    }

    /// Rename `old_name` (found anywhere under `root`) to `new_name` in the
    /// same directory. Returns the new path.
    #[instrument(skip(self, root), fields(root = %root.display()))]
    pub async fn rename_file(&self, root: &Path, old_name: &str, new_name: &str) -> Result<PathBuf> {
        if !is_plain_file_name(new_name) {
            return Err(invalid_name(new_name));
        }

        let old_path = self
            .find_file(root, old_name)
            .await
            .ok_or_else(|| RelayError::NotFound(old_name.to_string()))?;

        let new_path = old_path.with_file_name(new_name);
        if tokio::fs::try_exists(&new_path).await? {
            return Err(RelayError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", new_path.display()),
            )));
        }

        tokio::fs::rename(&old_path, &new_path).await?;
        debug!(from = %old_path.display(), to = %new_path.display(), "File renamed");
        Ok(new_path)
    }
}

fn find_in(dir: PathBuf, file_name: &str) -> BoxFuture<'_, io::Result<Option<PathBuf>>> {
    async move {
        let mut read_dir = tokio::fs::read_dir(&dir).await?;

        while let Some(dirent) = read_dir.next_entry().await? {
            let file_type = dirent.file_type().await?;
            if file_type.is_dir() {
                match find_in(dirent.path(), file_name).await {
                    Ok(Some(found)) => return Ok(Some(found)),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(path = %dirent.path().display(), error = %e, "Skipping unreadable directory");
                    }
                }
            } else if dirent.file_name() == file_name {
                return Ok(Some(dirent.path()));
            }
        }

        Ok(None)
    }
    .boxed()
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains(std::path::MAIN_SEPARATOR)
}

fn invalid_name(name: &str) -> RelayError {
    RelayError::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("not a plain file name: {name:?}"),
    ))
}

fn not_found_or_io(e: io::Error, path: &Path) -> RelayError {
    if e.kind() == io::ErrorKind::NotFound {
        RelayError::NotFound(path.display().to_string())
    } else {
        RelayError::Io(e)
    }
}
