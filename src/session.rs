//! Editor session state and its persisted form.
//!
//! `EditorSession` is the set of open tabs, keyed by file name, plus the
//! active tab. `SessionStore` writes the tabs to disk as an ordered list of
//! `{file, contents}` records and reads them back at startup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RelayError;

/// Contents of the first tab of a fresh session.
pub const DEFAULT_SCRIPT: &str = "print(\"Hello world!\")";

/// One open file in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    /// Tab key: the file's base name, or `Untitled-N`.
    pub file: String,
    pub contents: String,
    /// Where the file was read from or last saved to, if known.
    pub path: Option<PathBuf>,
}

/// Persisted form of a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub file: String,
    pub contents: String,
}

/// Open tabs in display order and the active one.
#[derive(Debug, Default)]
pub struct EditorSession {
    tabs: Vec<Tab>,
    active: Option<usize>,
}

impl EditorSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session from persisted records. The first tab is active.
    pub fn restore(records: Vec<SessionRecord>) -> Self {
        let mut session = Self::new();
        for record in records {
            session.open(record.file, record.contents, None);
        }
        if !session.tabs.is_empty() {
            session.active = Some(0);
        }
        session
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.tabs
            .iter()
            .map(|tab| SessionRecord {
                file: tab.file.clone(),
                contents: tab.contents.clone(),
            })
            .collect()
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn get(&self, file: &str) -> Option<&Tab> {
        self.position(file).map(|i| &self.tabs[i])
    }

    pub fn active(&self) -> Option<&Tab> {
        self.active.map(|i| &self.tabs[i])
    }

    fn position(&self, file: &str) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.file == file)
    }

    fn require(&self, file: &str) -> Result<usize, RelayError> {
        self.position(file)
            .ok_or_else(|| RelayError::Tab(format!("no open tab named {file:?}")))
    }

    /// Open `file` in a new tab, or switch to it if it is already open.
    ///
    /// An already-open tab keeps its contents; it only learns `path` if it
    /// had none. Returns whether a new tab was created.
    pub fn open(&mut self, file: String, contents: String, path: Option<PathBuf>) -> bool {
        if let Some(i) = self.position(&file) {
            if self.tabs[i].path.is_none() {
                self.tabs[i].path = path;
            }
            self.active = Some(i);
            return false;
        }

        self.tabs.push(Tab {
            file,
            contents,
            path,
        });
        self.active = Some(self.tabs.len() - 1);
        true
    }

    /// Open a new `Untitled-N` tab and return its name.
    pub fn new_untitled(&mut self, contents: String) -> String {
        let mut n = self.tabs.len() + 1;
        let name = loop {
            let candidate = format!("Untitled-{n}");
            if self.position(&candidate).is_none() {
                break candidate;
            }
            n += 1;
        };
        self.open(name.clone(), contents, None);
        name
    }

    /// Close `file`. The last remaining tab cannot be closed.
    ///
    /// Afterwards the tab that was to the right of the closed one is
    /// active, or the one to its left if it was the rightmost.
    pub fn close(&mut self, file: &str) -> Result<(), RelayError> {
        let i = self.require(file)?;
        if self.tabs.len() == 1 {
            return Err(RelayError::Tab("cannot close the last tab".into()));
        }

        self.tabs.remove(i);
        self.active = Some(i.min(self.tabs.len() - 1));
        Ok(())
    }

    pub fn switch(&mut self, file: &str) -> Result<(), RelayError> {
        self.active = Some(self.require(file)?);
        Ok(())
    }

    /// Replace the contents of an open tab.
    pub fn update(&mut self, file: &str, contents: String) -> Result<(), RelayError> {
        let i = self.require(file)?;
        self.tabs[i].contents = contents;
        Ok(())
    }

    /// Record that `file` was saved to `path` with `contents`.
    /// No-op when the tab is not open.
    pub fn mark_saved(&mut self, file: &str, contents: &str, path: PathBuf) {
        if let Some(i) = self.position(file) {
            self.tabs[i].contents = contents.to_string();
            self.tabs[i].path = Some(path);
        }
    }

    /// Whether renaming `old` to `new` would clash with another open tab.
    pub fn would_collide(&self, old: &str, new: &str) -> bool {
        old != new && self.position(new).is_some()
    }

    /// Re-key the tab `old` as `new`. Returns whether a tab was renamed.
    pub fn rename(
        &mut self,
        old: &str,
        new: &str,
        path: Option<PathBuf>,
    ) -> Result<bool, RelayError> {
        if self.would_collide(old, new) {
            return Err(RelayError::Tab(format!("a tab named {new:?} is already open")));
        }
        let Some(i) = self.position(old) else {
            return Ok(false);
        };

        self.tabs[i].file = new.to_string();
        if path.is_some() {
            self.tabs[i].path = path;
        }
        Ok(true)
    }

    /// Drop every resolved path, e.g. after the workspace root changed.
    pub fn forget_paths(&mut self) {
        for tab in &mut self.tabs {
            tab.path = None;
        }
    }
}

/// Reads and writes the session file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved records. A missing file is an empty session.
    pub async fn load(&self) -> Result<Vec<SessionRecord>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved session");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read session file {}", self.path.display())
                })
            }
        };

        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse session file {}", self.path.display()))
    }

    /// Write `records`, replacing the whole file.
    pub async fn save(&self, records: &[SessionRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(records).context("Failed to serialize session")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), tabs = records.len(), "Session saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(names: &[&str]) -> EditorSession {
        let mut session = EditorSession::new();
        for name in names {
            session.open((*name).to_string(), format!("-- {name}"), None);
        }
        session
    }

    fn active_name(session: &EditorSession) -> &str {
        &session.active().expect("an active tab").file
    }

    #[test]
    fn open_switches_to_existing_tab() {
        let mut session = session_with(&["a.lua", "b.lua"]);
        assert_eq!(active_name(&session), "b.lua");

        let created = session.open("a.lua".into(), "ignored".into(), Some("/w/a.lua".into()));

        assert!(!created);
        assert_eq!(session.tabs().len(), 2);
        assert_eq!(active_name(&session), "a.lua");
        let a = session.get("a.lua").unwrap();
        assert_eq!(a.contents, "-- a.lua");
        assert_eq!(a.path, Some(PathBuf::from("/w/a.lua")));
    }

    #[test]
    fn untitled_names_skip_taken_ones() {
        let mut session = session_with(&["Untitled-2"]);
        assert_eq!(session.new_untitled(String::new()), "Untitled-3");
        assert_eq!(session.new_untitled(String::new()), "Untitled-4");

        let mut fresh = EditorSession::new();
        assert_eq!(fresh.new_untitled(DEFAULT_SCRIPT.into()), "Untitled-1");
        assert_eq!(active_name(&fresh), "Untitled-1");
    }

    #[test]
    fn last_tab_cannot_be_closed() {
        let mut session = session_with(&["only.lua"]);
        assert!(matches!(session.close("only.lua"), Err(RelayError::Tab(_))));
        assert_eq!(session.tabs().len(), 1);
    }

    #[test]
    fn close_activates_right_neighbour_then_left() {
        let mut session = session_with(&["a", "b", "c"]);

        session.close("b").unwrap();
        assert_eq!(active_name(&session), "c");

        session.close("c").unwrap();
        assert_eq!(active_name(&session), "a");
    }

    #[test]
    fn close_unknown_tab_is_an_error() {
        let mut session = session_with(&["a", "b"]);
        assert!(session.close("zzz").is_err());
        assert_eq!(session.tabs().len(), 2);
    }

    #[test]
    fn rename_rekeys_tab() {
        let mut session = session_with(&["old.lua", "other.lua"]);

        assert!(session.rename("old.lua", "new.lua", Some("/w/new.lua".into())).unwrap());
        assert!(session.get("old.lua").is_none());
        let tab = session.get("new.lua").unwrap();
        assert_eq!(tab.contents, "-- old.lua");
        assert_eq!(tab.path, Some(PathBuf::from("/w/new.lua")));

        assert!(matches!(
            session.rename("new.lua", "other.lua", None),
            Err(RelayError::Tab(_))
        ));
        assert!(!session.rename("absent.lua", "whatever.lua", None).unwrap());
    }

    #[test]
    fn update_and_mark_saved() {
        let mut session = session_with(&["a.lua"]);
        session.update("a.lua", "print(2)".into()).unwrap();
        assert_eq!(session.get("a.lua").unwrap().contents, "print(2)");

        session.mark_saved("a.lua", "print(3)", "/w/a.lua".into());
        let tab = session.get("a.lua").unwrap();
        assert_eq!(tab.contents, "print(3)");
        assert_eq!(tab.path, Some(PathBuf::from("/w/a.lua")));

        assert!(session.update("missing", String::new()).is_err());
    }

    #[test]
    fn forget_paths_clears_every_tab() {
        let mut session = EditorSession::new();
        session.open("a.lua".into(), String::new(), Some("/w/a.lua".into()));
        session.open("b.lua".into(), String::new(), Some("/w/b.lua".into()));

        session.forget_paths();

        assert!(session.tabs().iter().all(|tab| tab.path.is_none()));
    }

    #[test]
    fn restore_keeps_order_and_activates_first() {
        let records = vec![
            SessionRecord {
                file: "b.lua".into(),
                contents: "b".into(),
            },
            SessionRecord {
                file: "a.lua".into(),
                contents: "a".into(),
            },
        ];

        let session = EditorSession::restore(records.clone());

        assert_eq!(session.records(), records);
        assert_eq!(active_name(&session), "b.lua");
        assert!(EditorSession::restore(Vec::new()).active().is_none());
    }

    #[tokio::test]
    async fn store_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested/session.json"));
        let records = session_with(&["a.lua", "Untitled-2"]).records();

        store.save(&records).await.unwrap();

        assert_eq!(store.load().await.unwrap(), records);
        assert!(!dir.path().join("nested/session.json.tmp").exists());
    }

    #[tokio::test]
    async fn store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(SessionStore::new(path).load().await.is_err());
    }

    #[test]
    fn record_format() {
        let json = serde_json::to_string(&SessionRecord {
            file: "a.lua".into(),
            contents: "print(1)".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"file":"a.lua","contents":"print(1)"}"#);
    }
}
