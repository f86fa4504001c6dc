//! Host protocol message types.
//!
//! Length-prefixed JSON between the editor front-end and the daemon.
//! Messages are framed as: [4-byte BE length][JSON payload]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::workspace::WorkspaceEntry;

/// Request sent from the editor to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostRequest {
    /// List the script tree, optionally below a path relative to the root.
    ListFiles {
        #[serde(default)]
        root: Option<String>,
    },
    /// Find a file by name anywhere in the workspace and open it.
    GetFile { name: String },
    /// Save a tab to where it came from.
    SaveFile { file: String, contents: String },
    /// Save to a path picked by the user; `path: null` means cancelled.
    SaveFileAs {
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        path: Option<PathBuf>,
        contents: String,
    },
    /// Open a path picked by the user; `path: null` means cancelled.
    OpenFile {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    RenameFile { old_name: String, new_name: String },
    /// Switch the workspace root.
    OpenFolder { path: PathBuf },
    NewTab {
        #[serde(default)]
        contents: Option<String>,
    },
    UpdateTab { file: String, contents: String },
    CloseTab { file: String },
    SwitchTab { file: String },
    ListTabs,
    /// Send a script to the execution target; the active tab if absent.
    Execute {
        #[serde(default)]
        script: Option<String>,
    },
    Status,
    LaunchTarget,
    SaveSession,
    Shutdown,
}

/// Response to exactly one `HostRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

/// Failure details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Payload of a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    Files {
        entries: Vec<WorkspaceEntry>,
    },
    File {
        file: String,
        contents: String,
        resolved_path: PathBuf,
    },
    Saved {
        resolved_path: PathBuf,
    },
    Renamed {
        file: String,
        resolved_path: Option<PathBuf>,
    },
    Workspace {
        root: PathBuf,
    },
    Tab {
        file: String,
    },
    Tabs {
        tabs: Vec<TabInfo>,
    },
    Status {
        connected: bool,
        peer: Option<String>,
        workspace: PathBuf,
    },
    Launched {
        pid: u32,
    },
}

/// One tab as reported to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub file: String,
    pub path: Option<PathBuf>,
    pub active: bool,
}

impl HostResponse {
    pub const fn ok(data: ResponseData) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub const fn ack() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    pub fn failure(err: &RelayError) -> Self {
        Self {
            success: false,
            error: Some(ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
            data: None,
        }
    }
}
