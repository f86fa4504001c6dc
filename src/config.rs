//! Daemon configuration.
//!
//! Read from an optional JSON file (`--config` or `SCRIPT_RELAY_CONFIG`).
//! Every field has a default, so an absent file is a valid configuration.
//! A handful of environment variables override the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Top-level configuration for the daemon.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Execution channel listener.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Workspace browsed by the editor.
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Editor session persistence.
    #[serde(default)]
    pub session: SessionConfig,

    /// Executable that becomes the channel's peer (optional).
    #[serde(default)]
    pub target: Option<TargetConfig>,
}

/// Execution channel listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Address to bind. Loopback by default; the channel is unauthenticated.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Fixed listening port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Text sent in a `MSG` frame to every new peer.
    #[serde(default = "default_welcome")]
    pub welcome: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            welcome: default_welcome(),
        }
    }
}

/// Workspace configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace root. Relative paths resolve against the working directory.
    #[serde(default = "default_workspace_path")]
    pub path: PathBuf,

    /// File name suffixes that count as scripts.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: default_workspace_path(),
            extensions: default_extensions(),
        }
    }
}

/// Session persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session file location. Defaults to the user data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Seconds between autosaves. 0 disables autosave.
    #[serde(default = "default_autosave")]
    pub autosave_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: None,
            autosave_seconds: default_autosave(),
        }
    }
}

/// External execution target.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Path to the executable.
    pub exec: String,

    /// Arguments passed on launch.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    /// Load configuration from `path`, falling back to `SCRIPT_RELAY_CONFIG`,
    /// falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("SCRIPT_RELAY_CONFIG").map(PathBuf::from));

        let Some(path) = path else {
            debug!("No config file given, using defaults");
            return Ok(Self::default());
        };

        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Socket address of the execution channel.
    ///
    /// Priority: `SCRIPT_RELAY_PORT` env var > config.
    pub fn channel_addr(&self) -> Result<SocketAddr> {
        let port = match std::env::var("SCRIPT_RELAY_PORT") {
            Ok(v) => v
                .parse()
                .with_context(|| format!("Invalid SCRIPT_RELAY_PORT: {v}"))?,
            Err(_) => self.channel.port,
        };

        format!("{}:{port}", self.channel.bind)
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.channel.bind))
    }

    /// Resolve the workspace root to an absolute path.
    ///
    /// Priority: `WORKSPACE_DIR` env var > config.
    pub fn resolved_workspace_dir(&self) -> PathBuf {
        let path = std::env::var_os("WORKSPACE_DIR")
            .map_or_else(|| self.workspace.path.clone(), PathBuf::from);

        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Execution target, if any.
    ///
    /// Priority: `TARGET_EXEC` env var (no arguments) > config.
    pub fn resolved_target(&self) -> Option<TargetConfig> {
        std::env::var("TARGET_EXEC").map_or_else(
            |_| self.target.clone(),
            |exec| {
                Some(TargetConfig {
                    exec,
                    args: Vec::new(),
                })
            },
        )
    }

    /// Session file location.
    pub fn session_path(&self) -> PathBuf {
        self.session.path.clone().unwrap_or_else(|| {
            dirs::data_dir().map_or_else(
                || PathBuf::from("session.json"),
                |d| d.join("script-relay").join("session.json"),
            )
        })
    }

    /// Interval between session autosaves, `None` when disabled.
    pub const fn autosave_interval(&self) -> Option<Duration> {
        match self.session.autosave_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Create a config from a JSON string (for testing).
    #[cfg(test)]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

const fn default_port() -> u16 {
    49152
}

fn default_welcome() -> String {
    "Welcome to the script relay!".into()
}

fn default_workspace_path() -> PathBuf {
    "workspace".into()
}

fn default_extensions() -> Vec<String> {
    vec![".lua".into(), ".luau".into(), ".txt".into()]
}

const fn default_autosave() -> u64 {
    30
}
