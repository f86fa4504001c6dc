//! Starting the external execution target.
//!
//! The target is whatever program will connect back to the execution
//! channel. Launching only spawns it; the connection arrives later through
//! the channel server.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::TargetConfig;
use crate::error::{RelayError, Result};

/// Something that can start the execution target.
#[async_trait]
pub trait TargetLauncher: Send + Sync {
    /// Start the target and return its process id.
    async fn launch(&self) -> Result<u32>;
}

/// Launcher that spawns the configured executable as a detached child.
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher {
    target: Option<TargetConfig>,
}

impl ProcessLauncher {
    #[must_use]
    pub const fn new(target: Option<TargetConfig>) -> Self {
        Self { target }
    }
}

#[async_trait]
impl TargetLauncher for ProcessLauncher {
    #[instrument(skip(self))]
    async fn launch(&self) -> Result<u32> {
        let target = self.target.as_ref().ok_or(RelayError::TargetNotConfigured)?;

        debug!(exec = %target.exec, args = ?target.args, "Spawning execution target");

        let mut child = Command::new(&target.exec)
            .args(&target.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let pid = child.id().unwrap_or_default();

        info!(pid, exec = %target.exec, "Execution target launched");

        // Reap the child so it does not linger as a zombie
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(pid, %status, "Execution target exited"),
                Err(e) => warn!(pid, error = %e, "Failed to wait for execution target"),
            }
        });

        Ok(pid)
    }
}
