//! script-relay daemon
//!
//! Serves the editor's host requests on stdio and relays scripts to the
//! execution target over a local WebSocket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use script_relay::channel::{server::ChannelServer, ExecutionChannel};
use script_relay::config::Config;
use script_relay::host::HostService;
use script_relay::launcher::ProcessLauncher;
use script_relay::session::SessionStore;
use script_relay::transport;
use script_relay::workspace::WorkspaceIndex;

#[derive(Parser, Debug)]
#[command(name = "script-relay")]
#[command(about = "Workspace host and execution relay for a script editor")]
struct Args {
    /// Path to a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workspace directory (overrides config)
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Execution channel port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Session file (overrides config)
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Serve host requests on stdin/stdout
    #[arg(long)]
    stdio: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr so stdout is free for the host protocol)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(session_file) = args.session_file {
        config.session.path = Some(session_file);
    }

    // CLI flags win over both the config file and the environment
    let mut addr = config.channel_addr()?;
    if let Some(port) = args.port {
        addr.set_port(port);
    }
    let workspace = match args.workspace {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => std::env::current_dir()
            .context("Failed to resolve current directory")?
            .join(dir),
        None => config.resolved_workspace_dir(),
    };
    tokio::fs::create_dir_all(&workspace)
        .await
        .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;

    info!(
        workspace = %workspace.display(),
        %addr,
        "Loaded configuration"
    );

    let channel = Arc::new(ExecutionChannel::new(config.channel.welcome.clone()));
    let server = ChannelServer::bind(addr, Arc::clone(&channel)).await?;
    let server_task = server.spawn();

    let host = Arc::new(HostService::new(
        WorkspaceIndex::new(config.workspace.extensions.clone()),
        workspace,
        channel,
        SessionStore::new(config.session_path()),
        Arc::new(ProcessLauncher::new(config.resolved_target())),
    ));
    host.restore_session().await;
    let autosave = config
        .autosave_interval()
        .and_then(|interval| host.start_autosave(interval));

    if args.stdio {
        transport::serve_stdio(Arc::clone(&host)).await?;
    } else {
        info!("Waiting for Ctrl-C");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
    }

    if let Some(autosave) = autosave {
        autosave.abort();
    }
    server_task.abort();
    if let Err(e) = host.save_session().await {
        warn!(error = %e, "Failed to save session on exit");
    }
    info!("Shut down");

    Ok(())
}
