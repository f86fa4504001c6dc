//! Request loop over a byte stream, normally the daemon's stdin/stdout.
//!
//! Reads one framed `HostRequest` at a time, answers it with exactly one
//! framed `HostResponse` and stops on end of input or `shutdown`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::protocol::{HostRequest, HostResponse};
use super::{recv_message, send_message};
use crate::error::RelayError;
use crate::host::HostService;

/// Serve requests from `reader` until EOF or `shutdown`.
pub async fn serve<R, W>(host: &HostService, reader: &mut R, writer: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = recv_message(reader)
        .await
        .context("Failed to read request")?
    {
        let (response, stop) = match serde_json::from_slice::<HostRequest>(&bytes) {
            Ok(HostRequest::Shutdown) => {
                info!("Shutdown requested");
                (HostResponse::ack(), true)
            }
            Ok(request) => (host.handle(request).await, false),
            Err(e) => {
                warn!(error = %e, "Malformed request");
                (
                    HostResponse::failure(&RelayError::Protocol(e.to_string())),
                    false,
                )
            }
        };

        let payload = serde_json::to_vec(&response).context("Failed to encode response")?;
        send_message(writer, &payload)
            .await
            .context("Failed to write response")?;

        if stop {
            return Ok(());
        }
    }

    debug!("Request stream closed");
    Ok(())
}

/// Serve requests on the process's stdin/stdout.
pub async fn serve_stdio(host: Arc<HostService>) -> Result<()> {
    info!("Serving host requests on stdio");

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    serve(&host, &mut stdin, &mut stdout).await
}
