//! Transport layer for editor ↔ daemon communication.
//!
//! Provides length-prefixed JSON framing and the serve loop that feeds
//! framed requests to the host service.

pub mod protocol;
pub mod stdio;

pub use protocol::{HostRequest, HostResponse};
pub use stdio::{serve, serve_stdio};

use anyhow::Result;

/// Maximum message size (64 MB). Safety valve against malformed messages.
const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

/// Write a length-prefixed message to a writer.
///
/// Format: [4-byte big-endian length][payload bytes]
pub async fn send_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| anyhow::anyhow!("Message too large: {} bytes", payload.len()))?;
    anyhow::ensure!(
        len <= MAX_MESSAGE_SIZE,
        "Message exceeds max size: {len} > {MAX_MESSAGE_SIZE}"
    );

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-prefixed message from a reader.
///
/// Returns `None` on a clean end of stream (EOF before a length prefix).
/// Enforces `MAX_MESSAGE_SIZE`.
pub async fn recv_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);

    anyhow::ensure!(
        len <= MAX_MESSAGE_SIZE,
        "Message exceeds max size: {len} > {MAX_MESSAGE_SIZE}"
    );

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::transport::protocol::ResponseData;

    #[tokio::test]
    async fn framing_preserves_payload() {
        let mut buf = Vec::new();
        send_message(&mut buf, b"hello world").await.unwrap();
        assert_eq!(&buf[..4], &11u32.to_be_bytes());

        let mut cursor = std::io::Cursor::new(buf);
        let received = recv_message(&mut cursor).await.unwrap();
        assert_eq!(received.as_deref(), Some(&b"hello world"[..]));
    }

    #[tokio::test]
    async fn empty_payload() {
        let mut buf = Vec::new();
        send_message(&mut buf, b"").await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let received = recv_message(&mut cursor).await.unwrap();
        assert_eq!(received, Some(Vec::new()));
    }

    #[tokio::test]
    async fn eof_is_end_of_stream() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(recv_message(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_payload_is_an_error() {
        let mut buf = 10u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"abc");
        let mut cursor = std::io::Cursor::new(buf);
        assert!(recv_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let buf = (MAX_MESSAGE_SIZE + 1).to_be_bytes().to_vec();
        let mut cursor = std::io::Cursor::new(buf);
        assert!(recv_message(&mut cursor).await.is_err());
    }

    #[test]
    fn protocol_deserialize_requests() {
        let req: HostRequest = serde_json::from_str(r#"{"type":"list_files"}"#).unwrap();
        assert!(matches!(req, HostRequest::ListFiles { root: None }));

        let req: HostRequest =
            serde_json::from_str(r#"{"type":"rename_file","old_name":"a.lua","new_name":"b"}"#)
                .unwrap();
        assert!(matches!(req, HostRequest::RenameFile { ref old_name, ref new_name }
            if old_name == "a.lua" && new_name == "b"));

        let req: HostRequest =
            serde_json::from_str(r#"{"type":"open_file","path":null}"#).unwrap();
        assert!(matches!(req, HostRequest::OpenFile { path: None }));

        let req: HostRequest = serde_json::from_str(r#"{"type":"execute"}"#).unwrap();
        assert!(matches!(req, HostRequest::Execute { script: None }));
    }

    #[test]
    fn protocol_serialize_success() {
        let resp = HostResponse::ok(ResponseData::Launched { pid: 42 });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": true, "data": {"type": "launched", "pid": 42}})
        );

        let json = serde_json::to_string(&HostResponse::ack()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);
    }

    #[test]
    fn protocol_serialize_failure() {
        let resp = HostResponse::failure(&RelayError::NotConnected);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "not_connected");
        assert_eq!(json["error"]["message"], "execution target is not connected");
        assert!(json.get("data").is_none());
    }
}
