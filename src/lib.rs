//! script-relay daemon library
//!
//! Headless host behind a script editor front-end:
//! - Workspace file index (list, find, read, write, rename script files)
//! - Execution channel: a single-peer local WebSocket speaking opcode-tagged frames
//! - Editor session (open tabs) persisted across restarts
//! - Host request protocol served over stdin/stdout

pub mod channel;
pub mod config;
pub mod error;
pub mod host;
pub mod launcher;
pub mod session;
pub mod transport;
pub mod workspace;
