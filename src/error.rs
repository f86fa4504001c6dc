//! Error taxonomy shared by the index, the channel and the host service.

/// Everything that can go wrong behind the host boundary.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("execution target is not connected")]
    NotConnected,

    #[error("dialog was cancelled")]
    DialogCancelled,

    #[error("no execution target is configured")]
    TargetNotConfigured,

    #[error("{0}")]
    Tab(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RelayError {
    /// Stable machine-readable name for the host protocol.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Io(_) => "io",
            Self::NotConnected => "not_connected",
            Self::DialogCancelled => "dialog_cancelled",
            Self::TargetNotConfigured => "target_not_configured",
            Self::Tab(_) => "tab",
            Self::Protocol(_) => "protocol",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(RelayError::NotConnected.kind(), "not_connected");
        assert_eq!(RelayError::NotFound("x".into()).kind(), "not_found");
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(RelayError::from(io).kind(), "io");
    }
}
