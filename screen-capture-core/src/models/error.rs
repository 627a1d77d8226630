use thiserror::Error;

use super::media::Permission;

/// Errors that can occur during screen capture operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("{0} permission denied")]
    PermissionDenied(Permission),

    #[error("no display available for capture")]
    NoDisplayAvailable,

    /// A producer delivered a sample without format metadata.
    #[error("sample has no format description")]
    NoFormatDescription,

    #[error("recording could not be saved: {0}")]
    RecordingSaveFailed(String),

    #[error("a recording is already in progress")]
    SessionActive,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("capture stream failed: {0}")]
    StreamFailed(String),

    #[error("container writer failed: {0}")]
    WriterFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Whether the user can fix this and try again (grant access, connect
    /// a display).
    pub fn is_user_recoverable(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::NoDisplayAvailable)
    }
}
