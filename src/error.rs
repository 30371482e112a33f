use thiserror::Error;

/// Failures of the media key interceptor's lifecycle operations
#[derive(Debug, Error)]
pub enum InterceptorError {
    #[error("accessibility permission has not been granted")]
    PermissionDenied,

    #[error("a permission poll is already running")]
    AlreadyPolling,

    #[error("failed to install the key event tap: {0}")]
    TapInstall(String),
}
