use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("FTP connection failed: {0}")]
    ConnectionError(String),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Remote operation failed: {0}")]
    RemoteOperationError(String),

    #[error("Transfer failed: {0}")]
    TransferError(String),

    #[error("Not connected to an FTP server")]
    NotConnected,

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Transport worker is no longer running")]
    TransportClosed,

    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),
}

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;
