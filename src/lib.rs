pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod endpoint;
mod error;
pub mod events;
pub mod filesystem;
pub mod repl;
pub mod transfer;
pub mod transport;
pub mod upload;
mod utils;

// Re-export commonly used types
pub use client::FtpClient;
pub use config::{Bookmark, ConfigManager};
pub use endpoint::{SessionEndpoint, parse_host_port};
pub use error::{AppError, Result};
pub use events::{ClientEvent, EventEmitter};
pub use filesystem::LocalDirectoryLister;
pub use repl::{Flow, Repl, ReplCommand};
pub use transport::{
    ConnectionState, Connector, FtpConnector, Notification, RemoteEntry, Transport,
};
pub use utils::{LOG_FILE, init_tracing, timestamped};
