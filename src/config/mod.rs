pub mod manager;

pub use manager::{AppSettings, Bookmark, Config, ConfigManager};
