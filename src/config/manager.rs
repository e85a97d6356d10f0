use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::endpoint::{FTP_DEFAULT_PORT, SessionEndpoint};
use crate::error::{AppError, Result};

/// Application settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AppSettings {
    pub default_port: u16,
    /// Starting local directory. The working directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_port: FTP_DEFAULT_PORT,
            local_dir: None,
        }
    }
}

fn default_remote_path() -> String {
    "/".to_string()
}

/// A saved FTP server. Passwords are never stored.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Bookmark {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_remote_path")]
    pub remote_path: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl Bookmark {
    pub fn new(host: String, port: u16, username: String) -> Self {
        let name = host.clone(); // Default name is the host
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            host,
            port,
            username,
            remote_path: default_remote_path(),
            created_at: Utc::now(),
            last_used: None,
        }
    }

    /// Bookmark the server and directory of a session.
    pub fn from_endpoint(endpoint: &SessionEndpoint) -> Self {
        let mut bookmark = Self::new(
            endpoint.host().to_string(),
            endpoint.port(),
            endpoint.username().to_string(),
        );
        bookmark.remote_path = endpoint.initial_path().to_string();
        bookmark
    }

    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Host cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(AppError::ValidationError(
                "Port must be greater than 0".to_string(),
            ));
        }

        if self.name.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Bookmark name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn update_last_used(&mut self) {
        self.last_used = Some(Utc::now());
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Session settings for this bookmark, without a password.
    pub fn to_endpoint(&self) -> SessionEndpoint {
        let mut endpoint = SessionEndpoint::new(self.host.clone(), self.port);
        endpoint.set_user_info(self.username.clone(), None);
        endpoint.set_remote_path(self.remote_path.clone());
        endpoint
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
    #[serde(default)]
    pub settings: AppSettings,
}

/// Loads, edits and persists the TOML configuration file.
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Create a configuration manager with a custom config path
    pub fn with_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::ConfigError("No config directory on this platform".to_string()))?
            .join("termftp");

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                AppError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        Ok(config_dir.join("config.toml"))
    }

    fn load_config_from_path(config_path: &Path) -> Result<Config> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(config_path)
            .map_err(|e| AppError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Persist current config to disk
    pub fn save(&self) -> Result<()> {
        let toml = toml::to_string_pretty(&self.config)
            .map_err(|e| AppError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }
        fs::write(&self.config_path, toml)
            .map_err(|e| AppError::ConfigError(format!("Failed to write config: {}", e)))?;
        Ok(())
    }

    pub fn settings(&self) -> &AppSettings {
        &self.config.settings
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.config.bookmarks
    }

    /// Look a bookmark up by name, falling back to host.
    pub fn find_bookmark(&self, key: &str) -> Option<&Bookmark> {
        self.config
            .bookmarks
            .iter()
            .find(|b| b.name == key)
            .or_else(|| self.config.bookmarks.iter().find(|b| b.host == key))
    }

    /// Add a bookmark and persist it. Returns false when the same
    /// host/port/username is already saved.
    pub fn add_bookmark(&mut self, bookmark: Bookmark) -> Result<bool> {
        bookmark.validate()?;

        let exists = self.config.bookmarks.iter().any(|b| {
            b.host == bookmark.host && b.port == bookmark.port && b.username == bookmark.username
        });
        if exists {
            return Ok(false);
        }
        self.config.bookmarks.push(bookmark);
        self.save()?;
        Ok(true)
    }

    pub fn remove_bookmark(&mut self, id: &str) -> Result<()> {
        let initial_len = self.config.bookmarks.len();
        self.config.bookmarks.retain(|b| b.id != id);

        if self.config.bookmarks.len() == initial_len {
            Err(AppError::ConfigError("Bookmark not found".to_string()))
        } else {
            self.save()
        }
    }

    /// Update last_used for a bookmark by id and persist
    pub fn touch_last_used(&mut self, id: &str) -> Result<()> {
        if let Some(b) = self.config.bookmarks.iter_mut().find(|b| b.id == id) {
            b.update_last_used();
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml")).unwrap();
        (dir, manager)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (_dir, manager) = manager();
        assert!(manager.bookmarks().is_empty());
        assert_eq!(manager.settings().default_port, 21);
        assert_eq!(manager.settings().local_dir, None);
    }

    #[test]
    fn test_add_bookmark_persists_and_dedupes() {
        let (dir, mut manager) = manager();
        let bookmark = Bookmark::new("ftp.example.com".to_string(), 21, "alice".to_string());
        assert!(manager.add_bookmark(bookmark.clone()).unwrap());

        let mut duplicate = Bookmark::new("ftp.example.com".to_string(), 21, "alice".to_string());
        duplicate.set_name("other".to_string());
        assert!(!manager.add_bookmark(duplicate).unwrap());

        let reloaded = ConfigManager::with_path(dir.path().join("config.toml")).unwrap();
        assert_eq!(reloaded.bookmarks(), &[bookmark]);
    }

    #[test]
    fn test_add_bookmark_validates() {
        let (_dir, mut manager) = manager();
        let bookmark = Bookmark::new(" ".to_string(), 21, String::new());
        assert!(matches!(
            manager.add_bookmark(bookmark),
            Err(AppError::ValidationError(_))
        ));
        let bookmark = Bookmark::new("h".to_string(), 0, String::new());
        assert!(matches!(
            manager.add_bookmark(bookmark),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_find_and_remove_bookmark() {
        let (_dir, mut manager) = manager();
        let mut bookmark = Bookmark::new("ftp.example.com".to_string(), 2121, String::new());
        bookmark.set_name("mirror".to_string());
        let id = bookmark.id.clone();
        manager.add_bookmark(bookmark).unwrap();

        assert_eq!(manager.find_bookmark("mirror").unwrap().port, 2121);
        assert_eq!(manager.find_bookmark("ftp.example.com").unwrap().id, id);
        assert!(manager.find_bookmark("nope").is_none());

        manager.touch_last_used(&id).unwrap();
        assert!(manager.bookmarks()[0].last_used.is_some());

        manager.remove_bookmark(&id).unwrap();
        assert!(manager.remove_bookmark(&id).is_err());
    }

    #[test]
    fn test_bookmark_round_trips_through_endpoint() {
        let mut endpoint = SessionEndpoint::new("ftp.example.com".to_string(), 21);
        endpoint.set_user_info("bob".to_string(), Some("pw".to_string()));
        endpoint.set_remote_path("/pub".to_string());

        let bookmark = Bookmark::from_endpoint(&endpoint);
        assert_eq!(bookmark.remote_path, "/pub");

        let restored = bookmark.to_endpoint();
        assert_eq!(restored.host(), "ftp.example.com");
        assert_eq!(restored.username(), "bob");
        assert_eq!(restored.remote_path(), "/pub");
        assert_eq!(restored.credentials(), Some(("bob".to_string(), String::new())));

        let serialized = toml::to_string(&bookmark).unwrap();
        assert!(!serialized.contains("pw"));
    }

    #[test]
    fn test_parse_minimal_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[settings]
default_port = 2121

[[bookmarks]]
id = "1"
name = "local"
host = "127.0.0.1"
port = 2121
created_at = "2024-01-01T00:00:00Z"
"#,
        )
        .unwrap();

        let manager = ConfigManager::with_path(&path).unwrap();
        assert_eq!(manager.settings().default_port, 2121);
        let bookmark = manager.find_bookmark("local").unwrap();
        assert_eq!(bookmark.remote_path, "/");
        assert_eq!(bookmark.username, "");
        assert_eq!(bookmark.last_used, None);
    }
}
