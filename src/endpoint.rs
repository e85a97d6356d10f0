//! Remote session endpoint and remote path helpers.

use crate::error::{AppError, Result};

/// Default FTP control port.
pub const FTP_DEFAULT_PORT: u16 = 21;

/// Where the client connects and which remote directory it is looking at.
///
/// Pure data: every mutation goes through a setter, and every command that
/// needs a destination path reads [`SessionEndpoint::remote_path`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEndpoint {
    host: String,
    port: u16,
    username: String,
    password: Option<String>,
    remote_path: String,
}

impl Default for SessionEndpoint {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: FTP_DEFAULT_PORT,
            username: String::new(),
            password: None,
            remote_path: "/".to_string(),
        }
    }
}

impl SessionEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn set_host_port(&mut self, host: impl Into<String>, port: u16) {
        self.host = host.into();
        self.port = port;
    }

    /// An empty username means anonymous login.
    pub fn set_user_info(&mut self, username: impl Into<String>, password: Option<String>) {
        self.username = username.into();
        self.password = password;
    }

    pub fn set_remote_path(&mut self, path: impl Into<String>) {
        self.remote_path = path.into();
    }

    /// Login credentials, or `None` for an anonymous login.
    pub fn credentials(&self) -> Option<(String, String)> {
        if self.username.is_empty() {
            None
        } else {
            Some((
                self.username.clone(),
                self.password.clone().unwrap_or_default(),
            ))
        }
    }

    /// Path to `cd` into right after login.
    pub fn initial_path(&self) -> &str {
        if self.remote_path.is_empty() {
            "/"
        } else {
            &self.remote_path
        }
    }

    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// Split `host[:port]`, falling back to `default_port`. A bare IPv6 literal
/// is taken as a host.
pub fn parse_host_port(input: &str, default_port: u16) -> Result<(String, u16)> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AppError::ValidationError("Host cannot be empty".to_string()));
    }
    match input.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.contains(':') => match port.parse::<u16>() {
            Ok(port) if port > 0 => Ok((host.to_string(), port)),
            _ => Err(AppError::ValidationError(format!("Invalid port: {port}"))),
        },
        _ => Ok((input.to_string(), default_port)),
    }
}

/// Parent of a remote path, truncated at the last `/`.
///
/// A path without a parent component normalizes to the root.
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
    }
}

/// Append a child name to a remote directory path.
pub fn join_remote(dir: &str, name: &str) -> String {
    let name = name.trim_matches('/');
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}
