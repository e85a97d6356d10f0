//! Connection lifecycle: opening and tearing down the transport, and turning
//! raw state changes into status lines.

use tracing::{debug, info, warn};

use crate::client::{FtpClient, Link};
use crate::error::{AppError, Result};
use crate::filesystem::DirectoryLister;
use crate::transport::{
    Command, ConnectionState, Connector, EventSink, SessionId, Transport,
};

/// What a state change means for the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateReport {
    pub connected: bool,
    pub message: Option<String>,
}

/// Tracks the last reported transport state.
#[derive(Debug)]
pub struct ConnectionTracker {
    state: ConnectionState,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self {
            state: ConnectionState::Unconnected,
        }
    }
}

impl ConnectionTracker {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::LoggedIn
    }

    pub fn on_state_changed(&mut self, state: ConnectionState, host: &str) -> StateReport {
        self.state = state;
        StateReport {
            connected: self.is_connected(),
            message: state_message(state, host),
        }
    }

    pub fn reset(&mut self) {
        self.state = ConnectionState::Unconnected;
    }
}

/// Status line for a state, if that state is worth announcing.
pub fn state_message(state: ConnectionState, host: &str) -> Option<String> {
    match state {
        ConnectionState::Unconnected => Some(format!("Disconnected from FTP server {host}...")),
        ConnectionState::Connecting => Some(format!("Connecting to FTP server {host}...")),
        ConnectionState::Connected => Some(format!("Connected to FTP server {host}...")),
        ConnectionState::LoggedIn => Some(format!("Logged onto {host}")),
        ConnectionState::HostLookup | ConnectionState::Closing => None,
    }
}

impl<C: Connector, L: DirectoryLister> FtpClient<C, L> {
    /// Open a transport if needed and queue connect, login and the initial cd.
    pub fn connect(&mut self) -> Result<()> {
        if self.endpoint.host().trim().is_empty() {
            return Err(AppError::ValidationError("Host cannot be empty".to_string()));
        }
        if !self.has_transport() {
            self.open_transport()?;
        }

        info!("Connecting to {}", self.endpoint.host_port());
        let host = self.endpoint.host().to_string();
        let port = self.endpoint.port();
        let credentials = self.endpoint.credentials();
        let path = self.endpoint.initial_path().to_string();

        self.send(Command::ConnectToHost { host, port })?;
        self.send(Command::Login { credentials })?;
        self.send(Command::Cd(path))
    }

    /// Tear down the transport. Returns false when there was nothing to tear down.
    pub fn disconnect(&mut self) -> bool {
        let Link::Present {
            session,
            mut transport,
        } = std::mem::replace(&mut self.link, Link::Absent)
        else {
            debug!("disconnect: no transport");
            return false;
        };

        info!("Closing session {}", session.0);
        transport.abort();
        transport.close();
        drop(transport);

        self.commands.clear();
        self.uploads.reset();
        if let Some(path) = self.transfers.discard() {
            debug!("Dropped transfer of {}", path.display());
        }
        self.connection.reset();

        self.events.status(format!(
            "Disconnected from FTP server {}...",
            self.endpoint.host()
        ));
        self.events.connected(false);
        true
    }

    /// Disconnect when a transport exists, connect otherwise.
    pub fn toggle_connection(&mut self) -> Result<()> {
        if self.disconnect() {
            Ok(())
        } else {
            self.connect()
        }
    }

    /// Re-issue a connect when not logged in and none is already on its way.
    pub fn reconnect_if_needed(&mut self) -> Result<()> {
        if self.connection.is_connected() || self.commands.is_connecting() {
            return Ok(());
        }
        debug!("Not logged in, reconnecting");
        self.connect()
    }

    fn open_transport(&mut self) -> Result<()> {
        self.next_session += 1;
        let session = SessionId(self.next_session);
        let sink = EventSink::new(session, self.notify_tx.clone());
        let transport = self.connector.open(sink).map_err(|e| {
            warn!("Failed to open transport: {}", e);
            e
        })?;
        self.link = Link::Present { session, transport };
        self.connection.reset();
        Ok(())
    }

    pub(crate) fn on_state_changed(&mut self, state: ConnectionState) {
        debug!("Connection state changed to {:?}", state);
        let report = self.connection.on_state_changed(state, self.endpoint.host());
        self.events.connected(report.connected);
        if let Some(message) = report.message {
            self.events.status(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ClientEvent;
    use crate::transport::testing::{Harness, Recorded};

    #[test]
    fn test_connected_only_when_logged_in() {
        let mut tracker = ConnectionTracker::default();
        for state in [
            ConnectionState::HostLookup,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Closing,
            ConnectionState::Unconnected,
        ] {
            assert!(!tracker.on_state_changed(state, "h").connected);
        }
        let report = tracker.on_state_changed(ConnectionState::LoggedIn, "h");
        assert!(report.connected);
        assert_eq!(report.message.as_deref(), Some("Logged onto h"));
    }

    #[test]
    fn test_silent_states() {
        assert_eq!(state_message(ConnectionState::Closing, "h"), None);
        assert_eq!(state_message(ConnectionState::HostLookup, "h"), None);
        assert_eq!(
            state_message(ConnectionState::Connecting, "h").as_deref(),
            Some("Connecting to FTP server h...")
        );
    }

    #[test]
    fn test_connect_queues_connect_login_cd() {
        let mut h = Harness::new();
        h.client.set_path("/pub");
        h.client.connect().unwrap();
        assert!(h.client.has_transport());
        assert_eq!(
            h.connector.take_commands(),
            vec![Command::ConnectToHost {
                host: Harness::HOST.to_string(),
                port: 21
            }]
        );

        h.complete_login();
        assert!(h.client.is_connected());
        assert_eq!(
            h.connector.take_commands(),
            vec![
                Command::Login {
                    credentials: Some(("alice".to_string(), "secret".to_string()))
                },
                Command::Cd("/pub".to_string()),
            ]
        );
    }

    #[test]
    fn test_connect_requires_host() {
        let mut h = Harness::new();
        h.client.set_host_port("  ", 21);
        assert!(matches!(
            h.client.connect(),
            Err(AppError::ValidationError(_))
        ));
        assert!(!h.client.has_transport());
    }

    #[test]
    fn test_state_changes_always_report_connected_flag() {
        let mut h = Harness::new();
        h.client.connect().unwrap();
        h.state(ConnectionState::HostLookup);
        h.state(ConnectionState::Connecting);
        h.state(ConnectionState::Closing);

        assert_eq!(
            h.drain_events(),
            vec![
                ClientEvent::Connected(false),
                ClientEvent::Connected(false),
                ClientEvent::Status(format!("Connecting to FTP server {}...", Harness::HOST)),
                ClientEvent::Connected(false),
            ]
        );
    }

    #[test]
    fn test_disconnect_tears_down() {
        let mut h = Harness::connected();
        h.client.mkdir("a").unwrap();
        h.client.mkdir("b").unwrap();

        assert!(h.client.disconnect());
        assert!(!h.client.has_transport());
        assert!(!h.client.is_connected());
        assert_eq!(h.client.active_command(), None);
        assert_eq!(h.client.pending_commands(), 0);

        let recorded = h.connector.take();
        assert_eq!(
            &recorded[recorded.len() - 2..],
            &[Recorded::Abort, Recorded::Close]
        );
        assert_eq!(
            h.drain_events(),
            vec![
                ClientEvent::Status(format!("Disconnected from FTP server {}...", Harness::HOST)),
                ClientEvent::Connected(false),
            ]
        );
    }

    #[test]
    fn test_disconnect_without_transport_is_noop() {
        let mut h = Harness::new();
        assert!(!h.client.disconnect());
        assert!(h.drain_events().is_empty());
        assert!(h.connector.take().is_empty());
    }

    #[test]
    fn test_toggle_connection() {
        let mut h = Harness::new();
        h.client.toggle_connection().unwrap();
        assert!(h.client.has_transport());
        h.client.toggle_connection().unwrap();
        assert!(!h.client.has_transport());
        assert_eq!(h.connector.sessions(), vec![SessionId(1)]);
    }

    #[test]
    fn test_reconnect_skipped_while_connecting() {
        let mut h = Harness::new();
        h.client.connect().unwrap();
        h.connector.take();

        // Connect is still in flight
        h.client.mkdir("x").unwrap();
        assert!(h.connector.take_commands().is_empty());
        assert_eq!(h.client.pending_commands(), 3);
    }

    #[test]
    fn test_reconnect_after_connection_lost() {
        let mut h = Harness::connected();
        h.state(ConnectionState::Unconnected);
        assert!(!h.client.is_connected());
        h.drain_events();

        h.client.mkdir("x").unwrap();
        let commands = h.connector.take_commands();
        assert!(matches!(commands[0], Command::ConnectToHost { .. }));
        assert_eq!(h.client.pending_commands(), 3);

        h.complete_login();
        h.finish_ok(); // Cd
        assert_eq!(
            h.connector.take_commands(),
            vec![
                Command::Login {
                    credentials: Some(("alice".to_string(), "secret".to_string()))
                },
                Command::Cd("/".to_string()),
                Command::Mkdir("x".to_string()),
            ]
        );
    }
}
