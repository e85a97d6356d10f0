//! The seam between the engine and whatever speaks the wire protocol.
//!
//! A [`Transport`] accepts one [`Command`] at a time and reports back through
//! an [`EventSink`]. The engine never blocks on it: it submits, returns, and
//! resumes when a [`Notification`] arrives.

pub mod ftp;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

pub use ftp::{FtpConnector, FtpTransport};

/// Raw transport connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    HostLookup,
    Connecting,
    Connected,
    LoggedIn,
    Closing,
}

/// One entry of a remote directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: Option<u64>,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size: Some(size),
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: None,
        }
    }
}

/// A control-channel command.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    ConnectToHost { host: String, port: u16 },
    Login { credentials: Option<(String, String)> },
    Cd(String),
    Mkdir(String),
    Rmdir(String),
    Rename { from: String, to: String },
    Remove(String),
    List,
    Get { remote: String },
    Put { remote: String, data: Bytes },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ConnectToHost { host, port } => write!(f, "ConnectToHost({host}:{port})"),
            // never print the password
            Command::Login { credentials } => match credentials {
                Some((user, _)) => write!(f, "Login({user})"),
                None => write!(f, "Login(anonymous)"),
            },
            Command::Cd(path) => write!(f, "Cd({path})"),
            Command::Mkdir(name) => write!(f, "Mkdir({name})"),
            Command::Rmdir(name) => write!(f, "Rmdir({name})"),
            Command::Rename { from, to } => write!(f, "Rename({from} -> {to})"),
            Command::Remove(name) => write!(f, "Remove({name})"),
            Command::List => write!(f, "List"),
            Command::Get { remote } => write!(f, "Get({remote})"),
            Command::Put { remote, data } => write!(f, "Put({remote}, {} bytes)", data.len()),
        }
    }
}

/// What a transport reports back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    StateChanged(ConnectionState),
    /// The command in flight finished. Carries no command identity on purpose.
    CommandFinished { error: Option<String> },
    ListInfo(RemoteEntry),
    /// A chunk of a download body.
    Data(Bytes),
    Progress { transferred: u64, total: u64 },
}

/// Identifies one transport instance, so events from a torn-down one can be dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub session: SessionId,
    pub event: TransportEvent,
}

/// Session-tagged sender handed to a transport when it is opened.
#[derive(Clone, Debug)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<Notification>,
}

impl EventSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Returns false once the engine side is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Notification {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// A live control channel. At most one command is outstanding at any time;
/// the engine guarantees it never submits a second one before the first finished.
pub trait Transport {
    /// Queue `command` for execution. Must not block.
    fn submit(&mut self, command: Command) -> Result<()>;

    /// Abort the running data transfer, if any.
    fn abort(&mut self);

    /// Close the control channel and stop the transport.
    fn close(&mut self);
}

/// Creates transports on demand.
pub trait Connector {
    type Transport: Transport;

    fn open(&mut self, sink: EventSink) -> Result<Self::Transport>;
}
