//! In-process transport double that records everything the engine asks of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::{
    Command, ConnectionState, Connector, EventSink, Notification, SessionId, Transport,
    TransportEvent,
};
use crate::client::FtpClient;
use crate::error::{AppError, Result};
use crate::events::{ClientEvent, EventEmitter};
use crate::filesystem::LocalDirectoryLister;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Recorded {
    Submit(Command),
    Abort,
    Close,
}

#[derive(Clone, Default)]
pub(crate) struct RecordingConnector {
    log: Arc<Mutex<Vec<Recorded>>>,
    sessions: Arc<Mutex<Vec<SessionId>>>,
    fail_submit: Arc<AtomicBool>,
}

impl RecordingConnector {
    /// Everything recorded since the last call.
    pub(crate) fn take(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    /// Submitted commands since the last call, dropping aborts and closes.
    pub(crate) fn take_commands(&self) -> Vec<Command> {
        self.take()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Submit(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn sessions(&self) -> Vec<SessionId> {
        self.sessions.lock().unwrap().clone()
    }

    /// Make every following submit fail as if the worker had died.
    pub(crate) fn fail_submits(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }
}

impl Connector for RecordingConnector {
    type Transport = RecordingTransport;

    fn open(&mut self, sink: EventSink) -> Result<RecordingTransport> {
        self.sessions.lock().unwrap().push(sink.session());
        Ok(RecordingTransport {
            log: Arc::clone(&self.log),
            fail_submit: Arc::clone(&self.fail_submit),
        })
    }
}

pub(crate) struct RecordingTransport {
    log: Arc<Mutex<Vec<Recorded>>>,
    fail_submit: Arc<AtomicBool>,
}

impl Transport for RecordingTransport {
    fn submit(&mut self, command: Command) -> Result<()> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(AppError::TransportClosed);
        }
        self.log.lock().unwrap().push(Recorded::Submit(command));
        Ok(())
    }

    fn abort(&mut self) {
        self.log.lock().unwrap().push(Recorded::Abort);
    }

    fn close(&mut self) {
        self.log.lock().unwrap().push(Recorded::Close);
    }
}

/// A client wired to a [`RecordingConnector`], driven by hand-fed notifications.
pub(crate) struct Harness {
    pub(crate) client: FtpClient<RecordingConnector>,
    pub(crate) connector: RecordingConnector,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    _notifications: mpsc::UnboundedReceiver<Notification>,
}

impl Harness {
    pub(crate) const HOST: &'static str = "ftp.example.com";

    pub(crate) fn new() -> Self {
        let connector = RecordingConnector::default();
        let (emitter, events) = EventEmitter::channel();
        let (mut client, notifications) =
            FtpClient::new(connector.clone(), LocalDirectoryLister, emitter);
        client.set_host_port(Self::HOST, 21);
        client.set_user_info("alice", Some("secret".to_string()));
        Self {
            client,
            connector,
            events,
            _notifications: notifications,
        }
    }

    /// Logged in at "/" with an idle queue and nothing recorded.
    pub(crate) fn connected() -> Self {
        let mut h = Self::new();
        h.client.connect().unwrap();
        h.complete_login();
        h.finish_ok(); // Cd
        h.finish_ok(); // List
        h.connector.take();
        h.drain_events();
        h
    }

    /// Walk an issued connect through lookup, connect and login.
    pub(crate) fn complete_login(&mut self) {
        self.state(ConnectionState::HostLookup);
        self.state(ConnectionState::Connecting);
        self.state(ConnectionState::Connected);
        self.finish_ok();
        self.state(ConnectionState::LoggedIn);
        self.finish_ok();
    }

    pub(crate) fn notify(&mut self, event: TransportEvent) {
        let session = self.client.session_id().expect("no transport open");
        self.client
            .handle_notification(Notification { session, event });
    }

    pub(crate) fn state(&mut self, state: ConnectionState) {
        self.notify(TransportEvent::StateChanged(state));
    }

    pub(crate) fn finish_ok(&mut self) {
        self.notify(TransportEvent::CommandFinished { error: None });
    }

    pub(crate) fn finish_err(&mut self, error: &str) {
        self.notify(TransportEvent::CommandFinished {
            error: Some(error.to_string()),
        });
    }

    pub(crate) fn drain_events(&mut self) -> Vec<ClientEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Only the status lines among the drained events.
    pub(crate) fn drain_statuses(&mut self) -> Vec<String> {
        self.drain_events()
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}
