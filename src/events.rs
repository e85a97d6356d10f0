use tokio::sync::mpsc;

use crate::transport::RemoteEntry;

/// Events the client reports to its observer (the front end).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Progress(u8),       // Transfer progress, 0..=100
    Status(String),     // Human-readable status line
    ListEntry(RemoteEntry),
    ClearListing,       // Sent right before a fresh LIST is issued
    Connected(bool),
}

/// Sending half for [`ClientEvent`]s.
///
/// A dropped receiver is not an error: the engine keeps running without an observer.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Client event dropped, observer is gone");
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.emit(ClientEvent::Status(message));
    }

    pub fn progress(&self, percent: u8) {
        self.emit(ClientEvent::Progress(percent));
    }

    pub fn connected(&self, connected: bool) {
        self.emit(ClientEvent::Connected(connected));
    }

    pub fn clear_listing(&self) {
        self.emit(ClientEvent::ClearListing);
    }

    pub fn list_entry(&self, entry: RemoteEntry) {
        self.emit(ClientEvent::ListEntry(entry));
    }
}
