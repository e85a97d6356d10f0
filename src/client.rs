//! The FTP client engine.
//!
//! `FtpClient` is single-threaded and event driven: public operations queue
//! commands and return immediately, and all follow-up work happens inside
//! [`FtpClient::handle_notification`]. The behaviour is split by concern:
//! connection lifecycle in `connection`, completion routing in `dispatch`,
//! single transfers in `transfer`, directory uploads in `upload`.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::ConnectionTracker;
use crate::dispatch::{ActiveCommand, CommandQueue};
use crate::endpoint::{SessionEndpoint, join_remote, parent_path};
use crate::error::{AppError, Result};
use crate::events::EventEmitter;
use crate::filesystem::{DirectoryLister, LocalDirectoryLister};
use crate::transfer::{ActiveTransfer, TransferController};
use crate::transport::{
    Command, ConnectionState, Connector, Notification, SessionId, Transport, TransportEvent,
};
use crate::upload::UploadBatch;

/// The transport handle, or its absence. Checked before every remote operation.
pub(crate) enum Link<T> {
    Absent,
    Present { session: SessionId, transport: T },
}

pub struct FtpClient<C: Connector, L: DirectoryLister = LocalDirectoryLister> {
    pub(crate) endpoint: SessionEndpoint,
    pub(crate) connector: C,
    pub(crate) link: Link<C::Transport>,
    pub(crate) connection: ConnectionTracker,
    pub(crate) commands: CommandQueue,
    pub(crate) transfers: TransferController,
    pub(crate) uploads: UploadBatch,
    pub(crate) lister: L,
    pub(crate) events: EventEmitter,
    pub(crate) notify_tx: mpsc::UnboundedSender<Notification>,
    pub(crate) next_session: u64,
}

impl<C: Connector, L: DirectoryLister> FtpClient<C, L> {
    /// Create a client. Transport notifications arrive on the returned receiver
    /// and must be fed back through [`FtpClient::handle_notification`].
    pub fn new(
        connector: C,
        lister: L,
        events: EventEmitter,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let client = Self {
            endpoint: SessionEndpoint::default(),
            connector,
            link: Link::Absent,
            connection: ConnectionTracker::default(),
            commands: CommandQueue::default(),
            transfers: TransferController::default(),
            uploads: UploadBatch::default(),
            lister,
            events,
            notify_tx,
            next_session: 0,
        };
        (client, notify_rx)
    }

    pub fn endpoint(&self) -> &SessionEndpoint {
        &self.endpoint
    }

    pub fn set_endpoint(&mut self, endpoint: SessionEndpoint) {
        self.endpoint = endpoint;
    }

    pub fn set_host_port(&mut self, host: impl Into<String>, port: u16) {
        self.endpoint.set_host_port(host, port);
    }

    pub fn set_user_info(&mut self, username: impl Into<String>, password: Option<String>) {
        self.endpoint.set_user_info(username, password);
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.endpoint.set_remote_path(path);
    }

    /// True only once the server accepted the login.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn has_transport(&self) -> bool {
        matches!(self.link, Link::Present { .. })
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match &self.link {
            Link::Present { session, .. } => Some(*session),
            Link::Absent => None,
        }
    }

    pub fn active_command(&self) -> Option<&ActiveCommand> {
        self.commands.in_flight()
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.pending_len()
    }

    pub fn active_transfer(&self) -> Option<&ActiveTransfer> {
        self.transfers.active()
    }

    pub fn upload_batch(&self) -> &UploadBatch {
        &self.uploads
    }

    /// Route one transport notification. Notifications from a transport that
    /// has since been torn down are dropped.
    pub fn handle_notification(&mut self, notification: Notification) {
        if self.session_id() != Some(notification.session) {
            debug!(
                "Dropping notification from stale session {}: {:?}",
                notification.session.0, notification.event
            );
            return;
        }

        match notification.event {
            TransportEvent::StateChanged(state) => self.on_state_changed(state),
            TransportEvent::CommandFinished { error } => self.on_command_finished(error),
            TransportEvent::ListInfo(entry) => self.events.list_entry(entry),
            TransportEvent::Data(data) => self.on_transfer_data(&data),
            TransportEvent::Progress { transferred, total } => {
                self.on_transfer_progress(transferred, total)
            }
        }
    }

    /// Change the remote directory.
    ///
    /// Without a transport this only records the path, which the next
    /// [`connect`](Self::connect) then navigates to.
    pub fn cd_to(&mut self, path: &str) -> Result<()> {
        let path = if path.is_empty() { "/" } else { path };
        self.endpoint.set_remote_path(path);

        if !self.has_transport() {
            debug!("No transport, remote path {} recorded for the next connect", path);
            return Ok(());
        }
        self.reconnect_if_needed()?;
        self.send(Command::Cd(path.to_string()))
    }

    pub fn cd_to_root(&mut self) -> Result<()> {
        self.cd_to("/")
    }

    pub fn cd_to_parent(&mut self) -> Result<()> {
        let parent = parent_path(self.endpoint.remote_path());
        debug!("cd to parent {}", parent);
        self.cd_to(&parent)
    }

    /// Enter a child directory of the current remote path.
    pub fn cd_into(&mut self, name: &str) -> Result<()> {
        let path = join_remote(self.endpoint.remote_path(), name);
        self.cd_to(&path)
    }

    pub fn mkdir(&mut self, name: &str) -> Result<()> {
        self.remote_command(Command::Mkdir(name.to_string()))
    }

    pub fn rmdir(&mut self, name: &str) -> Result<()> {
        self.remote_command(Command::Rmdir(name.to_string()))
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.remote_command(Command::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.remote_command(Command::Remove(name.to_string()))
    }

    /// Clear the listing and fetch it again.
    pub fn refresh_listing(&mut self) -> Result<()> {
        self.ensure_transport()?;
        self.reconnect_if_needed()?;
        self.events.clear_listing();
        self.send(Command::List)
    }

    fn remote_command(&mut self, command: Command) -> Result<()> {
        self.ensure_transport()?;
        self.reconnect_if_needed()?;
        self.send(command)
    }

    pub(crate) fn ensure_transport(&self) -> Result<()> {
        if self.has_transport() {
            Ok(())
        } else {
            Err(AppError::NotConnected)
        }
    }

    /// Queue a command behind whatever is already outstanding.
    pub(crate) fn send(&mut self, command: Command) -> Result<()> {
        self.ensure_transport()?;
        debug!("Queueing {:?}", command);
        self.commands.enqueue(command);
        self.pump();
        Ok(())
    }

    /// Submit the next queued command if nothing is in flight.
    pub(crate) fn pump(&mut self) {
        let Some(command) = self.commands.start_next() else {
            return;
        };

        debug!("Submitting {:?}", command);
        let result = match &mut self.link {
            Link::Present { transport, .. } => transport.submit(command),
            Link::Absent => Err(AppError::NotConnected),
        };
        if let Err(e) = result {
            warn!("Command submission failed: {}", e);
            self.on_command_finished(Some(e.to_string()));
        }
    }
}
