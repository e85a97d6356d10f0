//! Command serialization and completion routing.
//!
//! The transport reports completions without saying which command finished,
//! so the engine keeps exactly one command in flight and remembers what it
//! was. Completion takes that record out of the slot before anything else
//! happens, which makes a second completion for the same command a no-op.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::client::FtpClient;
use crate::filesystem::DirectoryLister;
use crate::transport::{Command, Connector};

/// The command currently executing, with the payload its completion needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActiveCommand {
    Connect,
    Login,
    Cd(String),
    Mkdir(String),
    Rmdir(String),
    Rename { from: String, to: String },
    Remove(String),
    List,
    Get { remote: String },
    Put { remote: String },
}

impl From<&Command> for ActiveCommand {
    fn from(command: &Command) -> Self {
        match command {
            Command::ConnectToHost { .. } => ActiveCommand::Connect,
            Command::Login { .. } => ActiveCommand::Login,
            Command::Cd(path) => ActiveCommand::Cd(path.clone()),
            Command::Mkdir(name) => ActiveCommand::Mkdir(name.clone()),
            Command::Rmdir(name) => ActiveCommand::Rmdir(name.clone()),
            Command::Rename { from, to } => ActiveCommand::Rename {
                from: from.clone(),
                to: to.clone(),
            },
            Command::Remove(name) => ActiveCommand::Remove(name.clone()),
            Command::List => ActiveCommand::List,
            Command::Get { remote } => ActiveCommand::Get {
                remote: remote.clone(),
            },
            Command::Put { remote, .. } => ActiveCommand::Put {
                remote: remote.clone(),
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    in_flight: Option<ActiveCommand>,
    pending: VecDeque<Command>,
    held: bool,
}

impl CommandQueue {
    pub fn in_flight(&self) -> Option<&ActiveCommand> {
        self.in_flight.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    pub(crate) fn enqueue(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    /// Pop the next command and mark it in flight, unless one already is or
    /// the queue is held.
    pub(crate) fn start_next(&mut self) -> Option<Command> {
        if self.held || self.in_flight.is_some() {
            return None;
        }
        let command = self.pending.pop_front()?;
        self.in_flight = Some(ActiveCommand::from(&command));
        Some(command)
    }

    /// Take the in-flight record. Returns it at most once per command.
    pub(crate) fn finish(&mut self) -> Option<ActiveCommand> {
        self.in_flight.take()
    }

    /// While held, newly queued commands wait behind the ones already pending.
    pub(crate) fn hold(&mut self) {
        self.held = true;
    }

    pub(crate) fn release(&mut self) {
        self.held = false;
    }

    pub(crate) fn clear(&mut self) {
        self.in_flight = None;
        self.pending.clear();
    }

    /// Drop the first pending command matching `pred`.
    pub(crate) fn remove_pending<F>(&mut self, pred: F) -> bool
    where
        F: Fn(&Command) -> bool,
    {
        match self.pending.iter().position(pred) {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    /// True while a get or put is executing or waiting, including one whose
    /// local side was already dropped by a cancel.
    pub(crate) fn has_transfer(&self) -> bool {
        matches!(
            self.in_flight,
            Some(ActiveCommand::Get { .. } | ActiveCommand::Put { .. })
        ) || self
            .pending
            .iter()
            .any(|c| matches!(c, Command::Get { .. } | Command::Put { .. }))
    }

    /// True while a connect or login is executing or waiting.
    pub(crate) fn is_connecting(&self) -> bool {
        matches!(
            self.in_flight,
            Some(ActiveCommand::Connect | ActiveCommand::Login)
        ) || self
            .pending
            .iter()
            .any(|c| matches!(c, Command::ConnectToHost { .. } | Command::Login { .. }))
    }
}

impl<C: Connector, L: DirectoryLister> FtpClient<C, L> {
    pub(crate) fn on_command_finished(&mut self, error: Option<String>) {
        let Some(finished) = self.commands.finish() else {
            debug!("Completion with no command in flight, ignoring");
            return;
        };
        match &error {
            Some(e) => warn!("{:?} failed: {}", finished, e),
            None => debug!("{:?} finished", finished),
        }

        self.commands.hold();
        match finished {
            ActiveCommand::Connect => {
                if error.is_some() {
                    let host = self.endpoint.host().to_string();
                    if let Err(e) = self.toggle_connection() {
                        warn!("Failed to toggle connection: {}", e);
                    }
                    self.events.status(format!(
                        "Unable to connect to the FTP server at {host}. Please check that the host name is correct."
                    ));
                }
            }
            ActiveCommand::Login => {}
            ActiveCommand::Cd(_)
            | ActiveCommand::Mkdir(_)
            | ActiveCommand::Rmdir(_)
            | ActiveCommand::Rename { .. }
            | ActiveCommand::Remove(_) => self.queue_listing_refresh(),
            ActiveCommand::Get { remote } => self.finish_get(&remote, error),
            ActiveCommand::Put { remote } => self.finish_put(&remote, error),
            ActiveCommand::List => {}
        }
        self.commands.release();
        self.pump();
    }

    pub(crate) fn queue_listing_refresh(&mut self) {
        self.events.clear_listing();
        if let Err(e) = self.send(Command::List) {
            debug!("Listing refresh skipped: {}", e);
        }
    }
}
