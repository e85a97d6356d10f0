//! Line-oriented front end: reads commands, drives the client, prints what it reports.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::FtpClient;
use crate::config::{Bookmark, ConfigManager};
use crate::endpoint::parse_host_port;
use crate::error::{AppError, Result};
use crate::events::ClientEvent;
use crate::filesystem::{CURRENT_DIR, DirectoryLister, LocalDirectoryLister, LocalEntry};
use crate::transport::{Connector, Notification, RemoteEntry};
use crate::utils::timestamped;

const HELP: &str = "\
open [bookmark|host[:port]]  connect (to the current server when no target)
close                        disconnect
ls                           list the remote directory
cd <dir|..|/|/abs/path>      change remote directory
cdup, root, pwd              parent directory, root directory, print remote path
get <file>                   download into the local directory
put <file|dir>               upload a file, or the files of a directory
mkdir, rmdir, rm <name>      remote directory and file management
rename <from> <to>           rename a remote entry
lcd <dir>, lls               change and list the local directory
cancel                       cancel the running download
status                       show connection and transfer state
bookmarks, save [name]       list bookmarks, bookmark the current server
unbookmark <name>            delete a bookmark
help, quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Open(Option<String>),
    Close,
    List,
    Cd(String),
    CdUp,
    Root,
    Pwd,
    Get(String),
    Put(String),
    Mkdir(String),
    Rmdir(String),
    Rename { from: String, to: String },
    Remove(String),
    Lcd(String),
    Lls,
    Cancel,
    Status,
    Bookmarks,
    Save(Option<String>),
    Unbookmark(String),
    Help,
    Quit,
}

impl FromStr for ReplCommand {
    type Err = AppError;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let required = |what: &str| -> Result<String> {
            if rest.is_empty() {
                Err(AppError::ValidationError(format!("usage: {verb} <{what}>")))
            } else {
                Ok(rest.to_string())
            }
        };
        let optional = || (!rest.is_empty()).then(|| rest.to_string());

        let command = match verb {
            "open" | "connect" => ReplCommand::Open(optional()),
            "close" | "disconnect" => ReplCommand::Close,
            "ls" | "dir" => ReplCommand::List,
            "cd" => ReplCommand::Cd(required("dir")?),
            "cdup" => ReplCommand::CdUp,
            "root" => ReplCommand::Root,
            "pwd" => ReplCommand::Pwd,
            "get" => ReplCommand::Get(required("file")?),
            "put" => ReplCommand::Put(required("file")?),
            "mkdir" => ReplCommand::Mkdir(required("dir")?),
            "rmdir" => ReplCommand::Rmdir(required("dir")?),
            "rename" | "mv" => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(from), Some(to), None) => ReplCommand::Rename {
                        from: from.to_string(),
                        to: to.to_string(),
                    },
                    _ => {
                        return Err(AppError::ValidationError(
                            "usage: rename <from> <to>".to_string(),
                        ));
                    }
                }
            }
            "rm" | "delete" => ReplCommand::Remove(required("file")?),
            "lcd" => ReplCommand::Lcd(required("dir")?),
            "lls" => ReplCommand::Lls,
            "cancel" => ReplCommand::Cancel,
            "status" => ReplCommand::Status,
            "bookmarks" => ReplCommand::Bookmarks,
            "save" => ReplCommand::Save(optional()),
            "unbookmark" => ReplCommand::Unbookmark(required("name")?),
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" | "bye" => ReplCommand::Quit,
            other => {
                return Err(AppError::ValidationError(format!(
                    "unknown command: {other} (try help)"
                )));
            }
        };
        Ok(command)
    }
}

/// The remote listing as the user sees it.
#[derive(Debug, Default)]
pub struct RemoteListing {
    entries: Vec<RemoteEntry>,
}

impl RemoteListing {
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns false for a name that is already listed.
    pub fn add(&mut self, entry: RemoteEntry) -> bool {
        if self.entries.iter().any(|e| e.name == entry.name) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Whether `name` is a directory, if it is listed at all.
    pub fn is_dir(&self, name: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.is_dir)
    }

    pub fn entries(&self) -> &[RemoteEntry] {
        &self.entries
    }
}

/// The local working directory.
#[derive(Debug)]
pub struct LocalView {
    dir: PathBuf,
}

impl LocalView {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current listing without the "." entry.
    pub fn entries(&self) -> io::Result<Vec<LocalEntry>> {
        let mut entries = LocalDirectoryLister.list(&self.dir)?;
        entries.retain(|e| e.name != CURRENT_DIR);
        Ok(entries)
    }

    pub fn change_dir(&mut self, target: &str) -> Result<()> {
        let dir = self.dir.join(target).canonicalize()?;
        if !dir.is_dir() {
            return Err(AppError::ValidationError(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        self.dir = dir;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Repl<C: Connector, W: Write> {
    client: FtpClient<C>,
    config: ConfigManager,
    listing: RemoteListing,
    local: LocalView,
    last_progress: Option<u8>,
    out: W,
}

impl<C: Connector, W: Write> Repl<C, W> {
    pub fn new(client: FtpClient<C>, config: ConfigManager, local_dir: PathBuf, out: W) -> Self {
        Self {
            client,
            config,
            listing: RemoteListing::default(),
            local: LocalView::new(local_dir),
            last_progress: None,
            out,
        }
    }

    pub fn client(&self) -> &FtpClient<C> {
        &self.client
    }

    pub fn listing(&self) -> &RemoteListing {
        &self.listing
    }

    pub fn local_dir(&self) -> &Path {
        self.local.dir()
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Read commands from `input` until it ends or the user quits, routing
    /// transport notifications and client events in between.
    pub async fn run<R>(
        &mut self,
        input: R,
        notifications: &mut mpsc::UnboundedReceiver<Notification>,
        events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        self.prompt();

        loop {
            tokio::select! {
                Some(notification) = notifications.recv() => {
                    self.client.handle_notification(notification);
                }
                Some(event) = events.recv() => self.on_client_event(event),
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if self.execute_line(&line) == Flow::Quit {
                            break;
                        }
                        self.prompt();
                    }
                    None => break,
                },
            }
        }

        self.client.disconnect();
        while let Ok(event) = events.try_recv() {
            self.on_client_event(event);
        }
        Ok(())
    }

    /// Parse and run one line, printing any error.
    pub fn execute_line(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        match line.parse::<ReplCommand>().and_then(|c| self.execute(c)) {
            Ok(flow) => flow,
            Err(e) => {
                self.print(format!("error: {e}"));
                Flow::Continue
            }
        }
    }

    pub fn execute(&mut self, command: ReplCommand) -> Result<Flow> {
        debug!("REPL command {:?}", command);
        match command {
            ReplCommand::Open(target) => self.open(target.as_deref())?,
            ReplCommand::Close => {
                if !self.client.disconnect() {
                    self.print("Not connected");
                }
            }
            ReplCommand::List => self.client.refresh_listing()?,
            ReplCommand::Cd(target) => self.cd(&target)?,
            ReplCommand::CdUp => self.client.cd_to_parent()?,
            ReplCommand::Root => self.client.cd_to_root()?,
            ReplCommand::Pwd => {
                let path = self.client.endpoint().remote_path().to_string();
                self.print(path);
            }
            ReplCommand::Get(name) => {
                if self.listing.is_dir(&name) == Some(true) {
                    self.print(format!("{name} is a directory"));
                } else {
                    let dir = self.local.dir().to_path_buf();
                    self.client.get(&name, &dir)?;
                }
            }
            ReplCommand::Put(name) => {
                let dir = self.local.dir().to_path_buf();
                self.client.put(&name, &dir)?;
            }
            ReplCommand::Mkdir(name) => self.client.mkdir(&name)?,
            ReplCommand::Rmdir(name) => self.client.rmdir(&name)?,
            ReplCommand::Rename { from, to } => self.client.rename(&from, &to)?,
            ReplCommand::Remove(name) => self.client.remove(&name)?,
            ReplCommand::Lcd(target) => {
                self.local.change_dir(&target)?;
                self.show_local_dir();
            }
            ReplCommand::Lls => self.show_local_dir(),
            ReplCommand::Cancel => {
                if !self.client.cancel_download() {
                    self.print("No download in progress");
                }
            }
            ReplCommand::Status => self.show_status(),
            ReplCommand::Bookmarks => self.show_bookmarks(),
            ReplCommand::Save(name) => self.save_bookmark(name)?,
            ReplCommand::Unbookmark(name) => self.remove_bookmark(&name)?,
            ReplCommand::Help => self.print(HELP),
            ReplCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    pub fn on_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Status(message) => {
                let line = timestamped(Local::now(), &message);
                self.print(line);
            }
            ClientEvent::ClearListing => self.listing.clear(),
            ClientEvent::ListEntry(entry) => {
                let line = format_remote_entry(&entry);
                if self.listing.add(entry) {
                    self.print(line);
                }
            }
            ClientEvent::Progress(percent) => self.show_progress(percent),
            ClientEvent::Connected(connected) => {
                debug!("Connected: {}", connected);
                if !connected {
                    self.last_progress = None;
                }
            }
        }
    }

    fn open(&mut self, target: Option<&str>) -> Result<()> {
        if self.client.has_transport() {
            self.print("Already connected, close first");
            return Ok(());
        }

        if let Some(target) = target {
            let bookmark = self.config.find_bookmark(target).cloned();
            match bookmark {
                Some(bookmark) => {
                    let mut endpoint = bookmark.to_endpoint();
                    // keep a password given on the command line for the same account
                    let current = self.client.endpoint();
                    if current.host() == endpoint.host() && current.username() == endpoint.username() {
                        let password = current.password().map(str::to_string);
                        endpoint.set_user_info(bookmark.username.clone(), password);
                    }
                    self.client.set_endpoint(endpoint);
                    if let Err(e) = self.config.touch_last_used(&bookmark.id) {
                        warn!("Failed to update bookmark: {}", e);
                    }
                }
                None => {
                    let (host, port) = parse_host_port(target, self.config.settings().default_port)?;
                    self.client.set_host_port(host, port);
                }
            }
        }

        self.listing.clear();
        self.client.toggle_connection()
    }

    fn cd(&mut self, target: &str) -> Result<()> {
        match target {
            ".." => self.client.cd_to_parent(),
            "/" => self.client.cd_to_root(),
            path if path.starts_with('/') => self.client.cd_to(path),
            name => {
                if self.listing.is_dir(name) == Some(false) {
                    return Err(AppError::ValidationError(format!(
                        "{name} is not a directory"
                    )));
                }
                self.client.cd_into(name)
            }
        }
    }

    fn save_bookmark(&mut self, name: Option<String>) -> Result<()> {
        let mut bookmark = Bookmark::from_endpoint(self.client.endpoint());
        if let Some(name) = name {
            bookmark.set_name(name);
        }
        let label = bookmark.name.clone();
        if self.config.add_bookmark(bookmark)? {
            self.print(format!("Saved bookmark {label}"));
        } else {
            self.print(format!("A bookmark for {label} already exists"));
        }
        Ok(())
    }

    fn remove_bookmark(&mut self, name: &str) -> Result<()> {
        let Some(id) = self.config.find_bookmark(name).map(|b| b.id.clone()) else {
            self.print(format!("No bookmark called {name}"));
            return Ok(());
        };
        self.config.remove_bookmark(&id)?;
        self.print(format!("Removed bookmark {name}"));
        Ok(())
    }

    fn show_progress(&mut self, percent: u8) {
        let bucket = percent / 10;
        if self.last_progress.map(|p| p / 10) != Some(bucket) {
            self.print(format!("progress: {percent}%"));
            self.last_progress = Some(percent);
        }
        if percent == 100 {
            self.last_progress = None;
            self.show_local_dir();
        }
    }

    fn show_local_dir(&mut self) {
        match self.local.entries() {
            Ok(entries) => {
                let mut lines = vec![format!("local: {}", self.local.dir().display())];
                lines.extend(entries.iter().map(format_local_entry));
                for line in lines {
                    self.print(line);
                }
            }
            Err(e) => self.print(format!(
                "error: cannot list {}: {e}",
                self.local.dir().display()
            )),
        }
    }

    fn show_status(&mut self) {
        let endpoint = self.client.endpoint();
        let user = match endpoint.username() {
            "" => "anonymous",
            user => user,
        };
        let mut lines = vec![
            format!(
                "state:    {:?}{}",
                self.client.connection_state(),
                if self.client.is_connected() { " (logged in)" } else { "" }
            ),
            format!("server:   {} as {}", endpoint.host_port(), user),
            format!("remote:   {}", endpoint.remote_path()),
            format!("local:    {}", self.local.dir().display()),
        ];
        if let Some(command) = self.client.active_command() {
            lines.push(format!(
                "command:  {:?} ({} queued)",
                command,
                self.client.pending_commands()
            ));
        }
        if let Some(transfer) = self.client.active_transfer() {
            lines.push(format!(
                "transfer: {:?} {} {}% ({}/{} bytes)",
                transfer.direction(),
                transfer.remote_name(),
                transfer.percent(),
                transfer.transferred_bytes(),
                transfer.total_bytes()
            ));
        }
        if self.client.upload_batch().is_draining() {
            lines.push(format!(
                "upload:   {} more files in this directory",
                self.client.upload_batch().remaining()
            ));
        }
        for line in lines {
            self.print(line);
        }
    }

    fn show_bookmarks(&mut self) {
        if self.config.bookmarks().is_empty() {
            self.print("No bookmarks");
            return;
        }
        let lines: Vec<String> = self
            .config
            .bookmarks()
            .iter()
            .map(|b| {
                let last_used = b
                    .last_used
                    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                format!(
                    "{:<16} {:<28} {:<12} {:<20} last used {}",
                    b.name,
                    b.host_port(),
                    if b.username.is_empty() { "anonymous" } else { b.username.as_str() },
                    b.remote_path,
                    last_used
                )
            })
            .collect();
        for line in lines {
            self.print(line);
        }
    }

    fn prompt(&mut self) {
        let prompt = if self.client.has_transport() {
            format!(
                "ftp {}:{}> ",
                self.client.endpoint().host(),
                self.client.endpoint().remote_path()
            )
        } else {
            "ftp> ".to_string()
        };
        if let Err(e) = write!(self.out, "{prompt}").and_then(|_| self.out.flush()) {
            warn!("Failed to write prompt: {}", e);
        }
    }

    fn print(&mut self, line: impl AsRef<str>) {
        if let Err(e) = writeln!(self.out, "{}", line.as_ref()) {
            warn!("Failed to write output: {}", e);
        }
    }
}

fn format_remote_entry(entry: &RemoteEntry) -> String {
    if entry.is_dir {
        format!("  {}/", entry.name)
    } else {
        format!(
            "  {:<40} {:>12}",
            entry.name,
            entry.size.map(|s| s.to_string()).unwrap_or_default()
        )
    }
}

fn format_local_entry(entry: &LocalEntry) -> String {
    if entry.is_dir {
        format!("  {}/", entry.name)
    } else {
        format!("  {:<40} {:>12}", entry.name, entry.size)
    }
}
