use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::client::{FtpClient, Link};
use crate::error::{AppError, Result};
use crate::filesystem::DirectoryLister;
use crate::transport::{Command, Connector, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    Download,
    Upload,
}

/// The one file currently moving between the local disk and the server.
#[derive(Debug)]
pub struct ActiveTransfer {
    direction: TransferDirection,
    remote_name: String,
    local_path: PathBuf,
    file: Option<File>,
    transferred_bytes: u64,
    total_bytes: u64,
    failure: Option<String>, // Local write error, the download is discarded on completion
}

impl ActiveTransfer {
    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn percent(&self) -> u8 {
        progress_percent(self.transferred_bytes, self.total_bytes)
    }
}

/// How a download ended.
#[derive(Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(PathBuf),
    Discarded {
        path: PathBuf,
        local_error: Option<String>,
    },
}

/// Owns the local side of at most one transfer.
#[derive(Debug, Default)]
pub struct TransferController {
    active: Option<ActiveTransfer>,
}

impl TransferController {
    pub fn active(&self) -> Option<&ActiveTransfer> {
        self.active.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Create the destination file. Fails if it already exists.
    pub(crate) fn open_download(&mut self, remote_name: &str, local_path: &Path) -> io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(local_path)?;
        self.active = Some(ActiveTransfer {
            direction: TransferDirection::Download,
            remote_name: remote_name.to_string(),
            local_path: local_path.to_path_buf(),
            file: Some(file),
            transferred_bytes: 0,
            total_bytes: 0,
            failure: None,
        });
        Ok(())
    }

    /// Open the source file and read it whole. The handle stays open until
    /// the upload completes.
    pub(crate) fn open_upload(&mut self, remote_name: &str, local_path: &Path) -> io::Result<Bytes> {
        let mut file = File::open(local_path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let total_bytes = contents.len() as u64;
        self.active = Some(ActiveTransfer {
            direction: TransferDirection::Upload,
            remote_name: remote_name.to_string(),
            local_path: local_path.to_path_buf(),
            file: Some(file),
            transferred_bytes: 0,
            total_bytes,
            failure: None,
        });
        Ok(Bytes::from(contents))
    }

    /// Append a received chunk to the download. Returns the error only for the
    /// first failed write; later chunks are dropped.
    pub(crate) fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        let Some(transfer) = self.active.as_mut() else {
            return Ok(());
        };
        if transfer.direction != TransferDirection::Download || transfer.failure.is_some() {
            return Ok(());
        }
        let Some(file) = transfer.file.as_mut() else {
            return Ok(());
        };
        if let Err(e) = file.write_all(data) {
            transfer.failure = Some(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn record_progress(&mut self, transferred: u64, total: u64) -> u8 {
        if let Some(transfer) = self.active.as_mut() {
            transfer.transferred_bytes = transferred;
            transfer.total_bytes = total;
        }
        progress_percent(transferred, total)
    }

    /// Close the download. The file is kept only on success without a local error.
    pub(crate) fn finish_download(&mut self, success: bool) -> Option<DownloadOutcome> {
        if self.active.as_ref()?.direction != TransferDirection::Download {
            return None;
        }
        let ActiveTransfer {
            local_path,
            file,
            failure,
            ..
        } = self.active.take()?;
        drop(file);

        if success && failure.is_none() {
            Some(DownloadOutcome::Saved(local_path))
        } else {
            remove_partial(&local_path);
            Some(DownloadOutcome::Discarded {
                path: local_path,
                local_error: failure,
            })
        }
    }

    /// Release the upload source.
    pub(crate) fn finish_upload(&mut self) -> Option<PathBuf> {
        if self.active.as_ref()?.direction != TransferDirection::Upload {
            return None;
        }
        self.active.take().map(|t| t.local_path)
    }

    /// Drop whatever is active, deleting a partial download.
    pub(crate) fn discard(&mut self) -> Option<PathBuf> {
        let ActiveTransfer {
            direction,
            local_path,
            file,
            ..
        } = self.active.take()?;
        drop(file);
        if direction == TransferDirection::Download {
            remove_partial(&local_path);
        }
        Some(local_path)
    }
}

/// Whole percent, clamped to 100. Zero while the total is unknown.
pub fn progress_percent(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (transferred as u128 * 100 / total as u128).min(100) as u8
}

fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial download {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

impl<C: Connector, L: DirectoryLister> FtpClient<C, L> {
    /// Download `file_name` from the current remote directory into `local_dir`.
    ///
    /// Returns whether a download was started. A name clash or an unwritable
    /// destination is reported as a status line and starts nothing.
    pub fn get(&mut self, file_name: &str, local_dir: &Path) -> Result<bool> {
        self.ensure_transport()?;
        if self.transfer_in_progress() {
            return Err(AppError::Busy(format!(
                "cannot download {file_name} while another transfer is running"
            )));
        }
        self.reconnect_if_needed()?;

        let local_path = local_dir.join(file_name);
        match self.transfers.open_download(file_name, &local_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                self.events.status(format!(
                    "There already exists a file called {file_name} in the current directory"
                ));
                return Ok(false);
            }
            Err(e) => {
                self.events.status(format!(
                    "Unable to save the file {}: {}",
                    local_path.display(),
                    e
                ));
                return Ok(false);
            }
        }

        self.send(Command::Get {
            remote: file_name.to_string(),
        })?;
        self.events.status(format!("Downloading {file_name}..."));
        Ok(true)
    }

    /// Upload a file, or a directory one level deep, from `local_dir` into the
    /// current remote directory. Returns whether an upload was started.
    pub fn put(&mut self, file_name: &str, local_dir: &Path) -> Result<bool> {
        self.ensure_transport()?;
        if self.transfer_in_progress() || self.uploads.is_draining() {
            return Err(AppError::Busy(format!(
                "cannot upload {file_name} while another transfer is running"
            )));
        }
        self.reconnect_if_needed()?;

        let local_path = local_dir.join(file_name);
        if local_path.is_file() {
            self.put_file(file_name, &local_path)
        } else if local_path.is_dir() {
            self.mkdir(file_name)?;
            self.events
                .status(format!("Created directory {file_name}"));
            self.put_files_in_dir(&local_path)
        } else {
            self.events.status(format!(
                "No file called {file_name} in the current directory"
            ));
            Ok(false)
        }
    }

    /// Abort the running download and delete what was written of it.
    /// Returns false when no download is active.
    pub fn cancel_download(&mut self) -> bool {
        let remote = match self.transfers.active() {
            Some(t) if t.direction() == TransferDirection::Download => t.remote_name().to_string(),
            _ => return false,
        };

        let dequeued = self
            .commands
            .remove_pending(|c| matches!(c, Command::Get { remote: r } if *r == remote));
        if !dequeued && let Link::Present { transport, .. } = &mut self.link {
            transport.abort();
        }

        if let Some(path) = self.transfers.discard() {
            self.events
                .status(format!("Canceled download of {}", path.display()));
        }
        true
    }

    fn transfer_in_progress(&self) -> bool {
        self.transfers.is_busy() || self.commands.has_transfer()
    }

    pub(crate) fn put_file(&mut self, remote_name: &str, local_path: &Path) -> Result<bool> {
        // queued directory entries arrive here without passing through put()
        self.reconnect_if_needed()?;
        let data = match self.transfers.open_upload(remote_name, local_path) {
            Ok(data) => data,
            Err(e) => {
                self.events.status(format!(
                    "Unable to open the file {}: {}",
                    local_path.display(),
                    e
                ));
                return Ok(false);
            }
        };

        self.send(Command::Put {
            remote: remote_name.to_string(),
            data,
        })?;
        self.events.status(format!("Uploading {remote_name}..."));
        Ok(true)
    }

    pub(crate) fn on_transfer_data(&mut self, data: &[u8]) {
        if let Err(e) = self.transfers.write_chunk(data) {
            error!("Failed to write downloaded data: {}", e);
            if let Link::Present { transport, .. } = &mut self.link {
                transport.abort();
            }
        }
    }

    pub(crate) fn on_transfer_progress(&mut self, transferred: u64, total: u64) {
        if !self.transfers.is_busy() {
            debug!("Progress {}/{} with no active transfer", transferred, total);
            return;
        }
        let percent = self.transfers.record_progress(transferred, total);
        self.events.progress(percent);
    }

    pub(crate) fn finish_get(&mut self, remote: &str, error: Option<String>) {
        match self.transfers.finish_download(error.is_none()) {
            Some(DownloadOutcome::Saved(path)) => {
                self.events
                    .status(format!("Downloaded at {}", path.display()));
            }
            Some(DownloadOutcome::Discarded {
                path,
                local_error: Some(e),
            }) => {
                self.events.status(format!(
                    "Unable to save the file {}: {}",
                    path.display(),
                    e
                ));
            }
            Some(DownloadOutcome::Discarded { path, .. }) => {
                self.events
                    .status(format!("Canceled download of {}", path.display()));
            }
            None => debug!("Download of {} ended after it was dropped", remote),
        }
    }

    pub(crate) fn finish_put(&mut self, remote: &str, error: Option<String>) {
        self.queue_listing_refresh();

        let path = self
            .transfers
            .finish_upload()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| remote.to_string());
        if error.is_none() {
            self.events.status(format!("Uploaded {path} to server"));
        } else {
            self.events.status(format!("Failed to upload of {path}"));
        }

        self.drain_upload_batch();
    }
}
