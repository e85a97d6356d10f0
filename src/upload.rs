//! Directory uploads. One level deep: the directory's regular files are sent
//! one after another, then the remote side returns to where it started.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::client::FtpClient;
use crate::endpoint::join_remote;
use crate::error::{AppError, Result};
use crate::filesystem::DirectoryLister;
use crate::transport::Connector;

/// A file waiting to be uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadQueueEntry {
    pub file_name: String,
    pub local_dir: PathBuf,
}

impl UploadQueueEntry {
    pub fn local_path(&self) -> PathBuf {
        self.local_dir.join(&self.file_name)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum UploadBatch {
    #[default]
    Idle,
    Draining {
        remaining: VecDeque<UploadQueueEntry>,
        return_path: String,
    },
}

/// What to do after an upload of the batch completed.
#[derive(Debug, PartialEq, Eq)]
pub enum BatchStep {
    Upload(UploadQueueEntry),
    /// The last entry is done. Go back to this remote path.
    Finished(String),
    Idle,
}

impl UploadBatch {
    pub fn is_draining(&self) -> bool {
        matches!(self, UploadBatch::Draining { .. })
    }

    pub fn remaining(&self) -> usize {
        match self {
            UploadBatch::Draining { remaining, .. } => remaining.len(),
            UploadBatch::Idle => 0,
        }
    }

    pub(crate) fn start(&mut self, entries: VecDeque<UploadQueueEntry>, return_path: String) {
        *self = UploadBatch::Draining {
            remaining: entries,
            return_path,
        };
    }

    pub(crate) fn advance(&mut self) -> BatchStep {
        let UploadBatch::Draining {
            remaining,
            return_path,
        } = self
        else {
            return BatchStep::Idle;
        };
        match remaining.pop_front() {
            Some(entry) => BatchStep::Upload(entry),
            None => {
                let path = std::mem::take(return_path);
                *self = UploadBatch::Idle;
                BatchStep::Finished(path)
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = UploadBatch::Idle;
    }
}

impl<C: Connector, L: DirectoryLister> FtpClient<C, L> {
    /// Upload the regular files of `dir` into the remote directory of the same
    /// name under the current remote path, which must already exist.
    ///
    /// Subdirectories are skipped. Returns whether an upload was started.
    pub fn put_files_in_dir(&mut self, dir: &Path) -> Result<bool> {
        self.ensure_transport()?;
        if self.uploads.is_draining() {
            return Err(AppError::Busy(format!(
                "cannot upload {} while a directory upload is running",
                dir.display()
            )));
        }

        let listing = match self.lister.list(dir) {
            Ok(listing) => listing,
            Err(e) => {
                self.events.status(format!(
                    "Unable to open the file {}: {}",
                    dir.display(),
                    e
                ));
                return Ok(false);
            }
        };

        let mut entries = VecDeque::new();
        for entry in listing.into_iter().filter(|e| !e.is_pseudo()) {
            if entry.is_file {
                entries.push_back(UploadQueueEntry {
                    file_name: entry.name,
                    local_dir: entry.parent,
                });
            } else {
                debug!("Skipping {} in directory upload", entry.path.display());
            }
        }
        if entries.is_empty() {
            info!("Nothing to upload in {}", dir.display());
            return Ok(false);
        }

        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                AppError::ValidationError(format!("{} has no directory name", dir.display()))
            })?;
        let return_path = self.endpoint.remote_path().to_string();
        let target = join_remote(&return_path, &dir_name);

        info!(
            "Uploading {} files from {} to {}",
            entries.len(),
            dir.display(),
            target
        );
        self.uploads.start(entries, return_path);
        self.cd_to(&target)?;
        Ok(self.drain_upload_batch())
    }

    /// Start the next upload of the batch, or go back once it is exhausted.
    /// Entries that cannot be opened are skipped.
    pub(crate) fn drain_upload_batch(&mut self) -> bool {
        loop {
            match self.uploads.advance() {
                BatchStep::Upload(entry) => {
                    match self.put_file(&entry.file_name, &entry.local_path()) {
                        Ok(true) => return true,
                        Ok(false) => continue,
                        Err(e) => {
                            warn!("Directory upload stopped: {}", e);
                            self.uploads.reset();
                            return false;
                        }
                    }
                }
                BatchStep::Finished(return_path) => {
                    info!("Directory upload finished, back to {}", return_path);
                    if let Err(e) = self.cd_to(&return_path) {
                        warn!("Failed to return to {}: {}", return_path, e);
                    }
                    return false;
                }
                BatchStep::Idle => return false,
            }
        }
    }
}
