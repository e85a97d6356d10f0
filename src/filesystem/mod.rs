//! Local directory listing for uploads and the local view.

pub mod local;

use std::io;
use std::path::{Path, PathBuf};

pub use local::LocalDirectoryLister;

pub const CURRENT_DIR: &str = ".";
pub const PARENT_DIR: &str = "..";

/// One entry of a local directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalEntry {
    pub name: String,
    /// Path of the entry under the canonical listed directory.
    pub path: PathBuf,
    /// Canonical path of the directory the entry was listed from.
    pub parent: PathBuf,
    pub is_dir: bool,
    pub is_file: bool,
    pub size: u64,
}

impl LocalEntry {
    /// The synthetic "." and ".." entries.
    pub fn is_pseudo(&self) -> bool {
        self.name == CURRENT_DIR || self.name == PARENT_DIR
    }
}

pub trait DirectoryLister {
    /// List `dir`, including the "." and ".." pseudo-entries.
    fn list(&self, dir: &Path) -> io::Result<Vec<LocalEntry>>;
}
