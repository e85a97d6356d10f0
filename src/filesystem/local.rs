use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use super::{CURRENT_DIR, DirectoryLister, LocalEntry, PARENT_DIR};

/// Lists the real filesystem. Symlinks are followed.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalDirectoryLister;

impl DirectoryLister for LocalDirectoryLister {
    fn list(&self, dir: &Path) -> io::Result<Vec<LocalEntry>> {
        let dir = dir.canonicalize()?;
        let parent = dir.parent().unwrap_or(&dir).to_path_buf();

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            // Follow symlinks to determine actual type
            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            entries.push(LocalEntry {
                name,
                path,
                parent: dir.clone(),
                is_dir: metadata.is_dir(),
                is_file: metadata.is_file(),
                size: metadata.len(),
            });
        }

        // Directories first, then by name
        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });

        let mut listing = vec![
            pseudo(CURRENT_DIR, dir.clone(), &dir),
            pseudo(PARENT_DIR, parent, &dir),
        ];
        listing.extend(entries);
        Ok(listing)
    }
}

fn pseudo(name: &str, path: std::path::PathBuf, listed_from: &Path) -> LocalEntry {
    LocalEntry {
        name: name.to_string(),
        path,
        parent: listed_from.to_path_buf(),
        is_dir: true,
        is_file: false,
        size: 0,
    }
}
