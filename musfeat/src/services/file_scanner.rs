//! Audio file discovery
//!
//! Walks one or more root directories and yields the files accepted by a
//! [`PathFilter`]. Traversal follows symbolic links and visits entries in a
//! stable order: within each directory, files come before subdirectories and
//! both are sorted by name. Unreadable entries are logged, counted and
//! skipped; they never abort discovery.
//!
//! A [`Discovery`] bound to a cancellation token stops at the next walked
//! entry once the token fires, whether or not that entry passes the filter.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::path_filter::PathFilter;

/// Root validation errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Audio file scanner
#[derive(Debug, Clone)]
pub struct FileScanner {
    filter: PathFilter,
    recursive: bool,
}

impl FileScanner {
    /// Create a recursive scanner applying `filter`
    pub fn new(filter: PathFilter) -> Self {
        Self {
            filter,
            recursive: true,
        }
    }

    /// Enable or disable descending into subdirectories
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Check that a root exists and is a directory
    pub fn validate_root(root: &Path) -> Result<(), ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }
        Ok(())
    }

    /// Lazily discover files under every root, in root order
    pub fn discover<'a>(&'a self, roots: &'a [PathBuf]) -> Discovery<'a> {
        Discovery {
            scanner: self,
            roots: roots.iter(),
            current: None,
            skipped: 0,
            cancel: None,
            interrupted: false,
        }
    }

    /// Collect the files of a single root
    pub fn scan(&self, root: &Path) -> Vec<PathBuf> {
        let roots = [root.to_path_buf()];
        self.discover(&roots).collect()
    }

    fn walker(&self, root: &Path) -> walkdir::IntoIter {
        let walker = WalkDir::new(root)
            .follow_links(true)
            .min_depth(1)
            .sort_by(files_first);

        if self.recursive {
            walker.into_iter()
        } else {
            walker.max_depth(1).into_iter()
        }
    }
}

/// Files before directories, then by name
fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// Single-pass iterator over discovered files
pub struct Discovery<'a> {
    scanner: &'a FileScanner,
    roots: std::slice::Iter<'a, PathBuf>,
    current: Option<(&'a Path, walkdir::IntoIter)>,
    skipped: usize,
    cancel: Option<CancellationToken>,
    interrupted: bool,
}

impl Discovery<'_> {
    /// Stop walking once `cancel` fires
    pub fn cancel_on(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Entries skipped so far because they could not be read
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Whether the walk ended early on cancellation
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }
}

impl Iterator for Discovery<'_> {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            if self.interrupted {
                return None;
            }
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                debug!("Discovery cancelled");
                self.interrupted = true;
                self.current = None;
                return None;
            }

            if self.current.is_none() {
                let root = self.roots.next()?;
                debug!("Scanning {}...", root.display());
                self.current = Some((root.as_path(), self.scanner.walker(root)));
            }

            let (root, walker) = self.current.as_mut()?;
            let root: &Path = *root;

            match walker.next() {
                None => {
                    self.current = None;
                }
                Some(Ok(entry)) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    if self.scanner.filter.matches_path(root, entry.path()) {
                        debug!("Added {}", entry.path().display());
                        return Some(entry.into_path());
                    }
                }
                Some(Err(e)) => {
                    // Covers permission errors and symlink loops
                    self.skipped += 1;
                    warn!(
                        path = ?e.path().map(|p| p.display().to_string()),
                        "Skipping unreadable entry: {}",
                        e
                    );
                }
            }
        }
    }
}
