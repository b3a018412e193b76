//! # Filesystem synchronization
//!
//! Applies the filesystem transitions implied by classification, in a fixed
//! order chosen to avoid missing-parent and dangling-path errors:
//!
//! 1. **Directories** — removals, renames, creations;
//! 2. **Files** — deletions, writes (trailing-newline-normalized, parents
//!    created), old-path cleanup after moves;
//! 3. **Mirrored duplicates** — previously-recorded destinations are deleted
//!    before current sources are copied, so a renamed destination never
//!    leaves an orphaned stale copy.
//!
//! A filesystem error surfaces immediately; transitions already applied are
//! not rolled back. Re-running the pipeline is the recovery path: the
//! classifier is idempotent against the partially-updated tree.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::classify::{normalize_newline, ChangeKind};
use crate::error::{Error, Result};
use crate::generate::{DynamicDir, GeneratedFile};

/// One "copy file X to one or more destinations" entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorCopy {
    pub source: PathBuf,
    pub destinations: Vec<PathBuf>,
}

/// The side-table of mirrored duplicates for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorSet {
    /// Destinations recorded by the previous run; deleted before copying.
    pub previous_destinations: Vec<PathBuf>,
    /// Current source-to-destinations copies.
    pub copies: Vec<MirrorCopy>,
}

/// Executes filesystem transitions under a repository root.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    root: PathBuf,
}

impl SyncEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Repository root all artifact paths are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply all transitions: directories, then files, then mirrors.
    pub fn apply(
        &self,
        dirs: &[(DynamicDir, ChangeKind)],
        files: &[(GeneratedFile, ChangeKind)],
        mirrors: &MirrorSet,
    ) -> Result<()> {
        for (dir, kind) in dirs {
            self.apply_dir(dir, *kind)?;
        }
        for (file, kind) in files {
            self.apply_file(file, *kind)?;
        }
        self.apply_mirrors(mirrors)?;
        Ok(())
    }

    fn apply_dir(&self, dir: &DynamicDir, kind: ChangeKind) -> Result<()> {
        match kind {
            ChangeKind::Removed => {
                if let Some(previous) = &dir.previous_path {
                    let path = self.root.join(previous);
                    debug!("removing directory '{}'", previous.display());
                    fs::remove_dir_all(&path)
                        .map_err(|e| sync_error("remove directory", &path, e))?;
                }
                Ok(())
            }
            ChangeKind::Moved => {
                let (Some(previous), Some(target)) = (&dir.previous_path, &dir.target_path)
                else {
                    return Ok(());
                };
                let from = self.root.join(previous);
                let to = self.root.join(target);
                ensure_parent(&to)?;
                debug!(
                    "moving directory '{}' -> '{}'",
                    previous.display(),
                    target.display()
                );
                fs::rename(&from, &to).map_err(|e| sync_error("move directory", &from, e))
            }
            ChangeKind::Created => {
                if let Some(target) = &dir.target_path {
                    let path = self.root.join(target);
                    debug!("creating directory '{}'", target.display());
                    fs::create_dir_all(&path)
                        .map_err(|e| sync_error("create directory", &path, e))?;
                }
                Ok(())
            }
            ChangeKind::Unchanged | ChangeKind::Disabled => Ok(()),
            // Classification never produces these for directories
            ChangeKind::Modified | ChangeKind::MovedModified => Ok(()),
        }
    }

    fn apply_file(&self, file: &GeneratedFile, kind: ChangeKind) -> Result<()> {
        match kind {
            ChangeKind::Removed => {
                if let Some(previous) = &file.previous_path {
                    remove_file_missing_ok(&self.root.join(previous))?;
                    info!("removed '{}'", previous.display());
                }
                Ok(())
            }
            ChangeKind::Created
            | ChangeKind::Modified
            | ChangeKind::Moved
            | ChangeKind::MovedModified => {
                let (Some(target), Some(content)) = (&file.target_path, &file.content) else {
                    return Ok(());
                };
                let path = self.root.join(target);
                ensure_parent(&path)?;
                fs::write(&path, normalize_newline(content))
                    .map_err(|e| sync_error("write", &path, e))?;
                info!("wrote '{}'", target.display());
                if matches!(kind, ChangeKind::Moved | ChangeKind::MovedModified) {
                    if let Some(previous) = &file.previous_path {
                        remove_file_missing_ok(&self.root.join(previous))?;
                        info!("removed old path '{}'", previous.display());
                    }
                }
                Ok(())
            }
            ChangeKind::Unchanged | ChangeKind::Disabled => Ok(()),
        }
    }

    fn apply_mirrors(&self, mirrors: &MirrorSet) -> Result<()> {
        for previous in &mirrors.previous_destinations {
            remove_file_missing_ok(&self.root.join(previous))?;
        }
        for copy in &mirrors.copies {
            let source = self.root.join(&copy.source);
            for destination in &copy.destinations {
                let destination = self.root.join(destination);
                ensure_parent(&destination)?;
                fs::copy(&source, &destination)
                    .map_err(|e| sync_error("copy", &source, e))?;
                debug!(
                    "mirrored '{}' -> '{}'",
                    copy.source.display(),
                    destination.display()
                );
            }
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| sync_error("create directory", parent, e))?;
    }
    Ok(())
}

fn remove_file_missing_ok(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(sync_error("remove", path, e)),
    }
}

fn sync_error(operation: &str, path: &Path, source: std::io::Error) -> Error {
    Error::Sync {
        operation: operation.to_string(),
        path: path.display().to_string(),
        message: source.to_string(),
    }
}
