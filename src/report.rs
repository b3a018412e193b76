//! # Change reporting
//!
//! The full list of `(path, ChangeKind)` tuples for directories and files,
//! suitable for a dry-run summary without touching the filesystem. The
//! presentation lookup (title and glyph per change kind) lives here, with
//! the reporting collaborator, not on the [`ChangeKind`] enum the core
//! branches on.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::classify::ChangeKind;
use crate::generate::{DynamicDir, GeneratedFile};

/// Presentation metadata for one change kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    pub title: &'static str,
    pub glyph: &'static str,
}

/// Look up the display title and glyph for a change kind.
pub fn presentation(kind: ChangeKind) -> Presentation {
    match kind {
        ChangeKind::Created => Presentation {
            title: "Created",
            glyph: "+",
        },
        ChangeKind::Removed => Presentation {
            title: "Removed",
            glyph: "-",
        },
        ChangeKind::Modified => Presentation {
            title: "Modified",
            glyph: "~",
        },
        ChangeKind::Moved => Presentation {
            title: "Moved",
            glyph: ">",
        },
        ChangeKind::MovedModified => Presentation {
            title: "Moved & modified",
            glyph: "±",
        },
        ChangeKind::Unchanged => Presentation {
            title: "Unchanged",
            glyph: "=",
        },
        ChangeKind::Disabled => Presentation {
            title: "Disabled",
            glyph: ".",
        },
    }
}

/// One reported entry. The path is absent for artifacts the configuration
/// disables entirely (no target, nothing previously on disk).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub path: Option<PathBuf>,
    pub kind: ChangeKind,
}

/// The classification outcome of one run, before (or instead of) applying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub dirs: Vec<ChangeEntry>,
    pub files: Vec<ChangeEntry>,
}

impl ChangeReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a classified directory, preferring the target path over the
    /// previous one for display.
    pub fn record_dir(&mut self, dir: &DynamicDir, kind: ChangeKind) {
        self.dirs.push(ChangeEntry {
            path: dir
                .target_path
                .as_ref()
                .or(dir.previous_path.as_ref())
                .cloned(),
            kind,
        });
    }

    /// Record a classified file.
    pub fn record_file(&mut self, file: &GeneratedFile, kind: ChangeKind) {
        self.files.push(ChangeEntry {
            path: file
                .target_path
                .as_ref()
                .or(file.previous_path.as_ref())
                .cloned(),
            kind,
        });
    }

    /// True when no entry would touch the filesystem.
    pub fn is_clean(&self) -> bool {
        self.dirs
            .iter()
            .chain(self.files.iter())
            .all(|e| matches!(e.kind, ChangeKind::Unchanged | ChangeKind::Disabled))
    }

    /// Count entries of a given kind across dirs and files.
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.dirs
            .iter()
            .chain(self.files.iter())
            .filter(|e| e.kind == kind)
            .count()
    }
}

impl fmt::Display for ChangeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.dirs.iter().chain(self.files.iter()) {
            let p = presentation(entry.kind);
            match &entry.path {
                Some(path) => writeln!(f, "{} {:<16} {}", p.glyph, p.title, path.display())?,
                None => writeln!(f, "{} {:<16} -", p.glyph, p.title)?,
            }
        }
        Ok(())
    }
}
