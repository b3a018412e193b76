//! # Change classification
//!
//! Pure diff of a candidate artifact against previously-recorded state,
//! producing one of seven [`ChangeKind`] values. The only I/O is a single
//! existence (and, for files, content) check against the working tree:
//! "previous" state is a logical record from the last run's snapshot, not a
//! live filesystem fact, and the two can disagree after manual edits.
//!
//! Classification is idempotent: re-running against a partially-synchronized
//! working tree computes exactly the remaining transitions.
//!
//! ## File decision table (evaluated in order)
//!
//! 1. candidate content absent and no previous path → `Disabled`
//! 2. candidate content absent and the file exists at the previous path →
//!    `Removed`
//! 3. candidate content absent → `Disabled`
//! 4. candidate target path absent → `Disabled`
//! 5. no previous path → `Created`
//! 6. nothing on disk at the previous path → `Created`
//! 7. otherwise compare `(content equal, path equal)`:
//!    `(T,T)` `Unchanged`, `(T,F)` `Moved`, `(F,T)` `Modified`,
//!    `(F,F)` `MovedModified`.
//!
//! Directories reuse the same shape with existence substituting for content
//! equality; `Modified` and `MovedModified` cannot occur for them.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::generate::{DynamicDir, GeneratedFile};

/// The seven-way classification of a candidate artifact relative to
/// previously recorded state. Immutable once computed for a given
/// (candidate, previous) pair within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Removed,
    Modified,
    Moved,
    MovedModified,
    Unchanged,
    Disabled,
}

/// Normalize content to end in exactly one newline, the form the sync engine
/// writes. Comparing normalized forms keeps classification idempotent.
pub fn normalize_newline(content: &str) -> String {
    let mut normalized = content.trim_end_matches('\n').to_string();
    normalized.push('\n');
    normalized
}

/// Classify one candidate file against its recorded previous state.
///
/// `repo_root` anchors the relative artifact paths for the on-disk check.
pub fn classify_file(repo_root: &Path, candidate: &GeneratedFile) -> Result<ChangeKind> {
    if candidate.content.is_none() {
        return Ok(match &candidate.previous_path {
            None => ChangeKind::Disabled,
            Some(previous) if repo_root.join(previous).is_file() => ChangeKind::Removed,
            Some(_) => ChangeKind::Disabled,
        });
    }

    let Some(target) = &candidate.target_path else {
        return Ok(ChangeKind::Disabled);
    };
    let Some(previous) = &candidate.previous_path else {
        return Ok(ChangeKind::Created);
    };
    let on_disk = repo_root.join(previous);
    if !on_disk.is_file() {
        return Ok(ChangeKind::Created);
    }

    let disk_content = fs::read_to_string(&on_disk).map_err(|e| Error::Sync {
        operation: "read".to_string(),
        path: on_disk.display().to_string(),
        message: e.to_string(),
    })?;
    let candidate_content = candidate.content.as_deref().unwrap_or_default();
    let content_equal =
        normalize_newline(&disk_content) == normalize_newline(candidate_content);
    let path_equal = target == previous;

    Ok(match (content_equal, path_equal) {
        (true, true) => ChangeKind::Unchanged,
        (true, false) => ChangeKind::Moved,
        (false, true) => ChangeKind::Modified,
        (false, false) => ChangeKind::MovedModified,
    })
}

/// Classify one candidate directory. Existence substitutes for content
/// equality, so `Modified` and `MovedModified` cannot occur.
pub fn classify_dir(repo_root: &Path, candidate: &DynamicDir) -> Result<ChangeKind> {
    let Some(target) = &candidate.target_path else {
        return Ok(match &candidate.previous_path {
            None => ChangeKind::Disabled,
            Some(previous) if repo_root.join(previous).is_dir() => ChangeKind::Removed,
            Some(_) => ChangeKind::Disabled,
        });
    };
    let Some(previous) = &candidate.previous_path else {
        return Ok(ChangeKind::Created);
    };
    if !repo_root.join(previous).is_dir() {
        return Ok(ChangeKind::Created);
    }
    Ok(if target == previous {
        ChangeKind::Unchanged
    } else {
        ChangeKind::Moved
    })
}
