//! # Version-control integration
//!
//! Small wrapper over the system `git` binary. Using the binary (rather than
//! a library) means credential helpers, SSH agents, and `~/.gitconfig`
//! settings all work without any handling here.
//!
//! [`BranchGuard`] checks out another branch and restores the original one
//! when dropped, so an early `?` return cannot strand the repository on the
//! wrong branch. Reading a file from a sibling branch goes through
//! `git show` and needs no checkout at all.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};
use semver::Version;

use crate::error::{Error, Result};
use crate::loader::{ExtensionDecl, FetchExtension};

/// Run a git subcommand in `repo`, returning trimmed stdout.
fn git(repo: &Path, args: &[&str]) -> Result<String> {
    debug!("git {}", args.join(" "));
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .output()
        .map_err(|e| Error::GitCommand {
            command: args.join(" "),
            stderr: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(Error::GitCommand {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Name of the currently checked-out branch.
pub fn current_branch(repo: &Path) -> Result<String> {
    git(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
}

/// True when the working tree has staged or unstaged changes.
pub fn is_dirty(repo: &Path) -> Result<bool> {
    Ok(!git(repo, &["status", "--porcelain"])?.is_empty())
}

/// Read a file's content from another branch without checking it out.
pub fn read_file_at(repo: &Path, branch: &str, path: &Path) -> Result<String> {
    git(
        repo,
        &["show", &format!("{}:{}", branch, path.display())],
    )
}

/// Parse a version string, tolerating a leading `v`.
pub fn parse_version(raw: &str) -> Option<Version> {
    Version::parse(raw.trim().strip_prefix('v').unwrap_or(raw.trim())).ok()
}

/// Project version recorded on a sibling branch, read from the compiled
/// snapshot that branch carries. Returns `None` when the branch has no
/// snapshot or the snapshot carries no parseable version.
pub fn branch_version(repo: &Path, branch: &str, snapshot_path: &Path) -> Result<Option<Version>> {
    let raw = match read_file_at(repo, branch, snapshot_path) {
        Ok(raw) => raw,
        Err(Error::GitCommand { stderr, .. }) => {
            debug!("no snapshot on '{}': {}", branch, stderr);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let snapshot: serde_json::Value = serde_json::from_str(&raw)?;
    Ok(snapshot
        .pointer("/tree/project/version")
        .and_then(|v| v.as_str())
        .and_then(parse_version))
}

/// Checks out `branch`, stashing dirty state first, and restores both on
/// drop. Restoration failures are logged, not panicked: Drop cannot
/// propagate errors.
pub struct BranchGuard {
    repo: PathBuf,
    original: String,
    stashed: bool,
}

impl BranchGuard {
    /// Switch `repo` to `branch`. The working tree is stashed first if dirty.
    pub fn checkout(repo: &Path, branch: &str) -> Result<Self> {
        let original = current_branch(repo)?;
        let stashed = if is_dirty(repo)? {
            git(repo, &["stash", "push", "--include-untracked"])?;
            true
        } else {
            false
        };
        if let Err(e) = git(repo, &["checkout", branch]) {
            // Undo the stash before surfacing the checkout failure
            if stashed {
                let _ = git(repo, &["stash", "pop"]);
            }
            return Err(e);
        }
        Ok(Self {
            repo: repo.to_path_buf(),
            original,
            stashed,
        })
    }

    /// The branch that will be restored on drop.
    pub fn original_branch(&self) -> &str {
        &self.original
    }
}

impl Drop for BranchGuard {
    fn drop(&mut self) {
        if let Err(e) = git(&self.repo, &["checkout", &self.original]) {
            warn!("failed to restore branch '{}': {}", self.original, e);
            return;
        }
        if self.stashed {
            if let Err(e) = git(&self.repo, &["stash", "pop"]) {
                warn!("failed to restore stashed changes: {}", e);
            }
        }
    }
}

/// Shallow-clone `url` (optionally at `ref_name`) into `target_dir`,
/// replacing any existing checkout. Using the system git means SSH keys,
/// credential helpers, and tokens configured for the user all apply.
pub fn clone_shallow(url: &str, ref_name: Option<&str>, target_dir: &Path) -> Result<()> {
    if target_dir.exists() {
        fs::remove_dir_all(target_dir)?;
    }
    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut args = vec!["clone", "--depth=1"];
    if let Some(r) = ref_name {
        args.push("--branch");
        args.push(r);
    }
    args.push(url);
    let output = Command::new("git")
        .args(&args)
        .arg(target_dir)
        .output()
        .map_err(|e| Error::Fetch {
            origin: url.to_string(),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(Error::Fetch {
            origin: url.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Relative path inside a source repository where exported fragments live.
const EXPORT_DIR: &str = ".repo-control/export";

/// Fetches extension fragments by shallow-cloning their source repository
/// and reading the exported fragment for the declared section type.
pub struct GitFetcher {
    checkout_root: PathBuf,
}

impl GitFetcher {
    /// `checkout_root` holds the per-source working clones.
    pub fn new(checkout_root: impl Into<PathBuf>) -> Self {
        Self {
            checkout_root: checkout_root.into(),
        }
    }

    /// Bare slugs resolve against the default forge host.
    fn source_url(source: &str) -> String {
        if source.contains("://") {
            source.to_string()
        } else {
            format!("https://github.com/{}", source)
        }
    }
}

impl FetchExtension for GitFetcher {
    fn fetch(&self, decl: &ExtensionDecl) -> Result<Vec<u8>> {
        let url = Self::source_url(&decl.source);
        let safe_name: String = decl
            .source
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        let checkout = self.checkout_root.join(safe_name);
        clone_shallow(&url, decl.r#ref.as_deref(), &checkout)?;

        let fragment = checkout
            .join(EXPORT_DIR)
            .join(format!("{}.yaml", decl.r#type));
        fs::read(&fragment).map_err(|_| Error::Fetch {
            origin: decl.source.clone(),
            message: format!(
                "source exports no '{}' fragment at {}/{}.yaml",
                decl.r#type, EXPORT_DIR, decl.r#type
            ),
        })
    }
}
