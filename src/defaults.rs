//! Default values for repo-control configuration.
//!
//! Centralized defaults used across commands, so flags, environment
//! variables, and documentation stay consistent.

use std::path::PathBuf;

/// Fragment directory relative to the repository root.
pub const FRAGMENT_DIR: &str = ".repo-control/config";

/// Schema directory relative to the repository root.
pub const SCHEMA_DIR: &str = ".repo-control/schemas";

/// Extension cache retention window in seconds (one day).
pub const CACHE_RETENTION_SECS: u64 = 86_400;

/// Returns the default cache root directory.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/repo-control` (XDG Base Directory)
/// - macOS: `~/Library/Caches/repo-control`
///
/// Falls back to `.repo-control-cache` in the current directory if the
/// platform cache directory cannot be determined. Can be overridden by the
/// `--cache-root` flag or the `REPO_CONTROL_CACHE` environment variable.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".repo-control-cache"))
        .join("repo-control")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_root_returns_path() {
        let cache_root = default_cache_root();
        assert!(cache_root.ends_with("repo-control"));
    }

    #[test]
    fn test_default_cache_root_is_absolute_or_fallback() {
        let cache_root = default_cache_root();
        assert!(
            cache_root.is_absolute() || cache_root.starts_with(".repo-control-cache"),
            "Expected absolute path or fallback, got: {:?}",
            cache_root
        );
    }
}
