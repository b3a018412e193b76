//! # Error Handling
//!
//! Centralized error handling for `repo-control`. A single `thiserror`-based
//! [`Error`] enum covers the failure modes of every compiler stage, grouped by
//! propagation policy:
//!
//! - **Content errors** (malformed fragment, duplicate local key, unresolvable
//!   template path, cyclic template reference): fatal before any filesystem
//!   write; carry the offending path and a human-readable context.
//! - **Validation errors** (schema mismatch, missing required field after
//!   defaults, extension-introduced type conflict): fatal; carry the schema
//!   path, the offending value, and provenance (local fragment or a named
//!   extension).
//! - **Fetch errors**: soft-failed by the caller where the data is optional
//!   enrichment, hard-failed where it is load-bearing.
//! - **Sync errors** (filesystem failure during apply): fatal, surfaced with
//!   the path and operation; no rollback of transitions already applied.
//!
//! The [`Result`] alias is used throughout the library.

use std::path::PathBuf;

use thiserror::Error;

/// Where a configuration value came from, for error attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// A local fragment file.
    Local(PathBuf),
    /// An externally-fetched extension, identified by its declared type.
    Extension { source: String, r#type: String },
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Local(path) => write!(f, "local fragment '{}'", path.display()),
            Provenance::Extension { source, r#type } => {
                write!(f, "extension '{}' from '{}'", r#type, source)
            }
        }
    }
}

/// Main error type for repo-control operations
#[derive(Error, Debug)]
pub enum Error {
    /// A fragment file could not be parsed or is structurally invalid.
    #[error("Fragment content error at '{path}': {message}")]
    Content { path: String, message: String },

    /// Two local fragments define the same top-level key. Always fatal,
    /// independent of extension merge policy.
    #[error("Duplicate top-level key '{key}' ({first} and {second})")]
    DuplicateKey {
        key: String,
        first: String,
        second: String,
    },

    /// A template marker referenced a path that does not exist in the tree.
    #[error("Unresolvable template path '{path}' referenced by marker in '{marker_at}'")]
    TemplatePath { path: String, marker_at: String },

    /// A template marker subscript was out of range or applied to a non-sequence.
    #[error("Template subscript error at '{path}': {message}")]
    TemplateSubscript { path: String, message: String },

    /// Template references form a cycle.
    #[error("Cyclic template reference: {cycle}")]
    TemplateCycle { cycle: String },

    /// A value failed schema validation.
    #[error("Validation error at '{schema_path}' ({provenance}): {message}")]
    Validation {
        schema_path: String,
        message: String,
        provenance: String,
    },

    /// A schema document itself could not be compiled.
    #[error("Invalid schema '{name}': {message}")]
    Schema { name: String, message: String },

    /// An extension merge hit a duplicate key under `raise_on_duplicate`.
    #[error("Duplicate key '{key}' at '{path}' introduced by {provenance}")]
    MergeDuplicate {
        key: String,
        path: String,
        provenance: String,
    },

    /// An external fetch failed. Callers decide whether this is fatal.
    #[error("Fetch error for '{origin}': {message}")]
    Fetch { origin: String, message: String },

    /// A cache store could not be read or written.
    #[error("Cache operation error: {message}")]
    Cache { message: String },

    /// A filesystem transition failed during synchronization.
    #[error("Sync error during {operation} of '{path}': {message}")]
    Sync {
        operation: String,
        path: String,
        message: String,
    },

    /// A git command failed during branch inspection.
    #[error("Git command failed: {command} - {stderr}")]
    GitCommand { command: String, stderr: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON parsing error, wrapped from `serde_json::Error`.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// A TOML parsing error, wrapped from `toml::de::Error`.
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A semantic versioning parsing error, wrapped from `semver::Error`.
    #[error("Semver parsing error: {0}")]
    Semver(#[from] semver::Error),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
