//! # Repo Control Library
//!
//! Core of the `repo-control` tool: a declarative control center that
//! compiles a directory of hand-authored configuration fragments into a
//! complete, internally-consistent set of repository artifacts, then
//! synchronizes the working tree to match.
//!
//! ## Core concepts
//!
//! - **Configuration tree (`tree`, `path`)**: a single path-addressable
//!   tree assembled from fragments, with `${{ path }}` template markers
//!   resolved against the tree itself.
//! - **Schemas (`schema`, `merge`)**: JSON-Schema validation in two modes,
//!   relaxed (markers still present) and strict (fully resolved), with
//!   defaults filled before required-ness is evaluated; policy-driven
//!   merging of externally-sourced extensions.
//! - **Loading (`loader`, `cache`, `vcs`)**: fragment discovery in YAML,
//!   JSON, and TOML, extension fetch over git with an on-disk cache, and
//!   branch-safe version-control helpers.
//! - **Generation (`generate`)**: the contract content generators implement,
//!   composed into a fixed, ordered pipeline.
//! - **Synchronization (`classify`, `sync`, `report`, `pipeline`)**: a
//!   seven-way diff of candidates against the previous run's snapshot, an
//!   ordered filesystem apply, and the change report.
//!
//! ## Execution flow
//!
//! `pipeline::Pipeline` runs the fixed stages of one compilation: load,
//! validate relaxed, resolve templates, validate strict, generate, validate
//! derived values, classify, and (unless dry-running) apply and persist the
//! snapshot.

pub mod cache;
pub mod classify;
pub mod defaults;
pub mod error;
pub mod generate;
pub mod loader;
pub mod merge;
pub mod path;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod sync;
pub mod tree;
pub mod vcs;

#[cfg(test)]
mod path_proptest;
