//! # CLI Command Implementations
//!
//! One module per subcommand. Each module defines a clap `Args` struct and
//! an `execute` function that orchestrates the library to perform the
//! command's logic.

pub mod apply;
pub mod check;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use repo_control::schema::SchemaRegistry;

/// Build the schema registry from a directory of per-section schema files.
///
/// The file stem names the top-level section the schema governs; YAML, JSON,
/// and TOML are accepted. A missing directory yields an empty registry, which
/// passes every tree through unvalidated.
pub fn load_registry(schema_dir: &Path) -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    if !schema_dir.is_dir() {
        return Ok(registry);
    }
    let mut entries: Vec<_> = fs::read_dir(schema_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();
    for path in entries {
        let Some(section) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading schema '{}'", path.display()))?;
        let schema: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            Some("toml") => serde_json::to_value(toml::from_str::<toml::Value>(&raw)?)?,
            _ => continue,
        };
        registry
            .register(section, schema)
            .with_context(|| format!("compiling schema '{}'", path.display()))?;
    }
    Ok(registry)
}
