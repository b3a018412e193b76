//! # Fragment loading
//!
//! Assembles raw configuration fragments into a single [`ConfigTree`] before
//! any validation or generation runs. Fragments live in one directory, one
//! logical section per file, in YAML, JSON, or TOML. Two local fragments
//! defining the same top-level key is always a hard error, independent of any
//! extension merge policy: it catches authoring mistakes early.
//!
//! A fragment set may declare **extensions**: externally-sourced fragments
//! merged into a named section under a declared conflict policy, in declared
//! order, at most one per section type. Fetched content is cached on disk in
//! a directory keyed by `{timestamp}__{hash-of-declaration-list}`; an entry
//! older than the retention window is discarded and the set re-downloaded,
//! preserving any README marker file in the cache root.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{Error, Provenance, Result};
use crate::merge::{merge_values, MergePolicy};
use crate::tree::ConfigTree;

/// Reserved top-level key holding the extension declaration list.
pub const EXTENSIONS_KEY: &str = "extensions";

/// One extension declaration: an externally-sourced fragment keyed by the
/// logical section it extends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDecl {
    /// Repository slug or URL the fragment is fetched from.
    pub source: String,
    /// Logical section name the fragment extends.
    pub r#type: String,
    /// Optional revision pin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
    #[serde(default = "default_true")]
    pub extend_arrays: bool,
    #[serde(default = "default_true")]
    pub extend_objects: bool,
    #[serde(default)]
    pub raise_on_duplicate: bool,
}

fn default_true() -> bool {
    true
}

impl ExtensionDecl {
    /// Merge policy implied by this declaration.
    pub fn policy(&self) -> MergePolicy {
        MergePolicy {
            extend_arrays: self.extend_arrays,
            extend_objects: self.extend_objects,
            raise_on_duplicate: self.raise_on_duplicate,
        }
    }

    /// Provenance string for error attribution.
    pub fn provenance(&self) -> Provenance {
        Provenance::Extension {
            source: self.source.clone(),
            r#type: self.r#type.clone(),
        }
    }
}

/// External collaborator that retrieves raw extension content.
pub trait FetchExtension {
    /// Return the raw bytes of the declared fragment.
    fn fetch(&self, decl: &ExtensionDecl) -> Result<Vec<u8>>;
}

/// Assembles fragments and extensions into the raw ConfigTree.
pub struct Loader<'a> {
    fetcher: &'a dyn FetchExtension,
    /// Extension disk cache root; `None` disables caching.
    cache_root: Option<PathBuf>,
    /// Cache entry retention window in seconds.
    retention_secs: u64,
}

impl<'a> Loader<'a> {
    pub fn new(fetcher: &'a dyn FetchExtension) -> Self {
        Self {
            fetcher,
            cache_root: None,
            retention_secs: 0,
        }
    }

    /// Enable the on-disk extension cache.
    pub fn with_cache(mut self, root: impl Into<PathBuf>, retention_secs: u64) -> Self {
        self.cache_root = Some(root.into());
        self.retention_secs = retention_secs;
        self
    }

    /// Read every fragment under `fragment_dir`, reject duplicate top-level
    /// keys, fetch and merge declared extensions, and return the assembled
    /// tree. The `extensions` key itself is consumed, not kept in the tree.
    pub fn load(&self, fragment_dir: &Path) -> Result<ConfigTree> {
        let mut tree = ConfigTree::new();
        let mut origins: Vec<(String, PathBuf)> = Vec::new();
        let mut declarations: Vec<ExtensionDecl> = Vec::new();

        for path in fragment_files(fragment_dir)? {
            let fragment = parse_fragment(&path)?;
            let Value::Object(map) = fragment else {
                return Err(Error::Content {
                    path: path.display().to_string(),
                    message: "fragment must be a mapping at the top level".to_string(),
                });
            };
            debug!("loaded fragment '{}'", path.display());
            for (key, value) in map {
                if let Some((_, first)) = origins.iter().find(|(k, _)| *k == key) {
                    return Err(Error::DuplicateKey {
                        key,
                        first: first.display().to_string(),
                        second: path.display().to_string(),
                    });
                }
                origins.push((key.clone(), path.clone()));
                if key == EXTENSIONS_KEY {
                    let decls: Vec<ExtensionDecl> =
                        serde_json::from_value(value).map_err(|e| Error::Content {
                            path: path.display().to_string(),
                            message: format!("invalid extension declarations: {}", e),
                        })?;
                    declarations = decls;
                } else {
                    let root = tree.root_mut();
                    if let Value::Object(root_map) = root {
                        root_map.insert(key, value);
                    }
                }
            }
        }

        self.apply_extensions(&mut tree, &declarations)?;
        Ok(tree)
    }

    /// Fetch each declared extension (through the disk cache) and merge it
    /// into its section, in declared order.
    fn apply_extensions(&self, tree: &mut ConfigTree, decls: &[ExtensionDecl]) -> Result<()> {
        if decls.is_empty() {
            return Ok(());
        }
        let mut seen: Vec<&str> = Vec::new();
        for decl in decls {
            if seen.contains(&decl.r#type.as_str()) {
                return Err(Error::Content {
                    path: EXTENSIONS_KEY.to_string(),
                    message: format!(
                        "multiple extensions declared for section '{}'",
                        decl.r#type
                    ),
                });
            }
            seen.push(&decl.r#type);
        }

        let contents = self.fetch_all(decls)?;
        for (decl, fragment) in decls.iter().zip(contents) {
            let provenance = decl.provenance().to_string();
            info!("merging {}", provenance);
            let root = tree.root_mut();
            let Value::Object(root_map) = root else {
                unreachable!("tree root is always a mapping");
            };
            match root_map.get_mut(&decl.r#type) {
                Some(section) => merge_values(
                    section,
                    &fragment,
                    decl.policy(),
                    &decl.r#type,
                    &provenance,
                )?,
                None => {
                    root_map.insert(decl.r#type.clone(), fragment);
                }
            }
        }
        Ok(())
    }

    /// Fetch the whole declaration set, using the disk cache when the cached
    /// entry is within the retention window.
    fn fetch_all(&self, decls: &[ExtensionDecl]) -> Result<Vec<Value>> {
        let key = declaration_hash(decls);

        if let Some(cached) = self.read_cache(&key, decls)? {
            debug!("extension cache hit for {}", key);
            return Ok(cached);
        }

        let mut contents = Vec::with_capacity(decls.len());
        for decl in decls {
            validate_source(&decl.source)?;
            let bytes = self.fetcher.fetch(decl)?;
            let value: Value =
                serde_yaml::from_slice(&bytes).map_err(|e| Error::Content {
                    path: decl.provenance().to_string(),
                    message: format!("invalid extension content: {}", e),
                })?;
            contents.push(value);
        }
        self.write_cache(&key, decls, &contents)?;
        Ok(contents)
    }

    fn read_cache(&self, key: &str, decls: &[ExtensionDecl]) -> Result<Option<Vec<Value>>> {
        let Some(root) = &self.cache_root else {
            return Ok(None);
        };
        if !root.is_dir() {
            return Ok(None);
        }
        let suffix = format!("__{}", key);
        let mut live: Option<PathBuf> = None;
        let mut stale: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.path().is_dir() || !name.ends_with(&suffix) {
                continue;
            }
            let timestamp: u64 = name
                .split("__")
                .next()
                .and_then(|t| t.parse().ok())
                .unwrap_or(0);
            if now_secs().saturating_sub(timestamp) <= self.retention_secs {
                live = Some(entry.path());
            } else {
                stale.push(entry.path());
            }
        }
        // Stale entries are cleared; the README marker in the cache root is
        // a plain file and untouched by directory removal.
        for dir in stale {
            warn!("clearing stale extension cache '{}'", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        let Some(dir) = live else {
            return Ok(None);
        };

        let mut contents = Vec::with_capacity(decls.len());
        for decl in decls {
            let path = dir.join(format!("{}.yaml", decl.r#type));
            if !path.is_file() {
                return Ok(None);
            }
            let raw = fs::read_to_string(&path)?;
            let value: Value = serde_yaml::from_str(&raw)?;
            contents.push(value);
        }
        Ok(Some(contents))
    }

    fn write_cache(&self, key: &str, decls: &[ExtensionDecl], contents: &[Value]) -> Result<()> {
        let Some(root) = &self.cache_root else {
            return Ok(());
        };
        let dir = root.join(format!("{}__{}", now_secs(), key));
        fs::create_dir_all(&dir)?;
        for (decl, value) in decls.iter().zip(contents) {
            let rendered = serde_yaml::to_string(value)?;
            fs::write(dir.join(format!("{}.yaml", decl.r#type)), rendered)?;
        }
        Ok(())
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Hash of the serialized declaration list, used as the cache key.
fn declaration_hash(decls: &[ExtensionDecl]) -> String {
    let serialized = serde_json::to_string(decls).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Reject declaration sources that look like URLs but do not parse as one.
fn validate_source(source: &str) -> Result<()> {
    if source.contains("://") {
        url::Url::parse(source)?;
    }
    Ok(())
}

/// Fragment files under `dir`, sorted for a deterministic load order.
fn fragment_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::Content {
            path: dir.display().to_string(),
            message: "fragment directory does not exist".to_string(),
        });
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml") | Some("json") | Some("toml")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Parse one fragment file by its extension.
fn parse_fragment(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&raw)?),
        Some("json") => Ok(serde_json::from_str(&raw)?),
        Some("toml") => {
            let parsed: toml::Value = toml::from_str(&raw)?;
            serde_json::to_value(parsed).map_err(|e| Error::Content {
                path: path.display().to_string(),
                message: format!("unrepresentable TOML value: {}", e),
            })
        }
        _ => Err(Error::Content {
            path: path.display().to_string(),
            message: "unsupported fragment format".to_string(),
        }),
    }
}
