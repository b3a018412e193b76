//! Extension-fragment merge
//!
//! Merges an externally-sourced fragment into a base configuration section
//! under a declared conflict policy. For keys present in both sides:
//!
//! - both values mappings and `extend_objects`: merge recursively;
//! - both values sequences and `extend_arrays`: concatenate;
//! - otherwise `raise_on_duplicate`: fail, naming the offending key and the
//!   extension's provenance;
//! - otherwise the extension value overwrites the base value (with a warning).
//!
//! This merge always runs before strict validation, so a fragment may legally
//! fill in a value the base schema requires.

use log::warn;
use serde_json::Value;

use crate::error::{Error, Result};

/// Conflict policy for one extension declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    /// Concatenate sequences present on both sides.
    pub extend_arrays: bool,
    /// Recursively merge mappings present on both sides.
    pub extend_objects: bool,
    /// Fail on any other key collision instead of overwriting.
    pub raise_on_duplicate: bool,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            extend_arrays: true,
            extend_objects: true,
            raise_on_duplicate: false,
        }
    }
}

/// Merge `addon` into `base` in place under `policy`.
///
/// `provenance` names the extension for error attribution; `path` is the
/// dotted location of `base` within the tree, used in messages only.
pub fn merge_values(
    base: &mut Value,
    addon: &Value,
    policy: MergePolicy,
    path: &str,
    provenance: &str,
) -> Result<()> {
    match (&mut *base, addon) {
        (Value::Object(base_map), Value::Object(addon_map)) => {
            for (key, addon_value) in addon_map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                match base_map.get_mut(key) {
                    None => {
                        base_map.insert(key.clone(), addon_value.clone());
                    }
                    Some(base_value) => {
                        merge_conflict(base_value, addon_value, policy, &child_path, provenance)?;
                    }
                }
            }
            Ok(())
        }
        _ => merge_conflict(base, addon, policy, path, provenance),
    }
}

/// Resolve a single key collision per the policy.
fn merge_conflict(
    base: &mut Value,
    addon: &Value,
    policy: MergePolicy,
    path: &str,
    provenance: &str,
) -> Result<()> {
    if policy.extend_objects && base.is_object() && addon.is_object() {
        return merge_values(base, addon, policy, path, provenance);
    }
    if policy.extend_arrays && base.is_array() && addon.is_array() {
        if let (Value::Array(base_seq), Value::Array(addon_seq)) = (&mut *base, addon) {
            base_seq.extend(addon_seq.iter().cloned());
        }
        return Ok(());
    }
    if policy.raise_on_duplicate {
        let key = path.rsplit('.').next().unwrap_or(path).to_string();
        return Err(Error::MergeDuplicate {
            key,
            path: path.to_string(),
            provenance: provenance.to_string(),
        });
    }
    warn!(
        "{}: overwriting value at '{}': {} -> {}",
        provenance,
        path,
        type_name(base),
        type_name(addon)
    );
    *base = addon.clone();
    Ok(())
}

/// Human-readable type name for log and error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
