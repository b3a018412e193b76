//! # ConfigTree: the path-addressable configuration value
//!
//! A [`ConfigTree`] is the hierarchical mapping being compiled: string keys to
//! mappings, sequences, strings, numbers, booleans, and nulls, rooted at a
//! single owner for one compilation run. Mappings keep author order (the
//! `preserve_order` feature of `serde_json`).
//!
//! ## Template markers
//!
//! String values may contain `${{ path }}` markers that reference another
//! location in the same tree. Two substitution modes:
//!
//! - The entire string is exactly one marker: the referenced value is
//!   substituted with its original type preserved, so a marker can resolve to
//!   a mapping, a list, or a number.
//! - The marker occurs inside a larger string: the referenced value is
//!   stringified and spliced in place, all occurrences left to right.
//!
//! Resolution is driven from the root tree, not the local subtree, and
//! recurses into the referenced location if it is itself unresolved. This
//! makes [`ConfigTree::fill`] safe to call before every producer has written
//! its section, at the cost of repeated work across calls (no memoization;
//! re-running `fill` on a resolved subtree is a no-op by construction).
//!
//! Cyclic references are a hard error: `resolve` carries a visited-path set
//! and fails with [`crate::error::Error::TemplateCycle`] on re-entry.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::path::{Subscript, TreePath};

/// Shortest possible marker: `${{x}}`. The schema relaxation pass uses this
/// as the `minLength` of its string fallback.
pub const MARKER_MIN_LEN: usize = 6;

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\{\s*([^{}]+?)\s*\}\}").unwrap())
}

fn whole_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$\{\{\s*([^{}]+?)\s*\}\}$").unwrap())
}

/// True if the string contains at least one template marker.
pub fn contains_marker(s: &str) -> bool {
    marker_regex().is_match(s)
}

/// True if any string inside the value contains a template marker.
pub fn value_contains_marker(value: &Value) -> bool {
    match value {
        Value::String(s) => contains_marker(s),
        Value::Array(items) => items.iter().any(value_contains_marker),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| contains_marker(k) || value_contains_marker(v)),
        _ => false,
    }
}

/// The hierarchical configuration value being compiled.
///
/// Created empty by the loader and mutated in place by every later stage:
/// validation fills defaults, resolution rewrites template strings. Never
/// copied wholesale except when a component needs a snapshot for comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTree {
    root: Value,
}

impl ConfigTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Wrap an existing value. The root must be a mapping.
    pub fn from_value(root: Value) -> Result<Self> {
        if !root.is_object() {
            return Err(Error::Content {
                path: String::new(),
                message: "configuration root must be a mapping".to_string(),
            });
        }
        Ok(Self { root })
    }

    /// Borrow the root value.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Mutably borrow the root value. Validation uses this to fill defaults
    /// into sections in place.
    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    /// Consume the tree, returning the root value.
    pub fn into_value(self) -> Value {
        self.root
    }

    /// Look up the value at `path`, applying any subscripts.
    ///
    /// Returns `None` for a missing key or out-of-range index. Slices
    /// materialize a new sequence, so the result is owned.
    pub fn get(&self, path: &TreePath) -> Option<Value> {
        lookup(&self.root, path).ok().flatten()
    }

    /// True if `path` addresses an existing value.
    pub fn contains(&self, path: &TreePath) -> bool {
        matches!(lookup(&self.root, path), Ok(Some(_)))
    }

    /// Set the value at `path`, creating intermediate mappings as needed.
    ///
    /// Index subscripts extend existing sequences with nulls when out of
    /// range; slice subscripts are not assignable.
    pub fn set(&mut self, path: &TreePath, value: Value) -> Result<()> {
        let target = navigate_mut(&mut self.root, path, true)?;
        *target = value;
        Ok(())
    }

    /// Resolve every template marker in the whole tree, in place.
    pub fn fill(&mut self) -> Result<()> {
        // Resolution always reads from the root as it stood when fill began.
        let snapshot = self.root.clone();
        let at = String::new();
        fill_value(&mut self.root, &snapshot, &at)?;
        Ok(())
    }

    /// Resolve the subtree at `path` in place and return the resolved value.
    pub fn fill_at(&mut self, path: &TreePath) -> Result<Value> {
        let snapshot = self.root.clone();
        let target = navigate_mut(&mut self.root, path, false)?;
        fill_value(target, &snapshot, &path.to_string())?;
        Ok(target.clone())
    }
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only lookup with subscript application.
///
/// `Ok(None)` means a missing key or out-of-range index; `Err` means a
/// subscript was applied to a non-sequence value.
fn lookup(root: &Value, path: &TreePath) -> Result<Option<Value>> {
    let mut current = root.clone();
    for segment in &path.segments {
        let next = match current {
            Value::Object(ref map) => map.get(&segment.key).cloned(),
            _ => None,
        };
        let Some(mut value) = next else {
            return Ok(None);
        };
        for sub in &segment.subscripts {
            let Value::Array(items) = value else {
                return Err(Error::TemplateSubscript {
                    path: path.to_string(),
                    message: format!("subscript applied to non-sequence at '{}'", segment.key),
                });
            };
            value = match sub {
                Subscript::Index(i) => match items.get(*i) {
                    Some(item) => item.clone(),
                    None => return Ok(None),
                },
                Subscript::Slice(start, stop) => {
                    let len = items.len();
                    let start = start.unwrap_or(0).min(len);
                    let stop = stop.unwrap_or(len).min(len);
                    Value::Array(items[start..start.max(stop)].to_vec())
                }
            };
        }
        current = value;
    }
    Ok(Some(current))
}

/// Mutable navigation. With `create`, missing keys become empty mappings and
/// short sequences are padded with nulls; without it, a missing location is a
/// lookup error.
fn navigate_mut<'a>(root: &'a mut Value, path: &TreePath, create: bool) -> Result<&'a mut Value> {
    let mut current = root;
    for segment in &path.segments {
        if !current.is_object() && create && current.is_null() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return Err(Error::Content {
                path: path.to_string(),
                message: format!("expected mapping while navigating to '{}'", segment.key),
            });
        };
        if !map.contains_key(&segment.key) {
            if create {
                map.insert(segment.key.clone(), Value::Null);
            } else {
                return Err(Error::TemplatePath {
                    path: path.to_string(),
                    marker_at: segment.key.clone(),
                });
            }
        }
        current = map.get_mut(&segment.key).unwrap();

        for sub in &segment.subscripts {
            match sub {
                Subscript::Index(i) => {
                    if current.is_null() && create {
                        *current = Value::Array(Vec::new());
                    }
                    let Value::Array(items) = current else {
                        return Err(Error::TemplateSubscript {
                            path: path.to_string(),
                            message: format!(
                                "subscript applied to non-sequence at '{}'",
                                segment.key
                            ),
                        });
                    };
                    if items.len() <= *i {
                        if create {
                            items.resize(*i + 1, Value::Null);
                        } else {
                            return Err(Error::TemplatePath {
                                path: path.to_string(),
                                marker_at: segment.key.clone(),
                            });
                        }
                    }
                    current = &mut items[*i];
                }
                Subscript::Slice(..) => {
                    return Err(Error::TemplateSubscript {
                        path: path.to_string(),
                        message: "slice subscripts are not assignable".to_string(),
                    });
                }
            }
        }
    }
    Ok(current)
}

/// Depth-first in-place resolution of a subtree against the root snapshot.
///
/// Mapping keys are resolved before values; a resolved key can change
/// insertion order but a value is never dropped unless two keys resolve to
/// the same string, in which case the later one wins.
fn fill_value(value: &mut Value, root: &Value, at: &str) -> Result<()> {
    match value {
        Value::Object(map) => {
            let entries = std::mem::take(map);
            for (key, mut item) in entries {
                let key = if contains_marker(&key) {
                    let mut visited = Vec::new();
                    splice_markers(&key, root, at, &mut visited)?
                } else {
                    key
                };
                let child_at = if at.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", at, key)
                };
                fill_value(&mut item, root, &child_at)?;
                map.insert(key, item);
            }
            Ok(())
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                let child_at = format!("{}[{}]", at, i);
                fill_value(item, root, &child_at)?;
            }
            Ok(())
        }
        Value::String(s) => {
            if contains_marker(s) {
                let mut visited = Vec::new();
                *value = resolve_string(s, root, at, &mut visited)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Resolve one string value: whole-marker strings keep the referenced type,
/// embedded markers are stringified and spliced.
fn resolve_string(s: &str, root: &Value, at: &str, visited: &mut Vec<String>) -> Result<Value> {
    if let Some(caps) = whole_marker_regex().captures(s) {
        let expr = caps.get(1).unwrap().as_str();
        return resolve_path(expr, root, at, visited);
    }
    Ok(Value::String(splice_markers(s, root, at, visited)?))
}

/// Replace every marker occurrence in `s` with the stringified referenced
/// value, left to right.
fn splice_markers(s: &str, root: &Value, at: &str, visited: &mut Vec<String>) -> Result<String> {
    let mut result = String::with_capacity(s.len());
    let mut last = 0;
    for caps in marker_regex().captures_iter(s) {
        let whole = caps.get(0).unwrap();
        let expr = caps.get(1).unwrap().as_str();
        result.push_str(&s[last..whole.start()]);
        let resolved = resolve_path(expr, root, at, visited)?;
        result.push_str(&stringify(&resolved));
        last = whole.end();
    }
    result.push_str(&s[last..]);
    Ok(result)
}

/// Look up a marker's path expression against the root and, if the target is
/// itself unresolved, recursively resolve it before returning.
fn resolve_path(expr: &str, root: &Value, at: &str, visited: &mut Vec<String>) -> Result<Value> {
    let path = TreePath::parse(expr)?;
    let canonical = path.to_string();
    if visited.contains(&canonical) {
        let mut chain = visited.clone();
        chain.push(canonical);
        return Err(Error::TemplateCycle {
            cycle: chain.join(" -> "),
        });
    }
    visited.push(canonical);

    let value = lookup(root, &path)?.ok_or_else(|| Error::TemplatePath {
        path: path.to_string(),
        marker_at: at.to_string(),
    })?;

    let resolved = resolve_value(value, root, &path.to_string(), visited)?;
    visited.pop();
    Ok(resolved)
}

/// Resolve markers inside an already looked-up value without mutating the
/// tree. The owning subtree is rewritten later when `fill` walks it.
fn resolve_value(value: Value, root: &Value, at: &str, visited: &mut Vec<String>) -> Result<Value> {
    match value {
        Value::String(s) if contains_marker(&s) => resolve_string(&s, root, at, visited),
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                resolved.push(resolve_value(item, root, &format!("{}[{}]", at, i), visited)?);
            }
            Ok(Value::Array(resolved))
        }
        Value::Object(map) => {
            let mut resolved = Map::new();
            for (key, item) in map {
                let key = if contains_marker(&key) {
                    splice_markers(&key, root, at, visited)?
                } else {
                    key
                };
                let child_at = format!("{}.{}", at, key);
                resolved.insert(key, resolve_value(item, root, &child_at, visited)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other),
    }
}

/// Stringify a resolved value for splicing into a larger string.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: Value) -> ConfigTree {
        ConfigTree::from_value(value).unwrap()
    }

    fn path(expr: &str) -> TreePath {
        TreePath::parse(expr).unwrap()
    }

    #[test]
    fn test_get_nested() {
        let t = tree(json!({"a": {"b": {"c": 42}}}));
        assert_eq!(t.get(&path("a.b.c")), Some(json!(42)));
        assert_eq!(t.get(&path("a.b")), Some(json!({"c": 42})));
        assert_eq!(t.get(&path("a.x")), None);
    }

    #[test]
    fn test_get_with_index() {
        let t = tree(json!({"items": [1, 2, 3]}));
        assert_eq!(t.get(&path("items[1]")), Some(json!(2)));
        assert_eq!(t.get(&path("items[5]")), None);
    }

    #[test]
    fn test_get_with_slice() {
        let t = tree(json!({"items": [1, 2, 3, 4]}));
        assert_eq!(t.get(&path("items[1:3]")), Some(json!([2, 3])));
        assert_eq!(t.get(&path("items[2:]")), Some(json!([3, 4])));
        assert_eq!(t.get(&path("items[:2]")), Some(json!([1, 2])));
        // Out-of-range slice bounds clamp instead of failing
        assert_eq!(t.get(&path("items[3:99]")), Some(json!([4])));
    }

    #[test]
    fn test_contains() {
        let t = tree(json!({"a": {"b": null}}));
        assert!(t.contains(&path("a.b")));
        assert!(!t.contains(&path("a.c")));
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut t = ConfigTree::new();
        t.set(&path("a.b.c"), json!(1)).unwrap();
        assert_eq!(t.get(&path("a.b.c")), Some(json!(1)));
        assert_eq!(t.get(&path("a.b")), Some(json!({"c": 1})));
    }

    #[test]
    fn test_set_extends_sequence() {
        let mut t = tree(json!({"items": [1]}));
        t.set(&path("items[3]"), json!(9)).unwrap();
        assert_eq!(t.get(&path("items")), Some(json!([1, null, null, 9])));
    }

    #[test]
    fn test_set_rejects_slice() {
        let mut t = tree(json!({"items": [1, 2]}));
        assert!(t.set(&path("items[0:1]"), json!(9)).is_err());
    }

    #[test]
    fn test_fill_whole_marker_preserves_type() {
        let mut t = tree(json!({
            "numbers": [1, 2, 3],
            "copy": "${{ numbers }}",
            "count": "${{ numbers[1] }}"
        }));
        t.fill().unwrap();
        assert_eq!(t.get(&path("copy")), Some(json!([1, 2, 3])));
        assert_eq!(t.get(&path("count")), Some(json!(2)));
    }

    #[test]
    fn test_fill_embedded_marker_stringifies() {
        let mut t = tree(json!({
            "name": "widget",
            "version": 2,
            "title": "${{ name }} v${{ version }}"
        }));
        t.fill().unwrap();
        assert_eq!(t.get(&path("title")), Some(json!("widget v2")));
    }

    #[test]
    fn test_fill_resolves_chains() {
        // title references full_name which itself references name
        let mut t = tree(json!({
            "name": "widget",
            "full_name": "${{ name }}-suite",
            "title": "The ${{ full_name }}"
        }));
        t.fill().unwrap();
        assert_eq!(t.get(&path("title")), Some(json!("The widget-suite")));
        assert_eq!(t.get(&path("full_name")), Some(json!("widget-suite")));
    }

    #[test]
    fn test_fill_resolves_mapping_keys() {
        let mut t = tree(json!({
            "lang": "rust",
            "matrix": {"${{ lang }}": {"edition": "2021"}}
        }));
        t.fill().unwrap();
        assert_eq!(
            t.get(&path("matrix.rust")),
            Some(json!({"edition": "2021"}))
        );
    }

    #[test]
    fn test_fill_is_idempotent() {
        let mut t = tree(json!({
            "name": "widget",
            "title": "${{ name }} tool"
        }));
        t.fill().unwrap();
        let once = t.clone();
        t.fill().unwrap();
        assert_eq!(t, once);
    }

    #[test]
    fn test_fill_noop_without_markers() {
        let mut t = tree(json!({"a": {"b": [1, "two", null, true]}}));
        let before = t.clone();
        t.fill().unwrap();
        assert_eq!(t, before);
    }

    #[test]
    fn test_fill_at_subtree() {
        let mut t = tree(json!({
            "name": "widget",
            "docs": {"title": "${{ name }} docs"},
            "other": "${{ name }}"
        }));
        let resolved = t.fill_at(&path("docs")).unwrap();
        assert_eq!(resolved, json!({"title": "widget docs"}));
        // Subtree resolved in place, untouched siblings stay unresolved
        assert_eq!(t.get(&path("docs.title")), Some(json!("widget docs")));
        assert_eq!(t.get(&path("other")), Some(json!("${{ name }}")));
    }

    #[test]
    fn test_fill_missing_path_is_error() {
        let mut t = tree(json!({"a": "${{ nowhere }}"}));
        let err = t.fill().unwrap_err();
        match err {
            Error::TemplatePath { path: p, .. } => assert_eq!(p, "nowhere"),
            other => panic!("expected TemplatePath, got {:?}", other),
        }
    }

    #[test]
    fn test_fill_out_of_range_index_is_error() {
        let mut t = tree(json!({"items": [1], "a": "${{ items[5] }}"}));
        assert!(matches!(
            t.fill().unwrap_err(),
            Error::TemplatePath { .. }
        ));
    }

    #[test]
    fn test_fill_subscript_on_scalar_is_error() {
        let mut t = tree(json!({"n": 3, "a": "${{ n[0] }}"}));
        assert!(matches!(
            t.fill().unwrap_err(),
            Error::TemplateSubscript { .. }
        ));
    }

    #[test]
    fn test_fill_detects_direct_cycle() {
        let mut t = tree(json!({"a": "${{ b }}", "b": "${{ a }}"}));
        let err = t.fill().unwrap_err();
        match err {
            Error::TemplateCycle { cycle } => {
                assert!(cycle.contains("a"));
                assert!(cycle.contains("b"));
            }
            other => panic!("expected TemplateCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_fill_detects_self_cycle() {
        let mut t = tree(json!({"a": "prefix ${{ a }}"}));
        assert!(matches!(
            t.fill().unwrap_err(),
            Error::TemplateCycle { .. }
        ));
    }

    #[test]
    fn test_fill_allows_repeated_reference() {
        // The same path twice in one string is repetition, not a cycle
        let mut t = tree(json!({"n": "x", "a": "${{ n }}${{ n }}"}));
        t.fill().unwrap();
        assert_eq!(t.get(&path("a")), Some(json!("xx")));
    }

    #[test]
    fn test_marker_detection() {
        assert!(contains_marker("${{ a.b }}"));
        assert!(contains_marker("prefix ${{a}} suffix"));
        assert!(!contains_marker("$ {{ a }}"));
        assert!(!contains_marker("plain"));
    }

    #[test]
    fn test_value_contains_marker() {
        assert!(value_contains_marker(&json!({"a": ["${{ x }}"]})));
        assert!(value_contains_marker(&json!({"${{ k }}": 1})));
        assert!(!value_contains_marker(&json!({"a": [1, "two"]})));
    }

    #[test]
    fn test_stringify_embedded_containers() {
        let mut t = tree(json!({
            "items": [1, 2],
            "msg": "list: ${{ items }}"
        }));
        t.fill().unwrap();
        assert_eq!(t.get(&path("msg")), Some(json!("list: [1,2]")));
    }
}
