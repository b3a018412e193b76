//! # Schema validation and default filling
//!
//! Each top-level configuration section may carry a JSON-Schema
//! (draft 2020-12) document. A [`SchemaDefinition`] holds the schema in two
//! derived forms:
//!
//! - **strict**: the schema as authored, used after template resolution;
//! - **relaxed**: every schema node rewritten to
//!   `anyOf: [original, {type: string, minLength: K}]` (preserving any
//!   `default`), so an unresolved template marker — always a string — still
//!   validates during the pre-resolution pass.
//!
//! Validation fills defaults as a side effect: an explicit default-filling
//! walk runs over the instance *before* the validator evaluates it, so
//! `required` is checked on the defaulted result, not on the raw input. A
//! section that is `{}` with a required property carrying a default therefore
//! validates.
//!
//! Schemas live in a [`SchemaRegistry`] value constructed once per run and
//! threaded through the loader and pipeline by parameter; there is no
//! process-wide registry.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::tree::{ConfigTree, MARKER_MIN_LEN};

/// Which derived schema form to validate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Pre-resolution: unresolved markers are tolerated as strings.
    Relaxed,
    /// Post-resolution: exact types.
    Strict,
}

/// One section schema, held in strict and relaxed derived forms with their
/// compiled validators.
pub struct SchemaDefinition {
    name: String,
    strict: Value,
    strict_validator: jsonschema::Validator,
    relaxed_validator: jsonschema::Validator,
}

impl std::fmt::Debug for SchemaDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl SchemaDefinition {
    /// Compile a schema document into its strict and relaxed forms.
    pub fn new(name: &str, strict: Value) -> Result<Self> {
        let relaxed = relax_schema(&strict);
        let strict_validator =
            jsonschema::validator_for(&strict).map_err(|e| Error::Schema {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        let relaxed_validator =
            jsonschema::validator_for(&relaxed).map_err(|e| Error::Schema {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            name: name.to_string(),
            strict,
            strict_validator,
            relaxed_validator,
        })
    }

    /// Section name this schema applies to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema as authored.
    pub fn strict(&self) -> &Value {
        &self.strict
    }

    /// Validate `instance` against this schema in `mode`, filling defaults
    /// first so required-ness is evaluated on the defaulted result.
    ///
    /// The first violation is returned as a fatal [`Error::Validation`]
    /// carrying the schema path, the offending value, and `provenance`.
    pub fn validate(
        &self,
        instance: &mut Value,
        mode: ValidationMode,
        provenance: &str,
    ) -> Result<()> {
        fill_defaults(instance, &self.strict);
        let validator = match mode {
            ValidationMode::Relaxed => &self.relaxed_validator,
            ValidationMode::Strict => &self.strict_validator,
        };
        if let Some(violation) = validator.iter_errors(instance).next() {
            return Err(Error::Validation {
                schema_path: format!("{}{}", self.name, violation.instance_path),
                message: format!("{} (value: {})", violation, truncate(&violation.instance)),
                provenance: provenance.to_string(),
            });
        }
        Ok(())
    }
}

fn truncate(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.len() <= 120 {
        return rendered;
    }
    // Cut on a char boundary; a byte-offset slice panics on multi-byte text
    let mut end = 120;
    while !rendered.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &rendered[..end])
}

/// An immutable set of section schemas for one compilation run.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, SchemaDefinition>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a schema for a top-level section.
    pub fn register(&mut self, section: &str, schema: Value) -> Result<()> {
        let definition = SchemaDefinition::new(section, schema)?;
        self.schemas.insert(section.to_string(), definition);
        Ok(())
    }

    /// Look up the schema for a section, if one is registered.
    pub fn get(&self, section: &str) -> Option<&SchemaDefinition> {
        self.schemas.get(section)
    }

    /// Registered section names, sorted.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Validate every top-level section of `tree` that has a registered
    /// schema, filling defaults in place. Sections without a schema pass
    /// through untouched.
    pub fn validate_tree(
        &self,
        tree: &mut ConfigTree,
        mode: ValidationMode,
        provenance: &str,
    ) -> Result<()> {
        let Value::Object(root) = tree.root_mut() else {
            return Err(Error::Content {
                path: String::new(),
                message: "configuration root must be a mapping".to_string(),
            });
        };
        for (section, definition) in &self.schemas {
            if let Some(instance) = root.get_mut(section) {
                definition.validate(instance, mode, provenance)?;
            }
        }
        Ok(())
    }
}

/// Rewrite every schema node to `anyOf: [original, string-fallback]`,
/// preserving any `default` at the wrapper level.
fn relax_schema(schema: &Value) -> Value {
    let Value::Object(node) = schema else {
        // Boolean schemas pass through.
        return schema.clone();
    };
    let mut inner = Map::new();
    for (keyword, value) in node {
        let relaxed = match keyword.as_str() {
            "properties" | "patternProperties" | "$defs" | "definitions" => match value {
                Value::Object(subschemas) => Value::Object(
                    subschemas
                        .iter()
                        .map(|(k, v)| (k.clone(), relax_schema(v)))
                        .collect(),
                ),
                other => other.clone(),
            },
            "items" | "additionalProperties" | "contains" | "propertyNames" | "not" | "if"
            | "then" | "else" => relax_schema(value),
            "prefixItems" | "allOf" | "anyOf" | "oneOf" => match value {
                Value::Array(branches) => {
                    Value::Array(branches.iter().map(relax_schema).collect())
                }
                other => other.clone(),
            },
            _ => value.clone(),
        };
        inner.insert(keyword.clone(), relaxed);
    }
    let default = inner.remove("default");
    let mut wrapper = Map::new();
    wrapper.insert(
        "anyOf".to_string(),
        Value::Array(vec![
            Value::Object(inner),
            serde_json::json!({"type": "string", "minLength": MARKER_MIN_LEN}),
        ]),
    );
    if let Some(default) = default {
        wrapper.insert("default".to_string(), default);
    }
    Value::Object(wrapper)
}

/// Walk the instance against the schema, inserting `default` values for
/// absent properties and recursing into present ones.
fn fill_defaults(instance: &mut Value, schema: &Value) {
    let Value::Object(node) = schema else {
        return;
    };

    if let (Some(Value::Object(properties)), Value::Object(map)) =
        (node.get("properties"), &mut *instance)
    {
        for (key, subschema) in properties {
            if !map.contains_key(key) {
                if let Some(default) = subschema.get("default") {
                    map.insert(key.clone(), default.clone());
                }
            }
            if let Some(child) = map.get_mut(key) {
                fill_defaults(child, subschema);
            }
        }
    }

    if let (Some(items_schema), Value::Array(items)) = (node.get("items"), &mut *instance) {
        for item in items {
            fill_defaults(item, items_schema);
        }
    }

    for combinator in ["allOf", "anyOf", "oneOf"] {
        if let Some(Value::Array(branches)) = node.get(combinator) {
            for branch in branches {
                fill_defaults(instance, branch);
            }
        }
    }
}
