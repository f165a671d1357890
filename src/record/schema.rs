//! Field schema for the event record store
//!
//! A schema is the fixed set of named, typed fields an unpacker may write
//! and expressions may reference. Fields are registered before the pipeline
//! starts and resolved once into row slots; expressions and unpackers then
//! address fields by [`FieldId`] with no per-event string lookup.
//!
//! Paths are dotted identifiers (`e`, `det.energy`) and a leaf may be a
//! fixed-size array (`gamma.e`, addressable element-wise in expressions as
//! `gamma.e[3]`).

use crate::error::{Result, SortError};
use crate::types::FieldKind;
use rhai::{Dynamic, Scope};
use std::collections::BTreeMap;

/// Handle to a registered field, resolved at registration time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldId {
    pub(crate) slot: usize,
    pub(crate) len: usize,
}

impl FieldId {
    /// Number of elements (1 for scalar fields)
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if this field was registered as an array
    pub fn is_array(&self) -> bool {
        self.len > 1
    }

    /// Returns false; a field always occupies at least one slot
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct FieldDef {
    path: String,
    kind: FieldKind,
    id: FieldId,
}

/// The fixed schema of an event record store
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldDef>,
    by_path: BTreeMap<String, usize>,
    slots: usize,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scalar field under a dotted path
    ///
    /// Fails if the path is already registered, or if it conflicts with an
    /// existing leaf (a leaf cannot also be a branch).
    pub fn register(&mut self, path: &str, kind: FieldKind) -> Result<FieldId> {
        self.register_entry(path, kind, 1)
    }

    /// Register a fixed-size array field under a dotted path
    pub fn register_array(&mut self, path: &str, kind: FieldKind, len: usize) -> Result<FieldId> {
        if len == 0 {
            return Err(SortError::Schema(format!(
                "array field `{}` must have at least one element",
                path
            )));
        }
        self.register_entry(path, kind, len)
    }

    fn register_entry(&mut self, path: &str, kind: FieldKind, len: usize) -> Result<FieldId> {
        validate_path(path)?;
        if self.by_path.contains_key(path) {
            return Err(SortError::Schema(format!(
                "field `{}` is already registered",
                path
            )));
        }
        // A new leaf may not sit above or below an existing one.
        let branch_prefix = format!("{}.", path);
        if self.by_path.keys().any(|p| p.starts_with(&branch_prefix)) {
            return Err(SortError::Schema(format!(
                "field `{}` conflicts with registered fields below it",
                path
            )));
        }
        let mut prefix = String::new();
        for segment in path.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            if prefix.len() < path.len() && self.by_path.contains_key(&prefix) {
                return Err(SortError::Schema(format!(
                    "field `{}` conflicts with registered leaf `{}`",
                    path, prefix
                )));
            }
        }

        let id = FieldId {
            slot: self.slots,
            len,
        };
        self.by_path.insert(path.to_string(), self.fields.len());
        self.fields.push(FieldDef {
            path: path.to_string(),
            kind,
            id,
        });
        self.slots += len;
        Ok(id)
    }

    /// Look up a registered field by path
    pub fn field(&self, path: &str) -> Option<FieldId> {
        self.by_path.get(path).map(|&i| self.fields[i].id)
    }

    /// Number of registered fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are registered
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total number of row slots backing this schema
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Iterate registered paths in registration order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.path.as_str())
    }

    /// Build an expression scope exposing every field's committed value
    ///
    /// Scalars surface per their [`FieldKind`] (float, integer or boolean),
    /// arrays surface as expression arrays, and dotted paths surface as
    /// nested object maps.
    pub(crate) fn build_scope(&self, slots: &[f64]) -> Scope<'static> {
        let mut scope = Scope::new();
        let mut roots: BTreeMap<String, rhai::Map> = BTreeMap::new();
        for def in &self.fields {
            let value = self.field_dynamic(def, slots);
            let mut segments = def.path.split('.');
            let first = segments.next().unwrap_or_default();
            let rest: Vec<&str> = segments.collect();
            if rest.is_empty() {
                scope.push_dynamic(first.to_string(), value);
            } else {
                let root = roots.entry(first.to_string()).or_default();
                insert_nested(root, &rest, value);
            }
        }
        for (name, map) in roots {
            scope.push_dynamic(name, Dynamic::from(map));
        }
        scope
    }

    /// Scope for a zero-filled row, used to validate expressions at compile
    pub(crate) fn zero_scope(&self) -> Scope<'static> {
        self.build_scope(&vec![0.0; self.slots])
    }

    /// Serialize a committed row as a JSON object following the path tree
    pub(crate) fn row_json(&self, slots: &[f64]) -> serde_json::Value {
        let mut root = serde_json::Map::new();
        for def in &self.fields {
            let value = if def.id.len == 1 {
                json_scalar(def.kind, slots[def.id.slot])
            } else {
                serde_json::Value::Array(
                    (0..def.id.len)
                        .map(|i| json_scalar(def.kind, slots[def.id.slot + i]))
                        .collect(),
                )
            };
            let segments: Vec<&str> = def.path.split('.').collect();
            insert_json(&mut root, &segments, value);
        }
        serde_json::Value::Object(root)
    }

    fn field_dynamic(&self, def: &FieldDef, slots: &[f64]) -> Dynamic {
        if def.id.len == 1 {
            scalar_dynamic(def.kind, slots[def.id.slot])
        } else {
            let array: rhai::Array = (0..def.id.len)
                .map(|i| scalar_dynamic(def.kind, slots[def.id.slot + i]))
                .collect();
            Dynamic::from(array)
        }
    }
}

fn scalar_dynamic(kind: FieldKind, value: f64) -> Dynamic {
    if kind == FieldKind::Bool {
        Dynamic::from(value != 0.0)
    } else if kind.is_integer() {
        Dynamic::from(value as i64)
    } else {
        Dynamic::from(value)
    }
}

fn json_scalar(kind: FieldKind, value: f64) -> serde_json::Value {
    if kind == FieldKind::Bool {
        serde_json::Value::Bool(value != 0.0)
    } else if kind.is_integer() {
        serde_json::Value::from(value as i64)
    } else {
        serde_json::Value::from(value)
    }
}

fn insert_nested(map: &mut rhai::Map, segments: &[&str], value: Dynamic) {
    if segments.len() == 1 {
        map.insert(segments[0].into(), value);
        return;
    }
    let entry = map
        .entry(segments[0].into())
        .or_insert_with(|| Dynamic::from(rhai::Map::new()));
    if let Some(mut child) = entry.write_lock::<rhai::Map>() {
        insert_nested(&mut child, &segments[1..], value);
    }
}

fn insert_json(map: &mut serde_json::Map<String, serde_json::Value>, segments: &[&str], value: serde_json::Value) {
    if segments.len() == 1 {
        map.insert(segments[0].to_string(), value);
        return;
    }
    let entry = map
        .entry(segments[0].to_string())
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    if let Some(child) = entry.as_object_mut() {
        insert_json(child, &segments[1..], value);
    }
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(SortError::Schema("field path may not be empty".to_string()));
    }
    for segment in path.split('.') {
        let mut chars = segment.chars();
        let valid_head = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !valid_head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SortError::Schema(format!(
                "invalid field path `{}`: segment `{}` is not an identifier",
                path, segment
            )));
        }
    }
    Ok(())
}
