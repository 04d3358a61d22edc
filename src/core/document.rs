//! Document model: JSON objects addressed by string field names.

use serde_json::{Map, Value};

use crate::error::{DriverError, Result};

/// One stored record: a mapping from field name to JSON value. Field order
/// is preserved so encoded documents round-trip deterministically.
pub type Document = Map<String, Value>;

/// Decode one row's document column.
pub(crate) fn decode_document(raw: &str) -> Result<Document> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(DriverError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Encode a document for storage.
pub(crate) fn encode_document(doc: &Document) -> String {
    serde_json::to_string(doc).expect("JSON maps always serialize")
}

/// Shallow merge: every field of `patch` overwrites the same field of
/// `base`; fields only present in `base` are kept.
pub(crate) fn merge(base: &Document, patch: &Document) -> Document {
    let mut merged = base.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// The document's `_id`, when present as a non-empty string.
pub(crate) fn doc_id(doc: &Document) -> Option<&str> {
    match doc.get("_id") {
        Some(Value::String(id)) if !id.is_empty() => Some(id),
        _ => None,
    }
}

/// Loose truthiness, used where the filter language accepts "a boolean"
/// but callers historically passed 1/0 or strings (`$exists`, projections).
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// A compiled projection: explicit excludes are removed first, then the
/// document is narrowed to the explicit includes. `_id` is re-added unless
/// it was explicitly excluded.
#[derive(Debug, Clone)]
pub(crate) struct Projection {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Projection {
    /// Split a field mask into include/exclude sets. Returns `None` for an
    /// absent or empty mask (no projection applied).
    pub(crate) fn compile(fields: Option<&Map<String, Value>>) -> Option<Projection> {
        let fields = fields?;
        if fields.is_empty() {
            return None;
        }

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for (field, flag) in fields {
            if truthy(flag) {
                include.push(field.clone());
            } else {
                exclude.push(field.clone());
            }
        }
        Some(Projection { include, exclude })
    }

    pub(crate) fn apply(&self, mut doc: Document) -> Document {
        let id = doc.get("_id").cloned();

        for field in &self.exclude {
            doc.remove(field);
        }

        if !self.include.is_empty() {
            doc.retain(|key, _| self.include.iter().any(|f| f == key));
        }

        if !self.exclude.iter().any(|f| f == "_id") {
            if let Some(id) = id {
                doc.insert("_id".to_string(), id);
            }
        }

        doc
    }
}
