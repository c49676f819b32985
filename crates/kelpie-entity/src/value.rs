//! Field values and their wire encoding.

use crate::def::FieldKind;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// In-memory value of a set field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
    Json(Value),
    Dir(BTreeMap<String, String>),
}

/// Error encoding a field for the store.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory fields fan out into child leaves; they have no
    /// single-leaf encoding.
    #[error("directory field cannot be encoded as a single leaf")]
    DirAsLeaf,
}

impl FieldValue {
    pub fn scalar(value: impl Into<String>) -> Self {
        FieldValue::Scalar(value.into())
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Encode the value into its single-leaf wire form.
    pub fn encode(&self) -> Result<String, EncodeError> {
        match self {
            FieldValue::Scalar(s) => Ok(s.clone()),
            FieldValue::List(items) => Ok(serde_json::to_string(items)?),
            FieldValue::Json(value) => Ok(serde_json::to_string(value)?),
            FieldValue::Dir(_) => Err(EncodeError::DirAsLeaf),
        }
    }

    /// Decode a stored leaf according to the field's declared kind.
    ///
    /// An empty stored value decodes to the empty container for `List`
    /// and `Json` fields.
    pub fn decode(kind: FieldKind, raw: &str) -> Result<Self, serde_json::Error> {
        match kind {
            FieldKind::Scalar => Ok(FieldValue::Scalar(raw.to_string())),
            FieldKind::List => {
                if raw.is_empty() {
                    Ok(FieldValue::List(Vec::new()))
                } else {
                    Ok(FieldValue::List(serde_json::from_str(raw)?))
                }
            }
            FieldKind::Json => {
                if raw.is_empty() {
                    Ok(FieldValue::Json(Value::Object(Default::default())))
                } else {
                    Ok(FieldValue::Json(serde_json::from_str(raw)?))
                }
            }
            // Dir leaves are read through read_dir, never decoded here.
            FieldKind::Dir => Ok(FieldValue::Dir(BTreeMap::new())),
        }
    }

    /// Representation used in the entity's hashing document.
    pub fn json_value(&self) -> Value {
        match self {
            FieldValue::Scalar(s) => Value::String(s.clone()),
            FieldValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            FieldValue::Json(value) => value.clone(),
            FieldValue::Dir(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        }
    }
}
