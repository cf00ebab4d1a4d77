//! Binding of raw submitted strings to records.

pub mod errors;
pub mod field;
pub mod formset;
pub mod record_form;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::database::manager::DatabaseError;
use crate::observer::ObserverError;

pub use errors::{ErrorList, FieldErrors, NON_FIELD_ERRORS};
pub use formset::{FormSetSummary, InlineFormSet, InlineSpec};
pub use record_form::RecordForm;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("Invalid form payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Observer(#[from] ObserverError),
}

/// Submitted form data: every key maps to one or more raw strings.
/// Multi-valued keys carry many-to-many membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormData(BTreeMap<String, Vec<String>>);

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Replace all values under `key`
    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) -> &mut Self {
        self.0.insert(key.into(), values);
        self
    }

    /// Last submitted value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|values| values.last()).map(String::as_str)
    }

    pub fn get_list(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// All submitted values for `key` joined into one string; empty when absent
    pub fn raw_string(&self, key: &str) -> String {
        self.get_list(key).join(",")
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build from a JSON object. Arrays become repeated values; scalars are
    /// stringified the way a browser would submit them.
    pub fn from_json(value: &Value) -> Result<Self, FormError> {
        let object = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(object) => object,
            _ => return Err(FormError::InvalidPayload("form data must be an object".to_string())),
        };

        let mut data = Self::new();
        for (key, value) in object {
            let values = match value {
                Value::Array(items) => items.iter().map(raw_value).collect::<Result<Vec<_>, _>>()?,
                scalar => vec![raw_value(scalar)?],
            };
            data.set(key.clone(), values);
        }
        Ok(data)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = Self::new();
        for (key, value) in iter {
            data.insert(key, value);
        }
        data
    }
}

fn raw_value(value: &Value) -> Result<String, FormError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(if *b { "on" } else { "" }.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(FormError::InvalidPayload(format!("unsupported form value: {}", other))),
    }
}

/// Display form of a stored value, as it would be pre-filled in a form
pub fn value_to_raw(value: &Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        Value::String(_) => value.clone(),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(value_to_raw).collect()),
        Value::Object(_) => Value::String(value.to_string()),
    }
}

/// Checkbox-style truthiness used for flags such as `DELETE`
pub fn is_truthy(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("on" | "true" | "1" | "yes")
    )
}
