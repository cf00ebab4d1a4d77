use std::collections::BTreeMap;

use serde::Serialize;

use super::formset::FormSetSummary;

/// Key holding errors that belong to the record as a whole
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Validation messages keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.add(NON_FIELD_ERRORS, message);
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

/// Flat, human-readable list of every error in a form and its formsets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorList(Vec<String>);

impl ErrorList {
    pub fn new(form_errors: &FieldErrors, formsets: &[FormSetSummary]) -> Self {
        let mut messages = Vec::new();
        push_field_errors(&mut messages, None, form_errors);

        for formset in formsets {
            messages.extend(formset.non_form_errors.iter().cloned());
            for (index, errors) in formset.errors.iter().enumerate() {
                let prefix = format!("{}-{}", formset.prefix, index);
                push_field_errors(&mut messages, Some(&prefix), errors);
            }
        }
        Self(messages)
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn push_field_errors(messages: &mut Vec<String>, prefix: Option<&str>, errors: &FieldErrors) {
    for (field, field_messages) in errors.iter() {
        for message in field_messages {
            let line = match (prefix, field.as_str()) {
                (None, NON_FIELD_ERRORS) => message.clone(),
                (None, field) => format!("{}: {}", field, message),
                (Some(prefix), NON_FIELD_ERRORS) => format!("{}: {}", prefix, message),
                (Some(prefix), field) => format!("{}-{}: {}", prefix, field, message),
            };
            messages.push(line);
        }
    }
}
