use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Primary key column shared by every registered table
pub const PRIMARY_KEY: &str = "id";

/// System fields that can only be set by observers, never by submitted form data
pub const SYSTEM_FIELDS: &[&str] = &["id", "created_at", "updated_at", "trashed_at", "deleted_at"];

/// Field change information for diff tracking
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub change_type: ChangeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,    // Field didn't exist in original
    Modified, // Field existed but value changed
    Removed,  // Field was explicitly removed
}

/// A dynamic record that can represent any database row with change tracking
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// Original state from database (None for records not yet stored)
    original: Option<Map<String, Value>>,
    /// Current field values
    fields: Map<String, Value>,
    /// Fields that have been modified since original
    modified_fields: BTreeSet<String>,
}

impl Record {
    /// Create a new empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Create record from SQL row data (allows system fields)
    pub fn from_sql_data(data: Map<String, Value>) -> Self {
        Self {
            original: Some(data.clone()),
            fields: data,
            modified_fields: BTreeSet::new(),
        }
    }

    /// Get field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set field value with automatic change tracking
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();

        // Prevent setting system fields directly (observers can use set_system_field)
        if SYSTEM_FIELDS.contains(&key.as_str()) {
            tracing::warn!("Attempted to set system field '{}' - ignoring", key);
            return self;
        }

        self.modified_fields.insert(key.clone());
        self.fields.insert(key, value.into());
        self
    }

    /// Set system field (for observers and the store only)
    pub fn set_system_field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        self.modified_fields.insert(key.clone());
        self.fields.insert(key, value.into());
        self
    }

    /// Apply multiple changes at once
    pub fn apply_changes<I>(&mut self, changes: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (key, value) in changes {
            self.set(key, value);
        }
        self
    }

    /// Get record ID
    pub fn id(&self) -> Option<i64> {
        match self.get(PRIMARY_KEY)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Set record ID (system field)
    pub fn set_id(&mut self, id: i64) -> &mut Self {
        self.set_system_field(PRIMARY_KEY, Value::from(id))
    }

    /// Touch updated_at field (for observers)
    pub fn touch_updated_at(&mut self) -> &mut Self {
        self.set_system_field("updated_at", Value::String(chrono::Utc::now().to_rfc3339()))
    }

    // ========================================
    // Change tracking
    // ========================================

    /// Check if a specific field has been changed
    pub fn changed(&self, key: &str) -> bool {
        match (&self.original, self.fields.get(key)) {
            (Some(original), Some(current)) => original.get(key) != Some(current),
            (Some(original), None) => original.contains_key(key),
            (None, Some(_)) => true, // New field on create
            (None, None) => false,
        }
    }

    /// Check if record has any changes
    pub fn has_changes(&self) -> bool {
        self.original.is_none() || self.modified_fields.iter().any(|f| self.changed(f))
    }

    /// Whether the record was loaded from the store
    pub fn is_stored(&self) -> bool {
        self.original.is_some()
    }

    /// Get original data (before changes)
    pub fn original(&self) -> Option<&Map<String, Value>> {
        self.original.as_ref()
    }

    /// Get detailed changes for each field, ordered by field name
    pub fn changes(&self) -> Vec<FieldChange> {
        let Some(original) = &self.original else {
            return self
                .fields
                .iter()
                .map(|(field, value)| FieldChange {
                    field: field.clone(),
                    old_value: None,
                    new_value: Some(value.clone()),
                    change_type: ChangeType::Added,
                })
                .collect();
        };

        self.modified_fields
            .iter()
            .filter_map(|field| {
                let old_value = original.get(field).cloned();
                let new_value = self.fields.get(field).cloned();
                let change_type = match (&old_value, &new_value) {
                    (None, Some(_)) => ChangeType::Added,
                    (Some(_), None) => ChangeType::Removed,
                    (Some(old), Some(new)) if old != new => ChangeType::Modified,
                    _ => return None, // No actual change
                };
                Some(FieldChange { field: field.clone(), old_value, new_value, change_type })
            })
            .collect()
    }

    /// Names of the fields with an actual change
    pub fn changed_fields(&self) -> Vec<String> {
        self.changes().into_iter().map(|c| c.field).collect()
    }

    /// Mark the current state as persisted
    pub fn mark_saved(&mut self) -> &mut Self {
        self.original = Some(self.fields.clone());
        self.modified_fields.clear();
        self
    }

    // ========================================
    // Serialization
    // ========================================

    /// Convert to JSON Value (all fields)
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Borrow all current fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_sql_data(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.to_json()
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Record(id: {:?}, fields: {}, changed: {})",
            self.id(),
            self.fields.len(),
            self.has_changes()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loaded() -> Record {
        Record::from(json!({ "id": 7, "name": "old", "price": 3 }).as_object().cloned().unwrap())
    }

    #[test]
    fn tracks_only_real_changes() {
        let mut record = loaded();
        record.set("name", "old").set("price", 4);

        assert!(!record.changed("name"));
        assert!(record.changed("price"));
        assert_eq!(record.changed_fields(), vec!["price".to_string()]);
        assert!(record.has_changes());
    }

    #[test]
    fn system_fields_are_ignored_by_set() {
        let mut record = loaded();
        record.set("id", 99);
        assert_eq!(record.id(), Some(7));

        record.set_system_field("updated_at", "2024-01-01T00:00:00Z");
        assert_eq!(record.changed_fields(), vec!["updated_at".to_string()]);
    }

    #[test]
    fn mark_saved_resets_tracking() {
        let mut record = loaded();
        record.set("name", "new");
        record.mark_saved();
        assert!(!record.has_changes());
        assert_eq!(record.original().and_then(|o| o.get("name")), Some(&json!("new")));
    }

    #[test]
    fn new_records_report_all_fields_added() {
        let mut record = Record::new();
        record.set("name", "child");
        let changes = record.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Added);
        assert!(!record.is_stored());
    }
}
