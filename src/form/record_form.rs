use serde_json::{Map, Value};

use super::errors::FieldErrors;
use super::field::{self, cleaned_ids, invalid_list_choice, INVALID_CHOICE};
use super::{FormData, FormError};
use crate::database::record::Record;
use crate::database::store::StoreTransaction;
use crate::observer::{ObserverPipeline, Operation};
use crate::schema::{FieldKind, ModelSchema};

/// A record bound to submitted data, restricted to a field selection
pub struct RecordForm<'a> {
    schema: &'a ModelSchema,
    instance: Record,
    data: &'a FormData,
    fields: Vec<String>,
    prefix: Option<String>,
    cleaned_data: Map<String, Value>,
    errors: FieldErrors,
    cleaned: bool,
}

impl<'a> RecordForm<'a> {
    /// Unknown and non-editable names in `selection` are dropped
    pub fn new(schema: &'a ModelSchema, instance: Record, data: &'a FormData, selection: &[String]) -> Self {
        let fields = selection
            .iter()
            .filter(|name| {
                let editable = schema.is_editable(name);
                if !editable {
                    tracing::debug!("Form for {} ignores field '{}'", schema.table, name);
                }
                editable
            })
            .cloned()
            .collect();

        Self {
            schema,
            instance,
            data,
            fields,
            prefix: None,
            cleaned_data: Map::new(),
            errors: FieldErrors::new(),
            cleaned: false,
        }
    }

    /// Read values from `{prefix}-{field}` keys
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn key(&self, field: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}-{}", prefix, field),
            None => field.to_string(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn instance(&self) -> &Record {
        &self.instance
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn cleaned_data(&self) -> &Map<String, Value> {
        &self.cleaned_data
    }

    pub fn is_valid(&self) -> bool {
        self.cleaned && self.errors.is_empty()
    }

    /// Whether any selected field received non-blank input
    pub fn has_input(&self) -> bool {
        self.fields
            .iter()
            .any(|f| self.data.get_list(&self.key(f)).iter().any(|v| !v.trim().is_empty()))
    }

    /// Clean every selected field, check related ids exist, then run the
    /// model-validation observers against the record with the cleaned data
    /// applied. Returns whether the form is valid.
    pub async fn full_clean(
        &mut self,
        tx: &mut dyn StoreTransaction,
        observers: &ObserverPipeline,
    ) -> Result<bool, FormError> {
        self.cleaned_data.clear();
        self.errors = FieldErrors::new();

        for name in &self.fields {
            let Some(meta) = self.schema.field(name) else { continue };
            let raw = self.data.get_list(&self.key(name));
            match field::clean(meta, raw) {
                Ok(value) => {
                    self.cleaned_data.insert(name.clone(), value);
                }
                Err(message) => self.errors.add(name.clone(), message),
            }
        }

        self.check_related_ids(tx).await?;

        if self.errors.is_empty() {
            let operation = if self.instance.is_stored() { Operation::Update } else { Operation::Create };
            let candidate = self.save();
            for error in observers.validate(self.schema, &candidate, operation).await {
                match error.field_name() {
                    Some(field) if self.fields.iter().any(|f| f == field) => self.errors.add(field, error.message()),
                    _ => self.errors.add_non_field(error.message()),
                }
            }
        }

        self.cleaned = true;
        Ok(self.errors.is_empty())
    }

    async fn check_related_ids(&mut self, tx: &mut dyn StoreTransaction) -> Result<(), FormError> {
        for (name, value) in &self.cleaned_data {
            let Some(meta) = self.schema.field(name) else { continue };
            match &meta.kind {
                FieldKind::ForeignKey { target } => {
                    let Some(id) = value.as_i64() else { continue };
                    if tx.existing_ids(target, &[id]).await?.is_empty() {
                        self.errors.add(name.clone(), INVALID_CHOICE);
                    }
                }
                FieldKind::ManyToMany { target } => {
                    let ids = cleaned_ids(value);
                    if ids.is_empty() {
                        continue;
                    }
                    let existing = tx.existing_ids(target, &ids).await?;
                    if let Some(missing) = ids.iter().find(|id| !existing.contains(id)) {
                        self.errors.add(name.clone(), invalid_list_choice(&missing.to_string()));
                    }
                }
                _ => {}
            }
        }
        for name in self.errors.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>() {
            self.cleaned_data.remove(&name);
        }
        Ok(())
    }

    /// The instance with the cleaned scalar values applied, not yet written.
    /// Many-to-many values are written separately by [`RecordForm::save_m2m`].
    pub fn save(&self) -> Record {
        let mut record = self.instance.clone();
        record.apply_changes(self.scalar_data());
        record
    }

    /// Cleaned values of single-column fields
    pub fn scalar_data(&self) -> Map<String, Value> {
        self.cleaned_data
            .iter()
            .filter(|(name, _)| !self.schema.is_multivalued_relation(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Cleaned memberships of many-to-many fields
    pub fn m2m_data(&self) -> Vec<(String, Vec<i64>)> {
        self.cleaned_data
            .iter()
            .filter(|(name, _)| self.schema.is_multivalued_relation(name))
            .map(|(name, value)| (name.clone(), cleaned_ids(value)))
            .collect()
    }

    /// Replace the memberships of every cleaned many-to-many field of `record_id`
    pub async fn save_m2m(&self, tx: &mut dyn StoreTransaction, record_id: i64) -> Result<(), FormError> {
        for (name, members) in self.m2m_data() {
            if let Some(relation) = self.schema.relation(&name) {
                tx.set_relation(relation, record_id, &members).await?;
            }
        }
        Ok(())
    }

    /// Names of the selected fields whose cleaned value differs from the instance
    pub fn changed_fields(&self) -> Vec<String> {
        self.cleaned_data
            .iter()
            .filter(|(name, value)| {
                self.schema.is_multivalued_relation(name) || self.instance.get(name) != Some(*value)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}
