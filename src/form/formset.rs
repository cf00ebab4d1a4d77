//! Inline formsets: child records edited together with their parent.

use serde::{Deserialize, Serialize};

use super::errors::FieldErrors;
use super::field::INVALID_CHOICE;
use super::record_form::RecordForm;
use super::{is_truthy, FormData, FormError};
use crate::database::record::Record;
use crate::database::store::StoreTransaction;
use crate::observer::{ObserverPipeline, Operation};
use crate::schema::ModelSchema;

/// Upper bound on TOTAL_FORMS accepted from a submission
pub const MAX_NUM_FORMS: usize = 1000;

const MANAGEMENT_FORM_ERROR: &str = "ManagementForm data is missing or has been tampered with.";

/// Registration of a child table edited inline with its parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineSpec {
    pub table: String,
    /// Child column referencing the parent id
    pub fk_column: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_can_delete")]
    pub can_delete: bool,
    /// Editable child fields; all editable fields when absent
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

fn default_can_delete() -> bool {
    true
}

impl InlineSpec {
    pub fn new(table: impl Into<String>, fk_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fk_column: fk_column.into(),
            prefix: None,
            can_delete: true,
            fields: None,
        }
    }

    /// Form prefix; defaults to `{table}_set`
    pub fn prefix(&self) -> String {
        self.prefix.clone().unwrap_or_else(|| format!("{}_set", self.table))
    }
}

/// Serializable view of a formset for error reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormSetSummary {
    pub prefix: String,
    pub total_forms: usize,
    pub errors: Vec<FieldErrors>,
    pub non_form_errors: Vec<String>,
}

struct InlineForm<'a> {
    form: RecordForm<'a>,
    /// Id field error for initial forms pointing at a foreign child
    id_error: bool,
    deleted: bool,
    /// Extra form left blank
    skipped: bool,
}

pub struct InlineFormSet<'a> {
    spec: &'a InlineSpec,
    schema: &'a ModelSchema,
    data: &'a FormData,
    parent_id: Option<i64>,
    prefix: String,
    forms: Vec<InlineForm<'a>>,
    non_form_errors: Vec<String>,
    cleaned: bool,
}

impl<'a> InlineFormSet<'a> {
    pub fn new(spec: &'a InlineSpec, schema: &'a ModelSchema, parent: &Record, data: &'a FormData) -> Self {
        Self {
            spec,
            schema,
            data,
            parent_id: parent.id(),
            prefix: spec.prefix(),
            forms: Vec::new(),
            non_form_errors: Vec::new(),
            cleaned: false,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn child_fields(&self) -> Vec<String> {
        let names = match &self.spec.fields {
            Some(fields) => fields.clone(),
            None => self.schema.fields().iter().map(|f| f.name.clone()).collect(),
        };
        names
            .into_iter()
            .filter(|name| name != &self.spec.fk_column && self.schema.is_editable(name))
            .collect()
    }

    fn management_value(&self, key: &str) -> Option<usize> {
        self.data
            .get(&format!("{}-{}", self.prefix, key))
            .and_then(|v| v.trim().parse::<usize>().ok())
    }

    /// Bind every submitted form to its child record and validate it
    pub async fn full_clean(
        &mut self,
        tx: &mut dyn StoreTransaction,
        observers: &ObserverPipeline,
    ) -> Result<bool, FormError> {
        self.forms.clear();
        self.non_form_errors.clear();
        self.cleaned = true;

        let (Some(total), Some(initial)) = (self.management_value("TOTAL_FORMS"), self.management_value("INITIAL_FORMS"))
        else {
            self.non_form_errors.push(MANAGEMENT_FORM_ERROR.to_string());
            return Ok(false);
        };
        if total > MAX_NUM_FORMS {
            self.non_form_errors.push(format!("Please submit at most {} forms.", MAX_NUM_FORMS));
            return Ok(false);
        }

        let children = match self.parent_id {
            Some(parent_id) => tx.select_children(self.schema, &self.spec.fk_column, parent_id).await?,
            None => Vec::new(),
        };
        let fields = self.child_fields();

        for index in 0..total {
            let form_prefix = format!("{}-{}", self.prefix, index);
            let submitted_id = self
                .data
                .get(&format!("{}-id", form_prefix))
                .and_then(|v| v.trim().parse::<i64>().ok());

            let (instance, id_error) = if index < initial {
                match children.iter().find(|c| submitted_id.is_some() && c.id() == submitted_id) {
                    Some(child) => (child.clone(), false),
                    None => (Record::new(), true),
                }
            } else {
                let mut child = Record::new();
                if let Some(parent_id) = self.parent_id {
                    child.set(self.spec.fk_column.clone(), parent_id);
                }
                (child, false)
            };

            let form = RecordForm::new(self.schema, instance, self.data, &fields).with_prefix(form_prefix.clone());
            let deleted = self.spec.can_delete && is_truthy(self.data.get(&format!("{}-DELETE", form_prefix)));
            let skipped = index >= initial && !form.has_input();
            self.forms.push(InlineForm { form, id_error, deleted, skipped });
        }

        for inline in &mut self.forms {
            if inline.deleted || inline.skipped || inline.id_error {
                continue;
            }
            inline.form.full_clean(tx, observers).await?;
        }

        Ok(self.is_valid())
    }

    pub fn is_valid(&self) -> bool {
        self.cleaned
            && self.non_form_errors.is_empty()
            && self.forms.iter().all(|f| {
                !f.id_error && (f.deleted || f.skipped || f.form.is_valid())
            })
    }

    /// Write deletions, updates and inserts through the save hooks.
    /// Returns the number of child records touched.
    pub async fn save(&self, tx: &mut dyn StoreTransaction, observers: &ObserverPipeline) -> Result<usize, FormError> {
        if !self.is_valid() {
            return Err(FormError::InvalidPayload(format!("formset {} is not valid", self.prefix)));
        }

        let mut touched = 0;
        for inline in &self.forms {
            let stored = inline.form.instance().is_stored();
            if inline.deleted {
                if stored {
                    observers.save(tx, self.schema, inline.form.instance().clone(), Operation::Delete).await?;
                    touched += 1;
                }
                continue;
            }
            if inline.skipped {
                continue;
            }

            let mut record = inline.form.save();
            if let Some(parent_id) = self.parent_id {
                record.set(self.spec.fk_column.clone(), parent_id);
            }
            let operation = if stored { Operation::Update } else { Operation::Create };
            let saved = observers.save(tx, self.schema, record, operation).await?;
            if let Some(id) = saved.id() {
                inline.form.save_m2m(tx, id).await?;
            }
            touched += 1;
        }

        tracing::debug!("Saved formset {} ({} child records)", self.prefix, touched);
        Ok(touched)
    }

    pub fn summary(&self) -> FormSetSummary {
        let errors = self
            .forms
            .iter()
            .map(|inline| {
                let mut errors = inline.form.errors().clone();
                if inline.id_error {
                    errors.add("id", INVALID_CHOICE);
                }
                errors
            })
            .collect();

        FormSetSummary {
            prefix: self.prefix.clone(),
            total_forms: self.forms.len(),
            errors,
            non_form_errors: self.non_form_errors.clone(),
        }
    }
}
