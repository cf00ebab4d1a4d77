//! Typed description of a registered record type.
//!
//! A [`ModelSchema`] is assembled per request from the store's live column
//! metadata plus the many-to-many relations declared at registration. It
//! answers the questions the updaters ask about a field: can it be edited,
//! is it unique, is it a multi-valued relation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::ColumnInfo;
use crate::database::record::SYSTEM_FIELDS;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Table not found or has no columns: {0}")]
    TableNotFound(String),

    #[error("Relation '{0}' collides with an existing column")]
    DuplicateField(String),
}

/// A many-to-many relation stored in a join table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSpec {
    /// Field name the relation is exposed under
    pub name: String,
    /// Table of the related records
    pub target: String,
    /// Join table holding the memberships
    pub through: String,
    /// Join table column pointing at the owning record
    pub source_column: String,
    /// Join table column pointing at the related record
    pub target_column: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Date,
    DateTime,
    Uuid,
    Json,
    ForeignKey { target: String },
    ManyToMany { target: String },
}

impl FieldKind {
    fn from_column(column: &ColumnInfo) -> Self {
        if let Some(target) = &column.foreign_table {
            return FieldKind::ForeignKey { target: target.clone() };
        }

        match column.data_type.to_ascii_lowercase().as_str() {
            "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "serial" | "bigserial" => {
                FieldKind::Integer
            }
            "float4" | "float8" | "real" | "double precision" => FieldKind::Float,
            "numeric" | "decimal" | "money" => FieldKind::Decimal,
            "bool" | "boolean" => FieldKind::Boolean,
            "date" => FieldKind::Date,
            "timestamp" | "timestamptz" => FieldKind::DateTime,
            "uuid" => FieldKind::Uuid,
            "json" | "jsonb" => FieldKind::Json,
            "text" | "varchar" | "bpchar" | "char" | "citext" | "name" => FieldKind::Text,
            other => {
                tracing::debug!("Column {} has unmapped type {}, treating as text", column.column_name, other);
                FieldKind::Text
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMeta {
    pub name: String,
    pub kind: FieldKind,
    /// Database type used when casting bound text parameters
    pub db_type: String,
    pub nullable: bool,
    pub has_default: bool,
    pub unique: bool,
    pub editable: bool,
    pub max_length: Option<usize>,
    #[serde(skip)]
    pub relation: Option<RelationSpec>,
}

impl FieldMeta {
    /// Empty input is rejected for required fields. Booleans always clean
    /// to a value, so they are never required.
    pub fn is_required(&self) -> bool {
        match &self.relation {
            Some(relation) => relation.required,
            None => !self.nullable && self.kind != FieldKind::Boolean,
        }
    }

    pub fn is_multivalued_relation(&self) -> bool {
        matches!(self.kind, FieldKind::ManyToMany { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSchema {
    pub table: String,
    fields: Vec<FieldMeta>,
}

impl ModelSchema {
    /// Build the schema from live column metadata and declared relations.
    /// `readonly_fields` are registration-level exclusions from editing.
    pub fn from_columns(
        table: impl Into<String>,
        columns: Vec<ColumnInfo>,
        relations: &[RelationSpec],
        readonly_fields: &[String],
    ) -> Result<Self, SchemaError> {
        let table = table.into();
        if columns.is_empty() {
            return Err(SchemaError::TableNotFound(table));
        }

        let mut fields: Vec<FieldMeta> = columns
            .into_iter()
            .map(|column| {
                let editable = !column.is_primary_key
                    && !SYSTEM_FIELDS.contains(&column.column_name.as_str())
                    && !readonly_fields.contains(&column.column_name);
                FieldMeta {
                    kind: FieldKind::from_column(&column),
                    db_type: column.data_type.clone(),
                    nullable: column.is_nullable,
                    has_default: column.has_default,
                    unique: column.is_unique || column.is_primary_key,
                    editable,
                    max_length: column.max_length.and_then(|l| usize::try_from(l).ok()),
                    relation: None,
                    name: column.column_name,
                }
            })
            .collect();

        for relation in relations {
            if fields.iter().any(|f| f.name == relation.name) {
                return Err(SchemaError::DuplicateField(relation.name.clone()));
            }
            fields.push(FieldMeta {
                name: relation.name.clone(),
                kind: FieldKind::ManyToMany { target: relation.target.clone() },
                db_type: "int8".to_string(),
                nullable: !relation.required,
                has_default: false,
                unique: false,
                editable: !readonly_fields.contains(&relation.name),
                max_length: None,
                relation: Some(relation.clone()),
            });
        }

        Ok(Self { table, fields })
    }

    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn is_unique(&self, name: &str) -> bool {
        self.field(name).map(|f| f.unique).unwrap_or(false)
    }

    pub fn is_multivalued_relation(&self, name: &str) -> bool {
        self.field(name).map(FieldMeta::is_multivalued_relation).unwrap_or(false)
    }

    pub fn is_editable(&self, name: &str) -> bool {
        self.field(name).map(|f| f.editable).unwrap_or(false)
    }

    /// Join-table description of a many-to-many field
    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.field(name).and_then(|f| f.relation.as_ref())
    }

    /// Fields that may be offered for mass update: editable and not unique.
    /// The same value assigned to many rows would violate a unique constraint.
    pub fn mass_update_fields(&self) -> Vec<&FieldMeta> {
        self.fields.iter().filter(|f| f.editable && !f.unique).collect()
    }

    pub fn mass_update_field_names(&self) -> Vec<String> {
        self.mass_update_fields().into_iter().map(|f| f.name.clone()).collect()
    }

    /// Editable unique fields, listed for display only
    pub fn unique_field_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.editable && f.unique)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Stored columns, without many-to-many relations
    pub fn columns(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().filter(|f| f.relation.is_none())
    }
}
