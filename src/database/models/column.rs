use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Live column metadata for one table column, as reported by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ColumnInfo {
    pub column_name: String,
    /// Database type name (Postgres `udt_name`, e.g. `int8`, `varchar`, `timestamptz`)
    pub data_type: String,
    pub is_nullable: bool,
    pub has_default: bool,
    pub max_length: Option<i32>,
    pub is_unique: bool,
    pub is_primary_key: bool,
    /// Referenced table when the column carries a single-column foreign key
    pub foreign_table: Option<String>,
}

impl ColumnInfo {
    pub fn new(column_name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
            is_nullable: false,
            has_default: false,
            max_length: None,
            is_unique: false,
            is_primary_key: false,
            foreign_table: None,
        }
    }

    pub fn primary_key(column_name: impl Into<String>) -> Self {
        Self {
            is_primary_key: true,
            is_unique: true,
            has_default: true,
            ..Self::new(column_name, "int8")
        }
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn max_length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.foreign_table = Some(table.into());
        self
    }
}
