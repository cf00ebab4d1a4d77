//! Persistence seam used by the updaters.
//!
//! Every mutating call happens inside a [`StoreTransaction`]; an
//! uncommitted transaction that is dropped is rolled back.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::manager::DatabaseError;
use super::models::{ChangeLogEntry, ColumnInfo};
use super::record::Record;
use crate::filter::FilterData;
use crate::schema::{ModelSchema, RelationSpec};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Live column metadata of a table; empty when the table does not exist
    async fn describe(&self, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    /// Records with the given ids that are inside `scope`, ordered by id
    async fn select(
        &mut self,
        schema: &ModelSchema,
        scope: &FilterData,
        ids: &[i64],
    ) -> Result<Vec<Record>, DatabaseError>;

    /// One set-based statement assigning `values` to every in-scope record of `ids`
    async fn update_many(
        &mut self,
        schema: &ModelSchema,
        scope: &FilterData,
        ids: &[i64],
        values: &Map<String, Value>,
    ) -> Result<u64, DatabaseError>;

    /// Persist the changed columns of a stored record
    async fn save(&mut self, schema: &ModelSchema, record: &Record) -> Result<(), DatabaseError>;

    /// Insert a new record, returning its id
    async fn insert(&mut self, schema: &ModelSchema, record: &Record) -> Result<i64, DatabaseError>;

    async fn delete(&mut self, schema: &ModelSchema, id: i64) -> Result<(), DatabaseError>;

    /// Child records whose `fk_column` points at `parent_id`, ordered by id
    async fn select_children(
        &mut self,
        schema: &ModelSchema,
        fk_column: &str,
        parent_id: i64,
    ) -> Result<Vec<Record>, DatabaseError>;

    /// Related ids of a many-to-many relation, ascending
    async fn relation_members(&mut self, relation: &RelationSpec, source_id: i64) -> Result<Vec<i64>, DatabaseError>;

    /// Replace the membership of a many-to-many relation with exactly `members`
    async fn set_relation(
        &mut self,
        relation: &RelationSpec,
        source_id: i64,
        members: &[i64],
    ) -> Result<(), DatabaseError>;

    /// Subset of `ids` present in `table`
    async fn existing_ids(&mut self, table: &str, ids: &[i64]) -> Result<Vec<i64>, DatabaseError>;

    async fn log_change(&mut self, entry: &ChangeLogEntry) -> Result<(), DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// Columns of `record` that differ from its loaded original and exist in `schema`
pub(crate) fn changed_columns(schema: &ModelSchema, record: &Record) -> Vec<(String, Value)> {
    record
        .changes()
        .into_iter()
        .filter(|change| schema.columns().any(|f| f.name == change.field))
        .map(|change| (change.field, change.new_value.unwrap_or(Value::Null)))
        .collect()
}
