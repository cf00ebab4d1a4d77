//! In-process record store.
//!
//! Backs the demo binary and the test suites. Transactions work on a
//! snapshot of the whole state that replaces the shared state on commit.
//! Every statement is appended to a journal that survives rollbacks, so
//! tests can count the statements an updater issued.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::manager::DatabaseError;
use super::models::{ChangeLogEntry, ColumnInfo};
use super::record::{Record, PRIMARY_KEY};
use super::store::{changed_columns, RecordStore, StoreTransaction};
use crate::filter::{FilterData, FilterWhere};
use crate::schema::{ModelSchema, RelationSpec};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select { table: String, ids: usize },
    UpdateMany { table: String, ids: Vec<i64>, fields: Vec<String> },
    Save { table: String, id: i64 },
    Insert { table: String, id: i64 },
    Delete { table: String, id: i64 },
    SetRelation { through: String, source_id: i64 },
    LogChange { table: String, object_id: i64 },
    Commit,
    Rollback,
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    rows: BTreeMap<i64, Map<String, Value>>,
}

impl MemoryTable {
    fn next_id(&self) -> i64 {
        self.rows.keys().next_back().map(|id| id + 1).unwrap_or(1)
    }

    /// Not-null and single-column unique constraints
    fn check_constraints(&self, table: &str) -> Result<(), DatabaseError> {
        for column in &self.columns {
            if !column.is_nullable && !column.has_default {
                if let Some((id, _)) = self
                    .rows
                    .iter()
                    .find(|(_, row)| row.get(&column.column_name).map(Value::is_null).unwrap_or(true))
                {
                    return Err(DatabaseError::QueryError(format!(
                        "null value in column \"{}\" of relation \"{}\" violates not-null constraint (id {})",
                        column.column_name, table, id
                    )));
                }
            }

            if column.is_unique && !column.is_primary_key {
                let mut seen = BTreeSet::new();
                for row in self.rows.values() {
                    match row.get(&column.column_name) {
                        None | Some(Value::Null) => {}
                        Some(value) => {
                            if !seen.insert(value.to_string()) {
                                return Err(DatabaseError::QueryError(format!(
                                    "duplicate key value violates unique constraint on \"{}\".\"{}\"",
                                    table, column.column_name
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    /// Join table name -> (source id, target id) pairs
    relations: BTreeMap<String, BTreeSet<(i64, i64)>>,
    change_log: Vec<ChangeLogEntry>,
}

impl MemoryState {
    fn table(&self, name: &str) -> Result<&MemoryTable, DatabaseError> {
        self.tables
            .get(name)
            .ok_or_else(|| DatabaseError::NotFound(format!("relation \"{}\" does not exist", name)))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, DatabaseError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DatabaseError::NotFound(format!("relation \"{}\" does not exist", name)))
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MemoryState>,
    journal: Mutex<Vec<Statement>>,
    update_many_calls: AtomicUsize,
    /// 1-based update_many call that fails; 0 disables injection
    fail_update_many_at: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    shared: Arc<Shared>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // Seeding
    // ========================================

    pub async fn create_table(&self, table: &str, columns: Vec<ColumnInfo>) {
        let mut state = self.shared.state.lock().await;
        state.tables.insert(table.to_string(), MemoryTable { columns, rows: BTreeMap::new() });
    }

    /// Insert a row outside any transaction, returning its id
    pub async fn insert_row(&self, table: &str, row: Value) -> Result<i64, DatabaseError> {
        let mut state = self.shared.state.lock().await;
        let table_state = state.table_mut(table)?;
        let mut row = match row {
            Value::Object(map) => map,
            _ => return Err(DatabaseError::QueryError("row must be an object".to_string())),
        };

        let id = match row.get(PRIMARY_KEY).and_then(Value::as_i64) {
            Some(id) => id,
            None => table_state.next_id(),
        };
        row.insert(PRIMARY_KEY.to_string(), Value::from(id));
        for column in &table_state.columns {
            row.entry(column.column_name.clone()).or_insert(Value::Null);
        }
        table_state.rows.insert(id, row);
        Ok(id)
    }

    pub async fn set_members(&self, through: &str, source_id: i64, members: &[i64]) {
        let mut state = self.shared.state.lock().await;
        let pairs = state.relations.entry(through.to_string()).or_default();
        pairs.retain(|(source, _)| *source != source_id);
        pairs.extend(members.iter().map(|member| (source_id, *member)));
    }

    /// Make the `n`th update_many call (1-based, counted from now) fail
    pub fn fail_update_many_at(&self, n: usize) {
        self.shared.update_many_calls.store(0, Ordering::SeqCst);
        self.shared.fail_update_many_at.store(n, Ordering::SeqCst);
    }

    // ========================================
    // Inspection
    // ========================================

    pub async fn row(&self, table: &str, id: i64) -> Option<Map<String, Value>> {
        let state = self.shared.state.lock().await;
        state.tables.get(table).and_then(|t| t.rows.get(&id).cloned())
    }

    pub async fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        let state = self.shared.state.lock().await;
        state
            .tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn members(&self, through: &str, source_id: i64) -> Vec<i64> {
        let state = self.shared.state.lock().await;
        state
            .relations
            .get(through)
            .map(|pairs| pairs.iter().filter(|(s, _)| *s == source_id).map(|(_, t)| *t).collect())
            .unwrap_or_default()
    }

    pub async fn change_log(&self) -> Vec<ChangeLogEntry> {
        self.shared.state.lock().await.change_log.clone()
    }

    pub async fn journal(&self) -> Vec<Statement> {
        self.shared.journal.lock().await.clone()
    }

    /// Number of set-based update statements issued against `table`
    pub async fn update_many_count(&self, table: &str) -> usize {
        self.shared
            .journal
            .lock()
            .await
            .iter()
            .filter(|s| matches!(s, Statement::UpdateMany { table: t, .. } if t == table))
            .count()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn describe(&self, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let state = self.shared.state.lock().await;
        Ok(state.tables.get(table).map(|t| t.columns.clone()).unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DatabaseError> {
        let working = self.shared.state.lock().await.clone();
        Ok(Box::new(MemoryTransaction { shared: self.shared.clone(), working }))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

pub struct MemoryTransaction {
    shared: Arc<Shared>,
    working: MemoryState,
}

impl MemoryTransaction {
    async fn journal(&self, statement: Statement) {
        tracing::trace!("memory store: {:?}", statement);
        self.shared.journal.lock().await.push(statement);
    }

    fn in_scope(scope: &FilterData, row: &Map<String, Value>) -> Result<bool, DatabaseError> {
        match &scope.where_clause {
            None => Ok(true),
            Some(where_clause) => {
                FilterWhere::matches(where_clause, row).map_err(|e| DatabaseError::QueryError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn select(
        &mut self,
        schema: &ModelSchema,
        scope: &FilterData,
        ids: &[i64],
    ) -> Result<Vec<Record>, DatabaseError> {
        let table = self.working.table(&schema.table)?;
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();

        let mut records = Vec::new();
        for (id, row) in &table.rows {
            if wanted.contains(id) && Self::in_scope(scope, row)? {
                records.push(Record::from_sql_data(row.clone()));
            }
        }

        self.journal(Statement::Select { table: schema.table.clone(), ids: ids.len() }).await;
        Ok(records)
    }

    async fn update_many(
        &mut self,
        schema: &ModelSchema,
        scope: &FilterData,
        ids: &[i64],
        values: &Map<String, Value>,
    ) -> Result<u64, DatabaseError> {
        self.journal(Statement::UpdateMany {
            table: schema.table.clone(),
            ids: ids.to_vec(),
            fields: values.keys().cloned().collect(),
        })
        .await;

        let call = self.shared.update_many_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.shared.fail_update_many_at.load(Ordering::SeqCst) == call {
            return Err(DatabaseError::QueryError(format!("injected failure on update statement {}", call)));
        }

        let table = self.working.table_mut(&schema.table)?;
        let mut affected = 0;
        for id in ids {
            let Some(row) = table.rows.get_mut(id) else { continue };
            if !Self::in_scope(scope, row)? {
                continue;
            }
            for (field, value) in values {
                row.insert(field.clone(), value.clone());
            }
            affected += 1;
        }
        table.check_constraints(&schema.table)?;
        Ok(affected)
    }

    async fn save(&mut self, schema: &ModelSchema, record: &Record) -> Result<(), DatabaseError> {
        let id = record
            .id()
            .ok_or_else(|| DatabaseError::QueryError("save requires a record id".to_string()))?;
        let changes = changed_columns(schema, record);

        let table = self.working.table_mut(&schema.table)?;
        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("{} id {}", schema.table, id)))?;
        for (field, value) in changes {
            row.insert(field, value);
        }
        table.check_constraints(&schema.table)?;

        self.journal(Statement::Save { table: schema.table.clone(), id }).await;
        Ok(())
    }

    async fn insert(&mut self, schema: &ModelSchema, record: &Record) -> Result<i64, DatabaseError> {
        let table = self.working.table_mut(&schema.table)?;
        let id = table.next_id();

        let mut row = Map::new();
        for column in &table.columns {
            let value = record.get(&column.column_name).cloned().unwrap_or(Value::Null);
            row.insert(column.column_name.clone(), value);
        }
        row.insert(PRIMARY_KEY.to_string(), Value::from(id));
        table.rows.insert(id, row);
        table.check_constraints(&schema.table)?;

        self.journal(Statement::Insert { table: schema.table.clone(), id }).await;
        Ok(id)
    }

    async fn delete(&mut self, schema: &ModelSchema, id: i64) -> Result<(), DatabaseError> {
        let table = self.working.table_mut(&schema.table)?;
        table.rows.remove(&id);
        self.journal(Statement::Delete { table: schema.table.clone(), id }).await;
        Ok(())
    }

    async fn select_children(
        &mut self,
        schema: &ModelSchema,
        fk_column: &str,
        parent_id: i64,
    ) -> Result<Vec<Record>, DatabaseError> {
        let table = self.working.table(&schema.table)?;
        let parent = Value::from(parent_id);
        Ok(table
            .rows
            .values()
            .filter(|row| row.get(fk_column) == Some(&parent))
            .cloned()
            .map(Record::from_sql_data)
            .collect())
    }

    async fn relation_members(&mut self, relation: &RelationSpec, source_id: i64) -> Result<Vec<i64>, DatabaseError> {
        Ok(self
            .working
            .relations
            .get(&relation.through)
            .map(|pairs| pairs.iter().filter(|(s, _)| *s == source_id).map(|(_, t)| *t).collect())
            .unwrap_or_default())
    }

    async fn set_relation(
        &mut self,
        relation: &RelationSpec,
        source_id: i64,
        members: &[i64],
    ) -> Result<(), DatabaseError> {
        let target = self.working.table(&relation.target)?;
        if let Some(missing) = members.iter().find(|m| !target.rows.contains_key(m)) {
            return Err(DatabaseError::QueryError(format!(
                "insert on \"{}\" violates foreign key: {} not present in \"{}\"",
                relation.through, missing, relation.target
            )));
        }

        let pairs = self.working.relations.entry(relation.through.clone()).or_default();
        pairs.retain(|(source, _)| *source != source_id);
        pairs.extend(members.iter().map(|member| (source_id, *member)));

        self.journal(Statement::SetRelation { through: relation.through.clone(), source_id }).await;
        Ok(())
    }

    async fn existing_ids(&mut self, table: &str, ids: &[i64]) -> Result<Vec<i64>, DatabaseError> {
        let table = self.working.table(table)?;
        Ok(ids.iter().copied().filter(|id| table.rows.contains_key(id)).collect())
    }

    async fn log_change(&mut self, entry: &ChangeLogEntry) -> Result<(), DatabaseError> {
        self.working.change_log.push(entry.clone());
        self.journal(Statement::LogChange { table: entry.table_name.clone(), object_id: entry.object_id }).await;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let MemoryTransaction { shared, working } = *self;
        *shared.state.lock().await = working;
        shared.journal.lock().await.push(Statement::Commit);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.journal(Statement::Rollback).await;
        Ok(())
    }
}
