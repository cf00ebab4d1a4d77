//! PostgreSQL record store on sqlx.
//!
//! Values are bound as text and cast to the column's database type, so a
//! single binding path serves every column kind. Rows are read back through
//! `row_to_json` to keep the dynamic record shape.

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::postgres::PgArguments;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::manager::{DatabaseError, DatabaseManager};
use super::models::{ChangeLogEntry, ColumnInfo};
use super::record::Record;
use super::store::{changed_columns, RecordStore, StoreTransaction};
use crate::config::config;
use crate::filter::{FilterData, FilterWhere, SqlResult};
use crate::schema::{ModelSchema, RelationSpec};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

const DESCRIBE_SQL: &str = r#"
SELECT
    c.column_name::text AS column_name,
    c.udt_name::text AS data_type,
    (c.is_nullable = 'YES') AS is_nullable,
    (c.column_default IS NOT NULL OR c.is_identity = 'YES') AS has_default,
    c.character_maximum_length::int4 AS max_length,
    EXISTS (
        SELECT 1
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema
        WHERE tc.table_schema = c.table_schema
          AND tc.table_name = c.table_name
          AND tc.constraint_type IN ('UNIQUE', 'PRIMARY KEY')
          AND kcu.column_name = c.column_name
          AND (
              SELECT count(*)
              FROM information_schema.key_column_usage k2
              WHERE k2.constraint_name = tc.constraint_name AND k2.table_schema = tc.table_schema
          ) = 1
    ) AS is_unique,
    EXISTS (
        SELECT 1
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema
        WHERE tc.table_schema = c.table_schema
          AND tc.table_name = c.table_name
          AND tc.constraint_type = 'PRIMARY KEY'
          AND kcu.column_name = c.column_name
    ) AS is_primary_key,
    (
        SELECT ccu.table_name::text
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema
        JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_name = tc.constraint_name AND ccu.constraint_schema = tc.constraint_schema
        WHERE tc.table_schema = c.table_schema
          AND tc.table_name = c.table_name
          AND tc.constraint_type = 'FOREIGN KEY'
          AND kcu.column_name = c.column_name
        LIMIT 1
    ) AS foreign_table
FROM information_schema.columns c
WHERE c.table_schema = current_schema() AND c.table_name = $1
ORDER BY c.ordinal_position
"#;

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
    change_log_table: Option<String>,
}

impl PgRecordStore {
    pub fn new(pool: PgPool, change_log_table: Option<String>) -> Self {
        Self { pool, change_log_table }
    }

    /// Store on the shared pool, configured from the environment
    pub async fn connect() -> Result<Self, DatabaseError> {
        let pool = DatabaseManager::pool().await?;
        let change_log_table = config().database.change_log_table.clone();
        if let Some(table) = &change_log_table {
            DatabaseManager::validate_identifier(table)?;
        }
        Ok(Self::new(pool, change_log_table))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn describe(&self, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let columns = sqlx::query_as::<_, ColumnInfo>(DESCRIBE_SQL)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        tracing::debug!("Described {} ({} columns)", table, columns.len());
        Ok(columns)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx, change_log_table: self.change_log_table.clone() }))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    change_log_table: Option<String>,
}

impl PgTransaction {
    /// Render the queryset where clause with placeholders after `param_index`
    fn scope_sql(scope: &FilterData, param_index: usize) -> Result<SqlResult, DatabaseError> {
        match &scope.where_clause {
            None => Ok(SqlResult { query: "1=1".to_string(), params: vec![] }),
            Some(where_clause) => FilterWhere::generate(where_clause, param_index)
                .map_err(|e| DatabaseError::QueryError(e.to_string())),
        }
    }

    async fn fetch_records(&mut self, query: PgQuery<'_>) -> Result<Vec<Record>, DatabaseError> {
        let mut records = Vec::new();
        let mut rows = query.fetch(&mut *self.tx);
        while let Some(row) = rows.try_next().await? {
            match row.try_get::<Value, _>("data")? {
                Value::Object(map) => records.push(Record::from_sql_data(map)),
                other => {
                    return Err(DatabaseError::QueryError(format!("unexpected row shape: {}", other)));
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn select(
        &mut self,
        schema: &ModelSchema,
        scope: &FilterData,
        ids: &[i64],
    ) -> Result<Vec<Record>, DatabaseError> {
        let table = quoted(&schema.table)?;
        let scope_sql = Self::scope_sql(scope, 1)?;
        let sql = format!(
            "SELECT row_to_json(t)::jsonb AS data FROM {} t WHERE t.id = ANY($1) AND ({}) ORDER BY t.id",
            table, scope_sql.query
        );

        log_sql(&sql);
        let mut query = sqlx::query(&sql).bind(ids.to_vec());
        for param in &scope_sql.params {
            query = bind_filter_param(query, param);
        }
        self.fetch_records(query).await
    }

    async fn update_many(
        &mut self,
        schema: &ModelSchema,
        scope: &FilterData,
        ids: &[i64],
        values: &Map<String, Value>,
    ) -> Result<u64, DatabaseError> {
        let table = quoted(&schema.table)?;

        let mut assignments = Vec::with_capacity(values.len());
        for (index, field) in values.keys().enumerate() {
            assignments.push(format!("{} = {}", quoted(field)?, cast_param(schema, field, index + 1)?));
        }
        if assignments.is_empty() {
            return Ok(0);
        }

        let ids_param = values.len() + 1;
        let scope_sql = Self::scope_sql(scope, ids_param)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ANY(${}) AND ({})",
            table,
            assignments.join(", "),
            ids_param,
            scope_sql.query
        );

        log_sql(&sql);
        let mut query = sqlx::query(&sql);
        for value in values.values() {
            query = query.bind(value_to_text(value));
        }
        query = query.bind(ids.to_vec());
        for param in &scope_sql.params {
            query = bind_filter_param(query, param);
        }

        let result = query.execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn save(&mut self, schema: &ModelSchema, record: &Record) -> Result<(), DatabaseError> {
        let id = record
            .id()
            .ok_or_else(|| DatabaseError::QueryError("save requires a record id".to_string()))?;
        let changes = changed_columns(schema, record);
        if changes.is_empty() {
            tracing::debug!("No changes for {} id {}, skipping save", schema.table, id);
            return Ok(());
        }

        let mut assignments = Vec::with_capacity(changes.len());
        for (index, (field, _)) in changes.iter().enumerate() {
            assignments.push(format!("{} = {}", quoted(field)?, cast_param(schema, field, index + 1)?));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ${}",
            quoted(&schema.table)?,
            assignments.join(", "),
            changes.len() + 1
        );

        log_sql(&sql);
        let mut query = sqlx::query(&sql);
        for (_, value) in &changes {
            query = query.bind(value_to_text(value));
        }
        let result = query.bind(id).execute(&mut *self.tx).await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("{} id {}", schema.table, id)));
        }
        Ok(())
    }

    async fn insert(&mut self, schema: &ModelSchema, record: &Record) -> Result<i64, DatabaseError> {
        let table = quoted(&schema.table)?;
        let values: Vec<(&str, &Value)> = schema
            .columns()
            .filter(|f| f.editable)
            .filter_map(|f| record.get(&f.name).map(|v| (f.name.as_str(), v)))
            .collect();

        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING id::int8", table)
        } else {
            let mut columns = Vec::with_capacity(values.len());
            let mut placeholders = Vec::with_capacity(values.len());
            for (index, (field, _)) in values.iter().enumerate() {
                columns.push(quoted(field)?);
                placeholders.push(cast_param(schema, field, index + 1)?);
            }
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING id::int8",
                table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        log_sql(&sql);
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for (_, value) in &values {
            query = query.bind(value_to_text(value));
        }
        Ok(query.fetch_one(&mut *self.tx).await?)
    }

    async fn delete(&mut self, schema: &ModelSchema, id: i64) -> Result<(), DatabaseError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", quoted(&schema.table)?);
        sqlx::query(&sql).bind(id).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn select_children(
        &mut self,
        schema: &ModelSchema,
        fk_column: &str,
        parent_id: i64,
    ) -> Result<Vec<Record>, DatabaseError> {
        let sql = format!(
            "SELECT row_to_json(t)::jsonb AS data FROM {} t WHERE t.{}::int8 = $1 ORDER BY t.id",
            quoted(&schema.table)?,
            quoted(fk_column)?
        );
        self.fetch_records(sqlx::query(&sql).bind(parent_id)).await
    }

    async fn relation_members(&mut self, relation: &RelationSpec, source_id: i64) -> Result<Vec<i64>, DatabaseError> {
        let sql = format!(
            "SELECT {target}::int8 FROM {through} WHERE {source} = $1 ORDER BY 1",
            target = quoted(&relation.target_column)?,
            through = quoted(&relation.through)?,
            source = quoted(&relation.source_column)?,
        );
        Ok(sqlx::query_scalar::<_, i64>(&sql)
            .bind(source_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn set_relation(
        &mut self,
        relation: &RelationSpec,
        source_id: i64,
        members: &[i64],
    ) -> Result<(), DatabaseError> {
        let through = quoted(&relation.through)?;
        let source = quoted(&relation.source_column)?;
        let target = quoted(&relation.target_column)?;

        let delete_sql = format!(
            "DELETE FROM {through} WHERE {source} = $1 AND NOT ({target} = ANY($2))",
        );
        sqlx::query(&delete_sql)
            .bind(source_id)
            .bind(members.to_vec())
            .execute(&mut *self.tx)
            .await?;

        let insert_sql = format!(
            "INSERT INTO {through} ({source}, {target}) \
             SELECT $1, m FROM unnest($2::int8[]) AS m \
             WHERE NOT EXISTS (SELECT 1 FROM {through} WHERE {source} = $1 AND {target} = m)",
        );
        sqlx::query(&insert_sql)
            .bind(source_id)
            .bind(members.to_vec())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn existing_ids(&mut self, table: &str, ids: &[i64]) -> Result<Vec<i64>, DatabaseError> {
        let sql = format!("SELECT id::int8 FROM {} WHERE id = ANY($1) ORDER BY id", quoted(table)?);
        Ok(sqlx::query_scalar::<_, i64>(&sql)
            .bind(ids.to_vec())
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn log_change(&mut self, entry: &ChangeLogEntry) -> Result<(), DatabaseError> {
        let Some(table) = &self.change_log_table else {
            tracing::info!(
                "Change on {} id {} by {}: {}",
                entry.table_name,
                entry.object_id,
                entry.user_name,
                entry.change_message
            );
            return Ok(());
        };

        let sql = format!(
            "INSERT INTO {} (table_name, object_id, user_name, change_message, action_time) VALUES ($1, $2, $3, $4, $5)",
            quoted(table)?
        );
        sqlx::query(&sql)
            .bind(&entry.table_name)
            .bind(entry.object_id)
            .bind(&entry.user_name)
            .bind(&entry.change_message)
            .bind(entry.action_time)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn log_sql(sql: &str) {
    if config().database.enable_query_logging {
        tracing::debug!(target: "sql", "{}", sql);
    }
}

fn quoted(identifier: &str) -> Result<String, DatabaseError> {
    DatabaseManager::validate_identifier(identifier)?;
    Ok(DatabaseManager::quote_identifier(identifier))
}

/// `$n` cast from text to the column's database type
fn cast_param(schema: &ModelSchema, field: &str, index: usize) -> Result<String, DatabaseError> {
    let column = schema
        .field(field)
        .ok_or_else(|| DatabaseError::QueryError(format!("unknown column {}", field)))?;
    Ok(format!("CAST(${}::text AS {})", index, quoted(&column.db_type)?))
}

/// Text form of a cleaned value as accepted by a Postgres cast
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn bind_filter_param<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.clone()),
    }
}
