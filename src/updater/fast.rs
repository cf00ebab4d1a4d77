//! Fast updater: one validation, then set-based UPDATEs in fixed-size chunks.

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{finish, MassUpdateError, Strategy, UpdateErrorBundle, UpdateReport, UpdateRequest};
use crate::config::config;
use crate::database::store::StoreTransaction;
use crate::form::{FieldErrors, RecordForm};
use crate::observer::Operation;
use crate::schema::RelationSpec;

/// Submitted values containing this marker are rejected before any write
pub const INVALID_MARKER: &str = "invalid";

const INVALID_VALUE: &str = "Enter a valid value.";

/// Validates once against the first selected record, then writes scalar
/// fields with one UPDATE per chunk of ids. Many-to-many fields are
/// replaced record by record and saved through the save hooks.
#[derive(Debug, Clone)]
pub struct FastMassUpdate {
    batch_size: usize,
}

impl Default for FastMassUpdate {
    fn default() -> Self {
        Self::new()
    }
}

impl FastMassUpdate {
    /// Uses the configured batch size
    pub fn new() -> Self {
        Self::with_batch_size(config().mass_update.batch_size)
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self { batch_size: batch_size.max(1) }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn update(&self, request: &UpdateRequest<'_>) -> Result<UpdateReport, UpdateErrorBundle> {
        let mut tx = request.store.begin().await?;
        let outcome = self.apply(tx.as_mut(), request).await;
        let records_updated = finish(tx, outcome).await?;

        info!(
            "Fast mass update of {} wrote {} records in chunks of {}",
            request.schema.table, records_updated, self.batch_size
        );
        Ok(UpdateReport { strategy: Strategy::Fast, records_updated })
    }

    async fn apply(&self, tx: &mut dyn StoreTransaction, request: &UpdateRequest<'_>) -> Result<usize, UpdateErrorBundle> {
        let schema = request.schema;
        let observers = &request.admin.observers;
        let first_id = *request.object_ids.first().ok_or(MassUpdateError::EmptySelection)?;

        let representative = tx
            .select(schema, request.scope, &[first_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MassUpdateError::NotFound(format!("{} id {}", schema.table, first_id)))?;

        let mut form = RecordForm::new(schema, representative, request.data, request.fields_to_update);
        let valid = form.full_clean(tx, observers).await?;

        let mut errors = form.errors().clone();
        for (field, messages) in marker_errors(request).iter() {
            if !errors.contains(field) {
                for message in messages {
                    errors.add(field.clone(), message.clone());
                }
            }
        }
        if !valid || !errors.is_empty() {
            return Err(UpdateErrorBundle::validation(errors, Vec::new()));
        }

        let scalars = form.scalar_data();
        let relations = self.relation_values(request, form.m2m_data());
        debug!(
            "Fast update of {}: {} scalar fields, {} relation fields",
            schema.table,
            scalars.len(),
            relations.len()
        );

        let mut updated = 0;
        for (index, chunk) in request.object_ids.chunks(self.batch_size).enumerate() {
            let mut chunk_updated = 0;
            if !scalars.is_empty() {
                chunk_updated = self.update_chunk(tx, request, chunk, &scalars).await?;
            }

            if !relations.is_empty() {
                let records = tx.select(schema, request.scope, chunk).await?;
                let mut saved = 0;
                for record in records {
                    let Some(id) = record.id() else { continue };
                    for (relation, members) in &relations {
                        tx.set_relation(relation, id, members).await?;
                    }
                    observers.save(tx, schema, record, Operation::Update).await?;
                    saved += 1;
                }
                chunk_updated = chunk_updated.max(saved);
            }

            debug!("Chunk {} of {}: {} records", index + 1, schema.table, chunk_updated);
            updated += chunk_updated;
        }

        Ok(updated)
    }

    async fn update_chunk(
        &self,
        tx: &mut dyn StoreTransaction,
        request: &UpdateRequest<'_>,
        chunk: &[i64],
        scalars: &Map<String, Value>,
    ) -> Result<usize, UpdateErrorBundle> {
        let affected = tx.update_many(request.schema, request.scope, chunk, scalars).await?;
        Ok(usize::try_from(affected).unwrap_or(usize::MAX))
    }

    /// Pair each cleaned many-to-many field with its relation
    fn relation_values<'r>(
        &self,
        request: &UpdateRequest<'r>,
        m2m: Vec<(String, Vec<i64>)>,
    ) -> Vec<(&'r RelationSpec, Vec<i64>)> {
        m2m.into_iter()
            .filter_map(|(name, members)| request.schema.relation(&name).map(|relation| (relation, members)))
            .collect()
    }
}

/// Field errors flagging every selected field whose raw value carries the marker
pub fn marker_errors(request: &UpdateRequest<'_>) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for field in request.fields_to_update {
        if request.data.raw_string(field).contains(INVALID_MARKER) {
            errors.add(field.clone(), INVALID_VALUE);
        }
    }
    errors
}
