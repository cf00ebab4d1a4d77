// Observer pipeline wrapping single-record writes

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;

use crate::database::record::Record;
use crate::database::store::StoreTransaction;
use crate::observer::context::ObserverContext;
use crate::observer::error::ObserverError;
use crate::observer::implementations::TouchTimestamps;
use crate::observer::traits::{Observer, ObserverRing, Operation};
use crate::schema::ModelSchema;

/// Executes observers in ring order around a record write
#[derive(Clone, Default)]
pub struct ObserverPipeline {
    observers: BTreeMap<ObserverRing, Vec<Arc<dyn Observer>>>,
}

impl ObserverPipeline {
    /// Create new observer pipeline with empty observer registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline with the built-in observers registered
    pub fn with_defaults() -> Self {
        let mut pipeline = Self::new();
        pipeline.register(Arc::new(TouchTimestamps));
        pipeline
    }

    pub fn register(&mut self, observer: Arc<dyn Observer>) {
        let ring = observer.ring();
        let name = observer.name();
        let observers = self.observers.entry(ring).or_default();
        observers.push(observer);
        observers.sort_by_key(|o| o.priority());

        tracing::debug!("Registered observer '{}' for ring {:?}", name, ring);
    }

    pub fn observer_names(&self) -> Vec<&'static str> {
        self.observers.values().flatten().map(|o| o.name()).collect()
    }

    /// Run the model-validation ring against `record` and return its errors.
    /// The record itself is not modified.
    pub async fn validate(&self, schema: &ModelSchema, record: &Record, operation: Operation) -> Vec<ObserverError> {
        let mut ctx = ObserverContext::new(operation, schema, record.clone());
        self.execute_ring(ObserverRing::ModelValidation, &mut ctx).await;
        ctx.errors
    }

    /// Write one record through the save hooks: business and enrichment
    /// rings, the store write, then the post-database ring. Returns the
    /// record as written.
    pub async fn save(
        &self,
        tx: &mut dyn StoreTransaction,
        schema: &ModelSchema,
        record: Record,
        operation: Operation,
    ) -> Result<Record, ObserverError> {
        let mut ctx = ObserverContext::new(operation, schema, record);

        tracing::debug!(
            "Observer pipeline starting: operation={:?}, schema={}, record={:?}",
            operation,
            schema.table,
            ctx.record.id()
        );

        for ring in ObserverRing::BEFORE_SAVE {
            if !self.execute_ring(ring, &mut ctx).await {
                tracing::warn!("Observer pipeline stopped at ring {:?} due to errors", ring);
                return Err(Self::combined(ctx.errors));
            }
        }

        match operation {
            Operation::Update => {
                tx.save(schema, &ctx.record).await?;
            }
            Operation::Create => {
                let id = tx.insert(schema, &ctx.record).await?;
                ctx.record.set_id(id);
            }
            Operation::Delete => {
                let id = ctx
                    .record
                    .id()
                    .ok_or_else(|| ObserverError::DatabaseError("delete requires a record id".to_string()))?;
                tx.delete(schema, id).await?;
            }
        }
        ctx.record.mark_saved();

        self.execute_ring(ObserverRing::PostDatabase, &mut ctx).await;
        if ctx.has_errors() {
            return Err(Self::combined(ctx.errors));
        }

        tracing::debug!("Observer pipeline finished in {:?}", ctx.execution_time());
        Ok(ctx.record)
    }

    fn combined(mut errors: Vec<ObserverError>) -> ObserverError {
        if errors.len() == 1 {
            return errors.remove(0);
        }
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        ObserverError::PipelineError(messages.join("; "))
    }

    /// Execute observers in a specific ring. Returns false when a
    /// pre-database ring produced errors.
    async fn execute_ring(&self, ring: ObserverRing, ctx: &mut ObserverContext<'_>) -> bool {
        let Some(observers) = self.observers.get(&ring) else {
            tracing::trace!("No observers registered for ring {:?}", ring);
            return true;
        };

        ctx.current_ring = Some(ring);
        for observer in observers {
            if !observer.applies_to_operation(ctx.operation) {
                tracing::trace!("Observer {} skipped - doesn't apply to operation {:?}", observer.name(), ctx.operation);
                continue;
            }

            if !observer.applies_to_schema(ctx.schema_name()) {
                tracing::trace!("Observer {} skipped - doesn't apply to schema {}", observer.name(), ctx.schema_name());
                continue;
            }

            let observer_start = Instant::now();
            let result = timeout(observer.timeout(), observer.execute(ctx)).await;
            let execution_time = observer_start.elapsed();

            match result {
                Ok(Ok(())) => {
                    tracing::trace!("Observer: {} completed in {:?}", observer.name(), execution_time);
                }
                Ok(Err(error)) => {
                    tracing::warn!("Observer: {} failed in {:?}: {}", observer.name(), execution_time, error);
                    ctx.errors.push(error);
                }
                Err(_timeout) => {
                    tracing::error!("Observer: {} timed out after {:?}", observer.name(), observer.timeout());
                    ctx.errors.push(ObserverError::TimeoutError(format!(
                        "Observer {} timed out after {:?}",
                        observer.name(),
                        observer.timeout()
                    )));
                }
            }
        }

        !(ctx.has_errors() && ring.is_pre_database())
    }
}
