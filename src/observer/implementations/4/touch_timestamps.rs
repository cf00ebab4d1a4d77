// Ring 4: Enrichment - stamps created_at/updated_at on records being written
use async_trait::async_trait;
use serde_json::Value;

use crate::observer::context::ObserverContext;
use crate::observer::error::ObserverError;
use crate::observer::traits::{Observer, ObserverRing, Operation};

#[derive(Default)]
pub struct TouchTimestamps;

#[async_trait]
impl Observer for TouchTimestamps {
    fn name(&self) -> &'static str {
        "TouchTimestamps"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::Enrichment
    }

    fn applies_to_operation(&self, op: Operation) -> bool {
        matches!(op, Operation::Create | Operation::Update)
    }

    async fn execute(&self, ctx: &mut ObserverContext<'_>) -> Result<(), ObserverError> {
        if ctx.operation == Operation::Update && !ctx.record.has_changes() {
            tracing::trace!("Record {:?} unchanged, not touching timestamps", ctx.record.id());
            return Ok(());
        }

        if ctx.schema.has_field("updated_at") {
            ctx.record.touch_updated_at();
        }

        if ctx.operation == Operation::Create
            && ctx.schema.has_field("created_at")
            && ctx.record.get("created_at").map(Value::is_null).unwrap_or(true)
        {
            let now = ctx.record.get("updated_at").cloned();
            let now = now.unwrap_or_else(|| Value::String(chrono::Utc::now().to_rfc3339()));
            ctx.record.set_system_field("created_at", now);
        }

        Ok(())
    }
}
