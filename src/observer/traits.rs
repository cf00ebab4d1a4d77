use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::observer::context::ObserverContext;
use crate::observer::error::ObserverError;

/// Observer rings around a single record save, executed in ascending order.
/// Ring 5 is the store write itself and has no observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ObserverRing {
    ModelValidation = 1, // Record-level validation, run by forms before saving
    Business = 3,        // Domain rules
    Enrichment = 4,      // Computed fields, timestamps
    PostDatabase = 6,    // After the store write, inside the same transaction
}

impl ObserverRing {
    /// Rings executed before the store write
    pub const BEFORE_SAVE: [ObserverRing; 2] = [ObserverRing::Business, ObserverRing::Enrichment];

    /// Errors in rings below the store write stop the save
    pub fn is_pre_database(&self) -> bool {
        (*self as u8) < 5
    }
}

/// Store operations the save hooks run around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

#[async_trait]
pub trait Observer: Send + Sync {
    /// Observer name for logging and debugging
    fn name(&self) -> &'static str;

    /// Which ring this observer belongs to
    fn ring(&self) -> ObserverRing;

    fn applies_to_operation(&self, _op: Operation) -> bool {
        true
    }

    /// Check if observer applies to this table
    fn applies_to_schema(&self, _schema: &str) -> bool {
        true
    }

    /// Execution timeout (default 5 seconds)
    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// Priority within ring (lower numbers execute first)
    fn priority(&self) -> u8 {
        50
    }

    async fn execute(&self, ctx: &mut ObserverContext<'_>) -> Result<(), ObserverError>;
}
