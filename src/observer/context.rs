use std::time::Instant;

use crate::database::record::Record;
use crate::observer::error::ObserverError;
use crate::observer::traits::{ObserverRing, Operation};
use crate::schema::ModelSchema;

/// State flowing through the pipeline for one record
#[derive(Debug)]
pub struct ObserverContext<'a> {
    pub operation: Operation,
    pub schema: &'a ModelSchema,
    pub record: Record,

    pub start_time: Instant,
    pub current_ring: Option<ObserverRing>,

    pub errors: Vec<ObserverError>,
}

impl<'a> ObserverContext<'a> {
    pub fn new(operation: Operation, schema: &'a ModelSchema, record: Record) -> Self {
        Self {
            operation,
            schema,
            record,
            start_time: Instant::now(),
            current_ring: None,
            errors: Vec::new(),
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.schema.table
    }

    pub fn add_error(&mut self, error: ObserverError) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn execution_time(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}
