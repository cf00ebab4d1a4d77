use thiserror::Error;

/// Observer system errors with structured error types
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ObserverError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Validation failure attributed to a single field
    #[error("{field}: {message}")]
    FieldValidation { field: String, message: String },

    #[error("System error: {0}")]
    SystemError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Pipeline execution failed: {0}")]
    PipelineError(String),
}

impl ObserverError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ObserverError::FieldValidation { field: field.into(), message: message.into() }
    }

    /// Field the error belongs to, if any; record-level errors return None
    pub fn field_name(&self) -> Option<&str> {
        match self {
            ObserverError::FieldValidation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Message without the field prefix
    pub fn message(&self) -> String {
        match self {
            ObserverError::ValidationError(message) => message.clone(),
            ObserverError::FieldValidation { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Convert from database errors
impl From<crate::database::manager::DatabaseError> for ObserverError {
    fn from(error: crate::database::manager::DatabaseError) -> Self {
        ObserverError::DatabaseError(error.to_string())
    }
}
