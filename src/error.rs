// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::admin::AdminError;
use crate::database::manager::DatabaseError;
use crate::form::FormError;
use crate::observer::error::ObserverError;
use crate::updater::MassUpdateError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 422 Unprocessable Entity (submission parsed but rejected)
    UnprocessableEntity { message: String, details: Value },

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::UnprocessableEntity { .. } => 422,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::UnprocessableEntity { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::UnprocessableEntity { message, details } => {
                json!({
                    "error": true,
                    "message": message,
                    "code": self.error_code(),
                    "data": details
                })
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::UnprocessableEntity { .. } => "UNPROCESSABLE_ENTITY",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn unprocessable_entity(message: impl Into<String>, details: Value) -> Self {
        ApiError::UnprocessableEntity { message: message.into(), details }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("Database configuration error: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::InvalidIdentifier(name) => ApiError::bad_request(format!("Invalid identifier: {}", name)),
            DatabaseError::QueryError(msg) => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Database query error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<ObserverError> for ApiError {
    fn from(err: ObserverError) -> Self {
        match err {
            ObserverError::ValidationError(_) | ObserverError::FieldValidation { .. } => {
                ApiError::unprocessable_entity(err.to_string(), Value::Null)
            }
            ObserverError::DatabaseError(msg) => {
                tracing::error!("Observer database error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            ObserverError::TimeoutError(msg) => {
                tracing::error!("Observer timeout: {}", msg);
                ApiError::internal_server_error("Request processing timed out")
            }
            ObserverError::SystemError(msg) | ObserverError::PipelineError(msg) => {
                tracing::error!("Observer failure: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<FormError> for ApiError {
    fn from(err: FormError) -> Self {
        match err {
            FormError::InvalidPayload(msg) => ApiError::invalid_json(msg),
            FormError::Database(e) => e.into(),
            FormError::Observer(e) => e.into(),
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        MassUpdateError::from(err).into()
    }
}

impl From<MassUpdateError> for ApiError {
    fn from(err: MassUpdateError) -> Self {
        match err {
            MassUpdateError::NotRegistered(_) | MassUpdateError::NotEnabled(_) | MassUpdateError::NotFound(_) => {
                ApiError::not_found(err.to_string())
            }
            MassUpdateError::PermissionDenied(_) => ApiError::forbidden(err.to_string()),
            MassUpdateError::EmptySelection
            | MassUpdateError::InvalidField(_)
            | MassUpdateError::InvalidPayload(_) => ApiError::bad_request(err.to_string()),
            MassUpdateError::Validation => ApiError::unprocessable_entity(err.to_string(), Value::Null),
            MassUpdateError::Setup(msg) => {
                tracing::error!("Mass update setup error: {}", msg);
                ApiError::internal_server_error("Mass update is misconfigured")
            }
            MassUpdateError::Schema(e) => {
                tracing::error!("Schema error: {}", e);
                ApiError::internal_server_error("Record type metadata is unavailable")
            }
            MassUpdateError::Database(e) => e.into(),
            MassUpdateError::Observer(e) => e.into(),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_update_errors_map_to_statuses() {
        let not_registered: ApiError = MassUpdateError::NotRegistered("shop.order".to_string()).into();
        assert_eq!(not_registered.status_code(), 404);
        assert!(not_registered.message().starts_with("Model not registered with the admin site"));

        let denied: ApiError = MassUpdateError::PermissionDenied("shop.change_order".to_string()).into();
        assert_eq!(denied.status_code(), 403);

        let empty: ApiError = MassUpdateError::EmptySelection.into();
        assert_eq!(empty.error_code(), "BAD_REQUEST");
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err: ApiError = DatabaseError::QueryError("relation \"secret\" does not exist".to_string()).into();
        assert_eq!(err.status_code(), 500);
        assert!(!err.message().contains("secret"));
    }

    #[test]
    fn unprocessable_entities_carry_details() {
        let err = ApiError::unprocessable_entity("Validation failed", json!({ "error_list": ["name: bad"] }));
        let body = err.to_json();
        assert_eq!(body["code"], "UNPROCESSABLE_ENTITY");
        assert_eq!(body["data"]["error_list"][0], "name: bad");
    }
}
