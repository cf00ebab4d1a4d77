// handlers/protected/mod.rs - Protected handlers (staff JWT required)
//
// Every route here sits behind jwt_auth_middleware, which injects the
// StaffUser extension. Per-model permissions are checked by the handlers.

pub mod admin;
pub mod mass_update;

use crate::admin::ModelKey;
use crate::error::ApiError;

/// Model key from path segments; malformed keys read as unknown models
pub(crate) fn model_key(app: &str, model: &str) -> Result<ModelKey, ApiError> {
    ModelKey::new(app, model).map_err(|e| ApiError::not_found(e.to_string()))
}
