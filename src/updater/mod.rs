//! The two update strategies and their shared contract.
//!
//! Both strategies take an [`UpdateRequest`] and return either an
//! [`UpdateReport`] or an [`UpdateErrorBundle`]. Any failure rolls back
//! every change made by the request.

pub mod fast;
pub mod formset;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::admin::{AdminError, ModelAdmin};
use crate::database::manager::DatabaseError;
use crate::database::store::{RecordStore, StoreTransaction};
use crate::filter::FilterData;
use crate::form::{ErrorList, FieldErrors, FormData, FormError, FormSetSummary, InlineSpec};
use crate::middleware::StaffUser;
use crate::observer::ObserverError;
use crate::schema::{ModelSchema, SchemaError};

pub use fast::FastMassUpdate;
pub use formset::FormSetMassUpdate;

#[derive(Debug, Error)]
pub enum MassUpdateError {
    #[error("Model not registered with the admin site: {0}")]
    NotRegistered(String),

    #[error("Mass update is not enabled for {0}")]
    NotEnabled(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No objects selected")]
    EmptySelection,

    #[error("Field cannot be mass updated: {0}")]
    InvalidField(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Validation failed")]
    Validation,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Observer(#[from] ObserverError),
}

impl From<FormError> for MassUpdateError {
    fn from(err: FormError) -> Self {
        match err {
            FormError::InvalidPayload(msg) => MassUpdateError::InvalidPayload(msg),
            FormError::Database(e) => MassUpdateError::Database(e),
            FormError::Observer(e) => MassUpdateError::Observer(e),
        }
    }
}

impl From<AdminError> for MassUpdateError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::NotRegistered(key) => MassUpdateError::NotRegistered(key),
            AdminError::Schema(e) => MassUpdateError::Schema(e),
            AdminError::Database(e) => MassUpdateError::Database(e),
            other => MassUpdateError::Setup(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    FormSet,
    Fast,
}

/// Everything an updater needs for one request
pub struct UpdateRequest<'a> {
    pub store: &'a dyn RecordStore,
    pub admin: &'a ModelAdmin,
    pub schema: &'a ModelSchema,
    /// Inline child schemas, in registration order
    pub inlines: &'a [(InlineSpec, ModelSchema)],
    /// Mass-update queryset scoping every read and write
    pub scope: &'a FilterData,
    pub object_ids: &'a [i64],
    pub fields_to_update: &'a [String],
    pub data: &'a FormData,
    pub user: &'a StaffUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub strategy: Strategy,
    pub records_updated: usize,
}

/// Failure outcome: collected formsets, structured field errors, the
/// flattened error list and the triggering error
#[derive(Debug, Default, Serialize)]
pub struct UpdateErrorBundle {
    pub formsets: Vec<FormSetSummary>,
    pub field_errors: Option<FieldErrors>,
    pub error_list: Option<ErrorList>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<MassUpdateError>,
}

impl UpdateErrorBundle {
    /// Bundle for a failed validation
    pub fn validation(field_errors: FieldErrors, formsets: Vec<FormSetSummary>) -> Self {
        let error_list = ErrorList::new(&field_errors, &formsets);
        Self {
            formsets,
            field_errors: Some(field_errors),
            error_list: Some(error_list),
            error: Some(MassUpdateError::Validation),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.error, Some(MassUpdateError::Validation))
    }
}

impl From<MassUpdateError> for UpdateErrorBundle {
    fn from(err: MassUpdateError) -> Self {
        Self { error: Some(err), ..Default::default() }
    }
}

impl From<DatabaseError> for UpdateErrorBundle {
    fn from(err: DatabaseError) -> Self {
        MassUpdateError::from(err).into()
    }
}

impl From<FormError> for UpdateErrorBundle {
    fn from(err: FormError) -> Self {
        MassUpdateError::from(err).into()
    }
}

impl From<ObserverError> for UpdateErrorBundle {
    fn from(err: ObserverError) -> Self {
        MassUpdateError::from(err).into()
    }
}

fn serialize_error<S: Serializer>(error: &Option<MassUpdateError>, serializer: S) -> Result<S::Ok, S::Error> {
    error.as_ref().map(ToString::to_string).serialize(serializer)
}

/// Strategy chosen per request
pub enum MassUpdater {
    FormSet(FormSetMassUpdate),
    Fast(FastMassUpdate),
}

impl MassUpdater {
    /// `form_sets_on == "on"` selects the form-replay updater; anything else the fast one
    pub fn from_flag(form_sets_on: Option<&str>) -> Self {
        match form_sets_on {
            Some("on") => MassUpdater::FormSet(FormSetMassUpdate::new()),
            _ => MassUpdater::Fast(FastMassUpdate::new()),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            MassUpdater::FormSet(_) => Strategy::FormSet,
            MassUpdater::Fast(_) => Strategy::Fast,
        }
    }

    pub async fn update(&self, request: &UpdateRequest<'_>) -> Result<UpdateReport, UpdateErrorBundle> {
        match self {
            MassUpdater::FormSet(updater) => updater.update(request).await,
            MassUpdater::Fast(updater) => updater.update(request).await,
        }
    }
}

/// Commit on success, roll back on any error
pub(crate) async fn finish(
    tx: Box<dyn StoreTransaction>,
    outcome: Result<usize, UpdateErrorBundle>,
) -> Result<usize, UpdateErrorBundle> {
    match outcome {
        Ok(updated) => {
            tx.commit().await?;
            Ok(updated)
        }
        Err(bundle) => {
            if let Err(e) = tx.rollback().await {
                tracing::error!("Rollback failed: {}", e);
            }
            Err(bundle)
        }
    }
}

/// "a", "a and b", "a, b and c"
pub(crate) fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}
