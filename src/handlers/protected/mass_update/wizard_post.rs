// POST /mass-update/:app/:model/:session_id - step 2 or process
//
// `to_update` replaces the field selection and returns the value form.
// `mass_update` (comma-joined selection) runs the updater chosen by
// `form_sets_on` with the submitted `data`.

use axum::extract::{Extension, Json, Path, State};
use serde::Deserialize;
use serde_json::{json, Value};

use super::utils::selected_ids;
use crate::error::ApiError;
use crate::form::FormData;
use crate::handlers::protected::model_key;
use crate::handlers::AppState;
use crate::mass_update::MassUpdate;
use crate::middleware::{ApiResponse, ApiResult, StaffUser};

#[derive(Debug, Default, Deserialize)]
pub struct WizardPayload {
    /// Field names chosen in step 1
    #[serde(default)]
    pub to_update: Option<Vec<String>>,
    /// Comma-joined selection echoed back by the value form
    #[serde(default)]
    pub mass_update: Option<String>,
    #[serde(default)]
    pub form_sets_on: Option<String>,
    /// Submitted values: field name to string, number, bool or array
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "_changelist_filters", default)]
    pub changelist_filters: Option<String>,
}

pub async fn post(
    State(state): State<AppState>,
    Path((app, model, session_id)): Path<(String, String, String)>,
    Extension(user): Extension<StaffUser>,
    Json(payload): Json<WizardPayload>,
) -> ApiResult<Value> {
    let key = model_key(&app, &model)?;
    let ids = selected_ids(&state, &user, &session_id).await?;
    let mut wizard = MassUpdate::new(&state.site, state.store.as_ref(), &key, &user, ids).await?;

    if let Some(selection) = payload.mass_update.as_deref() {
        wizard.set_fields_to_update(selection.split(','))?;
        let data = FormData::from_json(&payload.data)?;

        return match wizard
            .process_change(payload.form_sets_on.as_deref(), &data, payload.changelist_filters.as_deref())
            .await
        {
            Ok(outcome) => {
                // The selection is spent once the update is committed
                state.sessions.remove(&user.username, &session_id).await;
                Ok(ApiResponse::success(json!({
                    "step": "done",
                    "message": outcome.message,
                    "redirect": outcome.redirect,
                    "report": outcome.report,
                })))
            }
            Err(bundle) if bundle.is_validation() => {
                let form = wizard.value_form_view().await?;
                Err(ApiError::unprocessable_entity(
                    "Please correct the errors below.",
                    json!({
                        "step": "values",
                        "session_id": session_id,
                        "form": form,
                        "errors": bundle,
                    }),
                ))
            }
            Err(bundle) => match bundle.error {
                Some(error) => Err(error.into()),
                None => Err(ApiError::internal_server_error("Mass update failed")),
            },
        };
    }

    if let Some(selection) = &payload.to_update {
        wizard.set_fields_to_update(selection)?;
        let form = wizard.value_form_view().await?;
        return Ok(ApiResponse::success(json!({
            "step": "values",
            "session_id": session_id,
            "mass_update": wizard.fields_to_update().join(","),
            "changelist_filters": payload.changelist_filters,
            "form": form,
        })));
    }

    Err(ApiError::bad_request("Expected either to_update or mass_update"))
}
