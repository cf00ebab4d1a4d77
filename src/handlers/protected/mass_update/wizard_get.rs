// GET /mass-update/:app/:model/:session_id - step 1, field selection

use axum::extract::{Extension, Path, Query, State};
use serde_json::{json, Value};

use super::utils::{selected_ids, ChangelistQuery};
use crate::handlers::protected::model_key;
use crate::handlers::AppState;
use crate::mass_update::MassUpdate;
use crate::middleware::{ApiResponse, ApiResult, StaffUser};

pub async fn get(
    State(state): State<AppState>,
    Path((app, model, session_id)): Path<(String, String, String)>,
    Query(query): Query<ChangelistQuery>,
    Extension(user): Extension<StaffUser>,
) -> ApiResult<Value> {
    let key = model_key(&app, &model)?;
    let ids = selected_ids(&state, &user, &session_id).await?;
    let wizard = MassUpdate::new(&state.site, state.store.as_ref(), &key, &user, ids).await?;

    Ok(ApiResponse::success(json!({
        "step": "select_fields",
        "session_id": session_id,
        "changelist_filters": query.changelist_filters,
        "selection": wizard.field_selection_view(),
    })))
}
