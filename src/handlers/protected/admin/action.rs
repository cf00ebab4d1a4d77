// POST /admin/:app/:model/mass-update - changelist action entry point

use axum::{
    extract::{Extension, Path, State},
    response::{Json, Redirect},
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::handlers::protected::model_key;
use crate::handlers::AppState;
use crate::mass_update::MassUpdate;
use crate::middleware::StaffUser;

#[derive(Debug, Deserialize)]
pub struct ActionPayload {
    /// Ids checked on the changelist
    #[serde(rename = "_selected_action", alias = "ids", default)]
    pub ids: Vec<i64>,
    #[serde(rename = "_changelist_filters", default)]
    pub changelist_filters: Option<String>,
}

/// Stash the selected ids under a content-addressed session key and
/// redirect (303) to the wizard, keeping the changelist filters
pub async fn mass_update_action(
    State(state): State<AppState>,
    Path((app, model)): Path<(String, String)>,
    Extension(user): Extension<StaffUser>,
    Json(payload): Json<ActionPayload>,
) -> Result<Redirect, ApiError> {
    let key = model_key(&app, &model)?;

    // Registration, opt-in, permission and the first object are checked
    // before anything is stored
    MassUpdate::new(&state.site, state.store.as_ref(), &key, &user, payload.ids.clone()).await?;

    let session_id = state.sessions.stash(&user.username, &payload.ids).await;
    let mut location = format!("/mass-update/{}/{}/{}", key.app, key.model, session_id);
    if let Some(filters) = payload.changelist_filters.as_deref().filter(|f| !f.is_empty()) {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("_changelist_filters", filters)
            .finish();
        location = format!("{}?{}", location, query);
    }

    tracing::info!("{} started mass update of {} {} records", user.username, payload.ids.len(), key);
    Ok(Redirect::to(&location))
}
