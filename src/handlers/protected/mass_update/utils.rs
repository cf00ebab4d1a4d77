use serde::Deserialize;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::middleware::StaffUser;

#[derive(Debug, Default, Deserialize)]
pub struct ChangelistQuery {
    #[serde(rename = "_changelist_filters")]
    pub changelist_filters: Option<String>,
}

/// Ids stashed by the changelist action for this user
pub async fn selected_ids(state: &AppState, user: &StaffUser, session_id: &str) -> Result<Vec<i64>, ApiError> {
    state
        .sessions
        .load(&user.username, session_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Unknown or expired selection: {}", session_id)))
}
