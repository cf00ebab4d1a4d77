// handlers/public/mod.rs - Public handlers (no authentication)

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use super::AppState;

/// GET / - Service info
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let models: Vec<String> = state
        .site
        .models()
        .filter(|admin| state.site.is_mass_update_enabled(admin))
        .map(|admin| admin.key.to_string())
        .collect();

    Json(json!({
        "success": true,
        "data": {
            "name": "Mass Update",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Bulk editing of registered admin records",
            "mass_update_models": models,
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "action": "POST /admin/:app/:model/mass-update (staff)",
                "wizard": "GET|POST /mass-update/:app/:model/:session_id (staff)",
            }
        }
    }))
}

/// GET /health - Record store health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
