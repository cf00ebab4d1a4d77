pub mod admin;
pub mod auth;
pub mod config;
pub mod database;
pub mod demo;
pub mod error;
pub mod filter;
pub mod form;
pub mod handlers;
pub mod mass_update;
pub mod middleware;
pub mod observer;
pub mod schema;
pub mod updater;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{protected, public, AppState};
use crate::middleware::jwt_auth_middleware;

/// Application router: public service routes plus the staff-only wizard
pub fn app(state: AppState) -> Router {
    let staff = Router::new()
        .route("/admin/:app/:model/mass-update", post(protected::admin::mass_update_action))
        .route(
            "/mass-update/:app/:model/:session_id",
            get(protected::mass_update::wizard_get).post(protected::mass_update::wizard_post),
        )
        .route_layer(from_fn(jwt_auth_middleware));

    let mut router = Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(staff);

    let settings = config::config();
    if settings.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    let router = router.with_state(state);

    if settings.security.enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
