// handlers/mod.rs - Two-tier handler layout
//
// Public (no auth) → Protected (staff JWT required)

pub mod protected;
pub mod public;

use std::sync::Arc;

use crate::admin::AdminSite;
use crate::database::store::RecordStore;
use crate::mass_update::SessionStore;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub site: Arc<AdminSite>,
    pub store: Arc<dyn RecordStore>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(site: AdminSite, store: Arc<dyn RecordStore>) -> Self {
        Self { site: Arc::new(site), store, sessions: Arc::new(SessionStore::new()) }
    }
}
