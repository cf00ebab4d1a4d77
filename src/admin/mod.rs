//! Admin registry: which record types are administered and how.

pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::config::config;
use crate::database::manager::DatabaseError;
use crate::database::store::RecordStore;
use crate::filter::FilterData;
use crate::form::InlineSpec;
use crate::middleware::StaffUser;
use crate::observer::{Observer, ObserverPipeline};
use crate::schema::{ModelSchema, RelationSpec, SchemaError};

pub use registry::{ModelRegistration, SiteConfig};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Model not registered with the admin site: {0}")]
    NotRegistered(String),

    #[error("Model already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid model key: {0}")]
    InvalidKey(String),

    #[error("Invalid registry: {0}")]
    Registry(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// `app` + `model` pair naming a record type, as in `shop.product`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ModelKey {
    pub app: String,
    pub model: String,
}

impl ModelKey {
    pub fn new(app: impl Into<String>, model: impl Into<String>) -> Result<Self, AdminError> {
        let key = Self { app: app.into().to_ascii_lowercase(), model: model.into().to_ascii_lowercase() };
        let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid(&key.app) || !valid(&key.model) {
            return Err(AdminError::InvalidKey(format!("{}.{}", key.app, key.model)));
        }
        Ok(key)
    }

    /// Permission required to change records of this type
    pub fn change_permission(&self) -> String {
        format!("{}.change_{}", self.app, self.model)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app, self.model)
    }
}

/// Queryset override evaluated per request
pub type QuerysetHook = Arc<dyn Fn(&StaffUser) -> FilterData + Send + Sync>;

/// Registration of one record type with the admin site
#[derive(Clone)]
pub struct ModelAdmin {
    pub key: ModelKey,
    pub table: String,
    pub relations: Vec<RelationSpec>,
    pub inlines: Vec<InlineSpec>,
    pub readonly_fields: Vec<String>,
    /// Opt in to mass update when it is not added globally
    pub mass_update: bool,
    queryset: FilterData,
    mass_update_queryset: Option<QuerysetHook>,
    pub observers: ObserverPipeline,
}

impl fmt::Debug for ModelAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelAdmin")
            .field("key", &self.key)
            .field("table", &self.table)
            .field("relations", &self.relations)
            .field("inlines", &self.inlines)
            .field("mass_update", &self.mass_update)
            .field("observers", &self.observers.observer_names())
            .finish()
    }
}

impl ModelAdmin {
    /// Registration backed by the `{app}_{model}` table
    pub fn new(key: ModelKey) -> Self {
        let table = format!("{}_{}", key.app, key.model);
        Self {
            key,
            table,
            relations: Vec::new(),
            inlines: Vec::new(),
            readonly_fields: Vec::new(),
            mass_update: false,
            queryset: FilterData::all(),
            mass_update_queryset: None,
            observers: ObserverPipeline::with_defaults(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn relation(mut self, relation: RelationSpec) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn inline(mut self, inline: InlineSpec) -> Self {
        self.inlines.push(inline);
        self
    }

    pub fn readonly(mut self, field: impl Into<String>) -> Self {
        self.readonly_fields.push(field.into());
        self
    }

    pub fn with_mass_update(mut self, enabled: bool) -> Self {
        self.mass_update = enabled;
        self
    }

    /// Default queryset for every admin operation
    pub fn queryset(mut self, queryset: FilterData) -> Self {
        self.queryset = queryset;
        self
    }

    /// Queryset used by mass update instead of the default one
    pub fn mass_update_queryset(mut self, hook: QuerysetHook) -> Self {
        self.mass_update_queryset = Some(hook);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.register(observer);
        self
    }

    pub fn has_change_permission(&self, user: &StaffUser) -> bool {
        user.has_perm(&self.key.change_permission())
    }

    pub fn get_queryset(&self, _user: &StaffUser) -> FilterData {
        self.queryset.clone()
    }

    pub fn get_mass_update_queryset(&self, user: &StaffUser) -> FilterData {
        match &self.mass_update_queryset {
            Some(hook) => hook(user),
            None => self.get_queryset(user),
        }
    }

    /// Schema built from the store's live metadata
    pub async fn describe(&self, store: &dyn RecordStore) -> Result<ModelSchema, AdminError> {
        let columns = store.describe(&self.table).await?;
        Ok(ModelSchema::from_columns(&self.table, columns, &self.relations, &self.readonly_fields)?)
    }

    /// Schemas of the inline child tables, in registration order
    pub async fn describe_inlines(&self, store: &dyn RecordStore) -> Result<Vec<(InlineSpec, ModelSchema)>, AdminError> {
        let mut schemas = Vec::with_capacity(self.inlines.len());
        for inline in &self.inlines {
            let columns = store.describe(&inline.table).await?;
            let schema = ModelSchema::from_columns(&inline.table, columns, &[], &[])?;
            schemas.push((inline.clone(), schema));
        }
        Ok(schemas)
    }

    pub fn inline_prefixes(&self) -> Vec<String> {
        self.inlines.iter().map(InlineSpec::prefix).collect()
    }
}

#[derive(Clone, Default)]
pub struct AdminSite {
    registry: BTreeMap<ModelKey, Arc<ModelAdmin>>,
    add_globally: bool,
}

impl AdminSite {
    pub fn new(add_globally: bool) -> Self {
        Self { registry: BTreeMap::new(), add_globally }
    }

    /// Empty site using the configured `add_globally` setting
    pub fn from_config() -> Self {
        Self::new(config().mass_update.add_globally)
    }

    pub fn add_globally(&self) -> bool {
        self.add_globally
    }

    pub fn register(&mut self, admin: ModelAdmin) -> Result<(), AdminError> {
        if self.registry.contains_key(&admin.key) {
            return Err(AdminError::AlreadyRegistered(admin.key.to_string()));
        }
        tracing::info!("Registered {} (table {}, mass_update={})", admin.key, admin.table, admin.mass_update);
        self.registry.insert(admin.key.clone(), Arc::new(admin));
        Ok(())
    }

    pub fn get(&self, key: &ModelKey) -> Result<Arc<ModelAdmin>, AdminError> {
        self.registry
            .get(key)
            .cloned()
            .ok_or_else(|| AdminError::NotRegistered(key.to_string()))
    }

    /// Mass update is offered for every model when added globally,
    /// otherwise only for models that opt in
    pub fn is_mass_update_enabled(&self, admin: &ModelAdmin) -> bool {
        self.add_globally || admin.mass_update
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelAdmin>> {
        self.registry.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(app: &str, model: &str) -> ModelKey {
        ModelKey::new(app, model).unwrap()
    }

    #[test]
    fn model_keys_are_validated() {
        assert_eq!(key("Shop", "Product").to_string(), "shop.product");
        assert!(ModelKey::new("shop", "pro-duct").is_err());
        assert!(ModelKey::new("", "product").is_err());
        assert_eq!(key("shop", "product").change_permission(), "shop.change_product");
    }

    #[test]
    fn unregistered_models_are_rejected() {
        let mut site = AdminSite::new(true);
        site.register(ModelAdmin::new(key("shop", "product"))).unwrap();

        assert!(site.get(&key("shop", "product")).is_ok());
        assert!(matches!(site.get(&key("shop", "order")), Err(AdminError::NotRegistered(_))));
        assert!(matches!(
            site.register(ModelAdmin::new(key("shop", "product"))),
            Err(AdminError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn opt_in_applies_without_global_flag() {
        let global = AdminSite::new(true);
        let local = AdminSite::new(false);
        let plain = ModelAdmin::new(key("shop", "product"));
        let opted = ModelAdmin::new(key("shop", "order")).with_mass_update(true);

        assert!(global.is_mass_update_enabled(&plain));
        assert!(!local.is_mass_update_enabled(&plain));
        assert!(local.is_mass_update_enabled(&opted));
    }

    #[test]
    fn mass_update_queryset_overrides_default() {
        let admin = ModelAdmin::new(key("shop", "product"))
            .queryset(FilterData::with_where(serde_json::json!({ "active": true })))
            .mass_update_queryset(Arc::new(|user: &StaffUser| {
                FilterData::with_where(serde_json::json!({ "owner": user.username }))
            }));
        let user = StaffUser { username: "alice".to_string(), ..Default::default() };

        assert_eq!(
            admin.get_mass_update_queryset(&user).where_clause,
            Some(serde_json::json!({ "owner": "alice" }))
        );
        assert_eq!(admin.get_queryset(&user).where_clause, Some(serde_json::json!({ "active": true })));
    }

    #[test]
    fn change_permission_follows_model_key() {
        let admin = ModelAdmin::new(key("shop", "product"));
        let clerk = StaffUser {
            username: "clerk".to_string(),
            is_superuser: false,
            permissions: vec!["shop.change_product".to_string()],
        };
        let viewer = StaffUser { username: "viewer".to_string(), ..Default::default() };

        assert!(admin.has_change_permission(&clerk));
        assert!(!admin.has_change_permission(&viewer));
    }
}
