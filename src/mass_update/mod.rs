//! Mass-update wizard: field selection, value form and processing for one
//! registered record type and one selection of ids.

pub mod session;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::admin::{AdminSite, ModelAdmin, ModelKey};
use crate::database::record::Record;
use crate::database::store::{RecordStore, StoreTransaction};
use crate::filter::FilterData;
use crate::form::{value_to_raw, FormData, InlineSpec};
use crate::middleware::StaffUser;
use crate::schema::{FieldMeta, ModelSchema};
use crate::updater::{MassUpdateError, MassUpdater, UpdateErrorBundle, UpdateReport, UpdateRequest};

pub use session::{session_key, SessionStore};

/// Step 1 context: what may be selected
#[derive(Debug, Clone, Serialize)]
pub struct FieldSelection {
    pub model: String,
    pub object_count: usize,
    pub mass_update_fields: Vec<String>,
    /// Listed so the operator sees why they are missing; never selectable
    pub unique_fields: Vec<String>,
    pub inline_prefixes: Vec<String>,
    pub fields_to_update: Vec<String>,
    pub has_change_permission: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    #[serde(flatten)]
    pub meta: FieldMeta,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineDescriptor {
    pub prefix: String,
    pub table: String,
    pub fk_column: String,
    pub can_delete: bool,
    pub fields: Vec<String>,
    /// Current children of the first selected record
    pub initial: Vec<Value>,
}

/// Step 2 context: the selected fields and the first record's current values
#[derive(Debug, Clone, Serialize)]
pub struct ValueForm {
    pub model: String,
    pub object_count: usize,
    pub fields_to_update: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
    pub inlines: Vec<InlineDescriptor>,
    pub initial: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub message: String,
    pub redirect: String,
    pub report: UpdateReport,
}

/// One wizard run over a registered record type
pub struct MassUpdate<'a> {
    store: &'a dyn RecordStore,
    admin: Arc<ModelAdmin>,
    user: &'a StaffUser,
    schema: ModelSchema,
    inlines: Vec<(InlineSpec, ModelSchema)>,
    scope: FilterData,
    object_ids: Vec<i64>,
    first_object: Record,
    fields_to_update: Vec<String>,
}

impl<'a> MassUpdate<'a> {
    /// Resolve the registration, check access and load the first selected
    /// record. Schema metadata is read from the store on every call.
    pub async fn new(
        site: &AdminSite,
        store: &'a dyn RecordStore,
        key: &ModelKey,
        user: &'a StaffUser,
        object_ids: Vec<i64>,
    ) -> Result<Self, MassUpdateError> {
        let admin = site.get(key)?;
        if !site.is_mass_update_enabled(&admin) {
            return Err(MassUpdateError::NotEnabled(key.to_string()));
        }
        if !admin.has_change_permission(user) {
            warn!("{} lacks {} for mass update", user.username, key.change_permission());
            return Err(MassUpdateError::PermissionDenied(key.change_permission()));
        }
        let Some(&first_id) = object_ids.first() else {
            return Err(MassUpdateError::EmptySelection);
        };

        let schema = admin.describe(store).await?;
        let inlines = admin.describe_inlines(store).await?;
        let scope = admin.get_mass_update_queryset(user);

        let mut tx = store.begin().await?;
        let loaded = tx.select(&schema, &scope, &[first_id]).await;
        tx.rollback().await?;
        let first_object = loaded?
            .into_iter()
            .next()
            .ok_or_else(|| MassUpdateError::NotFound(format!("{} id {}", key, first_id)))?;

        debug!("Mass update of {} over {} ids for {}", key, object_ids.len(), user.username);
        Ok(Self {
            store,
            admin,
            user,
            schema,
            inlines,
            scope,
            object_ids,
            first_object,
            fields_to_update: Vec::new(),
        })
    }

    pub fn key(&self) -> &ModelKey {
        &self.admin.key
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn object_ids(&self) -> &[i64] {
        &self.object_ids
    }

    pub fn fields_to_update(&self) -> &[String] {
        &self.fields_to_update
    }

    /// Replace the selection. Every name must be a mass-updatable field or
    /// a registered inline prefix; duplicates are dropped.
    pub fn set_fields_to_update<I, S>(&mut self, fields: I) -> Result<(), MassUpdateError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = self.schema.mass_update_field_names();
        let prefixes = self.admin.inline_prefixes();

        let mut selection: Vec<String> = Vec::new();
        for field in fields {
            let field = field.as_ref().trim();
            if field.is_empty() || selection.iter().any(|f| f == field) {
                continue;
            }
            if !allowed.iter().any(|f| f == field) && !prefixes.iter().any(|p| p == field) {
                return Err(MassUpdateError::InvalidField(field.to_string()));
            }
            selection.push(field.to_string());
        }

        self.fields_to_update = selection;
        Ok(())
    }

    pub fn field_selection_view(&self) -> FieldSelection {
        FieldSelection {
            model: self.key().to_string(),
            object_count: self.object_ids.len(),
            mass_update_fields: self.schema.mass_update_field_names(),
            unique_fields: self.schema.unique_field_names(),
            inline_prefixes: self.admin.inline_prefixes(),
            fields_to_update: self.fields_to_update.clone(),
            has_change_permission: self.admin.has_change_permission(self.user),
            is_superuser: self.user.is_superuser,
        }
    }

    /// Descriptors for the selected fields, pre-filled with the first
    /// record's values. Many-to-many fields are pre-filled with member ids.
    pub async fn value_form_view(&self) -> Result<ValueForm, MassUpdateError> {
        let first_id = self
            .first_object
            .id()
            .ok_or_else(|| MassUpdateError::NotFound(format!("{} record without id", self.key())))?;

        let mut tx = self.store.begin().await?;
        let built = self.build_value_form(tx.as_mut(), first_id).await;
        tx.rollback().await?;
        built
    }

    async fn build_value_form(
        &self,
        tx: &mut dyn StoreTransaction,
        first_id: i64,
    ) -> Result<ValueForm, MassUpdateError> {
        let mut fields = Vec::new();
        let mut initial = Map::new();
        let mut inlines = Vec::new();

        for name in &self.fields_to_update {
            if let Some(meta) = self.schema.field(name) {
                let value = match self.schema.relation(name) {
                    Some(relation) => {
                        let members = tx.relation_members(relation, first_id).await?;
                        Value::Array(members.into_iter().map(|id| Value::String(id.to_string())).collect())
                    }
                    None => value_to_raw(self.first_object.get(name).unwrap_or(&Value::Null)),
                };
                initial.insert(name.clone(), value);
                fields.push(FieldDescriptor { meta: meta.clone(), required: meta.is_required() });
                continue;
            }

            if let Some((spec, child_schema)) = self.inlines.iter().find(|(spec, _)| &spec.prefix() == name) {
                let children = tx.select_children(child_schema, &spec.fk_column, first_id).await?;
                let child_fields = match &spec.fields {
                    Some(fields) => fields.clone(),
                    None => child_schema
                        .fields()
                        .iter()
                        .filter(|f| f.editable && f.name != spec.fk_column)
                        .map(|f| f.name.clone())
                        .collect(),
                };
                inlines.push(InlineDescriptor {
                    prefix: spec.prefix(),
                    table: spec.table.clone(),
                    fk_column: spec.fk_column.clone(),
                    can_delete: spec.can_delete,
                    fields: child_fields,
                    initial: children
                        .iter()
                        .map(|child| {
                            Value::Object(child.fields().iter().map(|(k, v)| (k.clone(), value_to_raw(v))).collect())
                        })
                        .collect(),
                });
            }
        }

        Ok(ValueForm {
            model: self.key().to_string(),
            object_count: self.object_ids.len(),
            fields_to_update: self.fields_to_update.clone(),
            fields,
            inlines,
            initial,
        })
    }

    /// Run the chosen updater over the selection
    pub async fn process_change(
        &self,
        form_sets_on: Option<&str>,
        data: &FormData,
        changelist_filters: Option<&str>,
    ) -> Result<ProcessOutcome, UpdateErrorBundle> {
        let updater = MassUpdater::from_flag(form_sets_on);
        let request = UpdateRequest {
            store: self.store,
            admin: &self.admin,
            schema: &self.schema,
            inlines: &self.inlines,
            scope: &self.scope,
            object_ids: &self.object_ids,
            fields_to_update: &self.fields_to_update,
            data,
            user: self.user,
        };

        let report = updater.update(&request).await?;
        info!(
            "{} mass-updated {} {} records ({:?})",
            self.user.username,
            report.records_updated,
            self.key(),
            report.strategy
        );

        Ok(ProcessOutcome {
            message: format!("Mass update successful. Edited {} objects", report.records_updated),
            redirect: self.changelist_url(changelist_filters),
            report,
        })
    }

    /// Changelist URL, keeping the operator's filters
    pub fn changelist_url(&self, changelist_filters: Option<&str>) -> String {
        let base = format!("/admin/{}/{}/", self.key().app, self.key().model);
        match changelist_filters {
            Some(filters) if !filters.is_empty() => format!("{}?{}", base, filters),
            _ => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryRecordStore;
    use crate::database::models::ColumnInfo;
    use crate::schema::RelationSpec;
    use serde_json::json;

    async fn setup(add_globally: bool, opt_in: bool) -> (AdminSite, MemoryRecordStore) {
        let store = MemoryRecordStore::new();
        store.create_table("shop_tag", vec![ColumnInfo::primary_key("id")]).await;
        store.insert_row("shop_tag", json!({})).await.unwrap();
        store.insert_row("shop_tag", json!({})).await.unwrap();
        store
            .create_table(
                "shop_product",
                vec![
                    ColumnInfo::primary_key("id"),
                    ColumnInfo::new("name", "text"),
                    ColumnInfo::new("stock", "int4"),
                    ColumnInfo::new("sku", "text").unique(),
                ],
            )
            .await;
        store.insert_row("shop_product", json!({ "name": "a", "stock": 5, "sku": "a" })).await.unwrap();
        store.insert_row("shop_product", json!({ "name": "b", "stock": 6, "sku": "b" })).await.unwrap();
        store.set_members("shop_product_tags", 1, &[2]).await;

        let mut site = AdminSite::new(add_globally);
        site.register(
            ModelAdmin::new(ModelKey::new("shop", "product").unwrap())
                .with_mass_update(opt_in)
                .relation(RelationSpec {
                    name: "tags".to_string(),
                    target: "shop_tag".to_string(),
                    through: "shop_product_tags".to_string(),
                    source_column: "product_id".to_string(),
                    target_column: "tag_id".to_string(),
                    required: false,
                }),
        )
        .unwrap();
        (site, store)
    }

    fn superuser() -> StaffUser {
        StaffUser { username: "root".to_string(), is_superuser: true, permissions: vec![] }
    }

    fn key() -> ModelKey {
        ModelKey::new("shop", "product").unwrap()
    }

    #[tokio::test]
    async fn unique_fields_are_never_offered() {
        let (site, store) = setup(true, false).await;
        let user = superuser();
        let mut wizard = MassUpdate::new(&site, &store, &key(), &user, vec![1, 2]).await.unwrap();

        let view = wizard.field_selection_view();
        assert_eq!(view.mass_update_fields, vec!["name", "stock", "tags"]);
        assert_eq!(view.unique_fields, vec!["sku"]);
        assert!(matches!(wizard.set_fields_to_update(["sku"]), Err(MassUpdateError::InvalidField(_))));
    }

    #[tokio::test]
    async fn selection_is_replaced_not_accumulated() {
        let (site, store) = setup(true, false).await;
        let user = superuser();
        let mut wizard = MassUpdate::new(&site, &store, &key(), &user, vec![1, 2]).await.unwrap();

        wizard.set_fields_to_update(["name", "stock", "name"]).unwrap();
        assert_eq!(wizard.fields_to_update(), &["name".to_string(), "stock".to_string()]);
        wizard.set_fields_to_update(["tags"]).unwrap();
        assert_eq!(wizard.fields_to_update(), &["tags".to_string()]);
    }

    #[tokio::test]
    async fn value_form_prefills_first_record() {
        let (site, store) = setup(true, false).await;
        let user = superuser();
        let mut wizard = MassUpdate::new(&site, &store, &key(), &user, vec![1, 2]).await.unwrap();
        wizard.set_fields_to_update(["stock", "tags"]).unwrap();

        let form = wizard.value_form_view().await.unwrap();
        assert_eq!(form.initial["stock"], json!("5"));
        assert_eq!(form.initial["tags"], json!(["2"]));
        assert_eq!(form.fields.len(), 2);
    }

    #[tokio::test]
    async fn access_is_checked_before_anything_runs() {
        let (site, store) = setup(false, false).await;
        let root = superuser();
        assert!(matches!(
            MassUpdate::new(&site, &store, &key(), &root, vec![1]).await,
            Err(MassUpdateError::NotEnabled(_))
        ));
        assert!(matches!(
            MassUpdate::new(&site, &store, &ModelKey::new("shop", "order").unwrap(), &root, vec![1]).await,
            Err(MassUpdateError::NotRegistered(_))
        ));

        let (site, store) = setup(false, true).await;
        let clerk = StaffUser { username: "clerk".to_string(), ..Default::default() };
        assert!(matches!(
            MassUpdate::new(&site, &store, &key(), &clerk, vec![1]).await,
            Err(MassUpdateError::PermissionDenied(_))
        ));
        assert!(matches!(
            MassUpdate::new(&site, &store, &key(), &root, vec![]).await,
            Err(MassUpdateError::EmptySelection)
        ));
        assert!(matches!(
            MassUpdate::new(&site, &store, &key(), &root, vec![99]).await,
            Err(MassUpdateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn processes_and_reports_success() {
        let (site, store) = setup(true, false).await;
        let user = superuser();
        let mut wizard = MassUpdate::new(&site, &store, &key(), &user, vec![1, 2]).await.unwrap();
        wizard.set_fields_to_update(["stock"]).unwrap();
        let data: FormData = [("stock", "0")].into_iter().collect();

        let outcome = wizard.process_change(None, &data, Some("q=a")).await.unwrap();
        assert_eq!(outcome.message, "Mass update successful. Edited 2 objects");
        assert_eq!(outcome.redirect, "/admin/shop/product/?q=a");
        assert_eq!(store.row("shop_product", 2).await.unwrap()["stock"], json!(0));
    }
}
