//! YAML model registrations.
//!
//! ```yaml
//! add_globally: false
//! models:
//!   - app: shop
//!     model: product
//!     mass_update: true
//!     readonly_fields: [slug]
//!     mass_update_queryset:
//!       where: { archived: false }
//!     relations:
//!       - { name: tags, target: shop_tag, through: shop_product_tags,
//!           source_column: product_id, target_column: tag_id }
//!     inlines:
//!       - { table: shop_variant, fk_column: product_id }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::{AdminError, AdminSite, ModelAdmin, ModelKey};
use crate::filter::{FilterData, FilterWhere};
use crate::form::InlineSpec;
use crate::middleware::StaffUser;
use crate::schema::RelationSpec;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteConfig {
    /// Overrides the configured setting when present
    #[serde(default)]
    pub add_globally: Option<bool>,
    #[serde(default)]
    pub models: Vec<ModelRegistration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelRegistration {
    pub app: String,
    pub model: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub mass_update: bool,
    #[serde(default)]
    pub readonly_fields: Vec<String>,
    #[serde(default)]
    pub queryset: Option<FilterData>,
    #[serde(default)]
    pub mass_update_queryset: Option<FilterData>,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
    #[serde(default)]
    pub inlines: Vec<InlineSpec>,
}

impl SiteConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, AdminError> {
        serde_yaml::from_str(yaml).map_err(|e| AdminError::Registry(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AdminError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| AdminError::Registry(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    /// Build a site from these registrations
    pub fn into_site(self, default_add_globally: bool) -> Result<AdminSite, AdminError> {
        let mut site = AdminSite::new(self.add_globally.unwrap_or(default_add_globally));
        for registration in self.models {
            site.register(registration.into_admin()?)?;
        }
        Ok(site)
    }
}

impl ModelRegistration {
    fn into_admin(self) -> Result<ModelAdmin, AdminError> {
        let key = ModelKey::new(self.app, self.model)?;
        let mut admin = ModelAdmin::new(key).with_mass_update(self.mass_update);

        if let Some(table) = self.table {
            admin = admin.table(table);
        }
        for field in self.readonly_fields {
            admin = admin.readonly(field);
        }
        for relation in self.relations {
            admin = admin.relation(relation);
        }
        for inline in self.inlines {
            admin = admin.inline(inline);
        }
        if let Some(queryset) = self.queryset {
            validate_queryset(&queryset)?;
            admin = admin.queryset(queryset);
        }
        if let Some(queryset) = self.mass_update_queryset {
            validate_queryset(&queryset)?;
            admin = admin.mass_update_queryset(Arc::new(move |_: &StaffUser| queryset.clone()));
        }
        Ok(admin)
    }
}

fn validate_queryset(queryset: &FilterData) -> Result<(), AdminError> {
    match &queryset.where_clause {
        Some(where_clause) => FilterWhere::validate(where_clause).map_err(|e| AdminError::Registry(e.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
add_globally: false
models:
  - app: shop
    model: product
    mass_update: true
    readonly_fields: [slug]
    mass_update_queryset:
      where: { archived: false }
    relations:
      - name: tags
        target: shop_tag
        through: shop_product_tags
        source_column: product_id
        target_column: tag_id
    inlines:
      - table: shop_variant
        fk_column: product_id
  - app: shop
    model: order
    table: orders
"#;

    #[test]
    fn loads_registrations() {
        let site = SiteConfig::from_yaml_str(YAML).unwrap().into_site(true).unwrap();
        assert!(!site.add_globally());

        let product = site.get(&ModelKey::new("shop", "product").unwrap()).unwrap();
        assert_eq!(product.table, "shop_product");
        assert_eq!(product.readonly_fields, vec!["slug".to_string()]);
        assert_eq!(product.relations[0].through, "shop_product_tags");
        assert_eq!(product.inline_prefixes(), vec!["shop_variant_set".to_string()]);
        assert!(product.inlines[0].can_delete);
        assert_eq!(
            product.get_mass_update_queryset(&StaffUser::default()).where_clause,
            Some(serde_json::json!({ "archived": false }))
        );

        let order = site.get(&ModelKey::new("shop", "order").unwrap()).unwrap();
        assert_eq!(order.table, "orders");
        assert!(!site.is_mass_update_enabled(&order));
        assert!(site.is_mass_update_enabled(&product));
    }

    #[test]
    fn rejects_bad_querysets() {
        let yaml = r#"
models:
  - app: shop
    model: product
    queryset:
      where: { "bad column": 1 }
"#;
        assert!(matches!(
            SiteConfig::from_yaml_str(yaml).unwrap().into_site(true),
            Err(AdminError::Registry(_))
        ));
    }
}
