//! Seeded in-memory catalogue for `--memory` runs.

use serde_json::json;

use crate::admin::{AdminError, AdminSite, ModelAdmin, ModelKey};
use crate::database::manager::DatabaseError;
use crate::database::memory::MemoryRecordStore;
use crate::database::models::ColumnInfo;
use crate::form::InlineSpec;
use crate::schema::RelationSpec;

pub const DEMO_PRODUCTS: i64 = 25;

/// Store with categories, tags, products and variants, and a site
/// registering `shop.product` with its tags and variants
pub async fn seeded(add_globally: bool) -> Result<(AdminSite, MemoryRecordStore), AdminError> {
    let store = seeded_store().await?;

    let mut site = AdminSite::new(add_globally);
    site.register(product_admin()?)?;
    site.register(ModelAdmin::new(ModelKey::new("shop", "category")?))?;

    Ok((site, store))
}

/// `shop.product`, opted in, with its tags relation and variant inline
pub fn product_admin() -> Result<ModelAdmin, AdminError> {
    Ok(ModelAdmin::new(ModelKey::new("shop", "product")?)
        .with_mass_update(true)
        .relation(RelationSpec {
            name: "tags".to_string(),
            target: "shop_tag".to_string(),
            through: "shop_product_tags".to_string(),
            source_column: "product_id".to_string(),
            target_column: "tag_id".to_string(),
            required: false,
        })
        .inline(InlineSpec::new("shop_variant", "product_id")))
}

pub async fn seeded_store() -> Result<MemoryRecordStore, DatabaseError> {
    let store = MemoryRecordStore::new();
    seed_tables(&store).await?;
    Ok(store)
}

async fn seed_tables(store: &MemoryRecordStore) -> Result<(), DatabaseError> {
    store
        .create_table(
            "shop_category",
            vec![ColumnInfo::primary_key("id"), ColumnInfo::new("name", "varchar").max_length(50)],
        )
        .await;
    store
        .create_table(
            "shop_tag",
            vec![ColumnInfo::primary_key("id"), ColumnInfo::new("label", "varchar").max_length(30)],
        )
        .await;
    store
        .create_table(
            "shop_product",
            vec![
                ColumnInfo::primary_key("id"),
                ColumnInfo::new("name", "varchar").max_length(100),
                ColumnInfo::new("sku", "varchar").max_length(32).unique(),
                ColumnInfo::new("price", "numeric").nullable(),
                ColumnInfo::new("stock", "int4"),
                ColumnInfo::new("active", "bool").with_default(),
                ColumnInfo::new("category_id", "int8").nullable().references("shop_category"),
                ColumnInfo::new("updated_at", "timestamptz").nullable(),
            ],
        )
        .await;
    store
        .create_table(
            "shop_variant",
            vec![
                ColumnInfo::primary_key("id"),
                ColumnInfo::new("product_id", "int8").references("shop_product"),
                ColumnInfo::new("label", "varchar").max_length(30),
                ColumnInfo::new("qty", "int4"),
            ],
        )
        .await;

    for name in ["Tools", "Garden"] {
        store.insert_row("shop_category", json!({ "name": name })).await?;
    }
    for label in ["new", "sale", "clearance"] {
        store.insert_row("shop_tag", json!({ "label": label })).await?;
    }
    for i in 1..=DEMO_PRODUCTS {
        store
            .insert_row(
                "shop_product",
                json!({
                    "name": format!("Product {}", i),
                    "sku": format!("SKU-{:04}", i),
                    "price": "9.99",
                    "stock": 10,
                    "active": true,
                    "category_id": 1 + i % 2,
                }),
            )
            .await?;
        store.insert_row("shop_variant", json!({ "product_id": i, "label": "default", "qty": 1 })).await?;
    }
    store.set_members("shop_product_tags", 1, &[1]).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_registered_catalogue() {
        let (site, store) = seeded(false).await.unwrap();
        let product = site.get(&ModelKey::new("shop", "product").unwrap()).unwrap();
        let category = site.get(&ModelKey::new("shop", "category").unwrap()).unwrap();

        assert!(site.is_mass_update_enabled(&product));
        assert!(!site.is_mass_update_enabled(&category));
        assert_eq!(store.rows("shop_product").await.len() as i64, DEMO_PRODUCTS);

        let schema = product.describe(&store).await.unwrap();
        assert!(schema.is_unique("sku"));
        assert!(schema.is_multivalued_relation("tags"));
    }
}
