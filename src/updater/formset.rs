//! Safe updater: replays the admin change form on every selected record.

use tracing::{debug, info};

use super::{finish, join_names, MassUpdateError, Strategy, UpdateErrorBundle, UpdateReport, UpdateRequest};
use crate::database::models::ChangeLogEntry;
use crate::database::store::StoreTransaction;
use crate::form::{FormSetSummary, InlineFormSet, RecordForm};
use crate::observer::Operation;

/// Validates and saves each record individually, with its inline formsets,
/// through the full save hooks. Slow but runs every hook and writes a
/// change-log entry per record.
#[derive(Debug, Clone, Default)]
pub struct FormSetMassUpdate;

impl FormSetMassUpdate {
    pub fn new() -> Self {
        Self
    }

    pub async fn update(&self, request: &UpdateRequest<'_>) -> Result<UpdateReport, UpdateErrorBundle> {
        let mut tx = request.store.begin().await?;
        let outcome = self.replay(tx.as_mut(), request).await;
        let records_updated = finish(tx, outcome).await?;

        info!("Form-replay mass update of {} saved {} records", request.schema.table, records_updated);
        Ok(UpdateReport { strategy: Strategy::FormSet, records_updated })
    }

    async fn replay(&self, tx: &mut dyn StoreTransaction, request: &UpdateRequest<'_>) -> Result<usize, UpdateErrorBundle> {
        let admin = request.admin;
        let schema = request.schema;
        let records = tx.select(schema, request.scope, request.object_ids).await?;
        if records.is_empty() {
            return Err(MassUpdateError::NotFound(format!("{} {:?}", schema.table, request.object_ids)).into());
        }

        let selected_inlines: Vec<_> = request
            .inlines
            .iter()
            .filter(|(spec, _)| request.fields_to_update.contains(&spec.prefix()))
            .collect();

        let mut all_formsets: Vec<FormSetSummary> = Vec::new();
        let mut saved = 0;

        for record in records {
            let mut form = RecordForm::new(schema, record.clone(), request.data, request.fields_to_update);
            let form_valid = form.full_clean(tx, &admin.observers).await?;

            // Formsets bind to the updated object when the form is valid,
            // otherwise to the record as loaded
            let new_object = if form_valid { form.save() } else { record };

            let mut formsets = Vec::with_capacity(selected_inlines.len());
            let mut formsets_valid = true;
            for (spec, child_schema) in &selected_inlines {
                let mut formset = InlineFormSet::new(spec, child_schema, &new_object, request.data);
                formsets_valid &= formset.full_clean(tx, &admin.observers).await?;
                formsets.push(formset);
            }
            all_formsets.extend(formsets.iter().map(InlineFormSet::summary));

            if !(form_valid && formsets_valid) {
                debug!("Form replay rejected {:?} in {}", new_object.id(), schema.table);
                return Err(UpdateErrorBundle::validation(form.errors().clone(), all_formsets));
            }

            let changed = form.changed_fields();
            let written = admin.observers.save(tx, schema, new_object, Operation::Update).await?;
            let Some(object_id) = written.id() else {
                return Err(MassUpdateError::NotFound(format!("{} record without id", schema.table)).into());
            };
            form.save_m2m(tx, object_id).await?;

            let mut inline_changes = Vec::new();
            for formset in &formsets {
                let touched = formset.save(tx, &admin.observers).await?;
                if touched > 0 {
                    inline_changes.push((formset.prefix().to_string(), touched));
                }
            }

            let message = change_message(&changed, &inline_changes);
            tx.log_change(&ChangeLogEntry::new(&schema.table, object_id, &request.user.username, message))
                .await?;
            saved += 1;
        }

        Ok(saved)
    }
}

fn change_message(fields: &[String], inlines: &[(String, usize)]) -> String {
    let mut parts = Vec::new();
    if !fields.is_empty() {
        parts.push(format!("Changed {}.", join_names(fields)));
    }
    for (prefix, touched) in inlines {
        parts.push(format!("Changed {} ({} records).", prefix, touched));
    }
    if parts.is_empty() {
        "No fields changed.".to_string()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::{ModelAdmin, ModelKey};
    use crate::database::memory::{MemoryRecordStore, Statement};
    use crate::database::models::ColumnInfo;
    use crate::filter::FilterData;
    use crate::form::{FormData, InlineSpec};
    use crate::middleware::StaffUser;
    use crate::schema::ModelSchema;
    use serde_json::json;

    async fn setup() -> (MemoryRecordStore, ModelAdmin, ModelSchema, Vec<(InlineSpec, ModelSchema)>) {
        let store = MemoryRecordStore::new();
        store
            .create_table(
                "shop_order",
                vec![
                    ColumnInfo::primary_key("id"),
                    ColumnInfo::new("status", "text"),
                    ColumnInfo::new("note", "text").nullable(),
                ],
            )
            .await;
        store
            .create_table(
                "shop_line",
                vec![
                    ColumnInfo::primary_key("id"),
                    ColumnInfo::new("order_id", "int8").references("shop_order"),
                    ColumnInfo::new("qty", "int4"),
                ],
            )
            .await;
        for _ in 0..3 {
            store.insert_row("shop_order", json!({ "status": "new" })).await.unwrap();
        }

        let admin = ModelAdmin::new(ModelKey::new("shop", "order").unwrap())
            .inline(InlineSpec::new("shop_line", "order_id"));
        let schema = admin.describe(&store).await.unwrap();
        let inlines = admin.describe_inlines(&store).await.unwrap();
        (store, admin, schema, inlines)
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn saves_each_record_and_logs_changes() {
        let (store, admin, schema, inlines) = setup().await;
        let data: FormData = [("status", "shipped"), ("note", "")].into_iter().collect();
        let selection = fields(&["status", "note"]);
        let user = StaffUser { username: "alice".to_string(), ..Default::default() };
        let request = UpdateRequest {
            store: &store,
            admin: &admin,
            schema: &schema,
            inlines: &inlines,
            scope: &FilterData::all(),
            object_ids: &[1, 2, 3],
            fields_to_update: &selection,
            data: &data,
            user: &user,
        };

        let report = FormSetMassUpdate::new().update(&request).await.unwrap();
        assert_eq!(report.records_updated, 3);

        for id in 1..=3 {
            assert_eq!(store.row("shop_order", id).await.unwrap()["status"], json!("shipped"));
        }
        let log = store.change_log().await;
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].user_name, "alice");
        assert_eq!(log[0].change_message, "Changed status.");
        assert!(store.journal().await.iter().all(|s| !matches!(s, Statement::UpdateMany { .. })));
    }

    #[tokio::test]
    async fn inline_failure_rolls_back_every_record() {
        let (store, admin, schema, inlines) = setup().await;
        store.insert_row("shop_line", json!({ "order_id": 1, "qty": 1 })).await.unwrap();

        // Line 1 belongs to order 1: order 1 saves, order 2 fails on the foreign child
        let data: FormData = [
            ("status", "packed"),
            ("shop_line_set-TOTAL_FORMS", "1"),
            ("shop_line_set-INITIAL_FORMS", "1"),
            ("shop_line_set-0-id", "1"),
            ("shop_line_set-0-qty", "3"),
        ]
        .into_iter()
        .collect();
        let selection = fields(&["status", "shop_line_set"]);
        let user = StaffUser::default();
        let request = UpdateRequest {
            store: &store,
            admin: &admin,
            schema: &schema,
            inlines: &inlines,
            scope: &FilterData::all(),
            object_ids: &[1, 2],
            fields_to_update: &selection,
            data: &data,
            user: &user,
        };

        let bundle = FormSetMassUpdate::new().update(&request).await.unwrap_err();
        assert!(bundle.is_validation());
        assert_eq!(bundle.formsets.len(), 2);
        assert!(bundle.error_list.unwrap().messages().iter().any(|m| m.starts_with("shop_line_set-0-id")));

        assert_eq!(store.row("shop_order", 1).await.unwrap()["status"], json!("new"));
        assert_eq!(store.row("shop_line", 1).await.unwrap()["qty"], json!(1));
        assert!(store.change_log().await.is_empty());
        assert_eq!(store.journal().await.last(), Some(&Statement::Rollback));
    }

    #[test]
    fn change_messages_name_changed_fields() {
        assert_eq!(change_message(&[], &[]), "No fields changed.");
        assert_eq!(
            change_message(&fields(&["status", "note"]), &[("shop_line_set".to_string(), 2)]),
            "Changed status and note. Changed shop_line_set (2 records)."
        );
    }
}
