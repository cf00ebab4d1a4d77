mod common;

use anyhow::Result;
use reqwest::{header::LOCATION, StatusCode};
use serde_json::{json, Value};

use mass_update_rust::mass_update::session_key;

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_action_redirects_to_content_addressed_session() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;

    let res = server
        .action(&token, "product", json!({ "_selected_action": [3, 4], "_changelist_filters": "q=a&o=1" }))
        .await?;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let location = res.headers().get(LOCATION).expect("Location header").to_str()?.to_string();
    let expected = format!(
        "/mass-update/shop/product/{}?_changelist_filters=q%3Da%26o%3D1",
        session_key(&[3, 4])
    );
    assert_eq!(location, expected);

    // Same ids, same key
    let again = server.start_wizard(&token, &[3, 4]).await?;
    assert_eq!(again, format!("/mass-update/shop/product/{}", session_key(&[3, 4])));
    Ok(())
}

#[tokio::test]
async fn test_field_selection_step() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;

    let res = server
        .action(&token, "product", json!({ "_selected_action": [1, 2, 3], "_changelist_filters": "q=a" }))
        .await?;
    let location = res.headers().get(LOCATION).expect("Location header").to_str()?.to_string();

    let (status, body) = server.get(&token, &location).await?;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);

    let data = &body["data"];
    assert_eq!(data["step"], "select_fields");
    assert_eq!(data["changelist_filters"], "q=a");

    let selection = &data["selection"];
    assert_eq!(selection["model"], "shop.product");
    assert_eq!(selection["object_count"], 3);
    assert_eq!(selection["is_superuser"], true);

    let fields = strings(&selection["mass_update_fields"]);
    assert!(fields.contains(&"stock".to_string()));
    assert!(fields.contains(&"tags".to_string()));
    assert!(!fields.contains(&"sku".to_string()), "unique fields are never offered");
    assert!(!fields.contains(&"id".to_string()));
    assert_eq!(strings(&selection["unique_fields"]), vec!["sku"]);
    assert_eq!(strings(&selection["inline_prefixes"]), vec!["shop_variant_set"]);
    Ok(())
}

#[tokio::test]
async fn test_value_form_prefills_first_record() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;
    let location = server.start_wizard(&token, &[1, 2]).await?;

    let (status, body) = server
        .post(&token, &location, json!({ "to_update": ["stock", "tags", "shop_variant_set"] }))
        .await?;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);

    let data = &body["data"];
    assert_eq!(data["step"], "values");
    assert_eq!(data["mass_update"], "stock,tags,shop_variant_set");

    let form = &data["form"];
    assert_eq!(form["object_count"], 2);
    assert_eq!(form["initial"]["stock"], "10");
    assert_eq!(form["initial"]["tags"], json!(["1"]));

    let inline = &form["inlines"][0];
    assert_eq!(inline["prefix"], "shop_variant_set");
    assert_eq!(inline["initial"][0]["label"], "default");
    assert_eq!(inline["initial"][0]["qty"], "1");
    Ok(())
}

#[tokio::test]
async fn test_selection_is_replaced_not_accumulated() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;
    let location = server.start_wizard(&token, &[1, 2]).await?;

    server.post(&token, &location, json!({ "to_update": ["stock", "name"] })).await?;
    let (status, body) = server.post(&token, &location, json!({ "to_update": ["active"] })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(strings(&body["data"]["form"]["fields_to_update"]), vec!["active"]);
    Ok(())
}

#[tokio::test]
async fn test_unknown_field_is_rejected() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;
    let location = server.start_wizard(&token, &[1]).await?;

    let (status, _) = server.post(&token, &location, json!({ "to_update": ["sku"] })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.post(&token, &location, json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_unknown_session_is_not_found() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;

    let (status, _) = server.get(&token, "/mass-update/shop/product/session-missing").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_process_reports_and_redirects() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;
    let location = server.start_wizard(&token, &[1, 2, 3]).await?;

    let (status, body) = server
        .post(
            &token,
            &location,
            json!({
                "mass_update": "stock",
                "data": { "stock": "7" },
                "_changelist_filters": "q=a",
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);

    let data = &body["data"];
    assert_eq!(data["step"], "done");
    assert_eq!(data["message"], "Mass update successful. Edited 3 objects");
    assert_eq!(data["redirect"], "/admin/shop/product/?q=a");
    assert_eq!(data["report"]["strategy"], "fast");
    Ok(())
}

#[tokio::test]
async fn test_finished_wizard_releases_its_selection() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;
    let location = server.start_wizard(&token, &[1, 2]).await?;

    let (status, _) = server
        .post(&token, &location, json!({ "mass_update": "stock", "data": { "stock": "4" } }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server.get(&token, &location).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_rejected_submission_keeps_its_selection() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;
    let location = server.start_wizard(&token, &[1, 2]).await?;

    let (status, _) = server
        .post(&token, &location, json!({ "mass_update": "stock", "data": { "stock": "many" } }))
        .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = server.get(&token, &location).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_submitted_values_come_back_as_initial_values() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;
    let location = server.start_wizard(&token, &[1, 2]).await?;

    let (status, body) = server
        .post(&token, &location, json!({ "mass_update": "name,stock", "data": { "name": "1", "stock": "2" } }))
        .await?;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);

    // A new wizard over the same records shows the submitted values
    let location = server.start_wizard(&token, &[1, 2]).await?;
    let (status, body) = server.post(&token, &location, json!({ "to_update": ["name", "stock"] })).await?;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);
    assert_eq!(body["data"]["form"]["initial"], json!({ "name": "1", "stock": "2" }));

    let location = server.start_wizard(&token, &[2, 1]).await?;
    let (_, body) = server.post(&token, &location, json!({ "to_update": ["name", "stock"] })).await?;
    assert_eq!(body["data"]["form"]["initial"], json!({ "name": "1", "stock": "2" }));
    Ok(())
}

#[tokio::test]
async fn test_resubmitting_initial_values_leaves_records_unchanged() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;
    let location = server.start_wizard(&token, &[1, 2]).await?;

    let (_, body) = server.post(&token, &location, json!({ "to_update": ["name", "stock", "active"] })).await?;
    let initial = body["data"]["form"]["initial"].clone();

    let before = server.product(2).await?;
    let (status, body) = server
        .post(&token, &location, json!({ "mass_update": "stock,active", "data": initial }))
        .await?;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);

    let after = server.product(2).await?;
    assert_eq!(before["stock"], after["stock"]);
    assert_eq!(before["active"], after["active"]);
    assert_eq!(before["name"], after["name"]);
    Ok(())
}
