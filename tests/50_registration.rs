mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_unregistered_model_is_not_found() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;

    let res = server.action(&token, "tag", json!({ "_selected_action": [1] })).await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_added_globally_covers_every_registered_model() -> Result<()> {
    let server = common::TestServer::start_with(true).await?;
    let token = common::superuser_token()?;

    let res = server.action(&token, "category", json!({ "_selected_action": [1, 2] })).await?;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    Ok(())
}

#[tokio::test]
async fn test_opt_in_is_required_when_not_added_globally() -> Result<()> {
    let server = common::TestServer::start_with(false).await?;
    let token = common::superuser_token()?;

    let res = server.action(&token, "category", json!({ "_selected_action": [1] })).await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // shop.product opts in explicitly
    let res = server.action(&token, "product", json!({ "_selected_action": [1] })).await?;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    Ok(())
}

#[tokio::test]
async fn test_empty_selection_is_rejected() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;

    let res = server.action(&token, "product", json!({ "_selected_action": [] })).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_missing_first_record_is_not_found() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;

    let res = server.action(&token, "product", json!({ "_selected_action": [999] })).await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_invalid_model_path_is_not_found() -> Result<()> {
    let server = common::TestServer::start().await?;
    let token = common::superuser_token()?;

    let res = server.action(&token, "no%20such", json!({ "_selected_action": [1] })).await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}
