#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::LOCATION, StatusCode};
use serde_json::Value;

use mass_update_rust::admin::{AdminSite, ModelAdmin, ModelKey};
use mass_update_rust::auth::{generate_jwt, Claims};
use mass_update_rust::database::MemoryRecordStore;
use mass_update_rust::demo;
use mass_update_rust::handlers::AppState;
use mass_update_rust::observer::{Observer, ObserverContext, ObserverError, ObserverRing};

/// Counts model-validation runs for `shop.product`
pub struct CountingValidator {
    pub count: Arc<AtomicUsize>,
}

#[async_trait]
impl Observer for CountingValidator {
    fn name(&self) -> &'static str {
        "CountingValidator"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::ModelValidation
    }

    async fn execute(&self, _ctx: &mut ObserverContext<'_>) -> Result<(), ObserverError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Rejects products whose name starts with "Locked"
pub struct LockedProducts;

#[async_trait]
impl Observer for LockedProducts {
    fn name(&self) -> &'static str {
        "LockedProducts"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::ModelValidation
    }

    async fn execute(&self, ctx: &mut ObserverContext<'_>) -> Result<(), ObserverError> {
        let locked = ctx
            .record
            .get("name")
            .and_then(Value::as_str)
            .map(|name| name.starts_with("Locked"))
            .unwrap_or(false);
        if locked {
            ctx.add_error(ObserverError::ValidationError("This product is locked.".to_string()));
        }
        Ok(())
    }
}

/// In-process server over the seeded catalogue
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub store: MemoryRecordStore,
    pub validations: Arc<AtomicUsize>,
    pub client: reqwest::Client,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        Self::start_with(true).await
    }

    pub async fn start_with(add_globally: bool) -> Result<Self> {
        let store = demo::seeded_store().await?;
        let validations = Arc::new(AtomicUsize::new(0));

        let mut site = AdminSite::new(add_globally);
        site.register(
            demo::product_admin()?
                .observer(Arc::new(CountingValidator { count: validations.clone() }))
                .observer(Arc::new(LockedProducts)),
        )?;
        site.register(ModelAdmin::new(ModelKey::new("shop", "category")?))?;

        let app = mass_update_rust::app(AppState::new(site, Arc::new(store.clone())));

        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("test server stopped: {}", e);
            }
        });

        // Keep redirects visible to the tests
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let server = Self { port, base_url: format!("http://127.0.0.1:{}", port), store, validations, client };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn validation_count(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    /// Changelist action; returns the raw response
    pub async fn action(&self, token: &str, model: &str, body: Value) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url(&format!("/admin/shop/{}/mass-update", model)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?)
    }

    /// Run the action for `ids` and return the wizard path it redirects to
    pub async fn start_wizard(&self, token: &str, ids: &[i64]) -> Result<String> {
        let res = self.action(token, "product", serde_json::json!({ "_selected_action": ids })).await?;
        anyhow::ensure!(res.status() == StatusCode::SEE_OTHER, "expected 303, got {}", res.status());
        let location = res
            .headers()
            .get(LOCATION)
            .context("missing Location header")?
            .to_str()?
            .to_string();
        Ok(location)
    }

    pub async fn get(&self, token: &str, path: &str) -> Result<(StatusCode, Value)> {
        let res = self.client.get(self.url(path)).bearer_auth(token).send().await?;
        let status = res.status();
        Ok((status, res.json::<Value>().await?))
    }

    pub async fn post(&self, token: &str, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        let res = self.client.post(self.url(path)).bearer_auth(token).json(&body).send().await?;
        let status = res.status();
        Ok((status, res.json::<Value>().await?))
    }

    pub async fn product(&self, id: i64) -> Result<serde_json::Map<String, Value>> {
        self.store.row("shop_product", id).await.context("product missing")
    }
}

pub fn superuser_token() -> Result<String> {
    token(Claims::new("root", true, true, vec![]))
}

pub fn clerk_token(permissions: &[&str]) -> Result<String> {
    token(Claims::new("clerk", true, false, permissions.iter().map(|p| p.to_string()).collect()))
}

pub fn customer_token() -> Result<String> {
    token(Claims::new("customer", false, false, vec![]))
}

fn token(claims: Claims) -> Result<String> {
    Ok(generate_jwt(&claims)?)
}
