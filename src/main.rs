use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mass_update_rust::admin::{AdminSite, SiteConfig};
use mass_update_rust::config::config;
use mass_update_rust::database::{PgRecordStore, RecordStore};
use mass_update_rust::handlers::AppState;

#[derive(Parser)]
#[command(name = "mass-update")]
#[command(about = "Admin mass-update service")]
#[command(version)]
struct Args {
    #[arg(long, help = "Port to listen on (overrides MASS_UPDATE_PORT / PORT)")]
    port: Option<u16>,

    #[arg(long, help = "YAML file with model registrations (overrides MASS_UPDATE_REGISTRY)")]
    registry: Option<PathBuf>,

    #[arg(long, help = "Serve a seeded in-memory catalogue instead of PostgreSQL")]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL and friends are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = config();
    tracing::info!("Starting mass-update in {:?} mode", config.environment);

    let (site, store): (AdminSite, Arc<dyn RecordStore>) = if args.memory {
        let (site, store) = mass_update_rust::demo::seeded(config.mass_update.add_globally).await?;
        tracing::info!("Serving seeded in-memory catalogue");
        (site, Arc::new(store))
    } else {
        let registry = args.registry.or_else(|| config.mass_update.registry_path.clone().map(PathBuf::from));
        let site = match registry {
            Some(path) => SiteConfig::load(&path)
                .and_then(|site_config| site_config.into_site(config.mass_update.add_globally))
                .with_context(|| format!("loading registry {}", path.display()))?,
            None => {
                tracing::warn!("No registry configured; no models are registered");
                AdminSite::from_config()
            }
        };
        let store = PgRecordStore::connect().await.context("connecting to the database")?;
        (site, Arc::new(store))
    };

    let app = mass_update_rust::app(AppState::new(site, store));

    let port = args.port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("mass-update listening on http://{}", bind_addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
