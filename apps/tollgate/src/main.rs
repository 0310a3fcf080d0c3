use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

mod cli;

use tollgate_common::{GlobalConfig, PricingTable};
use tollgate_core::gate::DEFAULT_CACHE_TTL;
use tollgate_core::{QuotaGate, UpstreamClient, UpstreamClientConfig, UsageMeter, WreqUpstreamClient};
use tollgate_router::{HealthProbe, ProxyState, proxy_router};
use tollgate_storage::MeterStorage;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("tollgate failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Cli::parse().into_patch().into_config()?;
    let pricing = load_pricing(&config)?;

    let storage = MeterStorage::connect(&config.dsn).await?;
    info!(dsn = %config.dsn, "db connected");
    storage.sync().await?;
    storage.ensure_plans().await?;
    info!("schema synced, plans ensured");

    let store = Arc::new(storage.clone());
    let gate = Arc::new(QuotaGate::new(store.clone(), DEFAULT_CACHE_TTL));
    let meter = Arc::new(UsageMeter::new(store, gate.clone(), pricing));
    let client: Arc<dyn UpstreamClient> =
        Arc::new(WreqUpstreamClient::new(UpstreamClientConfig::default())?);

    info!(
        upstream = %config.upstream_base_url,
        public_base_path = %config.public_base_path,
        "upstream configured"
    );

    let bind = format!("{}:{}", config.host, config.port);
    let app = proxy_router(ProxyState {
        gate,
        meter,
        client,
        health: Arc::new(StorageHealth(storage)),
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn load_pricing(config: &GlobalConfig) -> Result<PricingTable, Box<dyn Error + Send + Sync>> {
    let Some(path) = config.pricing_file.as_deref() else {
        return Ok(PricingTable::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let table = serde_json::from_str(&raw)?;
    info!(path, "pricing table loaded");
    Ok(table)
}

struct StorageHealth(MeterStorage);

impl HealthProbe for StorageHealth {
    fn check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async {
            match tokio::time::timeout(Duration::from_secs(5), self.0.health()).await {
                Ok(Ok(())) => true,
                _ => false,
            }
        })
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "shutdown signal listener failed");
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tollgate=info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
