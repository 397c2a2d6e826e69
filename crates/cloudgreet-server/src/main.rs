//! CloudGreet - Outreach service entry point

use anyhow::Result;
use chrono::Utc;
use cloudgreet_api::auth::hash_api_key;
use cloudgreet_api::AppState;
use cloudgreet_common::config::{Config, LoggingConfig};
use cloudgreet_core::{CredentialCipher, Dispatchers, SequenceWorker};
use cloudgreet_storage::models::ApiKey;
use cloudgreet_storage::{create_store, Store};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    init_logging(&config.logging);

    info!("Starting CloudGreet outreach service...");

    let store = create_store(&config.database).await?;
    info!(backend = store.backend_name(), "Store initialized");

    if store.backend_name() == "memory" {
        seed_dev_api_key(&store, &config).await?;
    }

    let cipher = CredentialCipher::from_config(config.security.encryption_key.as_deref())?;

    let cancel = CancellationToken::new();

    // Start the sequence worker
    let worker_handle = if config.scheduler.enabled {
        let dispatchers = Dispatchers::from_config(&config.dispatch, &config.server.hostname)?;
        let worker = SequenceWorker::new(store.clone(), dispatchers)?.with_config(&config.scheduler);
        let token = cancel.clone();
        info!(
            poll_interval_secs = config.scheduler.poll_interval_secs,
            concurrency = config.scheduler.concurrency,
            "Starting sequence worker"
        );
        Some(tokio::spawn(async move {
            worker.run(token).await;
        }))
    } else {
        info!("Sequence worker disabled");
        None
    };

    // Start API server
    let app = cloudgreet_api::create_router(AppState::new(store, cipher), &config.api.cors_origins);
    let addr = format!("{}:{}", config.server.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Starting API server");

    let shutdown = cancel.clone();
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "Failed to listen for shutdown signal");
                    }
                    info!("Shutdown signal received");
                }
                _ = shutdown.cancelled() => {}
            }
        })
        .await;

    if let Err(e) = &serve_result {
        error!(error = %e, "API server error");
    }

    cancel.cancel();
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Sequence worker task failed");
        }
    }

    info!("CloudGreet shutdown complete");

    serve_result.map_err(Into::into)
}

/// Insert the configured development key into the memory store
async fn seed_dev_api_key(store: &Store, config: &Config) -> Result<()> {
    let Some(key) = config.api.dev_api_key.as_deref() else {
        warn!("Memory backend without api.dev_api_key; admin routes will reject every request");
        return Ok(());
    };
    let Some(prefix) = key.get(..8) else {
        anyhow::bail!("api.dev_api_key must be at least 8 characters");
    };

    let tenant_id = config.api.dev_tenant_id.unwrap_or_else(Uuid::new_v4);
    store
        .api_keys
        .insert(ApiKey {
            id: Uuid::new_v4(),
            tenant_id,
            name: "development".to_string(),
            key_hash: hash_api_key(key),
            key_prefix: prefix.to_string(),
            scopes: vec!["*".to_string()],
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        })
        .await?;

    info!(tenant_id = %tenant_id, "Seeded development API key");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},cloudgreet=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
