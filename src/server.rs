//! Process bootstrap: configuration, wiring, HTTP serving, shutdown.
//!
//! Startup wires key material, the chain client, the proof client, the task
//! queue, the pending store and the pipeline, then serves the API. Teardown
//! runs in reverse: stop accepting HTTP, then drain the queue.

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::api::{self, AppState};
use crate::chain::{RegistryClient, RegistryOps};
use crate::config::Config;
use crate::issuer::IssuerService;
use crate::keys::KeyMaterial;
use crate::proof::MerkleProofClient;
use crate::queue::{TaskQueue, DEFAULT_CAPACITY};
use crate::store::PendingStore;

/// Run the issuer until SIGINT or SIGTERM.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    // A missing .env file is fine; variables may come from the environment.
    let _ = dotenvy::dotenv();

    info!("Starting certificate issuer v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Registry: {}", config.registry_address);
    info!("  Node: {}", config.node);
    info!("  Proof service: {}", config.merkle_proof_service.url);

    let keys = Arc::new(KeyMaterial::from_env()?);
    info!("  Provider address: {}", keys.provider_address());

    let registry = Arc::new(
        RegistryClient::connect(
            &config.node,
            config.registry_address,
            keys.provider_key().clone(),
        )
        .await?,
    );
    info!("  Chain ID: {}", RegistryOps::chain_id(registry.as_ref()));

    let proof_source = Arc::new(
        MerkleProofClient::connect(
            &config.merkle_proof_service.url,
            config.merkle_proof_service.tls,
        )
        .await?,
    );

    let queue = TaskQueue::new(DEFAULT_CAPACITY);
    let store = Arc::new(PendingStore::new());
    let issuer = Arc::new(IssuerService::new(
        registry,
        proof_source,
        keys,
        queue.clone(),
    ));

    let state = AppState {
        issuer,
        store,
    };
    let app = build_router(&config)?.with_state(state);

    let listen_addr = format!("{}:{}", config.api.host, config.api.port);
    info!("Starting HTTP server on {listen_addr}");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining task queue");
    queue.close().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

fn build_router(config: &Config) -> anyhow::Result<Router<AppState>> {
    let mut router = api::router().layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        let allow_origin = if config.api.cors_origin.is_empty() || config.api.cors_origin == "*" {
            AllowOrigin::any()
        } else {
            AllowOrigin::exact(
                config
                    .api
                    .cors_origin
                    .parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("invalid CORS origin: {e}"))?,
            )
        };
        router = router.layer(
            CorsLayer::new()
                .allow_origin(allow_origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        );
    }

    Ok(router)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Gracefully stopping");
}
