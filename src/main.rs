// Initialize configuration
// Set up logging
// Connect to the node
// Start the block source and shared service
// Start HTTP server

use chain_history_bridge::{
    api,
    blockchain::{ChainClient, EosRpcClient, PollingBlockSource},
    cache,
    config::Config,
    service::NodeService,
    state::AppState,
};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting chain-history-bridge");

    let config = Config::from_env();
    tracing::info!("Configuration loaded: {:?}", config);

    let client: Arc<dyn ChainClient> = Arc::new(EosRpcClient::new(&config)?);
    let head = client.get_info().await?;
    tracing::info!(
        "Connected to chain {} at block {}",
        head.chain_id,
        head.head_block_num
    );

    let shutdown = CancellationToken::new();
    let source = Arc::new(PollingBlockSource::new(
        client.clone(),
        config.poll_interval,
        shutdown.clone(),
    ));

    let block_cache = cache::init_block_cache(&config);
    tracing::info!(
        "Block time cache initialized with TTL: {:?} and capacity: {}",
        config.block_cache_ttl,
        config.block_cache_capacity
    );

    let service = Arc::new(NodeService::new(
        &config,
        client,
        source,
        block_cache,
        shutdown.clone(),
    ));

    let app_state = Arc::new(AppState { service });

    let app = api::create_router(app_state).layer(CorsLayer::permissive());
    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
    shutdown.cancel();
}
