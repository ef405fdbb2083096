use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use route_preload::config::{Cli, Config};
use route_preload::query::client::{QueryClient, QueryOptions};
use route_preload::routes::app_routes;
use route_preload::rpc::transport::HttpTransport;
use route_preload::rpc::utils::ApiUtils;
use route_preload::server::api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "route_preload=debug,tower_http=debug"
    } else {
        "route_preload=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("route-preload v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);
    let config = Arc::new(config);

    info!(
        rpc = %config.rpc.base_url,
        stale_time_ms = ?config.cache.stale_time_ms,
        revalidate_if_stale = config.cache.revalidate_if_stale,
        "Configuration loaded"
    );

    // The one query cache for the whole process.
    let client = QueryClient::new(QueryOptions::from(&config.cache))?;
    let transport = Arc::new(HttpTransport::from_config(&config.rpc)?);
    let api = ApiUtils::new(client, transport);
    let routes = app_routes(&api);

    info!(routes = ?routes.paths(), "Routes registered");

    let state = Arc::new(AppState {
        api,
        routes,
        config: config.clone(),
        start_time: Instant::now(),
    });

    let app = build_router(state);

    let listen_addr = config.server.listen.clone();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
