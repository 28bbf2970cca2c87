use anyhow::{Context, Result};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use autocatalog_rust::{
    config::Settings,
    filter_codec::FilterCodec,
    routes,
    search_api::{self, HttpSearchBackend},
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file first. Ignore errors (e.g., file not found)
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "autocatalog_rust=info,tower_http=info".into()))
        .with(fmt::layer())
        .init();

    tracing::info!("Initializing catalog server...");

    // Load configuration
    let settings = match Settings::new() {
        Ok(s) => {
            tracing::info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let codec = FilterCodec::new(settings.filter_defaults()?);

    // The client picks up HTTP_PROXY/HTTPS_PROXY from the environment
    let http_client = search_api::build_client(settings.fetch_timeout())?;
    let backend = HttpSearchBackend::new(http_client, settings.search_api_url.clone());
    tracing::info!("Search backend: {}", settings.search_api_url);

    let addr: SocketAddr = settings
        .server_address
        .parse()
        .with_context(|| format!("Invalid server address format: {}", settings.server_address))?;

    let app_state = AppState {
        settings: Arc::new(settings),
        codec: Arc::new(codec),
        backend: Arc::new(backend),
    };
    let app = routes::create_router(app_state);

    // Create a TCP listener
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => {
            tracing::info!("Server listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
