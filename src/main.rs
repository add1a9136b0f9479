//! Bot Catalog Backend
//!
//! REST backend for a community bot catalog with SQLite persistence, pluggable
//! asset storage and Tantivy full-text search.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod search;
mod service;
mod storage;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{AssetBackend, Config, LogFormat};
use search::SearchIndex;
use service::CatalogService;
use storage::{AssetStore, DiskAssetStore, HttpAssetStore, StorageGateway};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Starting Bot Catalog Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (CATALOG_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;

    let assets: Arc<dyn AssetStore> = match &config.asset_backend {
        AssetBackend::Disk { root } => {
            tracing::info!("Asset directory: {:?}", root);
            Arc::new(DiskAssetStore::new(root.clone(), &config.asset_public_url))
        }
        AssetBackend::Http { endpoint, token } => {
            tracing::info!("Asset endpoint: {}", endpoint);
            Arc::new(HttpAssetStore::new(
                endpoint,
                &config.asset_public_url,
                token.clone(),
            ))
        }
    };
    let gateway = Arc::new(StorageGateway::new(pool, assets, config.storage_timeout));

    // Initialize search index
    let search = Arc::new(SearchIndex::open(&config.index_path)?);
    let catalog = CatalogService::new(gateway, search);

    // Build initial search index from database
    tracing::info!("Building search index...");
    let indexed = catalog.rebuild_search().await?;
    tracing::info!("Search index built with {} bots", indexed);

    // Create application state
    let state = AppState {
        catalog,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();
    let max_upload_bytes = state.config.max_upload_bytes;

    // API routes
    let api_routes = Router::new()
        // Catalog
        .route("/catalog/revision", get(api::get_revision))
        // Bots
        .route("/bots", get(api::list_bots).post(api::publish_bot))
        .route("/bots/by-name/{name}", get(api::get_bot_by_name))
        .route(
            "/bots/{id}",
            get(api::get_bot).put(api::edit_bot).delete(api::delete_bot),
        )
        // Interactions
        .route("/bots/{id}/vote", get(api::get_my_vote).post(api::cast_vote))
        .route("/bots/{id}/comments", post(api::add_comment))
        .route("/bots/{id}/interactions", get(api::get_interactions))
        .route("/bots/{id}/events", get(api::bot_events))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let mut open_routes = Router::new().route("/health", get(health_check));
    if let AssetBackend::Disk { root } = &state.config.asset_backend {
        open_routes = open_routes.nest_service("/assets", ServeDir::new(root));
    }

    Router::new()
        .nest("/api", api_routes)
        .merge(open_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod test_support;
