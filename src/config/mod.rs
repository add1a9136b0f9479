//! Configuration module for the bot catalog.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

/// Where uploaded images and archives are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetBackend {
    /// Local directory, served back under `/assets`
    Disk { root: PathBuf },
    /// S3-style object endpoint reached over HTTP
    Http {
        endpoint: String,
        token: Option<String>,
    },
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    pub asset_backend: AssetBackend,
    /// Prefix of every public asset URL handed out by the store
    pub asset_public_url: String,
    /// Upper bound for any single storage call
    pub storage_timeout: Duration,
    /// Request body limit for multipart uploads
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("CATALOG_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("CATALOG_DB_PATH")
            .unwrap_or_else(|_| "./data/catalog.sqlite".to_string())
            .into();

        let index_path = env::var("CATALOG_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr: SocketAddr = env::var("CATALOG_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid CATALOG_BIND_ADDR: {}", e)))?;

        let log_level = env::var("CATALOG_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("CATALOG_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("text") | Err(_) => LogFormat::Text,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "Invalid CATALOG_LOG_FORMAT: {}",
                    other
                )))
            }
        };

        let asset_backend = match env::var("CATALOG_ASSET_BACKEND").as_deref() {
            Ok("disk") | Err(_) => AssetBackend::Disk {
                root: env::var("CATALOG_ASSET_DIR")
                    .unwrap_or_else(|_| "./data/assets".to_string())
                    .into(),
            },
            Ok("http") => AssetBackend::Http {
                endpoint: env::var("CATALOG_ASSET_ENDPOINT").map_err(|_| {
                    AppError::Internal(
                        "CATALOG_ASSET_ENDPOINT is required for the http asset backend"
                            .to_string(),
                    )
                })?,
                token: env::var("CATALOG_ASSET_TOKEN").ok(),
            },
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "Invalid CATALOG_ASSET_BACKEND: {}",
                    other
                )))
            }
        };

        let asset_public_url = env::var("CATALOG_ASSET_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}/assets", bind_addr));

        let storage_timeout = Duration::from_secs(parse_number(
            "CATALOG_STORAGE_TIMEOUT_SECS",
            10,
        )?);

        let max_upload_bytes = parse_number("CATALOG_MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?;

        Ok(Self {
            api_psk,
            db_path,
            index_path,
            bind_addr,
            log_level,
            log_format,
            asset_backend,
            asset_public_url: asset_public_url.trim_end_matches('/').to_string(),
            storage_timeout,
            max_upload_bytes,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}
