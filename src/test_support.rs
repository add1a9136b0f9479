//! Shared fixtures for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::db::init_database;
use crate::errors::AppError;
use crate::storage::{AssetCategory, AssetStore, AssetUpload, StorageGateway};

pub const MEMORY_BASE_URL: &str = "memory://assets";

/// In-memory asset store that records deletes and can be told to fail them.
#[derive(Default)]
pub struct MemoryAssetStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing_deletes: Mutex<HashSet<String>>,
    fail_uploads: Mutex<bool>,
    delete_attempts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Place an object directly and return its URL.
    pub fn seed(&self, category: &str, key: &str) -> String {
        let url = format!("{}/{}/{}", MEMORY_BASE_URL, category, key);
        self.objects.lock().unwrap().insert(url.clone(), b"seed".to_vec());
        url
    }

    pub fn fail_deletes_of(&self, url: &str) {
        self.failing_deletes.lock().unwrap().insert(url.to_string());
    }

    pub fn fail_uploads(&self) {
        *self.fail_uploads.lock().unwrap() = true;
    }

    pub fn contains(&self, url: &str) -> bool {
        self.objects.lock().unwrap().contains_key(url)
    }

    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn delete_attempts(&self) -> Vec<String> {
        self.delete_attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn put(
        &self,
        category: AssetCategory,
        key: &str,
        upload: &AssetUpload,
    ) -> Result<String, AppError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_uploads.lock().unwrap() {
            return Err(AppError::Storage("quota exceeded".to_string()));
        }
        let url = format!("{}/{}/{}", MEMORY_BASE_URL, category.as_str(), key);
        self.objects
            .lock()
            .unwrap()
            .insert(url.clone(), upload.bytes.clone());
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), AppError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.delete_attempts.lock().unwrap().push(url.to_string());
        if self.failing_deletes.lock().unwrap().contains(url) {
            return Err(AppError::Storage(format!("permission denied for {}", url)));
        }
        self.objects.lock().unwrap().remove(url);
        Ok(())
    }
}

/// Gateway over a fresh SQLite file and the given asset store.
pub async fn test_gateway_with(
    assets: Arc<dyn AssetStore>,
    timeout: Duration,
) -> (Arc<StorageGateway>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = init_database(&dir.path().join("test.sqlite"))
        .await
        .expect("Failed to init DB");
    (Arc::new(StorageGateway::new(pool, assets, timeout)), dir)
}

/// Gateway backed by a [`MemoryAssetStore`] with a generous timeout.
pub async fn test_gateway() -> (Arc<StorageGateway>, Arc<MemoryAssetStore>, TempDir) {
    let store = Arc::new(MemoryAssetStore::new());
    let (gateway, dir) = test_gateway_with(store.clone(), Duration::from_secs(10)).await;
    (gateway, store, dir)
}
