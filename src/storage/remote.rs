//! Plain HTTP object endpoint: bearer-token `PUT`/`DELETE`, no request signing.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};

use super::{AssetCategory, AssetStore, AssetUpload};
use crate::errors::AppError;

/// `PUT`/`DELETE {endpoint}/{category}/{key}`, public reads at
/// `{public_base_url}/{category}/{key}`.
#[derive(Clone)]
pub struct HttpAssetStore {
    client: Client,
    endpoint: String,
    public_base_url: String,
    token: Option<String>,
}

impl HttpAssetStore {
    pub fn new(
        endpoint: impl Into<String>,
        public_base_url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn object_url_for(&self, public_url: &str) -> Result<String, AppError> {
        let object_path = public_url
            .strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|path| {
                path.split_once('/').is_some_and(|(dir, key)| {
                    AssetCategory::from_dir(dir).is_some() && !key.is_empty() && !key.contains('/')
                })
            })
            .ok_or_else(|| {
                AppError::Storage(format!(
                    "Asset URL {} is not served by this store",
                    public_url
                ))
            })?;
        Ok(format!("{}/{}", self.endpoint, object_path))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn put(
        &self,
        category: AssetCategory,
        key: &str,
        upload: &AssetUpload,
    ) -> Result<String, AppError> {
        let object_url = format!("{}/{}/{}", self.endpoint, category.as_str(), key);

        let response = self
            .authorize(self.client.put(&object_url))
            .header(header::CONTENT_TYPE, &upload.content_type)
            .body(upload.bytes.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!(
                "Object store rejected upload of {} ({}): {}",
                key, status, body
            )));
        }

        Ok(format!(
            "{}/{}/{}",
            self.public_base_url,
            category.as_str(),
            key
        ))
    }

    async fn delete(&self, url: &str) -> Result<(), AppError> {
        let object_url = self.object_url_for(url)?;

        let response = self
            .authorize(self.client.delete(&object_url))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            s => Err(AppError::Storage(format!(
                "Object store refused to delete {} ({})",
                url, s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_mapping() {
        let store = HttpAssetStore::new(
            "https://objects.example.com/storage/",
            "https://cdn.example.com/public",
            None,
        );

        assert_eq!(
            store
                .object_url_for("https://cdn.example.com/public/archives/1_bot.zip")
                .unwrap(),
            "https://objects.example.com/storage/archives/1_bot.zip"
        );
        assert!(store
            .object_url_for("https://cdn.example.com/public/other/1_bot.zip")
            .is_err());
        assert!(store
            .object_url_for("https://cdn.example.com/public/images/a/b.png")
            .is_err());
        assert!(store.object_url_for("https://evil.example.com/x").is_err());
    }
}
