//! Object storage client for the portal backend
//!
//! This crate provides storage functionality,
//! allowing for uploading and removing objects and issuing public URLs.

use bytes::Bytes;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error type
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),
}

/// Upload options
#[derive(Debug, Clone, Serialize, Default)]
pub struct FileOptions {
    pub cache_control: Option<String>,
    pub content_type: Option<String>,
    pub upsert: Option<bool>,
}

impl FileOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache control header
    pub fn with_cache_control(mut self, cache_control: &str) -> Self {
        self.cache_control = Some(cache_control.to_string());
        self
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Overwrite an existing object at the same path
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = Some(upsert);
        self
    }
}

/// Storage response to a successful upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadResponse {
    /// `<bucket>/<path>` of the stored object
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Id", default)]
    pub id: Option<String>,
}

/// Bucket-scoped client
pub struct StorageBucketClient<'a> {
    parent: &'a StorageClient,
    bucket_id: String,
}

/// Storage client
#[derive(Clone)]
pub struct StorageClient {
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    http_client: Client,
}

impl StorageClient {
    /// Create a new storage client
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
            http_client,
        }
    }

    /// Authorize requests as a signed-in user instead of the anon key
    pub fn with_auth(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    /// Select a bucket
    pub fn from<'a>(&'a self, bucket_id: &str) -> StorageBucketClient<'a> {
        StorageBucketClient {
            parent: self,
            bucket_id: bucket_id.to_string(),
        }
    }

    fn bearer(&self) -> String {
        format!(
            "Bearer {}",
            self.access_token.as_deref().unwrap_or(&self.api_key)
        )
    }
}

impl<'a> StorageBucketClient<'a> {
    fn object_url(&self, path: &str) -> Result<Url> {
        if path.is_empty() || path.starts_with('/') || path.split('/').any(|s| s == "..") {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        let mut url = Url::parse(&self.parent.base_url)?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidPath(self.parent.base_url.clone()))?
            .pop_if_empty()
            .extend(["storage", "v1", "object", self.bucket_id.as_str()])
            .extend(path.split('/'));
        Ok(url)
    }

    /// Upload bytes to `path` inside the bucket
    pub async fn upload(
        &self,
        path: &str,
        contents: Bytes,
        options: Option<FileOptions>,
    ) -> Result<UploadResponse> {
        let mut url = self.object_url(path)?;
        let options = options.unwrap_or_default();

        if let Some(cache_control) = &options.cache_control {
            url.query_pairs_mut()
                .append_pair("cache_control", cache_control);
        }

        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        let mut part = Part::stream(contents).file_name(file_name);
        if let Some(content_type) = &options.content_type {
            part = part.mime_str(content_type)?;
        }
        let form = Form::new().part("file", part);

        debug!("Uploading object {}/{}", self.bucket_id, path);

        let response = self
            .parent
            .http_client
            .post(url)
            .header("apikey", &self.parent.api_key)
            .header("Authorization", self.parent.bearer())
            .header("x-upsert", options.upsert.unwrap_or(false).to_string())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            warn!("Upload to {}/{} failed: {}", self.bucket_id, path, error_text);
            return Err(StorageError::ApiError(error_text));
        }

        let uploaded = response.json::<UploadResponse>().await?;

        Ok(uploaded)
    }

    /// Remove objects from the bucket
    pub async fn remove(&self, paths: &[&str]) -> Result<()> {
        let url = format!(
            "{}/storage/v1/object/{}",
            self.parent.base_url, self.bucket_id
        );

        let payload = serde_json::json!({
            "prefixes": paths
        });

        let response = self
            .parent
            .http_client
            .delete(&url)
            .header("apikey", &self.parent.api_key)
            .header("Authorization", self.parent.bearer())
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(StorageError::ApiError(error_text));
        }

        Ok(())
    }

    /// Public URL of an object in a public bucket
    pub fn get_public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.parent.base_url, self.bucket_id, path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_upload_bytes() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/storage/v1/object/documents/user-1/1700000000000_guide.pdf"))
            .and(header("apikey", "fake-key"))
            .and(header("Authorization", "Bearer user-token"))
            .and(header("x-upsert", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Key": "documents/user-1/1700000000000_guide.pdf",
                "Id": "c0ffee"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let storage =
            StorageClient::new(&mock_server.uri(), "fake-key", Client::new()).with_auth("user-token");

        let uploaded = storage
            .from("documents")
            .upload(
                "user-1/1700000000000_guide.pdf",
                Bytes::from_static(b"%PDF-1.7"),
                Some(FileOptions::new().with_content_type("application/pdf")),
            )
            .await
            .unwrap();

        assert_eq!(uploaded.key, "documents/user-1/1700000000000_guide.pdf");
        assert_eq!(uploaded.id.as_deref(), Some("c0ffee"));
    }

    #[tokio::test]
    async fn test_upload_error_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/storage/v1/object/videos/u/clip.mp4"))
            .respond_with(
                ResponseTemplate::new(413).set_body_string("Payload too large"),
            )
            .mount(&mock_server)
            .await;

        let storage = StorageClient::new(&mock_server.uri(), "fake-key", Client::new());
        let result = storage
            .from("videos")
            .upload("u/clip.mp4", Bytes::from_static(b"\0\0"), None)
            .await;

        match result {
            Err(StorageError::ApiError(msg)) => assert!(msg.contains("Payload too large")),
            other => panic!("Expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remove_objects() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/videos"))
            .and(body_json(json!({ "prefixes": ["u/clip.mp4"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let storage = StorageClient::new(&mock_server.uri(), "fake-key", Client::new());
        storage.from("videos").remove(&["u/clip.mp4"]).await.unwrap();
    }

    #[test]
    fn test_public_url_and_path_validation() {
        let storage = StorageClient::new("https://example.supabase.co/", "k", Client::new());
        let bucket = storage.from("thumbnails");

        assert_eq!(
            bucket.get_public_url("u/thumb.png"),
            "https://example.supabase.co/storage/v1/object/public/thumbnails/u/thumb.png"
        );
        assert!(matches!(
            bucket.object_url("../escape"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(bucket.object_url(""), Err(StorageError::InvalidPath(_))));
    }
}
