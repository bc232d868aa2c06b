//! PostgREST table client for the portal backend
//!
//! This crate provides the table operations the portal needs,
//! allowing for querying, filtering, and manipulating rows over REST.
//!
//! # Features
//!
//! - Query API (`select`, `insert`, `update`, `upsert`, `delete`)
//! - Filtering (`eq`, `neq`, `ilike`, `in_list`)
//! - Ordering and limits
//! - Exact row counts

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Detailed PostgREST API error body
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Error type
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// PostgREST client bound to one table
#[derive(Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: HashMap<String, String>,
}

impl PostgrestClient {
    /// Create a new client for `table`
    pub fn new(
        base_url: &str,
        api_key: &str,
        table: &str,
        http_client: Client,
    ) -> Result<Self, PostgrestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).map_err(|_| {
                PostgrestError::InvalidParameters("Invalid API key header value".to_string())
            })?,
        );
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: HashMap::new(),
        })
    }

    /// Add a request header
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;

        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Authenticate requests with a user access token
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    /// Table this client targets
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns to return
    pub fn select(mut self, columns: &str) -> Self {
        self.query_params
            .insert("select".to_string(), columns.to_string());
        self
    }

    /// Equality filter
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.query_params
            .insert(column.to_string(), format!("eq.{}", value));
        self
    }

    /// Inequality filter
    pub fn neq(mut self, column: &str, value: &str) -> Self {
        self.query_params
            .insert(column.to_string(), format!("neq.{}", value));
        self
    }

    /// Case-insensitive pattern filter
    pub fn ilike(mut self, column: &str, pattern: &str) -> Self {
        self.query_params
            .insert(column.to_string(), format!("ilike.{}", pattern));
        self
    }

    /// Membership filter
    pub fn in_list(mut self, column: &str, values: &[&str]) -> Self {
        self.query_params
            .insert(column.to_string(), format!("in.({})", values.join(",")));
        self
    }

    /// Sort order
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        let order_str = match order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        self.query_params
            .insert("order".to_string(), format!("{}.{}", column, order_str));
        self
    }

    /// Maximum number of rows
    pub fn limit(mut self, count: i32) -> Self {
        self.query_params
            .insert("limit".to_string(), count.to_string());
        self
    }

    fn build_url(&self) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn error_from_response(response: reqwest::Response) -> PostgrestError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        warn!("PostgREST request failed with status {}: {}", status, error_text);

        match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
            Ok(details) => PostgrestError::ApiError { details, status },
            Err(_) => PostgrestError::UnparsedApiError {
                message: error_text,
                status,
            },
        }
    }

    /// Send a write request and parse the (possibly empty) representation
    async fn send_write(
        &self,
        method: Method,
        url: Url,
        prefer: &str,
        body: Option<Value>,
    ) -> Result<Value, PostgrestError> {
        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_str(prefer).map_err(|_| {
                PostgrestError::InvalidParameters(format!("Invalid Prefer header: {}", prefer))
            })?,
        );

        debug!("{} {}", method, url);

        let mut request = self.http_client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body_text = response.text().await.map_err(|e| {
            PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
        })?;

        // 204 No Content and return=minimal both come back empty
        if body_text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str::<Value>(&body_text)
                .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
        }
    }

    /// Fetch rows
    pub async fn execute<T: for<'de> Deserialize<'de>>(&self) -> Result<Vec<T>, PostgrestError> {
        let url = self.build_url()?;
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Fetch at most one row
    pub async fn execute_one<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, PostgrestError> {
        let rows = self.clone().limit(1).execute::<T>().await?;
        Ok(rows.into_iter().next())
    }

    /// Count matching rows without transferring them
    pub async fn execute_count(&self) -> Result<u64, PostgrestError> {
        let url = self.build_url()?;
        debug!("HEAD {}", url);

        let response = self
            .http_client
            .head(url)
            .headers(self.headers.clone())
            .header("Prefer", "count=exact")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PostgrestError::UnparsedApiError {
                message: "Count request failed".to_string(),
                status,
            });
        }

        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                PostgrestError::DeserializationError("Missing Content-Range header".to_string())
            })?;

        parse_content_range_total(content_range).ok_or_else(|| {
            PostgrestError::DeserializationError(format!(
                "Invalid Content-Range header: {}",
                content_range
            ))
        })
    }

    /// Insert rows and return their representation
    pub async fn insert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let url = self.build_url()?;
        let body = serde_json::to_value(values)?;
        self.send_write(Method::POST, url, "return=representation", Some(body))
            .await
    }

    /// Update rows matched by the filters
    pub async fn update<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        if !self.has_filters() {
            return Err(PostgrestError::InvalidParameters(
                "Refusing to update without a filter".to_string(),
            ));
        }
        let url = self.build_url()?;
        let body = serde_json::to_value(values)?;
        self.send_write(Method::PATCH, url, "return=representation", Some(body))
            .await
    }

    /// Insert rows, merging into existing ones that collide on `on_conflict`
    pub async fn upsert<T: Serialize>(
        &self,
        values: T,
        on_conflict: &str,
    ) -> Result<Value, PostgrestError> {
        let mut url = self.build_url()?;
        url.query_pairs_mut().append_pair("on_conflict", on_conflict);
        let body = serde_json::to_value(values)?;
        self.send_write(
            Method::POST,
            url,
            "resolution=merge-duplicates,return=representation",
            Some(body),
        )
        .await
    }

    /// Delete rows matched by the filters
    pub async fn delete(&self) -> Result<Value, PostgrestError> {
        if !self.has_filters() {
            return Err(PostgrestError::InvalidParameters(
                "Refusing to delete without a filter".to_string(),
            ));
        }
        let url = self.build_url()?;
        self.send_write(Method::DELETE, url, "return=representation", None)
            .await
    }

    fn has_filters(&self) -> bool {
        self.query_params
            .keys()
            .any(|key| !matches!(key.as_str(), "select" | "order" | "limit"))
    }
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`
pub fn parse_content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, table: &str) -> PostgrestClient {
        PostgrestClient::new(&server.uri(), "fake-key", table, reqwest::Client::new()).unwrap()
    }

    #[tokio::test]
    async fn test_select_with_filters() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/videos"))
            .and(query_param("select", "*"))
            .and(query_param("is_published", "eq.true"))
            .and(query_param("order", "created_at.desc"))
            .and(header("apikey", "fake-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "title": "Intro" },
                { "id": 2, "title": "Deep dive" }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let rows = client(&mock_server, "videos")
            .select("*")
            .eq("is_published", "true")
            .order("created_at", SortOrder::Descending)
            .execute::<Value>()
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], "Intro");
    }

    #[tokio::test]
    async fn test_api_error_details_are_parsed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "42501",
                "message": "permission denied for table profiles",
                "details": null,
                "hint": null
            })))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, "profiles")
            .select("*")
            .execute::<Value>()
            .await;

        match result {
            Err(PostgrestError::ApiError { details, status }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(details.code.as_deref(), Some("42501"));
            }
            other => panic!("Expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upsert_sends_conflict_target() {
        let mock_server = MockServer::start().await;
        let row = json!({ "video_id": "v1", "user_id": "u1", "progress_seconds": 10 });

        Mock::given(method("POST"))
            .and(path("/rest/v1/video_views"))
            .and(query_param("on_conflict", "video_id,user_id"))
            .and(header(
                "prefer",
                "resolution=merge-duplicates,return=representation",
            ))
            .and(body_json(&row))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([row.clone()])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, "video_views")
            .upsert(&row, "video_id,user_id")
            .await
            .unwrap();

        assert_eq!(result[0]["progress_seconds"], 10);
    }

    #[tokio::test]
    async fn test_update_requires_filter() {
        let mock_server = MockServer::start().await;

        let result = client(&mock_server, "videos")
            .update(json!({ "is_published": true }))
            .await;

        assert!(matches!(result, Err(PostgrestError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_delete_with_empty_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/documents"))
            .and(query_param("id", "eq.42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, "documents")
            .eq("id", "42")
            .delete()
            .await
            .unwrap();

        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_execute_count_reads_content_range() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/rest/v1/documents"))
            .and(header("prefer", "count=exact"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", "0-9/37"))
            .mount(&mock_server)
            .await;

        let count = client(&mock_server, "documents")
            .select("id")
            .execute_count()
            .await
            .unwrap();

        assert_eq!(count, 37);
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }
}
