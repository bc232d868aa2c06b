//! Configuration for the portal

use std::time::Duration;
use url::Url;

use crate::error::{PortalError, Result};

/// Default office-document preview endpoint; the encoded file URL is appended.
pub const DEFAULT_OFFICE_PREVIEW_URL: &str = "https://view.officeapps.live.com/op/embed.aspx?src=";

/// Storage buckets, one per content kind plus video thumbnails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketNames {
    pub videos: String,
    pub documents: String,
    pub certificates: String,
    pub thumbnails: String,
}

impl Default for BucketNames {
    fn default() -> Self {
        Self {
            videos: "videos".to_string(),
            documents: "documents".to_string(),
            certificates: "certificates".to_string(),
            thumbnails: "thumbnails".to_string(),
        }
    }
}

/// Configuration for the portal
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Backend project URL
    pub url: Url,

    /// Anonymous API key
    pub anon_key: String,

    /// Office preview endpoint prefix
    pub office_preview_url: String,

    /// Wall-clock period between playback progress upserts
    pub progress_sync_interval: Duration,

    /// Tick of the simulated upload progress
    pub upload_progress_tick: Duration,

    /// HTTP request timeout
    pub request_timeout: Option<Duration>,

    /// Storage buckets
    pub buckets: BucketNames,

    /// Default log directive when `RUST_LOG` is unset
    pub log_level: String,
}

impl PortalConfig {
    /// Creates a new configuration, validating the URL and key.
    pub fn new(url_str: &str, anon_key: String) -> Result<Self> {
        let url = Url::parse(url_str)?;
        if anon_key.trim().is_empty() {
            return Err(PortalError::Config("anon_key cannot be empty".to_string()));
        }
        Ok(Self {
            url,
            anon_key,
            office_preview_url: DEFAULT_OFFICE_PREVIEW_URL.to_string(),
            progress_sync_interval: Duration::from_secs(10),
            upload_progress_tick: Duration::from_millis(300),
            request_timeout: Some(Duration::from_secs(30)),
            buckets: BucketNames::default(),
            log_level: "info".to_string(),
        })
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let url_str = std::env::var("SUPABASE_URL").map_err(|_| {
            PortalError::Config("SUPABASE_URL environment variable not found".to_string())
        })?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY").map_err(|_| {
            PortalError::Config("SUPABASE_ANON_KEY environment variable not found".to_string())
        })?;

        let mut config = Self::new(&url_str, anon_key)?;

        if let Ok(preview) = std::env::var("PORTAL_OFFICE_PREVIEW_URL") {
            config = config.with_office_preview_url(&preview);
        }
        if let Some(secs) = env_secs("PORTAL_PROGRESS_SYNC_SECS")? {
            config = config.with_progress_sync_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = env_secs("PORTAL_REQUEST_TIMEOUT_SECS")? {
            config = config.with_request_timeout(Some(Duration::from_secs(secs)));
        }
        if let Ok(level) = std::env::var("PORTAL_LOG") {
            config = config.with_log_level(&level);
        }

        Ok(config)
    }

    /// Base URL without the trailing slash `Url` adds
    pub fn base_url(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    /// Set the office preview endpoint
    pub fn with_office_preview_url(mut self, value: &str) -> Self {
        self.office_preview_url = value.to_string();
        self
    }

    /// Set the progress sync interval
    pub fn with_progress_sync_interval(mut self, value: Duration) -> Self {
        self.progress_sync_interval = value;
        self
    }

    /// Set the simulated upload progress tick
    pub fn with_upload_progress_tick(mut self, value: Duration) -> Self {
        self.upload_progress_tick = value;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the bucket names
    pub fn with_buckets(mut self, value: BucketNames) -> Self {
        self.buckets = value;
        self
    }

    /// Set the default log directive
    pub fn with_log_level(mut self, value: &str) -> Self {
        self.log_level = value.to_string();
        self
    }
}

fn env_secs(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| PortalError::Config(format!("{} must be a whole number of seconds", name))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_new_valid() {
        let config = PortalConfig::new("http://localhost:54321", "anon".to_string()).unwrap();

        assert_eq!(config.url.as_str(), "http://localhost:54321/");
        assert_eq!(config.base_url(), "http://localhost:54321");
        assert_eq!(config.progress_sync_interval, Duration::from_secs(10));
        assert_eq!(config.office_preview_url, DEFAULT_OFFICE_PREVIEW_URL);
        assert_eq!(config.buckets.thumbnails, "thumbnails");
    }

    #[test]
    fn config_new_invalid_url() {
        let config = PortalConfig::new("not a valid url", "anon".to_string());
        assert!(matches!(config, Err(PortalError::UrlParse(_))));
    }

    #[test]
    fn config_new_empty_key() {
        match PortalConfig::new("http://localhost:54321", "  ".to_string()) {
            Err(PortalError::Config(msg)) => assert!(msg.contains("anon_key cannot be empty")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn builder_overrides() {
        let config = PortalConfig::new("https://demo.supabase.co", "anon".to_string())
            .unwrap()
            .with_progress_sync_interval(Duration::from_secs(5))
            .with_request_timeout(None)
            .with_log_level("debug");

        assert_eq!(config.progress_sync_interval, Duration::from_secs(5));
        assert!(config.request_timeout.is_none());
        assert_eq!(config.log_level, "debug");
    }
}
