//! Wiring of the auth, table and storage clients behind one handle.

use std::sync::Arc;

use portal_auth::{Auth, AuthOptions};
use portal_postgrest::PostgrestClient;
use portal_storage::StorageClient;
use reqwest::Client as ReqwestClient;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PortalConfig;
use crate::error::{PortalError, Result};

/// Backend table names
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const VIDEOS: &str = "videos";
    pub const DOCUMENTS: &str = "documents";
    pub const CERTIFICATES: &str = "certificates";
    pub const VIDEO_VIEWS: &str = "video_views";
    pub const DOCUMENT_DOWNLOADS: &str = "document_downloads";
}

/// Shared handle to the backend SDK clients.
#[derive(Clone)]
pub struct Backend {
    config: Arc<PortalConfig>,
    http_client: ReqwestClient,
    auth: Arc<Auth>,
}

impl Backend {
    /// Creates the backend handle from configuration.
    pub fn new(config: PortalConfig) -> Result<Self> {
        let mut builder = ReqwestClient::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let auth = Auth::new(
            config.base_url(),
            &config.anon_key,
            http_client.clone(),
            AuthOptions::default(),
        );

        info!(url = %config.url, "Backend client initialised");

        Ok(Self {
            config: Arc::new(config),
            http_client,
            auth: Arc::new(auth),
        })
    }

    /// Convenience constructor reading `SUPABASE_URL`/`SUPABASE_ANON_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(PortalConfig::from_env()?)
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Access token of the current session, if any
    pub fn access_token(&self) -> Option<String> {
        self.auth.get_session().map(|s| s.access_token)
    }

    /// Id of the signed-in user; `None` without a session or with a non-UUID id.
    pub fn current_user_id(&self) -> Option<Uuid> {
        let session = self.auth.get_session()?;
        match Uuid::parse_str(&session.user.id) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(user_id = %session.user.id, error = %e, "Session user id is not a UUID");
                None
            }
        }
    }

    /// Like `current_user_id` but an error when signed out
    pub fn require_user(&self) -> Result<Uuid> {
        self.current_user_id().ok_or(PortalError::NotAuthenticated)
    }

    /// Table client, authorised as the signed-in user when there is one
    pub fn from(&self, table: &str) -> Result<PostgrestClient> {
        let client = PostgrestClient::new(
            self.config.base_url(),
            &self.config.anon_key,
            table,
            self.http_client.clone(),
        )?;
        match self.access_token() {
            Some(token) => Ok(client.with_auth(&token)?),
            None => Ok(client),
        }
    }

    /// Storage client, authorised as the signed-in user when there is one
    pub fn storage(&self) -> StorageClient {
        let storage = StorageClient::new(
            self.config.base_url(),
            &self.config.anon_key,
            self.http_client.clone(),
        );
        match self.access_token() {
            Some(token) => storage.with_auth(&token),
            None => storage,
        }
    }
}
