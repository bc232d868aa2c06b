//! Auth client for the portal backend
//!
//! This crate provides password sign-in, session retrieval, token refresh,
//! sign-out and an auth-state-change subscription.

use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::broadcast;

/// Error type
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing session")]
    MissingSession,
}

/// Error body returned by the auth endpoints
#[derive(Debug, Clone, Deserialize)]
struct AuthApiErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl AuthApiErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// Authenticated user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Session returned by the token endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub user: User,
}

/// Auth state transitions broadcast to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum AuthChangeEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

impl AuthChangeEvent {
    /// The session carried by the event, if any
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthChangeEvent::SignedIn(session) | AuthChangeEvent::TokenRefreshed(session) => {
                Some(session)
            }
            AuthChangeEvent::SignedOut => None,
        }
    }
}

/// Client options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub persist_session: bool,
    /// Capacity of the auth-state broadcast channel
    pub event_capacity: usize,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            persist_session: true,
            event_capacity: 16,
        }
    }
}

/// Auth client
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    current_session: Arc<RwLock<Option<Session>>>,
    state_change: broadcast::Sender<AuthChangeEvent>,
}

impl Auth {
    /// Create a new auth client
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        let (state_change, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            current_session: Arc::new(RwLock::new(None)),
            state_change,
        }
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.current_session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.current_session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: AuthChangeEvent) {
        // No receivers is not an error: nobody is listening yet.
        if self.state_change.send(event).is_err() {
            debug!("Auth state change emitted without subscribers");
        }
    }

    async fn error_from_response(response: reqwest::Response) -> AuthError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<AuthApiErrorBody>(&text)
            .ok()
            .and_then(AuthApiErrorBody::into_message)
            .unwrap_or(text);
        warn!("Auth request failed with status {}: {}", status, message);
        AuthError::ApiError(message)
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.url);

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let session: Session = response.json().await?;
        info!("Signed in user {}", session.user.id);

        if self.options.persist_session {
            *self.write_session() = Some(session.clone());
        }
        self.emit(AuthChangeEvent::SignedIn(session.clone()));

        Ok(session)
    }

    /// Current session, read synchronously
    pub fn get_session(&self) -> Option<Session> {
        self.read_session().clone()
    }

    /// Replace the current session, e.g. one restored from disk
    pub fn set_session(&self, session: Session) {
        *self.write_session() = Some(session.clone());
        self.emit(AuthChangeEvent::SignedIn(session));
    }

    /// Fetch the user behind the current session
    pub async fn get_user(&self) -> Result<User, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;

        let url = format!("{}/auth/v1/user", self.url);

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let user: User = response.json().await?;
        Ok(user)
    }

    /// Exchange the refresh token for a new session
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;

        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.url);

        let payload = serde_json::json!({
            "refresh_token": session.refresh_token,
        });

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let new_session: Session = response.json().await?;

        if self.options.persist_session {
            *self.write_session() = Some(new_session.clone());
        }
        self.emit(AuthChangeEvent::TokenRefreshed(new_session.clone()));

        Ok(new_session)
    }

    /// Sign out; the local session is cleared even if the backend rejects the call
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;

        let url = format!("{}/auth/v1/logout", self.url);

        let result = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await;

        *self.write_session() = None;
        self.emit(AuthChangeEvent::SignedOut);
        info!("Signed out user {}", session.user.id);

        let response = result?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        Ok(())
    }

    /// Subscribe to auth state changes
    pub fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChangeEvent> {
        self.state_change.subscribe()
    }
}
