//! Error handling for the portal

use thiserror::Error;

/// Unified error type for portal operations
#[derive(Error, Debug)]
pub enum PortalError {
    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sign-in, sign-out or session errors from the auth backend
    #[error("Authentication error: {0}")]
    Auth(#[from] portal_auth::AuthError),

    /// Table query or write errors
    #[error("Database error: {0}")]
    Database(#[from] portal_postgrest::PostgrestError),

    /// Object storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] portal_storage::StorageError),

    /// HTTP client construction errors
    #[error("Network request error: {0}")]
    Network(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a local file for upload
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation needs a signed-in user
    #[error("Not signed in")]
    NotAuthenticated,

    /// The signed-in user lacks the required role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Rejected user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PortalError {
    /// Message shown to the user, verbatim from the backend where there is one
    pub fn user_message(&self) -> String {
        match self {
            PortalError::Auth(portal_auth::AuthError::ApiError(message)) => message.clone(),
            PortalError::Database(portal_postgrest::PostgrestError::ApiError { details, .. }) => {
                details.message.clone().unwrap_or_else(|| details.to_string())
            }
            PortalError::Storage(portal_storage::StorageError::ApiError(message)) => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
