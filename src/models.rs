//! Rows of the backend tables the portal reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile role; anything unrecognised is treated as neither admin nor client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
    #[serde(other)]
    Unknown,
}

/// `profiles` row, keyed by the auth user id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub role: Role,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Full name, falling back to the email
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

fn default_true() -> bool {
    true
}

/// Admin edit of a profile's display fields
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.company_name.is_none() && self.is_active.is_none()
    }
}

/// Owner columns embedded into certificate rows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnerSummary {
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub email: Option<String>,
}

/// `videos` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub duration_seconds: Option<i32>,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// `documents` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub file_name: String,
    pub file_url: String,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub category: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// `certificates` row with its owner embedded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Certificate {
    pub id: Uuid,
    pub client_id: Uuid,
    pub title: String,
    pub file_name: String,
    pub file_url: String,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub category: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<OwnerSummary>,
}

/// `video_views` row, unique per (video, user)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoView {
    pub video_id: Uuid,
    pub user_id: Uuid,
    pub progress_seconds: i64,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// `document_downloads` insert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentDownload {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub downloaded_at: DateTime<Utc>,
}
