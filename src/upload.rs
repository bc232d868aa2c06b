//! Upload/edit form for videos, documents and certificates.
//!
//! Submitting uploads the selected binary to the kind's bucket, resolves its
//! public URL and writes one metadata row. Progress is published on a `watch`
//! channel; it only moves forward during a submission and drops back to 0 on
//! failure.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use portal_storage::{FileOptions, StorageClient};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{tables, Backend};
use crate::config::BucketNames;
use crate::error::{PortalError, Result};
use crate::models::{Certificate, Document, Video};
use crate::viewer::extension_of;

/// Where the simulated progress starts and where it stops until the upload returns
const SIMULATION_START: u8 = 5;
const SIMULATION_CEILING: u8 = 90;
const UPLOADED: u8 = 95;
const COMMITTED: u8 = 100;

/// Content kind the form is editing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Video,
    Document,
    Certificate,
}

impl ContentKind {
    pub fn table(self) -> &'static str {
        match self {
            ContentKind::Video => tables::VIDEOS,
            ContentKind::Document => tables::DOCUMENTS,
            ContentKind::Certificate => tables::CERTIFICATES,
        }
    }

    pub fn bucket(self, buckets: &BucketNames) -> &str {
        match self {
            ContentKind::Video => &buckets.videos,
            ContentKind::Document => &buckets.documents,
            ContentKind::Certificate => &buckets.certificates,
        }
    }
}

/// A file picked for upload
#[derive(Debug, Clone, PartialEq)]
pub struct FileSelection {
    pub file_name: String,
    pub bytes: Bytes,
}

impl FileSelection {
    pub fn new(file_name: &str, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.to_string(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| PortalError::InvalidInput(format!("Not a file: {}", path.display())))?;
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(file_name, bytes))
    }

    pub fn size(&self) -> i64 {
        self.bytes.len() as i64
    }

    /// Lower-case extension, stored as `file_type`
    pub fn file_type(&self) -> Option<String> {
        extension_of(&self.file_name)
    }
}

/// Create a new row or edit an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit { id: Uuid },
}

/// File columns already stored on the row being edited
#[derive(Debug, Clone, PartialEq)]
struct StoredFile {
    url: String,
    name: Option<String>,
    size: Option<i64>,
    file_type: Option<String>,
}

/// Form state; fields map to the row's editable columns.
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub kind: ContentKind,
    pub mode: FormMode,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub duration_seconds: Option<i32>,
    /// Owning client, certificates only
    pub client_id: Option<Uuid>,
    pub is_published: bool,
    pub file: Option<FileSelection>,
    pub thumbnail: Option<FileSelection>,
    existing_file: Option<StoredFile>,
    existing_thumbnail_url: Option<String>,
}

impl UploadForm {
    /// Empty create form
    pub fn create(kind: ContentKind) -> Self {
        Self {
            kind,
            mode: FormMode::Create,
            title: String::new(),
            description: None,
            category: None,
            duration_seconds: None,
            client_id: None,
            is_published: false,
            file: None,
            thumbnail: None,
            existing_file: None,
            existing_thumbnail_url: None,
        }
    }

    pub fn edit_video(video: &Video) -> Self {
        Self {
            mode: FormMode::Edit { id: video.id },
            title: video.title.clone(),
            description: video.description.clone(),
            category: video.category.clone(),
            duration_seconds: video.duration_seconds,
            is_published: video.is_published,
            existing_file: Some(StoredFile {
                url: video.video_url.clone(),
                name: None,
                size: None,
                file_type: None,
            }),
            existing_thumbnail_url: video.thumbnail_url.clone(),
            ..Self::create(ContentKind::Video)
        }
    }

    pub fn edit_document(document: &Document) -> Self {
        Self {
            mode: FormMode::Edit { id: document.id },
            title: document.title.clone(),
            category: document.category.clone(),
            is_published: document.is_published,
            existing_file: Some(StoredFile {
                url: document.file_url.clone(),
                name: Some(document.file_name.clone()),
                size: document.file_size,
                file_type: document.file_type.clone(),
            }),
            ..Self::create(ContentKind::Document)
        }
    }

    pub fn edit_certificate(certificate: &Certificate) -> Self {
        Self {
            mode: FormMode::Edit { id: certificate.id },
            title: certificate.title.clone(),
            category: certificate.category.clone(),
            client_id: Some(certificate.client_id),
            is_published: certificate.is_published,
            existing_file: Some(StoredFile {
                url: certificate.file_url.clone(),
                name: Some(certificate.file_name.clone()),
                size: certificate.file_size,
                file_type: certificate.file_type.clone(),
            }),
            ..Self::create(ContentKind::Certificate)
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_duration(mut self, seconds: i32) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_client(mut self, client_id: Uuid) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_published(mut self, is_published: bool) -> Self {
        self.is_published = is_published;
        self
    }

    pub fn with_file(mut self, file: FileSelection) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: FileSelection) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    /// Check the form before anything is sent.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(PortalError::InvalidInput("Title is required".to_string()));
        }
        if self.mode == FormMode::Create && self.file.is_none() {
            return Err(PortalError::InvalidInput("Select a file to upload".to_string()));
        }
        if let Some(file) = &self.file {
            if file.bytes.is_empty() {
                return Err(PortalError::InvalidInput(format!(
                    "{} is empty",
                    file.file_name
                )));
            }
        }
        if self.kind == ContentKind::Certificate && self.client_id.is_none() {
            return Err(PortalError::InvalidInput(
                "A certificate needs an owning client".to_string(),
            ));
        }
        if matches!(self.duration_seconds, Some(seconds) if seconds < 0) {
            return Err(PortalError::InvalidInput(
                "Duration cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Upload, write the row and return its id. Progress restarts from 0 and
    /// is reset again on failure.
    pub async fn submit(&self, backend: &Backend, progress: &UploadProgress) -> Result<Uuid> {
        progress.reset();
        let result = self.run_submission(backend, progress).await;
        if let Err(e) = &result {
            progress.reset();
            warn!(table = self.kind.table(), error = %e, "Submission failed");
        }
        result
    }

    async fn run_submission(&self, backend: &Backend, progress: &UploadProgress) -> Result<Uuid> {
        self.validate()?;
        let user_id = backend.require_user()?;
        let storage = backend.storage();
        let buckets = &backend.config().buckets;
        let tick = backend.config().upload_progress_tick;

        let mut uploads = UploadBatch::new(&storage);

        let stored = match &self.file {
            Some(file) => {
                let bucket = self.kind.bucket(buckets);
                let url = uploads.put(bucket, user_id, file, progress, tick).await?;
                Some(StoredFile {
                    url,
                    name: Some(file.file_name.clone()),
                    size: Some(file.size()),
                    file_type: file.file_type(),
                })
            }
            None => self.existing_file.clone(),
        };
        let stored = stored
            .ok_or_else(|| PortalError::InvalidInput("Select a file to upload".to_string()))?;

        let thumbnail_url = match (&self.thumbnail, self.kind) {
            (Some(thumbnail), ContentKind::Video) => {
                match uploads
                    .put(&buckets.thumbnails, user_id, thumbnail, progress, tick)
                    .await
                {
                    Ok(url) => Some(url),
                    Err(e) => {
                        uploads.clean_up().await;
                        return Err(e);
                    }
                }
            }
            _ => self.existing_thumbnail_url.clone(),
        };
        progress.advance_to(UPLOADED);

        let written = self.write_row(backend, stored, thumbnail_url).await;
        let id = match written {
            Ok(id) => id,
            Err(e) => {
                uploads.clean_up().await;
                return Err(e);
            }
        };

        progress.advance_to(COMMITTED);
        info!(table = self.kind.table(), %id, mode = ?self.mode, "Row saved");
        Ok(id)
    }

    async fn write_row(
        &self,
        backend: &Backend,
        stored: StoredFile,
        thumbnail_url: Option<String>,
    ) -> Result<Uuid> {
        let payload = match self.kind {
            ContentKind::Video => serde_json::to_value(VideoPayload {
                title: self.title.trim(),
                description: self.description.as_deref(),
                category: self.category.as_deref(),
                duration_seconds: self.duration_seconds,
                video_url: &stored.url,
                thumbnail_url: thumbnail_url.as_deref(),
                is_published: self.is_published,
            })?,
            ContentKind::Document | ContentKind::Certificate => serde_json::to_value(FilePayload {
                title: self.title.trim(),
                file_name: stored.name.as_deref(),
                file_url: &stored.url,
                file_size: stored.size,
                file_type: stored.file_type.as_deref(),
                category: self.category.as_deref(),
                is_published: self.is_published,
                client_id: self.client_id.filter(|_| self.kind == ContentKind::Certificate),
            })?,
        };

        let table = backend.from(self.kind.table())?;
        match self.mode {
            FormMode::Create => {
                let representation = table.insert(payload).await?;
                inserted_id(&representation)
            }
            FormMode::Edit { id } => {
                table.eq("id", &id.to_string()).update(payload).await?;
                Ok(id)
            }
        }
    }
}

#[derive(Serialize)]
struct VideoPayload<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_seconds: Option<i32>,
    video_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail_url: Option<&'a str>,
    is_published: bool,
}

#[derive(Serialize)]
struct FilePayload<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<&'a str>,
    file_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    is_published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<Uuid>,
}

/// Id of the first row in an insert representation
fn inserted_id(representation: &Value) -> Result<Uuid> {
    let row = match representation {
        Value::Array(rows) => rows.first(),
        Value::Object(_) => Some(representation),
        _ => None,
    };
    let id = row
        .and_then(|row| row.get("id"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PortalError::Database(portal_postgrest::PostgrestError::DeserializationError(
                "Insert returned no row id".to_string(),
            ))
        })?;
    Uuid::parse_str(id).map_err(|e| PortalError::InvalidInput(format!("Row id {}: {}", id, e)))
}

/// Objects uploaded by one submission, removed again if a later step fails
struct UploadBatch<'a> {
    storage: &'a StorageClient,
    objects: Vec<(String, String)>,
}

impl<'a> UploadBatch<'a> {
    fn new(storage: &'a StorageClient) -> Self {
        Self {
            storage,
            objects: Vec::new(),
        }
    }

    async fn put(
        &mut self,
        bucket: &str,
        user_id: Uuid,
        file: &FileSelection,
        progress: &UploadProgress,
        tick: Duration,
    ) -> Result<String> {
        let path = storage_path(user_id, Utc::now().timestamp_millis(), &file.file_name);
        let mut options = FileOptions::new().with_cache_control("3600");
        if let Some(content_type) = file.file_type().as_deref().and_then(content_type_for) {
            options = options.with_content_type(content_type);
        }

        let bucket_client = self.storage.from(bucket);
        {
            let _simulation = progress.simulate(tick);
            bucket_client
                .upload(&path, file.bytes.clone(), Some(options))
                .await?;
        }

        debug!(bucket, path = %path, "Object uploaded");
        let url = bucket_client.get_public_url(&path);
        self.objects.push((bucket.to_string(), path));
        Ok(url)
    }

    /// Best-effort removal; failures are only logged.
    async fn clean_up(&self) {
        for (bucket, path) in &self.objects {
            match self.storage.from(bucket).remove(&[path.as_str()]).await {
                Ok(()) => info!(bucket = %bucket, path = %path, "Removed orphaned object"),
                Err(e) => warn!(bucket = %bucket, path = %path, error = %e, "Orphaned object left in storage"),
            }
        }
    }
}

/// `<user id>/<unix millis>_<sanitised name>`
pub fn storage_path(user_id: Uuid, millis: i64, file_name: &str) -> String {
    format!("{}/{}_{}", user_id, millis, sanitize_file_name(file_name))
}

/// Keep `[A-Za-z0-9._-]`, replace everything else with `_`.
pub fn sanitize_file_name(file_name: &str) -> String {
    let sanitized: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.trim_matches(|c| c == '.' || c == '_').is_empty() {
        "file".to_string()
    } else {
        sanitized
    }
}

fn content_type_for(extension: &str) -> Option<&'static str> {
    let content_type = match extension {
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => return None,
    };
    Some(content_type)
}

/// Submission progress in percent
#[derive(Clone)]
pub struct UploadProgress {
    sender: Arc<watch::Sender<u8>>,
}

impl Default for UploadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadProgress {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> u8 {
        *self.sender.borrow()
    }

    /// Move forward to `percent`; never moves back.
    pub fn advance_to(&self, percent: u8) {
        let percent = percent.min(COMMITTED);
        self.sender.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    pub fn reset(&self) {
        self.sender.send_replace(0);
    }

    /// Random steps toward the ceiling until the guard drops.
    pub fn simulate(&self, tick: Duration) -> SimulationGuard {
        self.advance_to(SIMULATION_START);
        let progress = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let current = progress.current();
                if current >= SIMULATION_CEILING {
                    break;
                }
                let step: u8 = rand::thread_rng().gen_range(2..=10);
                progress.advance_to(current.saturating_add(step).min(SIMULATION_CEILING));
            }
        });
        SimulationGuard { handle }
    }
}

/// Stops the progress simulation when dropped
pub struct SimulationGuard {
    handle: JoinHandle<()>,
}

impl Drop for SimulationGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_sanitised() {
        let user = Uuid::parse_str("6d2c0f0e-4b8b-4b5c-8d7e-1b2c3d4e5f60").unwrap();
        assert_eq!(
            storage_path(user, 1_767_225_600_000, "Guida AI 2026 (v2).pdf"),
            "6d2c0f0e-4b8b-4b5c-8d7e-1b2c3d4e5f60/1767225600000_Guida_AI_2026__v2_.pdf"
        );
        assert_eq!(sanitize_file_name("../"), "file");
        assert_eq!(sanitize_file_name("perché.docx"), "perch_.docx");
    }

    #[test]
    fn create_requires_file_title_and_owner() {
        let form = UploadForm::create(ContentKind::Document).with_title("Guida");
        assert!(matches!(form.validate(), Err(PortalError::InvalidInput(_))));

        let form = form.with_file(FileSelection::new("guida.pdf", vec![1u8, 2, 3]));
        assert!(form.validate().is_ok());

        let certificate = UploadForm::create(ContentKind::Certificate)
            .with_title("ISO")
            .with_file(FileSelection::new("iso.pdf", vec![1u8]));
        assert!(certificate.validate().is_err());
        assert!(certificate.with_client(Uuid::new_v4()).validate().is_ok());

        let blank = UploadForm::create(ContentKind::Video)
            .with_title("   ")
            .with_file(FileSelection::new("a.mp4", vec![1u8]));
        assert!(blank.validate().is_err());
    }

    #[test]
    fn progress_is_monotonic_until_reset() {
        let progress = UploadProgress::new();
        let receiver = progress.subscribe();

        progress.advance_to(40);
        progress.advance_to(20);
        assert_eq!(*receiver.borrow(), 40);

        progress.advance_to(250);
        assert_eq!(progress.current(), 100);

        progress.reset();
        assert_eq!(progress.current(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn simulation_stays_below_ceiling_and_stops_on_drop() {
        let progress = UploadProgress::new();
        let guard = progress.simulate(Duration::from_millis(100));
        assert_eq!(progress.current(), SIMULATION_START);

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(progress.current(), SIMULATION_CEILING);

        drop(guard);
        progress.reset();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(progress.current(), 0);
    }

    #[test]
    fn inserted_id_reads_representation() {
        let id = Uuid::new_v4();
        let value = serde_json::json!([{ "id": id.to_string(), "title": "x" }]);
        assert_eq!(inserted_id(&value).unwrap(), id);
        assert!(inserted_id(&Value::Null).is_err());
    }
}
