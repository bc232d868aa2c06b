//! Content screens: listings, search, publish toggle, delete, overview counts.
//!
//! A screen holds the rows fetched on mount plus the search query; searching
//! filters the fetched rows in memory and never re-queries. Mutations re-fetch
//! the full list afterwards.

use std::marker::PhantomData;

use chrono::Utc;
use portal_postgrest::{PostgrestClient, SortOrder};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::tables;
use crate::error::{PortalError, Result};
use crate::models::{Certificate, Document, DocumentDownload, Profile, ProfileUpdate, Video, VideoView};
use crate::router::Route;
use crate::session::{SessionContext, SessionState};

/// Rows that can be searched on a screen; `needle` is already lower-case.
pub trait Searchable {
    fn matches(&self, needle: &str) -> bool;
}

/// A publishable content table
pub trait ContentRow: Searchable + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    const SELECT: &'static str = "*";
    /// Column restricting client listings to the caller's own rows
    const OWNER_COLUMN: Option<&'static str> = None;

    fn id(&self) -> Uuid;
    fn title(&self) -> &str;
    fn is_published(&self) -> bool;
}

fn contains(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|value| value.to_lowercase().contains(needle))
        .unwrap_or(false)
}

impl Searchable for Video {
    fn matches(&self, needle: &str) -> bool {
        contains(Some(self.title.as_str()), needle) || contains(self.category.as_deref(), needle)
    }
}

impl ContentRow for Video {
    const TABLE: &'static str = tables::VIDEOS;

    fn id(&self) -> Uuid {
        self.id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn is_published(&self) -> bool {
        self.is_published
    }
}

impl Searchable for Document {
    fn matches(&self, needle: &str) -> bool {
        contains(Some(self.title.as_str()), needle) || contains(self.category.as_deref(), needle)
    }
}

impl ContentRow for Document {
    const TABLE: &'static str = tables::DOCUMENTS;

    fn id(&self) -> Uuid {
        self.id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn is_published(&self) -> bool {
        self.is_published
    }
}

impl Searchable for Certificate {
    fn matches(&self, needle: &str) -> bool {
        if contains(Some(self.title.as_str()), needle) {
            return true;
        }
        self.client.as_ref().map_or(false, |owner| {
            contains(owner.full_name.as_deref(), needle)
                || contains(owner.company_name.as_deref(), needle)
        })
    }
}

impl ContentRow for Certificate {
    const TABLE: &'static str = tables::CERTIFICATES;
    const SELECT: &'static str = "*,client:profiles(full_name,company_name,email)";
    const OWNER_COLUMN: Option<&'static str> = Some("client_id");

    fn id(&self) -> Uuid {
        self.id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn is_published(&self) -> bool {
        self.is_published
    }
}

impl Searchable for Profile {
    fn matches(&self, needle: &str) -> bool {
        contains(self.full_name.as_deref(), needle)
            || contains(self.company_name.as_deref(), needle)
            || contains(Some(self.email.as_str()), needle)
    }
}

/// Who a query is issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Admin { profile_id: Uuid },
    Client { profile_id: Uuid },
}

impl Audience {
    /// Audience of a settled session; profile-less sessions are clients keyed by user id.
    pub fn from_state(state: &SessionState) -> Result<Self> {
        if let Some(profile) = &state.profile {
            let profile_id = profile.id;
            return Ok(if profile.is_admin() {
                Audience::Admin { profile_id }
            } else {
                Audience::Client { profile_id }
            });
        }
        let user_id = state.user_id().ok_or(PortalError::NotAuthenticated)?;
        let profile_id = Uuid::parse_str(user_id).map_err(|_| PortalError::NotAuthenticated)?;
        Ok(Audience::Client { profile_id })
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Audience::Admin { .. })
    }

    pub fn profile_id(&self) -> Uuid {
        match self {
            Audience::Admin { profile_id } | Audience::Client { profile_id } => *profile_id,
        }
    }
}

/// Side of the portal a listing is shown on.
///
/// Dashboard screens only ever show published rows, and owned tables only the
/// caller's own rows, whoever is signed in. Admin screens are unfiltered and
/// refuse non-admin callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    Admin,
}

impl Screen {
    /// Screen a route renders, `None` for the login page
    pub fn for_route(route: &Route) -> Option<Self> {
        match route {
            Route::Login => None,
            route if route.is_admin() => Some(Screen::Admin),
            _ => Some(Screen::Dashboard),
        }
    }
}

/// Row filter resolved from a screen and the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    All,
    PublishedTo { profile_id: Uuid },
}

/// Fetched rows plus the live search query
#[derive(Debug, Clone)]
pub struct ContentScreen<T> {
    items: Vec<T>,
    query: String,
}

impl<T: Searchable> ContentScreen<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            query: String::new(),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Update the search query; matching reruns on the fetched set.
    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
    }

    /// Replace the rows after a re-fetch, keeping the query
    pub fn replace_items(&mut self, items: Vec<T>) {
        self.items = items;
    }

    /// Rows matching the query, in fetch order
    pub fn visible(&self) -> Vec<&T> {
        let needle = self.query.trim().to_lowercase();
        if needle.is_empty() {
            return self.items.iter().collect();
        }
        self.items.iter().filter(|item| item.matches(&needle)).collect()
    }
}

/// A delete awaiting confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletion<T> {
    pub id: Uuid,
    pub title: String,
    kind: PhantomData<fn() -> T>,
}

/// Dashboard counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overview {
    pub videos: u64,
    pub documents: u64,
    pub certificates: u64,
    /// Only counted on the admin screen
    pub clients: Option<u64>,
}

/// Screen operations against the backend, scoped by the current session.
#[derive(Clone)]
pub struct ContentService {
    session: SessionContext,
}

impl ContentService {
    pub fn new(session: SessionContext) -> Self {
        Self { session }
    }

    /// Audience read from the current session on every call
    pub fn audience(&self) -> Result<Audience> {
        Audience::from_state(&self.session.snapshot())
    }

    fn require_admin(&self, action: &str) -> Result<()> {
        if self.audience()?.is_admin() {
            Ok(())
        } else {
            Err(PortalError::Forbidden(format!("{} requires the admin role", action)))
        }
    }

    fn table(&self, table: &str) -> Result<PostgrestClient> {
        self.session.backend().from(table)
    }

    fn visibility(&self, screen: Screen) -> Result<Visibility> {
        let audience = self.audience()?;
        match screen {
            Screen::Dashboard => Ok(Visibility::PublishedTo {
                profile_id: audience.profile_id(),
            }),
            Screen::Admin if audience.is_admin() => Ok(Visibility::All),
            Screen::Admin => Err(PortalError::Forbidden(
                "Admin screens require the admin role".to_string(),
            )),
        }
    }

    fn scoped<T: ContentRow>(query: PostgrestClient, visibility: Visibility) -> PostgrestClient {
        match visibility {
            Visibility::All => query,
            Visibility::PublishedTo { profile_id } => {
                let query = query.eq("is_published", "true");
                match T::OWNER_COLUMN {
                    Some(column) => query.eq(column, &profile_id.to_string()),
                    None => query,
                }
            }
        }
    }

    /// Query a listing for `screen`, newest first.
    pub async fn try_list<T: ContentRow>(&self, screen: Screen) -> Result<Vec<T>> {
        let visibility = self.visibility(screen)?;
        let query = self
            .table(T::TABLE)?
            .select(T::SELECT)
            .order("created_at", SortOrder::Descending);
        let rows = Self::scoped::<T>(query, visibility).execute::<T>().await?;
        Ok(rows)
    }

    /// Listing for a screen; failures degrade to an empty list.
    pub async fn list<T: ContentRow>(&self, screen: Screen) -> Vec<T> {
        match self.try_list::<T>(screen).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table = T::TABLE, error = %e, "List fetch failed; showing empty list");
                Vec::new()
            }
        }
    }

    /// Mount a screen: one query, empty search
    pub async fn load<T: ContentRow>(&self, screen: Screen) -> ContentScreen<T> {
        ContentScreen::new(self.list::<T>(screen).await)
    }

    /// One video by id; on the dashboard hidden videos are `None`.
    pub async fn get_video(&self, screen: Screen, id: Uuid) -> Result<Option<Video>> {
        let visibility = self.visibility(screen)?;
        let query = self
            .table(tables::VIDEOS)?
            .select(Video::SELECT)
            .eq("id", &id.to_string());
        let video = Self::scoped::<Video>(query, visibility)
            .execute_one::<Video>()
            .await?;
        Ok(video)
    }

    /// Flip `is_published` on one row, then re-fetch the list.
    pub async fn set_published<T: ContentRow>(&self, id: Uuid, published: bool) -> Result<Vec<T>> {
        self.require_admin("Publishing")?;
        self.table(T::TABLE)?
            .eq("id", &id.to_string())
            .update(json!({ "is_published": published }))
            .await?;
        info!(table = T::TABLE, %id, published, "Publish state changed");
        Ok(self.list::<T>(Screen::Admin).await)
    }

    /// First step of a delete; nothing is sent until `confirm_delete`.
    pub fn request_delete<T: ContentRow>(&self, item: &T) -> PendingDeletion<T> {
        PendingDeletion {
            id: item.id(),
            title: item.title().to_string(),
            kind: PhantomData,
        }
    }

    /// Delete the confirmed row and re-fetch the list.
    pub async fn confirm_delete<T: ContentRow>(&self, pending: PendingDeletion<T>) -> Result<Vec<T>> {
        self.require_admin("Deleting")?;
        self.table(T::TABLE)?
            .eq("id", &pending.id.to_string())
            .delete()
            .await?;
        info!(table = T::TABLE, id = %pending.id, title = %pending.title, "Row deleted");
        Ok(self.list::<T>(Screen::Admin).await)
    }

    async fn count<T: ContentRow>(&self, visibility: Visibility) -> u64 {
        let result = match self.table(T::TABLE) {
            Ok(query) => Self::scoped::<T>(query.select("id"), visibility)
                .execute_count()
                .await
                .map_err(PortalError::from),
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!(table = T::TABLE, error = %e, "Count failed; showing 0");
            0
        })
    }

    async fn count_clients(&self) -> u64 {
        let result = match self.table(tables::PROFILES) {
            Ok(query) => query
                .select("id")
                .eq("role", "client")
                .execute_count()
                .await
                .map_err(PortalError::from),
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!(error = %e, "Client count failed; showing 0");
            0
        })
    }

    /// Home screen counts, fetched concurrently; each failure counts as 0.
    pub async fn overview(&self, screen: Screen) -> Result<Overview> {
        let visibility = self.visibility(screen)?;
        let clients = async {
            if visibility == Visibility::All {
                Some(self.count_clients().await)
            } else {
                None
            }
        };

        let (videos, documents, certificates, clients) = tokio::join!(
            self.count::<Video>(visibility),
            self.count::<Document>(visibility),
            self.count::<Certificate>(visibility),
            clients,
        );

        Ok(Overview {
            videos,
            documents,
            certificates,
            clients,
        })
    }

    /// Client profiles for the admin clients screen
    pub async fn try_list_clients(&self) -> Result<Vec<Profile>> {
        self.require_admin("Listing clients")?;
        let rows = self
            .table(tables::PROFILES)?
            .select("*")
            .eq("role", "client")
            .order("created_at", SortOrder::Descending)
            .execute::<Profile>()
            .await?;
        Ok(rows)
    }

    pub async fn list_clients(&self) -> Vec<Profile> {
        self.try_list_clients().await.unwrap_or_else(|e| {
            warn!(error = %e, "Client list fetch failed; showing empty list");
            Vec::new()
        })
    }

    /// Edit a client's display fields, then re-fetch the client list.
    pub async fn update_client(&self, id: Uuid, update: ProfileUpdate) -> Result<Vec<Profile>> {
        self.require_admin("Editing clients")?;
        if update.is_empty() {
            return Err(PortalError::InvalidInput("Nothing to update".to_string()));
        }
        self.table(tables::PROFILES)?
            .eq("id", &id.to_string())
            .update(&update)
            .await?;
        info!(%id, "Client profile updated");
        Ok(self.list_clients().await)
    }

    /// Record a client download and hand back the file URL.
    pub async fn record_download(&self, document: &Document) -> Result<String> {
        let user_id = self.session.backend().require_user()?;
        let row = DocumentDownload {
            document_id: document.id,
            user_id,
            downloaded_at: Utc::now(),
        };
        self.table(tables::DOCUMENT_DOWNLOADS)?.insert(&row).await?;
        info!(document_id = %document.id, %user_id, "Download recorded");
        Ok(document.file_url.clone())
    }

    /// The signed-in user's watch progress rows
    pub async fn list_video_progress(&self) -> Vec<VideoView> {
        let result = async {
            let user_id = self.session.backend().require_user()?;
            let rows = self
                .table(tables::VIDEO_VIEWS)?
                .select("*")
                .eq("user_id", &user_id.to_string())
                .execute::<VideoView>()
                .await?;
            Ok::<_, PortalError>(rows)
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Watch progress fetch failed");
            Vec::new()
        })
    }
}
