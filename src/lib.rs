//! Client Portal
//!
//! An authenticated dashboard over a Supabase-compatible backend. Admins upload
//! and manage videos, documents and certificates; clients browse, stream and
//! download what is published for them.

pub mod backend;
pub mod config;
pub mod content;
pub mod error;
pub mod format;
pub mod logging;
pub mod models;
pub mod progress;
pub mod router;
pub mod session;
pub mod upload;
pub mod viewer;

use tokio::task::JoinHandle;

pub use crate::backend::Backend;
pub use crate::config::PortalConfig;
pub use crate::error::{PortalError, Result};

use crate::content::ContentService;
use crate::router::{Navigation, Router};
use crate::session::SessionContext;

/// The main entry point for the portal
///
/// # Example
///
/// ```no_run
/// use client_portal::{Portal, PortalConfig};
///
/// # async fn run() -> client_portal::Result<()> {
/// let config = PortalConfig::new("https://your-project-url.supabase.co", "your-anon-key".to_string())?;
/// let portal = Portal::start(config).await?;
/// portal.session().sign_in("admin@example.com", "secret").await?;
/// println!("{:?}", portal.navigate("/admin/videos"));
/// # Ok(())
/// # }
/// ```
pub struct Portal {
    backend: Backend,
    session: SessionContext,
    router: Router,
    content: ContentService,
    listener: JoinHandle<()>,
}

impl Portal {
    /// Build the backend, resolve the current session and start listening for auth changes.
    pub async fn start(config: PortalConfig) -> Result<Self> {
        let backend = Backend::new(config)?;
        let session = SessionContext::new(backend.clone());
        let listener = session.spawn_listener();
        session.initialize().await;

        Ok(Self {
            router: Router::new(session.clone()),
            content: ContentService::new(session.clone()),
            backend,
            session,
            listener,
        })
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn content(&self) -> &ContentService {
        &self.content
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Resolve a path against the current session
    pub fn navigate(&self, path: &str) -> Navigation {
        self.router.navigate(path)
    }
}

impl Drop for Portal {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
