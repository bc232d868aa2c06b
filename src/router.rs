//! Role-gated routing.
//!
//! Every resolution rebuilds the route table from the current access state, so
//! the admin subtree only exists in the table when the profile is an admin.

use std::fmt;

use uuid::Uuid;

use crate::models::Role;
use crate::session::{SessionContext, SessionState};

pub const LOGIN_PATH: &str = "/login";
pub const DASHBOARD_PATH: &str = "/dashboard";

/// What the router knows about the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    Loading,
    Unauthenticated,
    AuthenticatedNoProfile,
    AuthenticatedClient,
    AuthenticatedAdmin,
}

impl AccessState {
    pub fn from_state(state: &SessionState) -> Self {
        if state.loading {
            return AccessState::Loading;
        }
        match (&state.session, &state.profile) {
            (None, _) => AccessState::Unauthenticated,
            (Some(_), None) => AccessState::AuthenticatedNoProfile,
            (Some(_), Some(profile)) if profile.role == Role::Admin => {
                AccessState::AuthenticatedAdmin
            }
            (Some(_), Some(_)) => AccessState::AuthenticatedClient,
        }
    }

    pub fn has_session(self) -> bool {
        !matches!(self, AccessState::Loading | AccessState::Unauthenticated)
    }

    pub fn is_admin(self) -> bool {
        self == AccessState::AuthenticatedAdmin
    }
}

/// A screen the portal can render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
    DashboardVideos,
    DashboardVideo { id: Uuid },
    DashboardDocuments,
    DashboardCertificates,
    Admin,
    AdminVideos,
    AdminDocuments,
    AdminCertificates,
    AdminClients,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Login => LOGIN_PATH.to_string(),
            Route::Dashboard => DASHBOARD_PATH.to_string(),
            Route::DashboardVideos => "/dashboard/videos".to_string(),
            Route::DashboardVideo { id } => format!("/dashboard/videos/{}", id),
            Route::DashboardDocuments => "/dashboard/documents".to_string(),
            Route::DashboardCertificates => "/dashboard/certificates".to_string(),
            Route::Admin => "/admin".to_string(),
            Route::AdminVideos => "/admin/videos".to_string(),
            Route::AdminDocuments => "/admin/documents".to_string(),
            Route::AdminCertificates => "/admin/certificates".to_string(),
            Route::AdminClients => "/admin/clients".to_string(),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Route::Admin
                | Route::AdminVideos
                | Route::AdminDocuments
                | Route::AdminCertificates
                | Route::AdminClients
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Outcome of resolving a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Session state not settled yet; nothing is evaluated
    Loading,
    Render(Route),
    Redirect(&'static str),
}

type RouteBuilder = fn(&[&str]) -> Option<Route>;

struct RouteEntry {
    pattern: &'static str,
    build: RouteBuilder,
}

const DASHBOARD_ROUTES: &[RouteEntry] = &[
    RouteEntry {
        pattern: "/dashboard",
        build: |_| Some(Route::Dashboard),
    },
    RouteEntry {
        pattern: "/dashboard/videos",
        build: |_| Some(Route::DashboardVideos),
    },
    RouteEntry {
        pattern: "/dashboard/videos/:id",
        build: |params| {
            let id = Uuid::parse_str(params.first()?).ok()?;
            Some(Route::DashboardVideo { id })
        },
    },
    RouteEntry {
        pattern: "/dashboard/documents",
        build: |_| Some(Route::DashboardDocuments),
    },
    RouteEntry {
        pattern: "/dashboard/certificates",
        build: |_| Some(Route::DashboardCertificates),
    },
];

const ADMIN_ROUTES: &[RouteEntry] = &[
    RouteEntry {
        pattern: "/admin",
        build: |_| Some(Route::Admin),
    },
    RouteEntry {
        pattern: "/admin/videos",
        build: |_| Some(Route::AdminVideos),
    },
    RouteEntry {
        pattern: "/admin/documents",
        build: |_| Some(Route::AdminDocuments),
    },
    RouteEntry {
        pattern: "/admin/certificates",
        build: |_| Some(Route::AdminCertificates),
    },
    RouteEntry {
        pattern: "/admin/clients",
        build: |_| Some(Route::AdminClients),
    },
];

/// Routes registered for an access state
fn route_table(access: AccessState) -> Vec<&'static RouteEntry> {
    let mut table: Vec<&'static RouteEntry> = DASHBOARD_ROUTES.iter().collect();
    if access.is_admin() {
        table.extend(ADMIN_ROUTES.iter());
    }
    table
}

/// Drops the query string and any trailing slashes; the root stays `/`.
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn match_entry(entry: &RouteEntry, path: &str) -> Option<Route> {
    let pattern: Vec<&str> = entry.pattern.split('/').collect();
    let segments: Vec<&str> = path.split('/').collect();
    if pattern.len() != segments.len() {
        return None;
    }

    let mut params = Vec::new();
    for (expected, actual) in pattern.iter().zip(segments.iter()) {
        if expected.starts_with(':') {
            if actual.is_empty() {
                return None;
            }
            params.push(*actual);
        } else if expected != actual {
            return None;
        }
    }
    (entry.build)(&params)
}

/// Resolve `path` for the given access state.
pub fn resolve(access: AccessState, path: &str) -> Navigation {
    if access == AccessState::Loading {
        return Navigation::Loading;
    }

    let path = normalize_path(path);

    if !access.has_session() {
        return if path == LOGIN_PATH {
            Navigation::Render(Route::Login)
        } else {
            Navigation::Redirect(LOGIN_PATH)
        };
    }

    if path == LOGIN_PATH {
        return Navigation::Redirect(DASHBOARD_PATH);
    }

    route_table(access)
        .into_iter()
        .find_map(|entry| match_entry(entry, &path))
        .map(Navigation::Render)
        .unwrap_or(Navigation::Redirect(DASHBOARD_PATH))
}

/// Router bound to a session context; reads the role on every call.
#[derive(Clone)]
pub struct Router {
    session: SessionContext,
}

impl Router {
    pub fn new(session: SessionContext) -> Self {
        Self { session }
    }

    pub fn navigate(&self, path: &str) -> Navigation {
        let navigation = resolve(self.session.access(), path);
        tracing::debug!(path, ?navigation, "Resolved route");
        navigation
    }
}
