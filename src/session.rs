//! Session and profile resolution.
//!
//! `SessionContext` owns the portal's view of who is signed in. It mirrors the
//! SDK session, resolves exactly one profile per session change, and
//! broadcasts every new `SessionState` to subscribers. It is passed
//! explicitly to whatever needs it; there is no global instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use portal_auth::{AuthChangeEvent, Session};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{tables, Backend};
use crate::error::Result;
use crate::models::Profile;
use crate::router::AccessState;

/// Snapshot of the session as the router and screens see it
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    /// True while the initial check or a profile fetch is outstanding
    pub loading: bool,
}

impl SessionState {
    fn initial() -> Self {
        Self {
            session: None,
            profile: None,
            loading: true,
        }
    }

    fn signed_out() -> Self {
        Self {
            session: None,
            profile: None,
            loading: false,
        }
    }

    /// Router state derived from this snapshot
    pub fn access(&self) -> AccessState {
        AccessState::from_state(self)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user.id.as_str())
    }
}

/// Explicit session context shared by reference across the portal.
#[derive(Clone)]
pub struct SessionContext {
    backend: Backend,
    state: Arc<RwLock<SessionState>>,
    generation: Arc<AtomicU64>,
    changes: broadcast::Sender<SessionState>,
}

impl SessionContext {
    /// New context in the loading state; call `initialize` to resolve it.
    pub fn new(backend: Backend) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            backend,
            state: Arc::new(RwLock::new(SessionState::initial())),
            generation: Arc::new(AtomicU64::new(0)),
            changes,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Current snapshot
    pub fn snapshot(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Router state for the current snapshot
    pub fn access(&self) -> AccessState {
        self.snapshot().access()
    }

    /// Receive every state published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.changes.subscribe()
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, state: SessionState) {
        if self.changes.send(state).is_err() {
            debug!("Session state changed with no subscribers");
        }
    }

    /// Resolve the session present at start-up and its profile.
    pub async fn initialize(&self) {
        match self.backend.auth().get_session() {
            Some(session) => self.begin_session(session).await,
            None => {
                let state = {
                    let mut state = self.write_state();
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    *state = SessionState::signed_out();
                    state.clone()
                };
                self.notify(state);
            }
        }
    }

    /// Apply one auth-state change. Re-applying the session already held is a no-op.
    pub async fn apply(&self, event: AuthChangeEvent) {
        match event {
            AuthChangeEvent::SignedIn(session) => {
                if !self.is_current(&session) {
                    debug!(user_id = %session.user.id, "Ignoring superseded sign-in");
                    return;
                }
                self.begin_session(session).await
            }
            AuthChangeEvent::TokenRefreshed(session) => {
                let refreshed = {
                    let mut state = self.write_state();
                    let same_user = state.user_id() == Some(session.user.id.as_str());
                    if same_user {
                        state.session = Some(session.clone());
                        Some(state.clone())
                    } else {
                        None
                    }
                };
                match refreshed {
                    Some(state) => self.notify(state),
                    None => self.begin_session(session).await,
                }
            }
            AuthChangeEvent::SignedOut => {
                let cleared = {
                    let mut state = self.write_state();
                    if state.session.is_none() && !state.loading {
                        None
                    } else {
                        self.generation.fetch_add(1, Ordering::SeqCst);
                        *state = SessionState::signed_out();
                        Some(state.clone())
                    }
                };
                if let Some(state) = cleared {
                    info!("Session cleared");
                    self.notify(state);
                }
            }
        }
    }

    /// Whether `session` is still the one the SDK holds
    fn is_current(&self, session: &Session) -> bool {
        self.backend
            .auth()
            .get_session()
            .map(|current| current.access_token == session.access_token)
            .unwrap_or(false)
    }

    /// Install `session` with an outstanding profile fetch; `None` if it is already held.
    fn claim_session(&self, session: Session) -> Option<(u64, SessionState)> {
        let mut state = self.write_state();
        let already_held = state
            .session
            .as_ref()
            .map(|current| current.access_token == session.access_token)
            .unwrap_or(false);
        if already_held {
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *state = SessionState {
            session: Some(session),
            profile: None,
            loading: true,
        };
        Some((generation, state.clone()))
    }

    async fn begin_session(&self, session: Session) {
        let user_id = session.user.id.clone();
        let Some((generation, claimed)) = self.claim_session(session) else {
            debug!(user_id = %user_id, "Session already applied");
            return;
        };
        self.notify(claimed);

        let profile = match self.fetch_profile(&user_id).await {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => {
                warn!(user_id = %user_id, "No profile row for signed-in user");
                None
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Profile fetch failed; continuing without profile");
                None
            }
        };

        let resolved = {
            let mut state = self.write_state();
            if self.generation.load(Ordering::SeqCst) != generation {
                None
            } else {
                state.profile = profile;
                state.loading = false;
                Some(state.clone())
            }
        };
        match resolved {
            Some(state) => self.notify(state),
            None => debug!(user_id = %user_id, "Discarding profile for superseded session"),
        }
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let profile = self
            .backend
            .from(tables::PROFILES)?
            .select("*")
            .eq("id", user_id)
            .execute_one::<Profile>()
            .await?;
        Ok(profile)
    }

    /// Forward SDK auth changes into this context until the SDK client goes away.
    pub fn spawn_listener(&self) -> JoinHandle<()> {
        let mut events = self.backend.auth().on_auth_state_change();
        let context = self.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => context.apply(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth listener lagged; resyncing from current session");
                        let event = match context.backend.auth().get_session() {
                            Some(session) => AuthChangeEvent::SignedIn(session),
                            None => AuthChangeEvent::SignedOut,
                        };
                        context.apply(event).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Auth listener stopped");
        })
    }

    /// Sign in; the backend's rejection message is returned verbatim.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionState> {
        let session = self
            .backend
            .auth()
            .sign_in_with_password(email, password)
            .await?;
        self.apply(AuthChangeEvent::SignedIn(session)).await;
        Ok(self.settled().await)
    }

    /// Wait until no session check or profile fetch is outstanding.
    pub async fn settled(&self) -> SessionState {
        let mut changes = self.subscribe();
        loop {
            let state = self.snapshot();
            if !state.loading {
                return state;
            }
            match changes.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.snapshot(),
            }
        }
    }

    /// Sign out; local state is cleared even when the backend call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.backend.auth().sign_out().await;
        self.apply(AuthChangeEvent::SignedOut).await;
        result.map_err(Into::into)
    }
}
