use anyhow::Result;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use greatideas_db::models::session::SessionData;
use greatideas_db::repositories::SessionRepository;
use greatideas_shared::cart::Cart;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub const SESSION_COOKIE: &str = "greatideas_session";

#[derive(Debug, Default)]
struct SessionState {
    /// `None` until the session is first written.
    id: Option<String>,
    user_id: Option<i64>,
    data: SessionData,
    dirty: bool,
}

/// Per-request view of the browser session, shared between middleware and handlers.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
    pub async fn id(&self) -> Option<String> {
        self.inner.lock().await.id.clone()
    }

    pub async fn user_id(&self) -> Option<i64> {
        self.inner.lock().await.user_id
    }

    pub async fn is_authenticated(&self) -> bool {
        self.user_id().await.is_some()
    }

    pub async fn login(&self, user_id: i64) {
        let mut state = self.inner.lock().await;
        if state.user_id != Some(user_id) {
            state.user_id = Some(user_id);
            state.dirty = true;
        }
    }

    pub async fn cart(&self) -> Cart {
        self.inner.lock().await.data.cart.clone()
    }

    /// Sum of quantities, shown on every page.
    pub async fn cart_count(&self) -> i64 {
        self.inner.lock().await.data.cart.total_items()
    }

    pub async fn update_cart<R>(&self, f: impl FnOnce(&mut Cart) -> R) -> R {
        let mut state = self.inner.lock().await;
        state.dirty = true;
        f(&mut state.data.cart)
    }

    pub async fn company_name(&self) -> Option<String> {
        self.inner.lock().await.data.company_name.clone()
    }

    pub async fn set_company_name(&self, name: Option<String>) {
        let mut state = self.inner.lock().await;
        state.data.company_name = name;
        state.dirty = true;
    }

    pub async fn is_dirty(&self) -> bool {
        self.inner.lock().await.dirty
    }
}

impl<S: Send + Sync> FromRequestParts<S> for SessionHandle {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<SessionHandle>().cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
pub struct SessionService {
    repo: SessionRepository,
    ttl: Duration,
}

impl SessionService {
    pub fn new(repo: SessionRepository, ttl_hours: i64) -> Self {
        Self {
            repo,
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Session for the cookie value, or an unsaved blank one.
    pub async fn load(&self, cookie: Option<&str>) -> Result<SessionHandle> {
        let state = match cookie {
            Some(id) if !id.is_empty() => match self.repo.load(id, Utc::now()).await? {
                Some(session) => SessionState {
                    id: Some(session.id),
                    user_id: session.user_id,
                    data: session.data,
                    dirty: false,
                },
                None => {
                    debug!("Session cookie {} is unknown or expired", id);
                    SessionState::default()
                }
            },
            _ => SessionState::default(),
        };
        Ok(SessionHandle {
            inner: Arc::new(Mutex::new(state)),
        })
    }

    /// Writes a modified session. Returns the id when a cookie has to be (re)sent.
    pub async fn persist(&self, handle: &SessionHandle) -> Result<Option<String>> {
        let mut state = handle.inner.lock().await;
        if !state.dirty {
            return Ok(None);
        }

        let mut session = match &state.id {
            Some(id) => greatideas_db::models::session::WebSession {
                id: id.clone(),
                user_id: state.user_id,
                data: SessionData::default(),
                expires_at: Utc::now() + self.ttl,
            },
            None => self.repo.create(self.ttl).await?,
        };
        session.user_id = state.user_id;
        session.data = state.data.clone();
        self.repo.save(&session, self.ttl).await?;

        state.id = Some(session.id.clone());
        state.dirty = false;
        Ok(Some(session.id))
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        self.repo.purge_expired(Utc::now()).await
    }
}
