//! Bearer-token sessions.
//!
//! `POST /sessions` issues an opaque token bound to an [`Actor`]; handlers
//! take a [`Session`] extractor that resolves it from the `Authorization`
//! header. Sessions live in memory and end at logout, expiry or restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use domain::Actor;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::ApiError;

/// Header the shipping aggregator's webhook authenticates with.
pub const WEBHOOK_KEY_HEADER: &str = "x-api-key";

/// How long a session stays valid when no TTL is configured.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone)]
struct SessionEntry {
    actor: Actor,
    expires_at: Instant,
}

/// Open sessions by token. Clones share the same table.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            ttl,
        }
    }

    /// Opens a session and returns its token. Expired sessions are
    /// evicted first.
    pub async fn create(&self, actor: Actor) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        evict_expired(&mut sessions, now);
        sessions.insert(
            token.clone(),
            SessionEntry {
                actor,
                expires_at: now + self.ttl,
            },
        );
        metrics::gauge!("sessions_active").set(sessions.len() as f64);
        token
    }

    /// The actor behind a live token. An expired token is dropped.
    pub async fn resolve(&self, token: &str) -> Option<Actor> {
        let now = Instant::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                None => return None,
                Some(entry) if entry.expires_at > now => return Some(entry.actor.clone()),
                Some(_) => {}
            }
        }
        let mut sessions = self.sessions.write().await;
        if sessions.get(token).is_some_and(|entry| entry.expires_at <= now) {
            sessions.remove(token);
            metrics::gauge!("sessions_active").set(sessions.len() as f64);
            tracing::debug!("session expired");
        }
        None
    }

    /// Ends a session. Returns false when the token was unknown.
    pub async fn revoke(&self, token: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(token).is_some();
        metrics::gauge!("sessions_active").set(sessions.len() as f64);
        removed
    }

    /// Number of sessions held, expired ones included until evicted.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn evict_expired(sessions: &mut HashMap<String, SessionEntry>, now: Instant) {
    let before = sessions.len();
    sessions.retain(|_, entry| entry.expires_at > now);
    let evicted = before - sessions.len();
    if evicted > 0 {
        tracing::debug!(evicted, "evicted expired sessions");
    }
}

/// Compares two shared secrets without leaking where they differ.
pub fn secrets_match(expected: &str, presented: &str) -> bool {
    const CONTEXT: &[u8] = b"shared-secret-check";
    let tag = |key: &str| {
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).ok()?;
        mac.update(CONTEXT);
        Some(mac)
    };
    match (tag(expected), tag(presented)) {
        (Some(expected), Some(presented)) => presented
            .verify_slice(&expected.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

/// Shared secret expected from the carrier webhook, if one is configured.
#[derive(Debug, Clone, Default)]
pub struct WebhookKey(pub Option<String>);

impl WebhookKey {
    fn matches(&self, presented: &str) -> bool {
        self.0
            .as_deref()
            .is_some_and(|expected| secrets_match(expected, presented))
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub actor: Actor,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    SessionStore: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
        let sessions = SessionStore::from_ref(state);
        let actor = sessions
            .resolve(token)
            .await
            .ok_or_else(|| ApiError::Unauthorized("unknown session".to_string()))?;
        Ok(Session {
            token: token.to_string(),
            actor,
        })
    }
}

/// A session caller, or the carrier webhook presenting its shared key.
#[derive(Debug, Clone)]
pub struct TrackingCaller(pub Actor);

impl<S> FromRequestParts<S> for TrackingCaller
where
    S: Send + Sync,
    SessionStore: FromRef<S>,
    WebhookKey: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(presented) = parts.headers.get(WEBHOOK_KEY_HEADER) {
            let presented = presented.to_str().unwrap_or_default();
            if WebhookKey::from_ref(state).matches(presented) {
                return Ok(TrackingCaller(Actor::system("carrier-webhook")));
            }
            tracing::warn!(target: "security", "tracking webhook presented a wrong key");
            return Err(ApiError::Unauthorized("invalid webhook key".to_string()));
        }
        let session = Session::from_request_parts(parts, state).await?;
        Ok(TrackingCaller(session.actor))
    }
}
