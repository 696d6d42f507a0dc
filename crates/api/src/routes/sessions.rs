//! Login and logout.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{Actor, Role, UserId};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::Payload;
use crate::session::{Session, secrets_match};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub admin_key: Option<String>,
}

fn default_role() -> Role {
    Role::Customer
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user_id: UserId,
    pub role: Role,
}

/// POST /sessions: opens a session for a customer or, with the admin
/// key, a merchant.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id, role = ?req.role))]
pub async fn login<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Payload(req): Payload<LoginRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }

    let actor = match req.role {
        Role::Customer => Actor::customer(user_id),
        Role::Admin => {
            let Some(expected) = state.admin_key.as_deref() else {
                return Err(ApiError::Forbidden(
                    "admin sessions are disabled".to_string(),
                ));
            };
            let presented = req.admin_key.as_deref().unwrap_or_default();
            if !secrets_match(expected, presented) {
                tracing::warn!(target: "security", "admin login with a wrong key");
                return Err(ApiError::Unauthorized("invalid admin key".to_string()));
            }
            Actor::admin(user_id)
        }
        Role::System => {
            return Err(ApiError::BadRequest(
                "system sessions cannot be opened".to_string(),
            ));
        }
    };

    let token = state.sessions.create(actor.clone()).await;
    tracing::info!("session opened");
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user_id: actor.user_id,
            role: actor.role,
        }),
    ))
}

/// DELETE /sessions: ends the caller's session.
pub async fn logout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
) -> StatusCode {
    state.sessions.revoke(&session.token).await;
    StatusCode::NO_CONTENT
}
