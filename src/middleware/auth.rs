//! Authentication extractors.
//!
//! The session holds a small [`SessionUser`] written at login. Handlers ask
//! for [`CurrentUser`] when a login is required and [`RequireAdmin`] for the
//! back-office.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::domain::aggregates::{Role, User};
use crate::error::AppError;

/// Session keys.
pub mod session_keys {
    pub const USER: &str = "user";
}

/// Who is signed in, as remembered by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self { id: user.id(), email: user.email().to_string(), role: user.role() }
    }
}

/// Extractor that requires a signed-in user.
pub struct CurrentUser(pub SessionUser);

/// Extractor that requires a signed-in admin.
pub struct RequireAdmin(pub SessionUser);

async fn session_user(parts: &Parts) -> Result<Option<SessionUser>, AppError> {
    let Some(session) = parts.extensions.get::<Session>() else {
        return Err(AppError::Internal("session layer missing".into()));
    };
    Ok(session.get::<SessionUser>(session_keys::USER).await?)
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_user(parts)
            .await?
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("Please log in".into()))
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = session_user(parts)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Please log in".into()))?;
        if user.role != Role::Admin {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Non-admin tried the back-office");
            return Err(AppError::Forbidden("Admin access required".into()));
        }
        Ok(Self(user))
    }
}

/// Stores the user in the session, rotating the session id.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_session_user(session: &Session, user: &SessionUser) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::USER, user).await
}

/// Ends the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_session_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
