//! HTTP middleware for the storefront API.
//!
//! - Session layer (tower-sessions, `PostgreSQL` or in-memory store)
//! - Auth extractors reading the signed-in user from the session

pub mod auth;
pub mod session;

pub use auth::{CurrentUser, RequireAdmin, SessionUser, clear_session_user, set_session_user};
pub use session::{SESSION_COOKIE_NAME, create_session_layer};
