//! Sign-up, password login, email code login and logout.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_sessions::Session;

use crate::domain::aggregates::{User, UserProfile};
use crate::error::AppResult;
use crate::middleware::{CurrentUser, SessionUser, clear_session_user, set_session_user};
use crate::services::accounts::{self, LoginInput, OtpRequestInput, OtpVerifyInput, RegisterInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/otp/request", post(request_otp))
        .route("/auth/otp/verify", post(verify_otp))
}

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(input): Json<RegisterInput>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let user = accounts::register(&state, input).await?;
    Ok((StatusCode::CREATED, Json(start_session(&session, &user).await?)))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(input): Json<LoginInput>,
) -> AppResult<Json<UserProfile>> {
    let user = accounts::login(&state, input).await?;
    Ok(Json(start_session(&session, &user).await?))
}

async fn logout(session: Session) -> AppResult<StatusCode> {
    clear_session_user(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> AppResult<Json<UserProfile>> {
    Ok(Json(accounts::load_user(&state, user.id).await?.profile()))
}

async fn request_otp(
    State(state): State<AppState>,
    Json(input): Json<OtpRequestInput>,
) -> AppResult<(StatusCode, Json<Message>)> {
    accounts::request_otp(&state, input).await?;
    Ok((StatusCode::ACCEPTED, Json(Message { message: "If the address is valid, a code is on its way" })))
}

async fn verify_otp(
    State(state): State<AppState>,
    session: Session,
    Json(input): Json<OtpVerifyInput>,
) -> AppResult<Json<UserProfile>> {
    let user = accounts::verify_otp(&state, input).await?;
    Ok(Json(start_session(&session, &user).await?))
}

async fn start_session(session: &Session, user: &User) -> AppResult<UserProfile> {
    set_session_user(session, &SessionUser::from(user)).await?;
    tracing::info!(user_id = %user.id(), "Signed in");
    Ok(user.profile())
}
