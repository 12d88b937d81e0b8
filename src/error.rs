//! Unified error handling for the API.
//!
//! Every failure a handler can hit converts into [`AppError`], which renders
//! as `{"error": "<message>"}` with a matching status code.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::domain::aggregates::{CartError, OrderError, ProductError, UserError};
use crate::domain::value_objects::PincodeError;
use crate::domain::{MoneyError, SkuError};
use crate::integrations::IntegrationError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error("{}", validation_message(.0))]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    User(#[from] UserError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(_) | Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Integration(IntegrationError::NotConfigured(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Integration(IntegrationError::Rejected(_)) => StatusCode::BAD_REQUEST,
            Self::Integration(_) => StatusCode::BAD_GATEWAY,
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Product(ProductError::InsufficientStock) => StatusCode::CONFLICT,
            Self::Product(_) => StatusCode::BAD_REQUEST,
            Self::Cart(CartError::ItemNotFound) | Self::User(UserError::AddressNotFound) => StatusCode::NOT_FOUND,
            Self::Cart(_) => StatusCode::BAD_REQUEST,
            Self::Order(OrderError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            Self::Order(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Store(_) | Self::Session(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Integration(IntegrationError::NotConfigured(_) | IntegrationError::Rejected(_)) => self.to_string(),
            Self::Integration(_) => "External service error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<SkuError> for AppError {
    fn from(e: SkuError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<MoneyError> for AppError {
    fn from(e: MoneyError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<PincodeError> for AppError {
    fn from(e: PincodeError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

/// First message per field, sorted by field name.
fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by_key(|(field, _)| *field);
    let parts: Vec<String> = fields
        .into_iter()
        .filter_map(|(field, errs)| {
            errs.first().map(|e| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect();
    if parts.is_empty() { "Invalid input".to_string() } else { parts.join("; ") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;
    use validator::Validate;

    #[derive(Validate)]
    struct Signup {
        #[validate(email(message = "Enter a valid email"))]
        email: String,
        #[validate(length(min = 8))]
        password: String,
    }

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(get_status(AppError::not_found("Order")), StatusCode::NOT_FOUND);
        assert_eq!(get_status(AppError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(AppError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(get_status(AppError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(get_status(AppError::TooManyRequests("x".into())), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            get_status(IntegrationError::NotConfigured("payments").into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(IntegrationError::Authentication("shiprocket").into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(OrderError::InvalidTransition { from: OrderStatus::Delivered, to: OrderStatus::Cancelled }.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(get_status(CartError::InvalidQuantity.into()), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(AppError::Internal("db down".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_message() {
        let err = Signup { email: "nope".into(), password: "short".into() }.validate().unwrap_err();
        let err = AppError::from(err);
        assert_eq!(err.to_string(), "Enter a valid email; password is invalid");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_display() {
        assert_eq!(AppError::not_found("Product").to_string(), "Product not found");
    }
}
