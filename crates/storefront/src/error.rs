//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Error bodies are JSON: `{"error": "<message>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::delivery::DeliveryError;
use crate::services::identity::IdentityError;

/// Body of every credential failure, whatever the cause.
const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Account operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Credential operation failed.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Delivery preference operation failed.
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// No credential was presented at all.
    #[error("No active session")]
    NoActiveSession,

    /// A credential was presented but cannot be used.
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Identity(err) => match err {
                IdentityError::Unauthorized => StatusCode::UNAUTHORIZED,
                IdentityError::InvalidSubject(_)
                | IdentityError::Encoding(_)
                | IdentityError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Delivery(err) => match err {
                DeliveryError::InvalidSelection(_) => StatusCode::BAD_REQUEST,
                DeliveryError::CatalogUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                DeliveryError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NoActiveSession | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    // Don't expose internal error details to clients
    fn client_message(&self) -> String {
        match self {
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid credentials".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    "Internal server error".to_string()
                }
            },
            Self::Identity(IdentityError::Unauthorized) | Self::Unauthorized => {
                UNAUTHORIZED_MESSAGE.to_string()
            }
            Self::Delivery(DeliveryError::InvalidSelection(msg)) => msg.clone(),
            Self::Delivery(DeliveryError::CatalogUnavailable(_)) => {
                "Delivery zones are temporarily unavailable".to_string()
            }
            Self::NoActiveSession => "No active session".to_string(),
            Self::NotFound(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::Database(_)
            | Self::Identity(_)
            | Self::Delivery(DeliveryError::Repository(_)) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody {
            error: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for an identity.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("zone-123".to_string());
        assert_eq!(err.to_string(), "Not found: zone-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(AppError::NotFound(String::new()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NoActiveSession.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Delivery(DeliveryError::InvalidSelection(String::new())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Delivery(DeliveryError::CatalogUnavailable(RepositoryError::NotFound))
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Auth(AuthError::UserAlreadyExists).status(),
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_credential_failures_share_one_body() {
        let (status_a, body_a) = body_of(AppError::Identity(IdentityError::Unauthorized)).await;
        let (status_b, body_b) = body_of(AppError::Unauthorized).await;
        assert_eq!(status_a, StatusCode::UNAUTHORIZED);
        assert_eq!(status_a, status_b);
        assert_eq!(body_a, body_b);
        assert_eq!(body_a["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = body_of(AppError::Database(RepositoryError::DataCorruption(
            "invalid subject type: admin".to_string(),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }
}
