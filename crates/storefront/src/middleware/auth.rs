//! Authentication extractors.
//!
//! Resolve the `Authorization: Bearer <access token>` header to a
//! [`SubjectContext`] through the identity service.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::Span;

use luzimarket_core::SubjectContext;

use crate::error::AppError;
use crate::services::identity::IdentityError;
use crate::state::AppState;

/// Extractor that requires a valid access credential.
///
/// Rejects with `NoActiveSession` if no credential is presented and with the
/// uniform `Unauthorized` if it doesn't validate.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireSubject(subject): RequireSubject) -> impl IntoResponse {
///     subject.session_id().to_string()
/// }
/// ```
pub struct RequireSubject(pub SubjectContext);

impl FromRequestParts<AppState> for RequireSubject {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::NoActiveSession)?;
        let subject = state
            .identity()
            .validate(token)
            .await
            .map_err(|e| match e {
                IdentityError::Unauthorized => AppError::Unauthorized,
                other => AppError::Identity(other),
            })?;

        record_subject(&subject);
        Ok(Self(subject))
    }
}

/// Extractor that resolves the caller's subject if a valid credential is
/// presented.
///
/// A missing or invalid credential yields `None`; only store failures reject.
pub struct OptionalSubject(pub Option<SubjectContext>);

impl FromRequestParts<AppState> for OptionalSubject {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(Self(None));
        };
        match state.identity().validate(token).await {
            Ok(subject) => {
                record_subject(&subject);
                Ok(Self(Some(subject)))
            }
            Err(IdentityError::Unauthorized) => Ok(Self(None)),
            Err(other) => Err(AppError::Identity(other)),
        }
    }
}

/// The bearer token of the request, if any.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn record_subject(subject: &SubjectContext) {
    let span = Span::current();
    span.record("session_id", tracing::field::display(subject.session_id()));
    span.record("subject_type", subject.subject_type().as_str());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/auth/session");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer_token(&parts(Some("bearer  abc "))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }
}
