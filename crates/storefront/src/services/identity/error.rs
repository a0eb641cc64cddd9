//! Identity error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors returned by the identity service.
///
/// Every credential problem (malformed, bad signature, expired, redeemed,
/// revoked) collapses into `Unauthorized`.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The presented credential cannot be used.
    #[error("unauthorized")]
    Unauthorized,

    /// `subject_id` given for a guest, or missing for an authenticated subject.
    #[error("invalid subject: {0}")]
    InvalidSubject(&'static str),

    /// Credential could not be produced.
    #[error("token encoding failed: {0}")]
    Encoding(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Store(#[from] RepositoryError),
}
