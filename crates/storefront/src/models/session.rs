//! Identity session records.

use chrono::{DateTime, Utc};

use luzimarket_core::{SessionId, SubjectContext, SubjectType, UserId};

/// A stored identity session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub subject_type: SubjectType,
    /// Present iff `subject_type` is authenticated.
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    /// Set on logout; a revoked session never comes back.
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Whether the session can still authorize requests.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    /// The subject this session currently represents.
    ///
    /// Returns `None` for revoked sessions and for rows whose subject type and
    /// user ID disagree.
    #[must_use]
    pub const fn subject(&self) -> Option<SubjectContext> {
        if !self.is_active() {
            return None;
        }
        SubjectContext::from_parts(self.id, self.subject_type, self.user_id)
    }
}

/// A rotation credential about to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRotationCredential {
    /// SHA-256 of the opaque token handed to the client.
    pub token_hash: String,
    pub session_id: SessionId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
