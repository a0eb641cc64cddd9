//! Delivery preference ownership.

use luzimarket_core::{SessionId, SubjectContext, UserId};

pub use luzimarket_core::PreferenceStatus;

/// Who a stored delivery preference belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceOwner {
    /// Durable preference of a logged-in user.
    User(UserId),
    /// Guest preference, lives as long as the session.
    Session(SessionId),
}

impl PreferenceOwner {
    /// The owner a subject reads from and writes to.
    #[must_use]
    pub fn for_subject(subject: &SubjectContext) -> Self {
        subject
            .user_id()
            .map_or_else(|| Self::Session(subject.session_id()), Self::User)
    }

    #[must_use]
    pub const fn is_durable(&self) -> bool {
        matches!(self, Self::User(_))
    }
}
