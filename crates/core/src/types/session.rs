//! Identity session types shared by the storefront service and its clients.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::delivery::PreferenceStatus;
use super::id::UserId;

/// Opaque identifier of an identity session.
///
/// Stays stable across token rotation and across the guest → authenticated
/// transition; only logout or rotation-credential expiry ends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Who the current actor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// Anonymous visitor identified only by the session.
    Guest,
    /// Logged-in user.
    Authenticated,
}

impl SubjectType {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Authenticated => "authenticated",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "guest" => Some(Self::Guest),
            "authenticated" => Some(Self::Authenticated),
            _ => None,
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved identity behind a valid access credential.
///
/// `user_id` is present iff the subject is authenticated; the constructors are
/// the only way to build one, so the pairing cannot drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectContext {
    session_id: SessionId,
    subject_type: SubjectType,
    user_id: Option<UserId>,
}

impl SubjectContext {
    /// Context for an anonymous session.
    #[must_use]
    pub const fn guest(session_id: SessionId) -> Self {
        Self {
            session_id,
            subject_type: SubjectType::Guest,
            user_id: None,
        }
    }

    /// Context for a logged-in user.
    #[must_use]
    pub const fn authenticated(session_id: SessionId, user_id: UserId) -> Self {
        Self {
            session_id,
            subject_type: SubjectType::Authenticated,
            user_id: Some(user_id),
        }
    }

    /// Rebuild a context from stored parts, rejecting mismatched pairs.
    #[must_use]
    pub const fn from_parts(
        session_id: SessionId,
        subject_type: SubjectType,
        user_id: Option<UserId>,
    ) -> Option<Self> {
        match (subject_type, user_id) {
            (SubjectType::Guest, None) => Some(Self::guest(session_id)),
            (SubjectType::Authenticated, Some(user_id)) => {
                Some(Self::authenticated(session_id, user_id))
            }
            _ => None,
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub const fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.subject_type, SubjectType::Authenticated)
    }
}

/// Credential pair returned by register, login, guest bootstrap and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived signed access credential.
    pub access_token: String,
    /// Single-use rotation credential.
    pub refresh_token: String,
    /// Session both credentials are bound to.
    pub session_id: SessionId,
    /// Subject type at issuance.
    pub subject_type: SubjectType,
    /// Access credential expiry.
    pub access_token_expires_at: DateTime<Utc>,
    /// Rotation credential expiry.
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// Body of `GET /api/auth/session`: the current subject and its restored
/// delivery preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub subject_type: SubjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub delivery: PreferenceStatus,
}

/// Claims carried inside an access credential.
///
/// Timestamps are Unix seconds. The storefront signs these; clients may read
/// them without verifying to learn the subject type and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Session the credential is bound to.
    pub sid: SessionId,
    /// Subject type at issuance.
    pub sub_type: SubjectType,
    /// User ID for authenticated subjects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<UserId>,
    /// Issued at.
    pub iat: i64,
    /// Expires at.
    pub exp: i64,
}

impl AccessClaims {
    /// Claims for `subject`, valid from `issued_at` until `expires_at`.
    #[must_use]
    pub fn for_subject(
        subject: &SubjectContext,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sid: subject.session_id,
            sub_type: subject.subject_type,
            uid: subject.user_id,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    /// The subject these claims describe, if the pairing is consistent.
    #[must_use]
    pub const fn subject(&self) -> Option<SubjectContext> {
        SubjectContext::from_parts(self.sid, self.sub_type, self.uid)
    }

    /// Whether the claims have expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_access_claims_expiry_and_subject() {
        let now = Utc::now();
        let subject = SubjectContext::authenticated(SessionId::generate(), UserId::new(3));
        let claims = AccessClaims::for_subject(&subject, now, now + chrono::Duration::minutes(15));
        assert_eq!(claims.subject(), Some(subject));
        assert!(!claims.is_expired(now));
        assert!(claims.is_expired(now + chrono::Duration::minutes(15)));

        let json = serde_json::to_value(AccessClaims::for_subject(
            &SubjectContext::guest(subject.session_id()),
            now,
            now,
        ))
        .unwrap();
        assert!(json.get("uid").is_none());
        assert_eq!(json["sub_type"], "guest");
    }

    #[test]
    fn test_subject_context_rejects_mismatched_parts() {
        let sid = SessionId::generate();
        assert!(SubjectContext::from_parts(sid, SubjectType::Guest, Some(UserId::new(1))).is_none());
        assert!(SubjectContext::from_parts(sid, SubjectType::Authenticated, None).is_none());

        let ctx =
            SubjectContext::from_parts(sid, SubjectType::Authenticated, Some(UserId::new(4)))
                .unwrap();
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.user_id(), Some(UserId::new(4)));
    }

    #[test]
    fn test_subject_type_round_trips_through_db_text() {
        for ty in [SubjectType::Guest, SubjectType::Authenticated] {
            assert_eq!(SubjectType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(SubjectType::parse("admin"), None);
    }

    #[test]
    fn test_token_pair_uses_camel_case() {
        let pair = TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            session_id: SessionId::generate(),
            subject_type: SubjectType::Guest,
            access_token_expires_at: Utc::now(),
            refresh_token_expires_at: Utc::now(),
        };
        let value = serde_json::to_value(&pair).unwrap();
        assert!(value.get("accessToken").is_some());
        assert!(value.get("refreshToken").is_some());
        assert_eq!(value["subjectType"], "guest");
    }
}
