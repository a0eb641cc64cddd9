//! Session identity management.
//!
//! Issues, rotates, validates and revokes the credential pair bound to an
//! identity session. The session ID stays the same across rotation and across
//! the guest to authenticated upgrade.

mod error;
pub mod token;

pub use error::IdentityError;
pub use token::TokenSigner;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use tracing::instrument;

use luzimarket_core::{AccessClaims, SessionId, SubjectContext, SubjectType, TokenPair, UserId};

use crate::config::TokenConfig;
use crate::db::{CredentialStore, RepositoryError};
use crate::models::{NewRotationCredential, SessionRecord};
use token::{generate_rotation_token, hash_rotation_token};

/// Issues and checks credentials against a [`CredentialStore`].
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    signer: TokenSigner,
    access_ttl: Duration,
    refresh_ttl: Duration,
    /// Current subject per session; `None` marks a revoked or unknown session.
    status: Cache<SessionId, Option<SubjectContext>>,
}

impl IdentityService {
    /// Create an identity service.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Encoding` if a configured lifetime is out of range.
    pub fn new(store: Arc<dyn CredentialStore>, config: &TokenConfig) -> Result<Self, IdentityError> {
        let to_chrono = |d: std::time::Duration| {
            Duration::from_std(d).map_err(|e| IdentityError::Encoding(e.to_string()))
        };
        Ok(Self {
            store,
            signer: TokenSigner::new(config.secret.clone()),
            access_ttl: to_chrono(config.access_ttl)?,
            refresh_ttl: to_chrono(config.refresh_ttl)?,
            status: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(config.session_cache_ttl)
                .build(),
        })
    }

    /// Issue a fresh credential pair.
    ///
    /// `user_id` is required for authenticated subjects and forbidden for
    /// guests. For an authenticated subject, `carry_over` names the caller's
    /// current session; it is upgraded in place so the session ID survives
    /// login. An unknown, revoked or foreign session is replaced by a new one.
    ///
    /// Any previous rotation credential of the session is invalidated.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidSubject` for a mismatched subject pair.
    #[instrument(skip(self), fields(session_id))]
    pub async fn issue(
        &self,
        subject_type: SubjectType,
        user_id: Option<UserId>,
        carry_over: Option<SessionId>,
    ) -> Result<TokenPair, IdentityError> {
        let now = Utc::now();

        let session = match (subject_type, user_id) {
            (SubjectType::Guest, Some(_)) => {
                return Err(IdentityError::InvalidSubject("guest subject cannot carry a user"));
            }
            (SubjectType::Authenticated, None) => {
                return Err(IdentityError::InvalidSubject("authenticated subject requires a user"));
            }
            (SubjectType::Guest, None) => {
                self.store.create_session(SubjectType::Guest, None, now).await?
            }
            (SubjectType::Authenticated, Some(user_id)) => {
                self.upgrade_or_create(user_id, carry_over, now).await?
            }
        };

        tracing::Span::current().record("session_id", tracing::field::display(session.id));
        self.status.invalidate(&session.id).await;

        let subject = subject_of(&session)?;
        let refresh_token = generate_rotation_token();
        let refresh_expires_at = now + self.refresh_ttl;
        self.store
            .replace_credential(NewRotationCredential {
                token_hash: hash_rotation_token(&refresh_token),
                session_id: session.id,
                issued_at: now,
                expires_at: refresh_expires_at,
            })
            .await?;

        tracing::info!(subject_type = %subject.subject_type(), "credentials issued");
        self.pair(&subject, refresh_token, now, refresh_expires_at)
    }

    async fn upgrade_or_create(
        &self,
        user_id: UserId,
        carry_over: Option<SessionId>,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord, IdentityError> {
        if let Some(session_id) = carry_over
            && let Some(upgraded) = self.store.upgrade_session(session_id, user_id, now).await?
        {
            return Ok(upgraded);
        }
        Ok(self
            .store
            .create_session(SubjectType::Authenticated, Some(user_id), now)
            .await?)
    }

    /// Exchange a rotation credential for a new pair on the same session.
    ///
    /// The presented credential is consumed. Of several concurrent calls with
    /// the same credential, exactly one succeeds.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Unauthorized` if the credential is malformed,
    /// expired, revoked or already redeemed.
    #[instrument(skip_all)]
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, IdentityError> {
        if presented.trim().is_empty() {
            return Err(IdentityError::Unauthorized);
        }

        let now = Utc::now();
        let refresh_token = generate_rotation_token();
        let refresh_expires_at = now + self.refresh_ttl;

        let session = self
            .store
            .rotate(
                &hash_rotation_token(presented),
                hash_rotation_token(&refresh_token),
                now,
                refresh_expires_at,
            )
            .await?
            .ok_or(IdentityError::Unauthorized)?;

        let subject = session.subject().ok_or(IdentityError::Unauthorized)?;
        tracing::debug!(session_id = %session.id, "rotation credential redeemed");
        self.pair(&subject, refresh_token, now, refresh_expires_at)
    }

    /// Resolve an access credential to its subject without rotating anything.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Unauthorized` if the signature or expiry check
    /// fails, or if the session was revoked or changed subject since issuance.
    pub async fn validate(&self, access_token: &str) -> Result<SubjectContext, IdentityError> {
        let claims = self
            .signer
            .verify(access_token, Utc::now())
            .ok_or(IdentityError::Unauthorized)?;
        let subject = claims.subject().ok_or(IdentityError::Unauthorized)?;

        match self.current_subject(subject.session_id()).await? {
            Some(current) if current == subject => Ok(subject),
            _ => Err(IdentityError::Unauthorized),
        }
    }

    /// Revoke the session and both of its credentials.
    ///
    /// Returns `false` if the session was already revoked.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Store` if the store fails.
    #[instrument(skip(self))]
    pub async fn revoke(&self, session_id: SessionId) -> Result<bool, IdentityError> {
        let revoked = self.store.revoke_session(session_id, Utc::now()).await?;
        self.status.insert(session_id, None).await;
        tracing::info!(revoked, "session revoked");
        Ok(revoked)
    }

    async fn current_subject(
        &self,
        session_id: SessionId,
    ) -> Result<Option<SubjectContext>, RepositoryError> {
        if let Some(cached) = self.status.get(&session_id).await {
            return Ok(cached);
        }
        let subject = self
            .store
            .get_session(session_id)
            .await?
            .and_then(|record| record.subject());
        self.status.insert(session_id, subject).await;
        Ok(subject)
    }

    fn pair(
        &self,
        subject: &SubjectContext,
        refresh_token: String,
        now: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> Result<TokenPair, IdentityError> {
        let access_expires_at = now + self.access_ttl;
        let claims = AccessClaims::for_subject(subject, now, access_expires_at);
        Ok(TokenPair {
            access_token: self.signer.sign(&claims)?,
            refresh_token,
            session_id: subject.session_id(),
            subject_type: subject.subject_type(),
            access_token_expires_at: access_expires_at,
            refresh_token_expires_at: refresh_expires_at,
        })
    }
}

fn subject_of(session: &SessionRecord) -> Result<SubjectContext, IdentityError> {
    session.subject().ok_or_else(|| {
        IdentityError::Store(RepositoryError::DataCorruption(format!(
            "session {} has an inconsistent subject",
            session.id
        )))
    })
}
