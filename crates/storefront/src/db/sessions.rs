//! Identity session and rotation credential storage.
//!
//! Rotation is a compare-and-invalidate: the presented credential is marked
//! redeemed only if it is still live, and the replacement is inserted in the
//! same transaction. Two concurrent refreshes with the same credential race on
//! a single row update, so exactly one of them sees the row.
//!
//! Every write to a session's credentials first locks its `identity_session`
//! row, so a refresh and a login upgrade of the same session run one after
//! the other and the one-live-credential index is never hit by a race.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use luzimarket_core::{SessionId, SubjectType, UserId};

use super::{RepositoryError, StoreFuture, conflict_or_database};
use crate::models::{NewRotationCredential, SessionRecord};

/// Storage for identity sessions and their rotation credentials.
pub trait CredentialStore: Send + Sync {
    /// Create a new active session.
    fn create_session(
        &self,
        subject_type: SubjectType,
        user_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, SessionRecord>;

    /// Fetch a session by ID, revoked or not.
    fn get_session(&self, id: SessionId) -> StoreFuture<'_, Option<SessionRecord>>;

    /// Turn an active guest session (or a session already owned by `user_id`)
    /// into an authenticated one for `user_id`.
    ///
    /// Returns `None` if the session is unknown, revoked, or owned by another
    /// user.
    fn upgrade_session(
        &self,
        id: SessionId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<SessionRecord>>;

    /// Revoke every live credential of the session and store `credential`.
    fn replace_credential(&self, credential: NewRotationCredential) -> StoreFuture<'_, ()>;

    /// Redeem the credential with `presented_hash` and store its replacement.
    ///
    /// Returns the owning session if the credential was live (not redeemed,
    /// not revoked, not expired at `now`, session not revoked), `None`
    /// otherwise. Nothing is written when `None` is returned.
    fn rotate<'a>(
        &'a self,
        presented_hash: &'a str,
        replacement_hash: String,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'a, Option<SessionRecord>>;

    /// Revoke the session and all of its credentials.
    ///
    /// Returns `false` if the session was unknown or already revoked.
    fn revoke_session(&self, id: SessionId, now: DateTime<Utc>) -> StoreFuture<'_, bool>;

    /// Delete credentials that can never be redeemed again.
    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64>;
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    subject_type: String,
    user_id: Option<i32>,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = RepositoryError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let subject_type = SubjectType::parse(&row.subject_type).ok_or_else(|| {
            RepositoryError::DataCorruption(format!("invalid subject type: {}", row.subject_type))
        })?;
        Ok(Self {
            id: SessionId::from_uuid(row.id),
            subject_type,
            user_id: row.user_id.map(UserId::new),
            created_at: row.created_at,
            revoked_at: row.revoked_at,
        })
    }
}

/// `PostgreSQL`-backed credential store.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CredentialStore for PgCredentialStore {
    fn create_session(
        &self,
        subject_type: SubjectType,
        user_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, SessionRecord> {
        Box::pin(async move {
            let row: SessionRow = sqlx::query_as(
                r"
                INSERT INTO storefront.identity_session (id, subject_type, user_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $4)
                RETURNING id, subject_type, user_id, created_at, revoked_at
                ",
            )
            .bind(SessionId::generate().as_uuid())
            .bind(subject_type.as_str())
            .bind(user_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

            SessionRecord::try_from(row)
        })
    }

    fn get_session(&self, id: SessionId) -> StoreFuture<'_, Option<SessionRecord>> {
        Box::pin(async move {
            let row: Option<SessionRow> = sqlx::query_as(
                r"
                SELECT id, subject_type, user_id, created_at, revoked_at
                FROM storefront.identity_session
                WHERE id = $1
                ",
            )
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

            row.map(SessionRecord::try_from).transpose()
        })
    }

    fn upgrade_session(
        &self,
        id: SessionId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<SessionRecord>> {
        Box::pin(async move {
            let row: Option<SessionRow> = sqlx::query_as(
                r"
                UPDATE storefront.identity_session
                SET subject_type = 'authenticated', user_id = $2, updated_at = $3
                WHERE id = $1
                  AND revoked_at IS NULL
                  AND (subject_type = 'guest' OR user_id = $2)
                RETURNING id, subject_type, user_id, created_at, revoked_at
                ",
            )
            .bind(id.as_uuid())
            .bind(user_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            row.map(SessionRecord::try_from).transpose()
        })
    }

    fn replace_credential(&self, credential: NewRotationCredential) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            lock_session(&mut tx, credential.session_id).await?;

            sqlx::query(
                r"
                UPDATE storefront.rotation_credential
                SET revoked_at = $2
                WHERE session_id = $1 AND redeemed_at IS NULL AND revoked_at IS NULL
                ",
            )
            .bind(credential.session_id.as_uuid())
            .bind(credential.issued_at)
            .execute(&mut *tx)
            .await?;

            insert_credential(&mut tx, &credential).await?;

            tx.commit().await?;
            Ok(())
        })
    }

    fn rotate<'a>(
        &'a self,
        presented_hash: &'a str,
        replacement_hash: String,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'a, Option<SessionRecord>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            let owner: Option<(Uuid,)> = sqlx::query_as(
                r"
                SELECT s.id
                FROM storefront.rotation_credential c
                JOIN storefront.identity_session s ON s.id = c.session_id
                WHERE c.token_hash = $1
                FOR UPDATE OF s
                ",
            )
            .bind(presented_hash)
            .fetch_optional(&mut *tx)
            .await?;
            if owner.is_none() {
                tx.rollback().await?;
                return Ok(None);
            }

            // Runs on a fresh snapshot taken after the session lock.
            let row: Option<SessionRow> = sqlx::query_as(
                r"
                UPDATE storefront.rotation_credential c
                SET redeemed_at = $2
                FROM storefront.identity_session s
                WHERE c.token_hash = $1
                  AND c.session_id = s.id
                  AND c.redeemed_at IS NULL
                  AND c.revoked_at IS NULL
                  AND c.expires_at > $2
                  AND s.revoked_at IS NULL
                RETURNING s.id, s.subject_type, s.user_id, s.created_at, s.revoked_at
                ",
            )
            .bind(presented_hash)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = row else {
                tx.rollback().await?;
                return Ok(None);
            };
            let session = SessionRecord::try_from(row)?;

            let replacement = NewRotationCredential {
                token_hash: replacement_hash,
                session_id: session.id,
                issued_at: now,
                expires_at,
            };
            insert_credential(&mut tx, &replacement).await?;

            tx.commit().await?;
            Ok(Some(session))
        })
    }

    fn revoke_session(&self, id: SessionId, now: DateTime<Utc>) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query(
                r"
                UPDATE storefront.identity_session
                SET revoked_at = $2, updated_at = $2
                WHERE id = $1 AND revoked_at IS NULL
                ",
            )
            .bind(id.as_uuid())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r"
                UPDATE storefront.rotation_credential
                SET revoked_at = $2
                WHERE session_id = $1 AND revoked_at IS NULL
                ",
            )
            .bind(id.as_uuid())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                DELETE FROM storefront.rotation_credential
                WHERE expires_at <= $1 OR redeemed_at IS NOT NULL OR revoked_at IS NOT NULL
                ",
            )
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected())
        })
    }
}

/// Serialize credential writes for one session until `tx` ends.
async fn lock_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session_id: SessionId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        SELECT id FROM storefront.identity_session
        WHERE id = $1
        FOR UPDATE
        ",
    )
    .bind(session_id.as_uuid())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_credential(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    credential: &NewRotationCredential,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO storefront.rotation_credential (token_hash, session_id, issued_at, expires_at)
        VALUES ($1, $2, $3, $4)
        ",
    )
    .bind(&credential.token_hash)
    .bind(credential.session_id.as_uuid())
    .bind(credential.issued_at)
    .bind(credential.expires_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| conflict_or_database(e, "active rotation credential"))?;

    Ok(())
}
