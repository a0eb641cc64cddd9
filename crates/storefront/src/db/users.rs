//! Account storage.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use luzimarket_core::{Email, UserId};

use super::{RepositoryError, StoreFuture, conflict_or_database};
use crate::models::User;

/// Storage for accounts and their password hashes.
pub trait UserStore: Send + Sync {
    /// Create an account with a password hash.
    ///
    /// Fails with `RepositoryError::Conflict` if the email is taken.
    fn create_with_password<'a>(
        &'a self,
        email: &'a Email,
        password_hash: &'a str,
    ) -> StoreFuture<'a, User>;

    /// Get an account and its password hash by email.
    ///
    /// Returns `None` if the account does not exist or has no password.
    fn get_password_hash<'a>(&'a self, email: &'a Email)
    -> StoreFuture<'a, Option<(User, String)>>;
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        Ok(Self {
            id: UserId::new(row.id),
            email,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserWithPasswordRow {
    id: i32,
    email: String,
    created_at: DateTime<Utc>,
    password_hash: Option<String>,
}

/// `PostgreSQL`-backed account store.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserStore for PgUserStore {
    fn create_with_password<'a>(
        &'a self,
        email: &'a Email,
        password_hash: &'a str,
    ) -> StoreFuture<'a, User> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            let row: UserRow = sqlx::query_as(
                r"
                INSERT INTO storefront.app_user (email)
                VALUES ($1)
                RETURNING id, email, created_at
                ",
            )
            .bind(email.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_or_database(e, "email"))?;

            let user = User::try_from(row)?;

            sqlx::query(
                r"
                INSERT INTO storefront.user_password (user_id, password_hash)
                VALUES ($1, $2)
                ",
            )
            .bind(user.id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(user)
        })
    }

    fn get_password_hash<'a>(
        &'a self,
        email: &'a Email,
    ) -> StoreFuture<'a, Option<(User, String)>> {
        Box::pin(async move {
            let row: Option<UserWithPasswordRow> = sqlx::query_as(
                r"
                SELECT u.id, u.email, u.created_at, p.password_hash
                FROM storefront.app_user u
                LEFT JOIN storefront.user_password p ON u.id = p.user_id
                WHERE u.email = $1
                ",
            )
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;

            let Some(r) = row else {
                return Ok(None);
            };
            let Some(password_hash) = r.password_hash else {
                return Ok(None);
            };

            let user = User::try_from(UserRow {
                id: r.id,
                email: r.email,
                created_at: r.created_at,
            })?;
            Ok(Some((user, password_hash)))
        })
    }
}
