//! Persistence for the storefront service.
//!
//! # Database: `luzimarket`
//!
//! ## Tables (schema `storefront`)
//!
//! - `app_user` / `user_password` - Accounts and Argon2id hashes
//! - `identity_session` - Guest and authenticated sessions
//! - `rotation_credential` - Hashed single-use refresh tokens
//! - `delivery_zone` - Live delivery zone catalog
//! - `delivery_preference` - Selected `(state, zone)` per user or guest session
//!
//! # Stores
//!
//! Every table group sits behind an object-safe store trait so handlers only
//! see `Arc<dyn Store>`. Each trait has a `PostgreSQL` implementation in its
//! module and an in-memory implementation in [`memory`].
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p luzimarket-cli -- migrate
//! ```

pub mod memory;
pub mod preferences;
pub mod sessions;
pub mod users;
pub mod zones;

use std::time::Duration;

use futures::future::BoxFuture;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use preferences::{PgPreferenceStore, PreferenceStore};
pub use sessions::{CredentialStore, PgCredentialStore};
pub use users::{PgUserStore, UserStore};
pub use zones::{PgZoneCatalog, ZoneCatalog};

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The requested row does not exist.
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored value could not be mapped to its domain type.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Future returned by every store method.
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, RepositoryError>>;

/// Map a unique violation to `Conflict`, everything else to `Database`.
pub(crate) fn conflict_or_database(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(err)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
