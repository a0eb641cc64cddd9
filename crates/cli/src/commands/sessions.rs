//! Session maintenance commands.

use chrono::Utc;

use luzimarket_storefront::db::{CredentialStore, PgCredentialStore};

use super::connect;

/// Delete rotation credentials that can never be redeemed again.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn purge() -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect().await?;
    let store = PgCredentialStore::new(pool);

    let removed = store.purge_expired(Utc::now()).await?;
    tracing::info!(removed, "Purged rotation credentials");
    Ok(())
}
