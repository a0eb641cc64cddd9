//! CLI command implementations.

pub mod migrate;
pub mod sessions;
pub mod zones;

use secrecy::SecretString;
use sqlx::PgPool;

/// Connect to the storefront database named by the environment.
///
/// Reads `STOREFRONT_DATABASE_URL`, falling back to `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| "STOREFRONT_DATABASE_URL not set")?;

    let pool = luzimarket_storefront::db::create_pool(&database_url).await?;
    tracing::info!("Connected to database");
    Ok(pool)
}
