//! Delivery zone catalog.
//!
//! Zone listings per state are cached for a short TTL. Single-zone lookups,
//! which decide whether a selection is still valid, always hit the database
//! so a deactivated zone is rejected immediately.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tracing::instrument;

use luzimarket_core::{DeliveryZone, DeliveryZoneId, StateCode};

use super::{RepositoryError, StoreFuture, conflict_or_database};

/// Default TTL for cached zone listings.
pub const DEFAULT_ZONE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Read access to the live zone catalog.
pub trait ZoneCatalog: Send + Sync {
    /// Active zones belonging to `state`, ordered by name.
    fn zones_for_state<'a>(&'a self, state: &'a StateCode)
    -> StoreFuture<'a, Arc<Vec<DeliveryZone>>>;

    /// An active zone by ID.
    fn find_zone(&self, id: DeliveryZoneId) -> StoreFuture<'_, Option<DeliveryZone>>;
}

#[derive(sqlx::FromRow)]
struct ZoneRow {
    id: i32,
    state_code: String,
    name: String,
    fee: i64,
}

impl TryFrom<ZoneRow> for DeliveryZone {
    type Error = RepositoryError;

    fn try_from(row: ZoneRow) -> Result<Self, Self::Error> {
        let state_code = StateCode::parse(&row.state_code).map_err(|e| {
            RepositoryError::DataCorruption(format!("zone {}: {e}", row.id))
        })?;
        Ok(Self {
            id: DeliveryZoneId::new(row.id),
            state_code,
            name: row.name,
            fee: row.fee,
        })
    }
}

/// A zone definition used when seeding the catalog.
#[derive(Debug, Clone)]
pub struct ZoneSeed {
    pub state_code: StateCode,
    pub name: String,
    pub fee: i64,
}

/// `PostgreSQL`-backed zone catalog with a TTL cache over listings.
#[derive(Clone)]
pub struct PgZoneCatalog {
    pool: PgPool,
    listings: Cache<StateCode, Arc<Vec<DeliveryZone>>>,
}

impl PgZoneCatalog {
    #[must_use]
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        let listings = Cache::builder()
            .max_capacity(64)
            .time_to_live(ttl)
            .build();
        Self { pool, listings }
    }

    /// Insert a zone, or update the fee and reactivate it if `(state, name)`
    /// already exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database operation fails.
    #[instrument(skip(self), fields(state = %seed.state_code, name = %seed.name))]
    pub async fn upsert_zone(&self, seed: &ZoneSeed) -> Result<DeliveryZone, RepositoryError> {
        let row: ZoneRow = sqlx::query_as(
            r"
            INSERT INTO storefront.delivery_zone (state_code, name, fee)
            VALUES ($1, $2, $3)
            ON CONFLICT (state_code, name) DO UPDATE
            SET fee = EXCLUDED.fee, is_active = TRUE, updated_at = now()
            RETURNING id, state_code, name, fee
            ",
        )
        .bind(seed.state_code.as_str())
        .bind(&seed.name)
        .bind(seed.fee)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_database(e, "delivery zone"))?;

        self.listings.invalidate(&seed.state_code).await;
        DeliveryZone::try_from(row)
    }

    /// Take a zone out of the catalog. Preferences that reference it become
    /// invalid on their next restore.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no active zone has this ID.
    #[instrument(skip(self), fields(zone_id = %id))]
    pub async fn deactivate_zone(&self, id: DeliveryZoneId) -> Result<(), RepositoryError> {
        let row: Option<(String,)> = sqlx::query_as(
            r"
            UPDATE storefront.delivery_zone
            SET is_active = FALSE, updated_at = now()
            WHERE id = $1 AND is_active
            RETURNING state_code
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((state_code,)) = row else {
            return Err(RepositoryError::NotFound);
        };
        if let Ok(state) = StateCode::parse(&state_code) {
            self.listings.invalidate(&state).await;
        }
        Ok(())
    }

    /// Every active zone, ordered by state then name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database query fails.
    pub async fn list_all(&self) -> Result<Vec<DeliveryZone>, RepositoryError> {
        let rows: Vec<ZoneRow> = sqlx::query_as(
            r"
            SELECT id, state_code, name, fee
            FROM storefront.delivery_zone
            WHERE is_active
            ORDER BY state_code, name
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeliveryZone::try_from).collect()
    }

    async fn load_state(&self, state: &StateCode) -> Result<Vec<DeliveryZone>, RepositoryError> {
        let rows: Vec<ZoneRow> = sqlx::query_as(
            r"
            SELECT id, state_code, name, fee
            FROM storefront.delivery_zone
            WHERE state_code = $1 AND is_active
            ORDER BY name
            ",
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeliveryZone::try_from).collect()
    }
}

impl ZoneCatalog for PgZoneCatalog {
    fn zones_for_state<'a>(
        &'a self,
        state: &'a StateCode,
    ) -> StoreFuture<'a, Arc<Vec<DeliveryZone>>> {
        Box::pin(async move {
            if let Some(cached) = self.listings.get(state).await {
                tracing::debug!(state = %state, "zone listing cache hit");
                return Ok(cached);
            }

            let zones = Arc::new(self.load_state(state).await?);
            self.listings.insert(state.clone(), Arc::clone(&zones)).await;
            Ok(zones)
        })
    }

    fn find_zone(&self, id: DeliveryZoneId) -> StoreFuture<'_, Option<DeliveryZone>> {
        Box::pin(async move {
            let row: Option<ZoneRow> = sqlx::query_as(
                r"
                SELECT id, state_code, name, fee
                FROM storefront.delivery_zone
                WHERE id = $1 AND is_active
                ",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            row.map(DeliveryZone::try_from).transpose()
        })
    }
}
