//! Delivery preference storage, keyed by user (durable) or guest session.

use chrono::Utc;
use sqlx::PgPool;

use luzimarket_core::{DeliverySelection, DeliveryZoneId, SessionId, StateCode, UserId};

use super::{RepositoryError, StoreFuture};
use crate::models::PreferenceOwner;

/// Storage for the selected `(state, zone)` pair of each owner.
pub trait PreferenceStore: Send + Sync {
    /// Get the stored selection for `owner`.
    fn get(&self, owner: PreferenceOwner) -> StoreFuture<'_, Option<DeliverySelection>>;

    /// Insert or overwrite the selection for `owner`.
    fn put<'a>(
        &'a self,
        owner: PreferenceOwner,
        selection: &'a DeliverySelection,
    ) -> StoreFuture<'a, ()>;

    /// Delete the selection for `owner`. Returns whether one existed.
    fn delete(&self, owner: PreferenceOwner) -> StoreFuture<'_, bool>;

    /// Move the guest selection of `session_id` onto `user_id`, overwriting any
    /// durable selection the user already had.
    ///
    /// Returns the moved selection, or `None` (leaving the user's selection
    /// untouched) if the session had none.
    fn transfer(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> StoreFuture<'_, Option<DeliverySelection>>;
}

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    state_code: String,
    zone_id: i32,
    zone_fee: i64,
}

impl TryFrom<PreferenceRow> for DeliverySelection {
    type Error = RepositoryError;

    fn try_from(row: PreferenceRow) -> Result<Self, Self::Error> {
        let state_code = StateCode::parse(&row.state_code)
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        Ok(Self {
            state_code,
            zone_id: DeliveryZoneId::new(row.zone_id),
            zone_fee: row.zone_fee,
        })
    }
}

/// `PostgreSQL`-backed preference store.
#[derive(Clone)]
pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PreferenceStore for PgPreferenceStore {
    fn get(&self, owner: PreferenceOwner) -> StoreFuture<'_, Option<DeliverySelection>> {
        Box::pin(async move {
            let query = match owner {
                PreferenceOwner::User(user_id) => sqlx::query_as::<_, PreferenceRow>(
                    r"
                    SELECT state_code, zone_id, zone_fee
                    FROM storefront.delivery_preference
                    WHERE user_id = $1
                    ",
                )
                .bind(user_id),
                PreferenceOwner::Session(session_id) => sqlx::query_as::<_, PreferenceRow>(
                    r"
                    SELECT state_code, zone_id, zone_fee
                    FROM storefront.delivery_preference
                    WHERE session_id = $1
                    ",
                )
                .bind(session_id.as_uuid()),
            };

            let row = query.fetch_optional(&self.pool).await?;
            row.map(DeliverySelection::try_from).transpose()
        })
    }

    fn put<'a>(
        &'a self,
        owner: PreferenceOwner,
        selection: &'a DeliverySelection,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = match owner {
                PreferenceOwner::User(user_id) => sqlx::query(
                    r"
                    INSERT INTO storefront.delivery_preference (user_id, state_code, zone_id, zone_fee, updated_at)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (user_id) DO UPDATE
                    SET state_code = EXCLUDED.state_code,
                        zone_id = EXCLUDED.zone_id,
                        zone_fee = EXCLUDED.zone_fee,
                        updated_at = EXCLUDED.updated_at
                    ",
                )
                .bind(user_id),
                PreferenceOwner::Session(session_id) => sqlx::query(
                    r"
                    INSERT INTO storefront.delivery_preference (session_id, state_code, zone_id, zone_fee, updated_at)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (session_id) DO UPDATE
                    SET state_code = EXCLUDED.state_code,
                        zone_id = EXCLUDED.zone_id,
                        zone_fee = EXCLUDED.zone_fee,
                        updated_at = EXCLUDED.updated_at
                    ",
                )
                .bind(session_id.as_uuid()),
            };

            query
                .bind(selection.state_code.as_str())
                .bind(selection.zone_id)
                .bind(selection.zone_fee)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

            Ok(())
        })
    }

    fn delete(&self, owner: PreferenceOwner) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let query = match owner {
                PreferenceOwner::User(user_id) => {
                    sqlx::query("DELETE FROM storefront.delivery_preference WHERE user_id = $1")
                        .bind(user_id)
                }
                PreferenceOwner::Session(session_id) => {
                    sqlx::query("DELETE FROM storefront.delivery_preference WHERE session_id = $1")
                        .bind(session_id.as_uuid())
                }
            };

            let result = query.execute(&self.pool).await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn transfer(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> StoreFuture<'_, Option<DeliverySelection>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            let guest: Option<PreferenceRow> = sqlx::query_as(
                r"
                DELETE FROM storefront.delivery_preference
                WHERE session_id = $1
                RETURNING state_code, zone_id, zone_fee
                ",
            )
            .bind(session_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = guest else {
                tx.rollback().await?;
                return Ok(None);
            };
            let selection = DeliverySelection::try_from(row)?;

            sqlx::query(
                r"
                INSERT INTO storefront.delivery_preference (user_id, state_code, zone_id, zone_fee, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id) DO UPDATE
                SET state_code = EXCLUDED.state_code,
                    zone_id = EXCLUDED.zone_id,
                    zone_fee = EXCLUDED.zone_fee,
                    updated_at = EXCLUDED.updated_at
                ",
            )
            .bind(user_id)
            .bind(selection.state_code.as_str())
            .bind(selection.zone_id)
            .bind(selection.zone_fee)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(Some(selection))
        })
    }
}
