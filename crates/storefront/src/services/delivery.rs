//! Server-side delivery preference handling.
//!
//! A subject's preference is stored under its user ID when authenticated and
//! under its session ID when a guest. Every read is checked against the live
//! zone catalog; a reference that no longer resolves is reported as invalid
//! rather than replaced.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use luzimarket_core::{
    DeliverySelection, DeliveryZone, DeliveryZoneId, STALE_SELECTION_MESSAGE, SessionId, StateCode,
    SubjectContext, UserId,
};

use crate::db::{PreferenceStore, RepositoryError, ZoneCatalog};
use crate::models::{PreferenceOwner, PreferenceStatus};

/// Shown when a guest's selection is saved.
pub const GUEST_SAVED_MESSAGE: &str = "Delivery location saved for this visit.";
/// Shown when an account's selection is saved.
pub const ACCOUNT_SAVED_MESSAGE: &str = "Delivery location saved to your account.";

/// Errors returned by the delivery service.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The requested state/zone pair is not valid.
    #[error("{0}")]
    InvalidSelection(String),

    /// The zone catalog could not be read.
    #[error("zone catalog unavailable: {0}")]
    CatalogUnavailable(RepositoryError),

    /// Preference storage failed.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of saving a preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPreference {
    pub preference: DeliverySelection,
    pub message: &'static str,
}

/// Delivery preference operations for one request.
pub struct DeliveryService<'a> {
    catalog: &'a dyn ZoneCatalog,
    preferences: &'a dyn PreferenceStore,
}

impl<'a> DeliveryService<'a> {
    #[must_use]
    pub const fn new(catalog: &'a dyn ZoneCatalog, preferences: &'a dyn PreferenceStore) -> Self {
        Self {
            catalog,
            preferences,
        }
    }

    /// Active zones of `state`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::CatalogUnavailable` if the catalog can't be read.
    pub async fn zones_for_state(
        &self,
        state: &StateCode,
    ) -> Result<Arc<Vec<DeliveryZone>>, DeliveryError> {
        self.catalog
            .zones_for_state(state)
            .await
            .map_err(DeliveryError::CatalogUnavailable)
    }

    /// One active zone, read past the listing cache.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::CatalogUnavailable` if the catalog can't be read.
    pub async fn zone(&self, id: DeliveryZoneId) -> Result<Option<DeliveryZone>, DeliveryError> {
        self.catalog
            .find_zone(id)
            .await
            .map_err(DeliveryError::CatalogUnavailable)
    }

    /// Validate and persist a selection for `subject`.
    ///
    /// When `state` is given the zone must belong to it. The fee stored is
    /// the catalog's current fee, not anything the caller sent.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InvalidSelection` if the zone is unknown,
    /// inactive, or under a different state.
    #[instrument(skip(self, subject), fields(session_id = %subject.session_id()))]
    pub async fn update_preference(
        &self,
        subject: &SubjectContext,
        state: Option<StateCode>,
        zone_id: DeliveryZoneId,
    ) -> Result<SavedPreference, DeliveryError> {
        let zone = self
            .catalog
            .find_zone(zone_id)
            .await
            .map_err(DeliveryError::CatalogUnavailable)?
            .ok_or_else(|| {
                DeliveryError::InvalidSelection(format!("Delivery zone {zone_id} is not available."))
            })?;

        if let Some(state) = &state
            && *state != zone.state_code
        {
            return Err(DeliveryError::InvalidSelection(format!(
                "Delivery zone {zone_id} does not belong to {}.",
                state.label()
            )));
        }

        let owner = PreferenceOwner::for_subject(subject);
        let preference = DeliverySelection::from_zone(&zone);
        self.preferences.put(owner, &preference).await?;

        tracing::info!(state = %preference.state_code, zone_id = %preference.zone_id, durable = owner.is_durable(), "delivery preference saved");
        let message = if owner.is_durable() {
            ACCOUNT_SAVED_MESSAGE
        } else {
            GUEST_SAVED_MESSAGE
        };
        Ok(SavedPreference {
            preference,
            message,
        })
    }

    /// Restore the stored preference of `subject` and check it against the
    /// live catalog.
    ///
    /// An invalid guest copy is deleted. An invalid durable copy is kept so
    /// the account still shows what needs re-selecting, and only an explicit
    /// update replaces it.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::CatalogUnavailable` if the catalog can't be
    /// read; nothing is cleared in that case.
    #[instrument(skip(self, subject), fields(session_id = %subject.session_id()))]
    pub async fn current_preference(
        &self,
        subject: &SubjectContext,
    ) -> Result<PreferenceStatus, DeliveryError> {
        let owner = PreferenceOwner::for_subject(subject);
        let Some(preference) = self.preferences.get(owner).await? else {
            return Ok(PreferenceStatus::None);
        };

        // Listings are cached; a single-zone lookup sees deactivation at once.
        let live = self
            .catalog
            .find_zone(preference.zone_id)
            .await
            .map_err(DeliveryError::CatalogUnavailable)?;

        if preference.resolves_in(live.as_slice()) {
            return Ok(PreferenceStatus::Valid { preference });
        }

        tracing::warn!(state = %preference.state_code, zone_id = %preference.zone_id, "stored delivery preference no longer resolves");
        if !owner.is_durable() {
            self.preferences.delete(owner).await?;
        }
        Ok(PreferenceStatus::Invalid {
            preference,
            message: STALE_SELECTION_MESSAGE.to_string(),
        })
    }

    /// Move the guest preference of `session_id` onto `user_id`.
    ///
    /// The guest choice wins over whatever the account had. With no guest
    /// choice the account's preference is left as is.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Repository` if storage fails.
    #[instrument(skip(self))]
    pub async fn merge_on_login(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Option<DeliverySelection>, DeliveryError> {
        let moved = self.preferences.transfer(session_id, user_id).await?;
        if moved.is_some() {
            tracing::info!("guest delivery preference merged into account");
        }
        Ok(moved)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::db::StoreFuture;
    use crate::db::memory::{MemoryPreferenceStore, MemoryZoneCatalog};

    fn zone(id: i32, state: &str, name: &str, fee: i64) -> DeliveryZone {
        DeliveryZone {
            id: DeliveryZoneId::new(id),
            state_code: StateCode::parse(state).unwrap(),
            name: name.to_string(),
            fee,
        }
    }

    fn catalog() -> MemoryZoneCatalog {
        MemoryZoneCatalog::new(vec![
            zone(1, "nuevo-leon", "Monterrey", 5000),
            zone(2, "coahuila", "Saltillo", 7500),
            zone(3, "coahuila", "Torreón", 9000),
        ])
    }

    fn state(code: &str) -> StateCode {
        StateCode::parse(code).unwrap()
    }

    /// Catalog whose listings are snapshotted on first read, like a warm
    /// TTL cache in front of another process's writes.
    struct SnapshotCatalog {
        live: MemoryZoneCatalog,
        listings: std::sync::Mutex<HashMap<StateCode, Arc<Vec<DeliveryZone>>>>,
    }

    impl SnapshotCatalog {
        fn new(live: MemoryZoneCatalog) -> Self {
            Self {
                live,
                listings: std::sync::Mutex::default(),
            }
        }
    }

    impl ZoneCatalog for SnapshotCatalog {
        fn zones_for_state<'a>(
            &'a self,
            state: &'a StateCode,
        ) -> StoreFuture<'a, Arc<Vec<DeliveryZone>>> {
            Box::pin(async move {
                let cached = self.listings.lock().unwrap().get(state).cloned();
                if let Some(zones) = cached {
                    return Ok(zones);
                }
                let zones = self.live.zones_for_state(state).await?;
                self.listings
                    .lock()
                    .unwrap()
                    .insert(state.clone(), Arc::clone(&zones));
                Ok(zones)
            })
        }

        fn find_zone(&self, id: DeliveryZoneId) -> StoreFuture<'_, Option<DeliveryZone>> {
            self.live.find_zone(id)
        }
    }

    #[tokio::test]
    async fn test_authenticated_save_is_durable() {
        let catalog = catalog();
        let store = MemoryPreferenceStore::new();
        let service = DeliveryService::new(&catalog, &store);
        let subject = SubjectContext::authenticated(SessionId::generate(), UserId::new(5));

        let saved = service
            .update_preference(&subject, Some(state("coahuila")), DeliveryZoneId::new(2))
            .await
            .unwrap();
        assert_eq!(saved.message, ACCOUNT_SAVED_MESSAGE);
        assert_eq!(saved.preference.zone_fee, 7500);

        let stored = store.get(PreferenceOwner::User(UserId::new(5))).await.unwrap();
        assert_eq!(stored, Some(saved.preference));
    }

    #[tokio::test]
    async fn test_guest_save_is_session_scoped() {
        let catalog = catalog();
        let store = MemoryPreferenceStore::new();
        let service = DeliveryService::new(&catalog, &store);
        let session_id = SessionId::generate();
        let subject = SubjectContext::guest(session_id);

        let saved = service
            .update_preference(&subject, None, DeliveryZoneId::new(1))
            .await
            .unwrap();
        assert_eq!(saved.message, GUEST_SAVED_MESSAGE);
        assert_eq!(saved.preference.state_code, state("nuevo-leon"));
        assert!(
            store
                .get(PreferenceOwner::Session(session_id))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_rejects_zone_from_other_state_or_unknown() {
        let catalog = catalog();
        let store = MemoryPreferenceStore::new();
        let service = DeliveryService::new(&catalog, &store);
        let subject = SubjectContext::guest(SessionId::generate());

        let wrong_state = service
            .update_preference(&subject, Some(state("nuevo-leon")), DeliveryZoneId::new(2))
            .await;
        assert!(matches!(wrong_state, Err(DeliveryError::InvalidSelection(_))));

        let unknown = service
            .update_preference(&subject, None, DeliveryZoneId::new(99))
            .await;
        assert!(matches!(unknown, Err(DeliveryError::InvalidSelection(_))));

        assert!(matches!(
            service.current_preference(&subject).await.unwrap(),
            PreferenceStatus::None
        ));
    }

    #[tokio::test]
    async fn test_stale_guest_preference_is_cleared() {
        let catalog = catalog();
        let store = MemoryPreferenceStore::new();
        let service = DeliveryService::new(&catalog, &store);
        let subject = SubjectContext::guest(SessionId::generate());

        service
            .update_preference(&subject, Some(state("coahuila")), DeliveryZoneId::new(3))
            .await
            .unwrap();
        catalog.deactivate(DeliveryZoneId::new(3)).await;

        let status = service.current_preference(&subject).await.unwrap();
        assert!(matches!(status, PreferenceStatus::Invalid { .. }));
        assert!(matches!(
            service.current_preference(&subject).await.unwrap(),
            PreferenceStatus::None
        ));
    }

    #[tokio::test]
    async fn test_stale_durable_preference_is_kept_but_invalid() {
        let catalog = catalog();
        let store = MemoryPreferenceStore::new();
        let service = DeliveryService::new(&catalog, &store);
        let subject = SubjectContext::authenticated(SessionId::generate(), UserId::new(1));

        service
            .update_preference(&subject, None, DeliveryZoneId::new(2))
            .await
            .unwrap();
        catalog.deactivate(DeliveryZoneId::new(2)).await;

        for _ in 0..2 {
            let status = service.current_preference(&subject).await.unwrap();
            assert!(matches!(status, PreferenceStatus::Invalid { .. }));
        }
    }

    #[tokio::test]
    async fn test_deactivation_behind_warm_listing_is_invalid() {
        let catalog = SnapshotCatalog::new(catalog());
        let store = MemoryPreferenceStore::new();
        let service = DeliveryService::new(&catalog, &store);
        let subject = SubjectContext::authenticated(SessionId::generate(), UserId::new(4));

        service
            .update_preference(&subject, Some(state("coahuila")), DeliveryZoneId::new(3))
            .await
            .unwrap();
        assert!(matches!(
            service.current_preference(&subject).await.unwrap(),
            PreferenceStatus::Valid { .. }
        ));

        // Warm the listing, then deactivate underneath it.
        let listed = service.zones_for_state(&state("coahuila")).await.unwrap();
        assert_eq!(listed.len(), 2);
        catalog.live.deactivate(DeliveryZoneId::new(3)).await;
        assert_eq!(
            service.zones_for_state(&state("coahuila")).await.unwrap().len(),
            2
        );

        let status = service.current_preference(&subject).await.unwrap();
        assert!(matches!(
            status,
            PreferenceStatus::Invalid { ref preference, .. } if preference.zone_id == DeliveryZoneId::new(3)
        ));
        assert!(service.zone(DeliveryZoneId::new(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_on_login_guest_wins() {
        let catalog = catalog();
        let store = MemoryPreferenceStore::new();
        let service = DeliveryService::new(&catalog, &store);
        let session_id = SessionId::generate();
        let user_id = UserId::new(8);

        service
            .update_preference(
                &SubjectContext::authenticated(SessionId::generate(), user_id),
                Some(state("coahuila")),
                DeliveryZoneId::new(3),
            )
            .await
            .unwrap();
        service
            .update_preference(
                &SubjectContext::guest(session_id),
                Some(state("nuevo-leon")),
                DeliveryZoneId::new(1),
            )
            .await
            .unwrap();

        let merged = service.merge_on_login(session_id, user_id).await.unwrap();
        assert_eq!(merged.map(|p| p.zone_id), Some(DeliveryZoneId::new(1)));

        let status = service
            .current_preference(&SubjectContext::authenticated(session_id, user_id))
            .await
            .unwrap();
        let PreferenceStatus::Valid { preference } = status else {
            panic!("expected valid preference, got {status:?}");
        };
        assert_eq!(preference.state_code, state("nuevo-leon"));
        assert_eq!(preference.zone_id, DeliveryZoneId::new(1));
    }
}
