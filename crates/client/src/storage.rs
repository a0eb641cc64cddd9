//! Per-browser-session key/value storage.
//!
//! Holds the credential pair and the ephemeral delivery selection. Everything
//! in here dies with the session.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use luzimarket_core::{DeliveryZoneId, StateCode};

/// Key of the access credential.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Key of the rotation credential.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Key of the ephemeral state selection.
pub const SELECTED_STATE_KEY: &str = "selectedDeliveryState";
/// Key of the ephemeral zone selection.
pub const SELECTED_ZONE_KEY: &str = "selectedDeliveryZone";

/// Session-scoped string storage.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-process [`SessionStorage`].
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// What the ephemeral selection keys hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredSelection {
    /// Both keys present and well-formed.
    Pair(StateCode, DeliveryZoneId),
    /// Keys present but unreadable.
    Corrupt,
}

/// Read the ephemeral selection, if any.
pub fn load_selection(storage: &dyn SessionStorage) -> Option<StoredSelection> {
    let state = storage.get(SELECTED_STATE_KEY);
    let zone = storage.get(SELECTED_ZONE_KEY);
    if state.is_none() && zone.is_none() {
        return None;
    }

    let parsed = state
        .as_deref()
        .and_then(|s| StateCode::parse(s).ok())
        .zip(zone.as_deref().and_then(|z| z.parse::<DeliveryZoneId>().ok()));
    Some(parsed.map_or(StoredSelection::Corrupt, |(state, zone)| {
        StoredSelection::Pair(state, zone)
    }))
}

/// Write the ephemeral selection.
pub fn save_selection(storage: &dyn SessionStorage, state: &StateCode, zone: DeliveryZoneId) {
    storage.set(SELECTED_STATE_KEY, state.as_str().to_owned());
    storage.set(SELECTED_ZONE_KEY, zone.to_string());
}

/// Drop the ephemeral selection.
pub fn clear_selection(storage: &dyn SessionStorage) {
    storage.remove(SELECTED_STATE_KEY);
    storage.remove(SELECTED_ZONE_KEY);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_round_trip_and_clear() {
        let storage = MemorySessionStorage::new();
        assert_eq!(load_selection(&storage), None);

        let state = StateCode::parse("coahuila").unwrap();
        save_selection(&storage, &state, DeliveryZoneId::new(2));
        assert_eq!(storage.get(SELECTED_ZONE_KEY).as_deref(), Some("2"));
        assert_eq!(
            load_selection(&storage),
            Some(StoredSelection::Pair(state, DeliveryZoneId::new(2)))
        );

        clear_selection(&storage);
        assert_eq!(load_selection(&storage), None);
    }

    #[test]
    fn test_unreadable_selection_is_corrupt() {
        let storage = MemorySessionStorage::new();
        storage.set(SELECTED_STATE_KEY, "atlantis".to_owned());
        storage.set(SELECTED_ZONE_KEY, "2".to_owned());
        assert_eq!(load_selection(&storage), Some(StoredSelection::Corrupt));

        storage.remove(SELECTED_STATE_KEY);
        assert_eq!(load_selection(&storage), Some(StoredSelection::Corrupt));
    }
}
