//! In-memory store implementations.
//!
//! Used by router tests and for running the service without a database.
//! Each store keeps its state behind a single `tokio::sync::Mutex`, so every
//! check-and-write runs under one lock acquisition.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use luzimarket_core::{
    DeliverySelection, DeliveryZone, DeliveryZoneId, Email, SessionId, StateCode, SubjectType,
    UserId,
};

use super::{
    CredentialStore, PreferenceStore, RepositoryError, StoreFuture, UserStore, ZoneCatalog,
};
use crate::models::{NewRotationCredential, PreferenceOwner, SessionRecord, User};

#[derive(Debug, Clone)]
struct CredentialEntry {
    session_id: SessionId,
    expires_at: DateTime<Utc>,
    redeemed_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
}

impl CredentialEntry {
    const fn is_live(&self) -> bool {
        self.redeemed_at.is_none() && self.revoked_at.is_none()
    }
}

#[derive(Default)]
struct CredentialState {
    sessions: HashMap<SessionId, SessionRecord>,
    credentials: HashMap<String, CredentialEntry>,
}

impl CredentialState {
    fn revoke_live(&mut self, session_id: SessionId, now: DateTime<Utc>) {
        for entry in self.credentials.values_mut() {
            if entry.session_id == session_id && entry.is_live() {
                entry.revoked_at = Some(now);
            }
        }
    }

    fn insert(&mut self, credential: NewRotationCredential) -> Result<(), RepositoryError> {
        if self.credentials.contains_key(&credential.token_hash) {
            return Err(RepositoryError::Conflict(
                "rotation credential already exists".to_string(),
            ));
        }
        self.credentials.insert(
            credential.token_hash,
            CredentialEntry {
                session_id: credential.session_id,
                expires_at: credential.expires_at,
                redeemed_at: None,
                revoked_at: None,
            },
        );
        Ok(())
    }
}

/// In-memory [`CredentialStore`].
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<CredentialState>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live credentials held for `session_id`.
    pub async fn live_credentials(&self, session_id: SessionId) -> usize {
        let state = self.state.lock().await;
        state
            .credentials
            .values()
            .filter(|entry| entry.session_id == session_id && entry.is_live())
            .count()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn create_session(
        &self,
        subject_type: SubjectType,
        user_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, SessionRecord> {
        Box::pin(async move {
            let record = SessionRecord {
                id: SessionId::generate(),
                subject_type,
                user_id,
                created_at: now,
                revoked_at: None,
            };
            self.state
                .lock()
                .await
                .sessions
                .insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn get_session(&self, id: SessionId) -> StoreFuture<'_, Option<SessionRecord>> {
        Box::pin(async move { Ok(self.state.lock().await.sessions.get(&id).cloned()) })
    }

    fn upgrade_session(
        &self,
        id: SessionId,
        user_id: UserId,
        _now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<SessionRecord>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let Some(record) = state.sessions.get_mut(&id) else {
                return Ok(None);
            };
            let owned_by_other = record.user_id.is_some_and(|owner| owner != user_id);
            if !record.is_active() || owned_by_other {
                return Ok(None);
            }
            record.subject_type = SubjectType::Authenticated;
            record.user_id = Some(user_id);
            Ok(Some(record.clone()))
        })
    }

    fn replace_credential(&self, credential: NewRotationCredential) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.revoke_live(credential.session_id, credential.issued_at);
            state.insert(credential)
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
            let mut state = self.state.lock().await;

            let Some(entry) = state.credentials.get(presented_hash) else {
                return Ok(None);
            };
            if !entry.is_live() || entry.expires_at <= now {
                return Ok(None);
            }
            let session_id = entry.session_id;
            let Some(session) = state
                .sessions
                .get(&session_id)
                .filter(|s| s.is_active())
                .cloned()
            else {
                return Ok(None);
            };

            if let Some(entry) = state.credentials.get_mut(presented_hash) {
                entry.redeemed_at = Some(now);
            }
            state.insert(NewRotationCredential {
                token_hash: replacement_hash,
                session_id,
                issued_at: now,
                expires_at,
            })?;

            Ok(Some(session))
        })
    }

    fn revoke_session(&self, id: SessionId, now: DateTime<Utc>) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let revoked = match state.sessions.get_mut(&id) {
                Some(record) if record.is_active() => {
                    record.revoked_at = Some(now);
                    true
                }
                _ => false,
            };
            for entry in state.credentials.values_mut() {
                if entry.session_id == id && entry.revoked_at.is_none() {
                    entry.revoked_at = Some(now);
                }
            }
            Ok(revoked)
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let before = state.credentials.len();
            state
                .credentials
                .retain(|_, entry| entry.is_live() && entry.expires_at > now);
            Ok(u64::try_from(before - state.credentials.len()).unwrap_or(u64::MAX))
        })
    }
}

struct UserEntry {
    user: User,
    password_hash: String,
}

/// In-memory [`UserStore`].
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<UserEntry>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn create_with_password<'a>(
        &'a self,
        email: &'a Email,
        password_hash: &'a str,
    ) -> StoreFuture<'a, User> {
        Box::pin(async move {
            let mut users = self.users.lock().await;
            if users.iter().any(|entry| &entry.user.email == email) {
                return Err(RepositoryError::Conflict("email already exists".to_string()));
            }
            let next_id = i32::try_from(users.len() + 1)
                .map_err(|_| RepositoryError::DataCorruption("user id overflow".to_string()))?;
            let user = User {
                id: UserId::new(next_id),
                email: email.clone(),
                created_at: Utc::now(),
            };
            users.push(UserEntry {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            });
            Ok(user)
        })
    }

    fn get_password_hash<'a>(
        &'a self,
        email: &'a Email,
    ) -> StoreFuture<'a, Option<(User, String)>> {
        Box::pin(async move {
            let users = self.users.lock().await;
            Ok(users
                .iter()
                .find(|entry| &entry.user.email == email)
                .map(|entry| (entry.user.clone(), entry.password_hash.clone())))
        })
    }
}

/// In-memory [`PreferenceStore`].
#[derive(Default)]
pub struct MemoryPreferenceStore {
    preferences: Mutex<HashMap<PreferenceOwner, DeliverySelection>>,
}

impl MemoryPreferenceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, owner: PreferenceOwner) -> StoreFuture<'_, Option<DeliverySelection>> {
        Box::pin(async move { Ok(self.preferences.lock().await.get(&owner).cloned()) })
    }

    fn put<'a>(
        &'a self,
        owner: PreferenceOwner,
        selection: &'a DeliverySelection,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.preferences
                .lock()
                .await
                .insert(owner, selection.clone());
            Ok(())
        })
    }

    fn delete(&self, owner: PreferenceOwner) -> StoreFuture<'_, bool> {
        Box::pin(async move { Ok(self.preferences.lock().await.remove(&owner).is_some()) })
    }

    fn transfer(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> StoreFuture<'_, Option<DeliverySelection>> {
        Box::pin(async move {
            let mut preferences = self.preferences.lock().await;
            let Some(selection) = preferences.remove(&PreferenceOwner::Session(session_id)) else {
                return Ok(None);
            };
            preferences.insert(PreferenceOwner::User(user_id), selection.clone());
            Ok(Some(selection))
        })
    }
}

/// In-memory [`ZoneCatalog`] over a fixed zone list.
pub struct MemoryZoneCatalog {
    zones: Mutex<Vec<DeliveryZone>>,
}

impl MemoryZoneCatalog {
    #[must_use]
    pub fn new(zones: Vec<DeliveryZone>) -> Self {
        Self {
            zones: Mutex::new(zones),
        }
    }

    /// Remove a zone from the catalog.
    pub async fn deactivate(&self, id: DeliveryZoneId) {
        self.zones.lock().await.retain(|zone| zone.id != id);
    }
}

impl ZoneCatalog for MemoryZoneCatalog {
    fn zones_for_state<'a>(
        &'a self,
        state: &'a StateCode,
    ) -> StoreFuture<'a, Arc<Vec<DeliveryZone>>> {
        Box::pin(async move {
            let zones = self.zones.lock().await;
            let mut matching: Vec<_> = zones
                .iter()
                .filter(|zone| &zone.state_code == state)
                .cloned()
                .collect();
            matching.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(Arc::new(matching))
        })
    }

    fn find_zone(&self, id: DeliveryZoneId) -> StoreFuture<'_, Option<DeliveryZone>> {
        Box::pin(async move {
            let zones = self.zones.lock().await;
            Ok(zones.iter().find(|zone| zone.id == id).cloned())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn credential(hash: &str, session_id: SessionId, now: DateTime<Utc>) -> NewRotationCredential {
        NewRotationCredential {
            token_hash: hash.to_string(),
            session_id,
            issued_at: now,
            expires_at: now + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn test_rotate_redeems_once() {
        let store = MemoryCredentialStore::new();
        let now = Utc::now();
        let session = store
            .create_session(SubjectType::Guest, None, now)
            .await
            .unwrap();
        store
            .replace_credential(credential("a", session.id, now))
            .await
            .unwrap();

        let expires = now + Duration::days(7);
        let first = store.rotate("a", "b".to_string(), now, expires).await.unwrap();
        assert_eq!(first.map(|s| s.id), Some(session.id));

        let replay = store.rotate("a", "c".to_string(), now, expires).await.unwrap();
        assert!(replay.is_none());
        assert_eq!(store.live_credentials(session.id).await, 1);
    }

    #[tokio::test]
    async fn test_rotate_rejects_expired_and_revoked() {
        let store = MemoryCredentialStore::new();
        let now = Utc::now();
        let session = store
            .create_session(SubjectType::Guest, None, now)
            .await
            .unwrap();
        store
            .replace_credential(credential("a", session.id, now))
            .await
            .unwrap();

        let later = now + Duration::days(8);
        let expired = store
            .rotate("a", "b".to_string(), later, later + Duration::days(7))
            .await
            .unwrap();
        assert!(expired.is_none());

        assert!(store.revoke_session(session.id, now).await.unwrap());
        let revoked = store
            .rotate("a", "b".to_string(), now, now + Duration::days(7))
            .await
            .unwrap();
        assert!(revoked.is_none());
        assert!(!store.revoke_session(session.id, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_credential_keeps_one_live() {
        let store = MemoryCredentialStore::new();
        let now = Utc::now();
        let session = store
            .create_session(SubjectType::Guest, None, now)
            .await
            .unwrap();
        for hash in ["a", "b", "c"] {
            store
                .replace_credential(credential(hash, session.id, now))
                .await
                .unwrap();
        }
        assert_eq!(store.live_credentials(session.id).await, 1);
        assert_eq!(store.purge_expired(now).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upgrade_session_refuses_other_user() {
        let store = MemoryCredentialStore::new();
        let now = Utc::now();
        let session = store
            .create_session(SubjectType::Guest, None, now)
            .await
            .unwrap();

        let upgraded = store
            .upgrade_session(session.id, UserId::new(1), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(upgraded.subject_type, SubjectType::Authenticated);

        let same = store.upgrade_session(session.id, UserId::new(1), now).await.unwrap();
        assert!(same.is_some());
        let other = store.upgrade_session(session.id, UserId::new(2), now).await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_transfer_overwrites_durable() {
        let store = MemoryPreferenceStore::new();
        let session_id = SessionId::generate();
        let user_id = UserId::new(7);
        let guest = DeliverySelection {
            state_code: StateCode::parse("nuevo-leon").unwrap(),
            zone_id: DeliveryZoneId::new(1),
            zone_fee: 5000,
        };
        let durable = DeliverySelection {
            state_code: StateCode::parse("coahuila").unwrap(),
            zone_id: DeliveryZoneId::new(3),
            zone_fee: 9000,
        };
        store.put(PreferenceOwner::User(user_id), &durable).await.unwrap();
        store
            .put(PreferenceOwner::Session(session_id), &guest)
            .await
            .unwrap();

        let moved = store.transfer(session_id, user_id).await.unwrap();
        assert_eq!(moved.as_ref(), Some(&guest));
        assert_eq!(
            store.get(PreferenceOwner::User(user_id)).await.unwrap(),
            Some(guest)
        );
        assert!(
            store
                .get(PreferenceOwner::Session(session_id))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_transfer_without_guest_copy_keeps_durable() {
        let store = MemoryPreferenceStore::new();
        let user_id = UserId::new(7);
        let durable = DeliverySelection {
            state_code: StateCode::parse("coahuila").unwrap(),
            zone_id: DeliveryZoneId::new(3),
            zone_fee: 9000,
        };
        store.put(PreferenceOwner::User(user_id), &durable).await.unwrap();

        let moved = store.transfer(SessionId::generate(), user_id).await.unwrap();
        assert!(moved.is_none());
        assert_eq!(
            store.get(PreferenceOwner::User(user_id)).await.unwrap(),
            Some(durable)
        );
    }
}
