//! Delivery location selection.
//!
//! [`DeliveryCoordinator`] drives the `{state, zone}` picker as an explicit
//! state machine:
//!
//! ```text
//! NoSelection ──select_state──▶ StateSelected ──select_zone──▶ ZoneSelected
//!                                    ▲                              │
//!                      select_state  │                           confirm
//!                   (other state)    │                              ▼
//!      Invalid ◀──restore (stale)── any ◀────────────────────── Confirmed
//! ```
//!
//! Zone lists are fetched per state. Every fetch carries a [`ZoneRequest`]
//! fencing token; a response is applied only while its token is the latest,
//! so a slow answer for a previous state never replaces the current list.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::instrument;

use luzimarket_core::{
    DeliverySelection, DeliveryUpdate, DeliveryZone, DeliveryZoneId, PreferenceStatus,
    STALE_SELECTION_MESSAGE, SessionSummary, StateCode, UserId,
};

use crate::api::ApiClient;
use crate::error::{ClientError, CoordinatorError};
use crate::storage::{
    SessionStorage, StoredSelection, clear_selection, load_selection, save_selection,
};

/// Boxed future returned by [`DeliveryBackend`] methods.
pub type BackendFuture<'a, T> = BoxFuture<'a, Result<T, ClientError>>;

/// Server operations the coordinator depends on.
pub trait DeliveryBackend: Send + Sync {
    /// Whether an identity is available to save against.
    fn has_session(&self) -> bool;

    /// Current subject and its stored preference.
    fn session(&self) -> BackendFuture<'_, SessionSummary>;

    /// Active zones of `state`. May be served from a cache.
    fn zones<'a>(&'a self, state: &'a StateCode) -> BackendFuture<'a, Vec<DeliveryZone>>;

    /// One zone as the live catalog has it, `None` once deactivated.
    fn zone(&self, id: DeliveryZoneId) -> BackendFuture<'_, Option<DeliveryZone>>;

    /// Persist the pair for the current subject.
    fn save_preference<'a>(
        &'a self,
        state: &'a StateCode,
        zone_id: DeliveryZoneId,
    ) -> BackendFuture<'a, DeliveryUpdate>;
}

impl DeliveryBackend for ApiClient {
    fn has_session(&self) -> bool {
        Self::has_session(self)
    }

    fn session(&self) -> BackendFuture<'_, SessionSummary> {
        Box::pin(Self::session(self))
    }

    fn zones<'a>(&'a self, state: &'a StateCode) -> BackendFuture<'a, Vec<DeliveryZone>> {
        Box::pin(Self::zones(self, state))
    }

    fn zone(&self, id: DeliveryZoneId) -> BackendFuture<'_, Option<DeliveryZone>> {
        Box::pin(Self::zone(self, id))
    }

    fn save_preference<'a>(
        &'a self,
        state: &'a StateCode,
        zone_id: DeliveryZoneId,
    ) -> BackendFuture<'a, DeliveryUpdate> {
        Box::pin(self.update_session(state, zone_id))
    }
}

/// Where the picker currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    NoSelection,
    StateSelected {
        state: StateCode,
    },
    ZoneSelected {
        state: StateCode,
        zone: DeliveryZone,
    },
    Confirmed {
        selection: DeliverySelection,
    },
    /// A restored pair no longer resolves; a new zone must be chosen.
    Invalid {
        state: StateCode,
        zone_id: DeliveryZoneId,
        message: String,
    },
}

impl Phase {
    /// The state this phase is scoped to, if any.
    #[must_use]
    pub const fn state(&self) -> Option<&StateCode> {
        match self {
            Self::NoSelection => None,
            Self::StateSelected { state }
            | Self::ZoneSelected { state, .. }
            | Self::Invalid { state, .. } => Some(state),
            Self::Confirmed { selection } => Some(&selection.state_code),
        }
    }
}

/// Fencing token of one zone-list fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRequest {
    token: u64,
    state: StateCode,
}

impl ZoneRequest {
    #[must_use]
    pub const fn state(&self) -> &StateCode {
        &self.state
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ZoneFetch {
    Idle,
    Loading(ZoneRequest),
    Ready,
    Failed(String),
}

/// A saved selection and the message to show for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub selection: DeliverySelection,
    pub message: String,
}

/// Delivery location state machine for one page/session.
pub struct DeliveryCoordinator<B> {
    backend: B,
    storage: Arc<dyn SessionStorage>,
    phase: Phase,
    zones: Vec<DeliveryZone>,
    fetch: ZoneFetch,
    next_token: u64,
}

impl DeliveryCoordinator<ApiClient> {
    /// Coordinator over an API client, sharing its session storage.
    #[must_use]
    pub fn for_client(client: ApiClient) -> Self {
        let storage = client.storage();
        Self::new(client, storage)
    }
}

impl<B: DeliveryBackend> DeliveryCoordinator<B> {
    #[must_use]
    pub fn new(backend: B, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            backend,
            storage,
            phase: Phase::NoSelection,
            zones: Vec::new(),
            fetch: ZoneFetch::Idle,
            next_token: 0,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Zone options for the current state. Empty while a different state's
    /// list would be the only one available.
    #[must_use]
    pub fn zones(&self) -> &[DeliveryZone] {
        &self.zones
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self.fetch, ZoneFetch::Loading(_))
    }

    /// Whether confirm would be attempted right now.
    #[must_use]
    pub const fn can_confirm(&self) -> bool {
        matches!(self.fetch, ZoneFetch::Ready | ZoneFetch::Idle)
            && matches!(
                self.phase,
                Phase::ZoneSelected { .. } | Phase::Confirmed { .. }
            )
    }

    /// Drop everything in memory and discard in-flight fetches. Storage is
    /// left alone.
    pub fn reset(&mut self) {
        self.next_token += 1;
        self.phase = Phase::NoSelection;
        self.zones.clear();
        self.fetch = ZoneFetch::Idle;
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Choose a state and load its zones.
    ///
    /// A zone already chosen under the same state is kept if the fresh list
    /// still contains it; any other state change clears the zone.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::InvalidSelection` for an unknown state and
    /// `CoordinatorError::TransientFetchFailure` if zones can't be loaded.
    #[instrument(skip(self))]
    pub async fn select_state(&mut self, code: &str) -> Result<(), CoordinatorError> {
        let request = self.choose_state(code)?;
        let result = self.backend.zones(request.state()).await;
        self.apply_zone_list(&request, result).map(|_| ())
    }

    /// The synchronous half of [`select_state`](Self::select_state): move to
    /// the state and return the fetch the caller must run.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::InvalidSelection` for an unknown state.
    pub fn choose_state(&mut self, code: &str) -> Result<ZoneRequest, CoordinatorError> {
        let state = StateCode::parse(code)
            .map_err(|e| CoordinatorError::InvalidSelection(format!("{e}.")))?;

        let keeps_zone = self.phase.state() == Some(&state)
            && matches!(
                self.phase,
                Phase::ZoneSelected { .. } | Phase::Confirmed { .. } | Phase::StateSelected { .. }
            );
        if !keeps_zone {
            self.phase = Phase::StateSelected {
                state: state.clone(),
            };
        }

        Ok(self.begin_fetch(state))
    }

    fn begin_fetch(&mut self, state: StateCode) -> ZoneRequest {
        self.next_token += 1;
        let request = ZoneRequest {
            token: self.next_token,
            state,
        };
        if self
            .zones
            .first()
            .is_some_and(|zone| zone.state_code != request.state)
        {
            self.zones.clear();
        }
        self.fetch = ZoneFetch::Loading(request.clone());
        request
    }

    /// Apply the result of a zone fetch.
    ///
    /// Returns `Ok(false)` when `request` has been superseded and the result
    /// was discarded.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::TransientFetchFailure` if the current fetch
    /// failed. Confirm stays disabled until a fetch succeeds.
    pub fn apply_zone_list(
        &mut self,
        request: &ZoneRequest,
        result: Result<Vec<DeliveryZone>, ClientError>,
    ) -> Result<bool, CoordinatorError> {
        if !matches!(&self.fetch, ZoneFetch::Loading(current) if current == request) {
            tracing::debug!(state = %request.state, "discarding superseded zone list");
            return Ok(false);
        }

        let zones = match result {
            Ok(zones) => zones,
            Err(e) => {
                tracing::warn!(state = %request.state, error = %e, "zone fetch failed");
                let message = e.to_string();
                self.fetch = ZoneFetch::Failed(message.clone());
                return Err(CoordinatorError::TransientFetchFailure(message));
            }
        };

        self.zones = zones
            .into_iter()
            .filter(|zone| zone.state_code == request.state)
            .collect();
        self.fetch = ZoneFetch::Ready;

        // A kept zone must still be offered under its state.
        let still_listed = |id: DeliveryZoneId| self.zones.iter().find(|z| z.id == id).cloned();
        match &self.phase {
            Phase::ZoneSelected { state, zone } if *state == request.state => {
                self.phase = still_listed(zone.id).map_or_else(
                    || Phase::StateSelected {
                        state: state.clone(),
                    },
                    |zone| Phase::ZoneSelected {
                        state: state.clone(),
                        zone,
                    },
                );
            }
            Phase::Confirmed { selection } if selection.state_code == request.state => {
                if still_listed(selection.zone_id).is_none() {
                    self.phase = Phase::StateSelected {
                        state: request.state.clone(),
                    };
                }
            }
            _ => {}
        }
        Ok(true)
    }

    /// Choose a zone from the current state's list.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::InvalidSelection`, leaving the phase
    /// unchanged, if no state is chosen or the zone isn't listed for it.
    pub fn select_zone(&mut self, zone_id: DeliveryZoneId) -> Result<(), CoordinatorError> {
        let Some(state) = self.phase.state().cloned() else {
            return Err(CoordinatorError::InvalidSelection(
                "Choose a state first.".to_string(),
            ));
        };
        if self.fetch != ZoneFetch::Ready {
            return Err(CoordinatorError::InvalidSelection(format!(
                "Delivery zones for {} are not loaded.",
                state.label()
            )));
        }

        let zone = self
            .zones
            .iter()
            .find(|zone| zone.id == zone_id && zone.state_code == state)
            .cloned()
            .ok_or_else(|| {
                CoordinatorError::InvalidSelection(format!(
                    "Delivery zone {zone_id} is not available in {}.",
                    state.label()
                ))
            })?;

        if let Phase::Confirmed { selection } = &self.phase
            && selection.zone_id == zone_id
        {
            return Ok(());
        }
        self.phase = Phase::ZoneSelected { state, zone };
        Ok(())
    }

    /// Save the selected pair.
    ///
    /// Always writes the ephemeral copy; the server keeps the durable copy
    /// for authenticated subjects. Re-confirming a confirmed pair saves it
    /// again with the same outcome.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::TransientFetchFailure` while zones are loading
    ///   or after a failed fetch
    /// - `CoordinatorError::InvalidSelection` without a selected zone, or
    ///   while the restored pair is invalid
    /// - `CoordinatorError::NoActiveSession` without an identity
    #[instrument(skip(self))]
    pub async fn confirm(&mut self) -> Result<Confirmation, CoordinatorError> {
        match &self.fetch {
            ZoneFetch::Loading(_) => {
                return Err(CoordinatorError::TransientFetchFailure(
                    "Delivery zones are still loading.".to_string(),
                ));
            }
            ZoneFetch::Failed(message) => {
                return Err(CoordinatorError::TransientFetchFailure(message.clone()));
            }
            ZoneFetch::Idle | ZoneFetch::Ready => {}
        }

        let (state, zone_id) = match &self.phase {
            Phase::ZoneSelected { state, zone } => (state.clone(), zone.id),
            Phase::Confirmed { selection } => (selection.state_code.clone(), selection.zone_id),
            Phase::Invalid { message, .. } => {
                return Err(CoordinatorError::InvalidSelection(message.clone()));
            }
            Phase::NoSelection | Phase::StateSelected { .. } => {
                return Err(CoordinatorError::InvalidSelection(
                    "Choose a delivery zone first.".to_string(),
                ));
            }
        };

        if !self.backend.has_session() {
            return Err(CoordinatorError::NoActiveSession);
        }

        let update = self.backend.save_preference(&state, zone_id).await?;
        save_selection(
            self.storage.as_ref(),
            &update.preference.state_code,
            update.preference.zone_id,
        );
        self.phase = Phase::Confirmed {
            selection: update.preference.clone(),
        };
        tracing::info!(state = %update.preference.state_code, zone_id = %update.preference.zone_id, "delivery location confirmed");

        Ok(Confirmation {
            selection: update.preference,
            message: update.message,
        })
    }

    // =========================================================================
    // Restore and merge
    // =========================================================================

    /// Restore the selection on load.
    ///
    /// The ephemeral copy wins; without one the server's copy for the
    /// current subject is used. A pair that no longer resolves ends in
    /// [`Phase::Invalid`] with the ephemeral copy cleared.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::TransientFetchFailure` if the catalog or the
    /// session can't be reached.
    #[instrument(skip(self))]
    pub async fn restore(&mut self) -> Result<&Phase, CoordinatorError> {
        self.reset();

        match load_selection(self.storage.as_ref()) {
            Some(StoredSelection::Pair(state, zone_id)) => {
                self.restore_pair(state, zone_id).await?;
                return Ok(&self.phase);
            }
            Some(StoredSelection::Corrupt) => {
                tracing::warn!("clearing unreadable delivery selection");
                clear_selection(self.storage.as_ref());
            }
            None => {}
        }

        if !self.backend.has_session() {
            return Ok(&self.phase);
        }
        let session = self.backend.session().await;
        match session {
            Ok(summary) => self.restore_status(summary.delivery).await?,
            Err(ClientError::NoActiveSession | ClientError::Unauthorized) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(&self.phase)
    }

    /// Carry the guest selection over to `user_id` right after login.
    ///
    /// An ephemeral pair is written to the account unconditionally. Without
    /// one, the account's stored preference becomes active.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::NoActiveSession` unless the current
    /// session is authenticated as `user_id`.
    #[instrument(skip(self))]
    pub async fn merge_on_login(&mut self, user_id: UserId) -> Result<&Phase, CoordinatorError> {
        let summary = self.backend.session().await?;
        if summary.user_id != Some(user_id) {
            return Err(CoordinatorError::NoActiveSession);
        }

        self.reset();
        match load_selection(self.storage.as_ref()) {
            Some(StoredSelection::Pair(state, zone_id)) => {
                let saved = self.backend.save_preference(&state, zone_id).await;
                match saved {
                    Ok(update) => {
                        tracing::info!(%user_id, "guest delivery location merged into account");
                        let selection = update.preference;
                        self.restore_pair(selection.state_code, selection.zone_id)
                            .await?;
                    }
                    Err(ClientError::Api {
                        status: 400,
                        message,
                    }) => {
                        clear_selection(self.storage.as_ref());
                        self.invalidate(state, zone_id, message).await?;
                    }
                    Err(e) => return Err(e.into()),
                }
                return Ok(&self.phase);
            }
            Some(StoredSelection::Corrupt) => clear_selection(self.storage.as_ref()),
            None => {}
        }

        self.restore_status(summary.delivery).await?;
        Ok(&self.phase)
    }

    async fn restore_status(&mut self, status: PreferenceStatus) -> Result<(), CoordinatorError> {
        match status {
            PreferenceStatus::None => Ok(()),
            PreferenceStatus::Valid { preference } => {
                self.restore_pair(preference.state_code, preference.zone_id)
                    .await
            }
            PreferenceStatus::Invalid {
                preference,
                message,
            } => {
                self.invalidate(preference.state_code, preference.zone_id, message)
                    .await
            }
        }
    }

    /// Validate a stored pair against the live catalog.
    ///
    /// The state's listing is loaded for re-selection; whether the pair
    /// still resolves is decided by a single-zone lookup.
    async fn restore_pair(
        &mut self,
        state: StateCode,
        zone_id: DeliveryZoneId,
    ) -> Result<(), CoordinatorError> {
        let request = self.begin_fetch(state.clone());
        let result = self.backend.zones(request.state()).await;
        if !self.apply_zone_list(&request, result)? {
            return Ok(());
        }

        let live = self.backend.zone(zone_id).await?;
        if let Some(zone) = live.filter(|zone| zone.state_code == state) {
            save_selection(self.storage.as_ref(), &state, zone_id);
            self.phase = Phase::Confirmed {
                selection: DeliverySelection::from_zone(&zone),
            };
        } else {
            tracing::info!(%state, %zone_id, "stored delivery location no longer resolves");
            self.zones.retain(|zone| zone.id != zone_id);
            clear_selection(self.storage.as_ref());
            self.phase = Phase::Invalid {
                state,
                zone_id,
                message: STALE_SELECTION_MESSAGE.to_string(),
            };
        }
        Ok(())
    }

    /// Enter `Invalid` with the state's zones loaded for re-selection.
    async fn invalidate(
        &mut self,
        state: StateCode,
        zone_id: DeliveryZoneId,
        message: String,
    ) -> Result<(), CoordinatorError> {
        self.phase = Phase::Invalid {
            state: state.clone(),
            zone_id,
            message,
        };
        let request = self.begin_fetch(state);
        let result = self.backend.zones(request.state()).await;
        if self.apply_zone_list(&request, result)? {
            self.zones.retain(|zone| zone.id != zone_id);
        }
        Ok(())
    }
}
