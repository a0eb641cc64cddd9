//! Delivery location lookups.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use luzimarket_core::{DeliveryState, DeliveryZone, DeliveryZoneId, STATES, StateCode};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Query parameters for the zone listing.
#[derive(Debug, Deserialize)]
pub struct ZonesQuery {
    pub state: String,
}

/// The fixed state lookup.
pub async fn states() -> Json<&'static [DeliveryState]> {
    Json(STATES)
}

/// Active zones of one state.
pub async fn zones(
    State(state): State<AppState>,
    Query(query): Query<ZonesQuery>,
) -> Result<Json<Vec<DeliveryZone>>> {
    let code = StateCode::parse(&query.state).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let zones = state.delivery().zones_for_state(&code).await?;
    Ok(Json(Vec::clone(&zones)))
}

/// One active zone, checked against the catalog rather than a cached listing.
pub async fn zone(
    State(state): State<AppState>,
    Path(id): Path<DeliveryZoneId>,
) -> Result<Json<DeliveryZone>> {
    state
        .delivery()
        .zone(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Delivery zone {id} is not available.")))
}
