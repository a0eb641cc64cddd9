//! Delivery location types: the fixed state lookup, zones, and selections.
//!
//! A delivery location is always a `(state, zone)` pair. States come from the
//! fixed [`STATES`] lookup; zones come from the live catalog and each belongs
//! to exactly one state.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::DeliveryZoneId;

/// An entry of the fixed state lookup, shaped as `{value, label}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryState {
    /// Slug used in storage and URLs (e.g. `nuevo-leon`).
    pub value: &'static str,
    /// Human-readable name.
    pub label: &'static str,
}

/// The 32 Mexican federal entities.
pub const STATES: &[DeliveryState] = &[
    DeliveryState { value: "aguascalientes", label: "Aguascalientes" },
    DeliveryState { value: "baja-california", label: "Baja California" },
    DeliveryState { value: "baja-california-sur", label: "Baja California Sur" },
    DeliveryState { value: "campeche", label: "Campeche" },
    DeliveryState { value: "chiapas", label: "Chiapas" },
    DeliveryState { value: "chihuahua", label: "Chihuahua" },
    DeliveryState { value: "ciudad-de-mexico", label: "Ciudad de México" },
    DeliveryState { value: "coahuila", label: "Coahuila" },
    DeliveryState { value: "colima", label: "Colima" },
    DeliveryState { value: "durango", label: "Durango" },
    DeliveryState { value: "estado-de-mexico", label: "Estado de México" },
    DeliveryState { value: "guanajuato", label: "Guanajuato" },
    DeliveryState { value: "guerrero", label: "Guerrero" },
    DeliveryState { value: "hidalgo", label: "Hidalgo" },
    DeliveryState { value: "jalisco", label: "Jalisco" },
    DeliveryState { value: "michoacan", label: "Michoacán" },
    DeliveryState { value: "morelos", label: "Morelos" },
    DeliveryState { value: "nayarit", label: "Nayarit" },
    DeliveryState { value: "nuevo-leon", label: "Nuevo León" },
    DeliveryState { value: "oaxaca", label: "Oaxaca" },
    DeliveryState { value: "puebla", label: "Puebla" },
    DeliveryState { value: "queretaro", label: "Querétaro" },
    DeliveryState { value: "quintana-roo", label: "Quintana Roo" },
    DeliveryState { value: "san-luis-potosi", label: "San Luis Potosí" },
    DeliveryState { value: "sinaloa", label: "Sinaloa" },
    DeliveryState { value: "sonora", label: "Sonora" },
    DeliveryState { value: "tabasco", label: "Tabasco" },
    DeliveryState { value: "tamaulipas", label: "Tamaulipas" },
    DeliveryState { value: "tlaxcala", label: "Tlaxcala" },
    DeliveryState { value: "veracruz", label: "Veracruz" },
    DeliveryState { value: "yucatan", label: "Yucatán" },
    DeliveryState { value: "zacatecas", label: "Zacatecas" },
];

/// Error returned when a state code is not in the lookup.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown state code: {0}")]
pub struct StateCodeError(pub String);

/// A state code known to exist in [`STATES`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateCode(String);

impl StateCode {
    /// Parse a state code, accepting only values from the lookup.
    ///
    /// # Errors
    ///
    /// Returns [`StateCodeError`] if the code is not a known state.
    pub fn parse(s: &str) -> Result<Self, StateCodeError> {
        let normalized = s.trim().to_lowercase();
        if STATES.iter().any(|state| state.value == normalized) {
            Ok(Self(normalized))
        } else {
            Err(StateCodeError(s.to_owned()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display label from the lookup.
    #[must_use]
    pub fn label(&self) -> &'static str {
        STATES
            .iter()
            .find(|state| state.value == self.0)
            .map_or("", |state| state.label)
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StateCode {
    type Error = StateCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StateCode> for String {
    fn from(code: StateCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for StateCode {
    type Err = StateCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A delivery zone from the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryZone {
    pub id: DeliveryZoneId,
    /// State this zone belongs to.
    pub state_code: StateCode,
    pub name: String,
    /// Delivery fee in minor currency units (centavos).
    pub fee: i64,
}

/// A confirmed `(state, zone)` pair with the fee seen at selection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySelection {
    pub state_code: StateCode,
    pub zone_id: DeliveryZoneId,
    /// Informational only; recomputed from the catalog for shipping.
    pub zone_fee: i64,
}

impl DeliverySelection {
    /// Build a selection from a catalog zone.
    #[must_use]
    pub fn from_zone(zone: &DeliveryZone) -> Self {
        Self {
            state_code: zone.state_code.clone(),
            zone_id: zone.id,
            zone_fee: zone.fee,
        }
    }

    /// Whether this selection still resolves against the given zone list.
    ///
    /// The zone must be present *and* belong to the selection's state.
    #[must_use]
    pub fn resolves_in(&self, zones: &[DeliveryZone]) -> bool {
        zones
            .iter()
            .any(|zone| zone.id == self.zone_id && zone.state_code == self.state_code)
    }
}

/// Shown when a stored selection no longer resolves against the catalog.
pub const STALE_SELECTION_MESSAGE: &str =
    "Your saved delivery zone is no longer available. Please choose a new one.";

/// Outcome of restoring a stored preference against the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PreferenceStatus {
    /// Nothing stored for this subject.
    None,
    /// Stored pair still resolves.
    Valid { preference: DeliverySelection },
    /// Stored pair no longer resolves and must be re-selected.
    Invalid {
        preference: DeliverySelection,
        message: String,
    },
}

/// Body returned when a delivery preference is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryUpdate {
    /// Differs for guest and account-linked saves.
    pub message: String,
    pub preference: DeliverySelection,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn zone(id: i32, state: &str, name: &str, fee: i64) -> DeliveryZone {
        DeliveryZone {
            id: DeliveryZoneId::new(id),
            state_code: StateCode::parse(state).unwrap(),
            name: name.to_string(),
            fee,
        }
    }

    #[test]
    fn test_state_lookup_has_unique_values() {
        assert_eq!(STATES.len(), 32);
        let mut values: Vec<_> = STATES.iter().map(|s| s.value).collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), STATES.len());
    }

    #[test]
    fn test_state_code_parse() {
        let code = StateCode::parse(" Nuevo-Leon ").unwrap();
        assert_eq!(code.as_str(), "nuevo-leon");
        assert_eq!(code.label(), "Nuevo León");
        assert!(StateCode::parse("texas").is_err());
        assert!(serde_json::from_str::<StateCode>("\"atlantis\"").is_err());
    }

    #[test]
    fn test_selection_resolves_only_under_its_state() {
        let zones = vec![zone(2, "coahuila", "Saltillo", 7500)];
        let selection = DeliverySelection::from_zone(&zones[0]);
        assert!(selection.resolves_in(&zones));

        let moved = vec![zone(2, "nuevo-leon", "Saltillo", 7500)];
        assert!(!selection.resolves_in(&moved));
        assert!(!selection.resolves_in(&[]));
    }

    #[test]
    fn test_zone_serializes_contract_fields() {
        let value = serde_json::to_value(zone(2, "coahuila", "Saltillo", 7500)).unwrap();
        assert_eq!(value["id"], 2);
        assert_eq!(value["name"], "Saltillo");
        assert_eq!(value["fee"], 7500);
        assert_eq!(value["stateCode"], "coahuila");
    }

    #[test]
    fn test_preference_status_is_tagged() {
        let preference = DeliverySelection::from_zone(&zone(1, "nuevo-leon", "Monterrey", 5000));
        let value = serde_json::to_value(PreferenceStatus::Valid { preference }).unwrap();
        assert_eq!(value["status"], "valid");
        assert_eq!(value["preference"]["zoneId"], 1);

        let none: PreferenceStatus = serde_json::from_str(r#"{"status":"none"}"#).unwrap();
        assert_eq!(none, PreferenceStatus::None);
    }
}
