//! Delivery zone catalog commands.
//!
//! # File format
//!
//! ```yaml
//! zones:
//!   - state: coahuila
//!     name: Saltillo
//!     fee: 7500
//!   - state: nuevo-leon
//!     name: Monterrey
//!     fee: 5000
//! ```
//!
//! Fees are in minor currency units. Seeding is keyed by `(state, name)`, so
//! running it twice updates fees instead of duplicating zones and reactivates
//! zones that were switched off.

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use luzimarket_core::{DeliveryZoneId, StateCode};
use luzimarket_storefront::db::PgZoneCatalog;
use luzimarket_storefront::db::zones::{DEFAULT_ZONE_CACHE_TTL, ZoneSeed};

use super::connect;

/// Top-level YAML document.
#[derive(Debug, Deserialize)]
pub struct ZoneFile {
    pub zones: Vec<ZoneEntry>,
}

/// One zone as written in the file.
#[derive(Debug, Deserialize)]
pub struct ZoneEntry {
    pub state: String,
    pub name: String,
    pub fee: i64,
}

/// Check every entry, returning seeds or all problems found.
pub fn validate(file: &ZoneFile) -> Result<Vec<ZoneSeed>, Vec<String>> {
    let mut seeds = Vec::with_capacity(file.zones.len());
    let mut errors = Vec::new();

    for (index, entry) in file.zones.iter().enumerate() {
        let position = index + 1;
        let name = entry.name.trim();
        if name.is_empty() {
            errors.push(format!("zone #{position}: name is empty"));
        }
        if entry.fee < 0 {
            errors.push(format!("zone #{position} ({name}): fee must not be negative"));
        }
        match StateCode::parse(&entry.state) {
            Ok(state_code) => seeds.push(ZoneSeed {
                state_code,
                name: name.to_string(),
                fee: entry.fee,
            }),
            Err(e) => errors.push(format!("zone #{position} ({name}): {e}")),
        }
    }

    let mut seen = std::collections::HashSet::new();
    for seed in &seeds {
        if !seen.insert((seed.state_code.as_str(), seed.name.to_lowercase())) {
            errors.push(format!(
                "duplicate zone {} in {}",
                seed.name, seed.state_code
            ));
        }
    }

    if errors.is_empty() { Ok(seeds) } else { Err(errors) }
}

/// Seed delivery zones from a YAML file.
///
/// # Errors
///
/// Returns an error if the file is missing or invalid, or database
/// operations fail.
pub async fn seed(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading delivery zones from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let file: ZoneFile = serde_yaml::from_str(&content)?;

    let seeds = match validate(&file) {
        Ok(seeds) => seeds,
        Err(errors) => {
            error!("Zone file validation failed:");
            for err in &errors {
                error!("  - {err}");
            }
            return Err(format!("{} validation errors found", errors.len()).into());
        }
    };

    let pool = connect().await?;
    let catalog = PgZoneCatalog::new(pool, DEFAULT_ZONE_CACHE_TTL);

    for seed in &seeds {
        let zone = catalog.upsert_zone(seed).await?;
        info!(id = %zone.id, state = %zone.state_code, name = %zone.name, fee = zone.fee, "Zone upserted");
    }

    info!("Seeding complete! {} zones processed", seeds.len());
    Ok(())
}

/// Deactivate a zone.
///
/// # Errors
///
/// Returns an error if no active zone has this ID.
pub async fn deactivate(id: i32) -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect().await?;
    let catalog = PgZoneCatalog::new(pool, DEFAULT_ZONE_CACHE_TTL);

    catalog.deactivate_zone(DeliveryZoneId::new(id)).await?;
    info!(zone_id = id, "Zone deactivated");
    Ok(())
}

/// Log every zone in the catalog.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect().await?;
    let catalog = PgZoneCatalog::new(pool, DEFAULT_ZONE_CACHE_TTL);

    let zones = catalog.list_all().await?;
    info!("Delivery zones ({})", zones.len());
    for zone in zones {
        info!(
            "  {:>4}  {:<20} {:<24} {:>8}",
            zone.id,
            zone.state_code.as_str(),
            zone.name,
            zone.fee
        );
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> ZoneFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_validate_accepts_good_file() {
        let file = parse(
            "zones:\n  - state: coahuila\n    name: Saltillo\n    fee: 7500\n  - state: Nuevo-Leon\n    name: Monterrey\n    fee: 5000\n",
        );
        let seeds = validate(&file).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[1].state_code.as_str(), "nuevo-leon");
        assert_eq!(seeds[0].fee, 7500);
    }

    #[test]
    fn test_validate_collects_every_error() {
        let file = parse(
            "zones:\n  - state: texas\n    name: Austin\n    fee: 100\n  - state: coahuila\n    name: ' '\n    fee: -1\n",
        );
        let errors = validate(&file).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("texas"));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let file = parse(
            "zones:\n  - state: coahuila\n    name: Saltillo\n    fee: 7500\n  - state: coahuila\n    name: saltillo\n    fee: 8000\n",
        );
        let errors = validate(&file).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("duplicate"));
    }
}
