//! Integration tests for Luzimarket.
//!
//! # Running Tests
//!
//! ```bash
//! # Migrate and seed a database, then start the storefront
//! cargo run -p luzimarket-cli -- migrate
//! cargo run -p luzimarket-cli -- zones seed
//! # Rate limiting would throttle the suite; turn it off for the run
//! STOREFRONT_RATE_LIMIT=false cargo run -p luzimarket-storefront
//!
//! # Run the ignored end-to-end tests against it
//! cargo test -p luzimarket-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `session_flow` - Guest bootstrap, rotation, login upgrade, logout
//! - `delivery_flow` - Delivery selection, restore and merge on login

use std::sync::Arc;

use url::Url;
use uuid::Uuid;

use luzimarket_client::{ApiClient, MemorySessionStorage, SessionStorage};

/// Base URL for the storefront API (configurable via environment).
#[must_use]
pub fn storefront_base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// A client with its own empty session storage.
///
/// # Panics
///
/// Panics if `STOREFRONT_BASE_URL` is not a valid URL.
#[must_use]
pub fn fresh_client() -> (ApiClient, Arc<MemorySessionStorage>) {
    let base_url = Url::parse(&storefront_base_url()).expect("Invalid STOREFRONT_BASE_URL");
    let storage = Arc::new(MemorySessionStorage::new());
    let client = ApiClient::new(base_url, Arc::clone(&storage) as Arc<dyn SessionStorage>);
    (client, storage)
}

/// A unique throwaway email address.
#[must_use]
pub fn unique_email() -> String {
    format!("it-{}@example.com", Uuid::new_v4().simple())
}
