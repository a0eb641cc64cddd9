//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Account registration and password login
//! - `identity` - Session credentials: issue, refresh, validate, revoke
//! - `delivery` - Delivery preference persistence and catalog validation

pub mod auth;
pub mod delivery;
pub mod identity;
