//! Luzimarket Core - Shared types library.
//!
//! This crate provides common types used across all Luzimarket components:
//! - `storefront` - Session identity and delivery preference HTTP service
//! - `client` - Client-side orchestration (token handling, delivery selection)
//! - `cli` - Command-line tools for migrations and catalog management
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, sessions, and delivery locations

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
