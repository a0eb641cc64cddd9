//! Luzimarket storefront library.
//!
//! Session identity with rotating credentials, plus the delivery-location
//! preference lifecycle for guests and accounts. Exposed as a library so the
//! router can be exercised in tests without a listening socket.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
