//! Luzimarket client library.
//!
//! Client-side half of the session and delivery flows:
//!
//! - [`storage`] - Per-browser-session key/value storage
//! - [`api`] - Token-holding HTTP client with one-shot refresh on 401
//! - [`delivery`] - Delivery location state machine with fenced zone fetches
//! - [`error`] - Client and coordinator error types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod delivery;
pub mod error;
pub mod storage;

pub use api::ApiClient;
pub use delivery::{Confirmation, DeliveryBackend, DeliveryCoordinator, Phase, ZoneRequest};
pub use error::{ClientError, CoordinatorError};
pub use storage::{MemorySessionStorage, SessionStorage};
