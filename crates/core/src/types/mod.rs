//! Core types for Luzimarket.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod delivery;
pub mod email;
pub mod id;
pub mod session;

pub use delivery::{
    DeliverySelection, DeliveryState, DeliveryUpdate, DeliveryZone, PreferenceStatus,
    STALE_SELECTION_MESSAGE, STATES, StateCode, StateCodeError,
};
pub use email::{Email, EmailError};
pub use id::*;
pub use session::{
    AccessClaims, SessionId, SessionSummary, SubjectContext, SubjectType, TokenPair,
};
