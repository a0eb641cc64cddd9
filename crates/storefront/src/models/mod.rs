//! Domain models for the storefront service.
//!
//! These are validated domain objects, separate from database row types.

pub mod preference;
pub mod session;
pub mod user;

pub use preference::{PreferenceOwner, PreferenceStatus};
pub use session::{NewRotationCredential, SessionRecord};
pub use user::User;
