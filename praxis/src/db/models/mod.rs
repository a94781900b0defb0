//! Database record models matching table schemas.
//!
//! Models are distinct from the API models in [`crate::api::models`] so storage and the wire
//! format can evolve independently. Row types derive `sqlx::FromRow`; request types carry the
//! columns a repository writes.

pub mod appointments;
pub mod clinics;
pub mod notification_settings;
pub mod profiles;
