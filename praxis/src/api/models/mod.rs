//! API request/response models.
//!
//! These are the JSON shapes of the HTTP surface, documented through `utoipa`. Conversions from
//! the database models in [`crate::db::models`] live next to each response type.

use serde::{Deserialize, Deserializer};

pub mod appointments;
pub mod clinics;
pub mod notifications;
pub mod pagination;
pub mod profiles;
pub mod voice;

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`) in PATCH bodies.
/// Use together with `#[serde(default)]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
