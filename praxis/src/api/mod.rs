//! HTTP surface: route handlers and their request/response models.
//!
//! - **Management API** (`/admin/api/v1/*`): profiles, clinics, appointments, notification
//!   settings, voice recording and subscription maintenance. Callers are identified by the
//!   identity proxy header, see [`crate::auth`].
//! - **Public booking** (`/public/appointments`): unauthenticated appointment requests.
//!
//! Every endpoint is documented with `utoipa`; the rendered reference lives at `/admin/docs`.

pub mod handlers;
pub mod models;
