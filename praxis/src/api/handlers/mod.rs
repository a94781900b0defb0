//! Axum route handlers, one module per resource.
//!
//! - [`profiles`]: profile lookup, access decisions and admin subscription changes
//! - [`clinics`]: clinic accounts and the approval flow
//! - [`appointments`]: calendars for staff and the public booking endpoint
//! - [`notifications`]: per-event channel gating, the SMTP override and test sends
//! - [`voice`]: microphone arbitration between dictation widgets
//! - [`subscriptions`]: on-demand expiry sweep
//!
//! Handlers return [`crate::errors::Error`], which maps to the HTTP status and body.
//! Features that need a paid or trial subscription answer `402 Payment Required` with a
//! machine-readable `code` when the caller (or their clinic) is locked out.

pub mod appointments;
pub mod clinics;
pub mod notifications;
pub mod profiles;
pub mod subscriptions;
pub mod voice;
