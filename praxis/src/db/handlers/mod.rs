//! Repository implementations for database access.
//!
//! - [`Profiles`]: doctors, staff and administrators, including their subscription fields
//! - [`Clinics`]: clinic accounts and their approval state
//! - [`Appointments`]: bookings made publicly or by staff
//! - [`NotificationSettings`]: per-event channel gating and the SMTP override

pub mod appointments;
pub mod clinics;
pub mod notification_settings;
pub mod profiles;
pub mod repository;

pub use appointments::Appointments;
pub use clinics::Clinics;
pub use notification_settings::NotificationSettings;
pub use profiles::Profiles;
pub use repository::Repository;
