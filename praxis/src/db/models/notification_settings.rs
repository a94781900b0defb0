//! Database models for notification gating and the SMTP override.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "notification_event", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    AppointmentBooked,
    SubscriptionExpiring,
    SubscriptionExpired,
}

impl NotificationEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationEvent::AppointmentBooked => "appointment_booked",
            NotificationEvent::SubscriptionExpiring => "subscription_expiring",
            NotificationEvent::SubscriptionExpired => "subscription_expired",
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `notifications_config`.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationSettingDBResponse {
    pub event: NotificationEvent,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SmtpSettingsDBRequest {
    pub host: String,
    pub port: i32,
    pub username: String,
    /// `None` keeps the stored password.
    pub password_encrypted: Option<String>,
    pub use_tls: bool,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct SmtpSettingsDBResponse {
    pub host: String,
    pub port: i32,
    pub username: String,
    pub password_encrypted: Option<String>,
    pub use_tls: bool,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}
