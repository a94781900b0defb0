//! API request/response models for notification settings.

use crate::db::models::notification_settings::{NotificationEvent, NotificationSettingDBResponse, SmtpSettingsDBResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationSettingResponse {
    pub event: NotificationEvent,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<NotificationSettingDBResponse> for NotificationSettingResponse {
    fn from(db: NotificationSettingDBResponse) -> Self {
        Self {
            event: db.event,
            email_enabled: db.email_enabled,
            sms_enabled: db.sms_enabled,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationSettingUpdate {
    pub event: NotificationEvent,
    pub email_enabled: bool,
    pub sms_enabled: bool,
}

/// The stored SMTP override. The password itself is never returned.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SmtpSettingsResponse {
    pub host: String,
    pub port: i32,
    pub username: String,
    pub has_password: bool,
    pub use_tls: bool,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<SmtpSettingsDBResponse> for SmtpSettingsResponse {
    fn from(db: SmtpSettingsDBResponse) -> Self {
        Self {
            host: db.host,
            port: db.port,
            username: db.username,
            has_password: db.password_encrypted.is_some(),
            use_tls: db.use_tls,
            from_email: db.from_email,
            from_name: db.from_name,
            enabled: db.enabled,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SmtpSettingsUpdate {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Omit to keep the stored password
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    pub from_email: String,
    pub from_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Connection parameters to try. With no `host`, the transport currently in effect is tested.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SmtpTestRequest {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SmtpTestResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TestNotificationRequest {
    pub event: NotificationEvent,
}
