//! Outbound notifications.
//!
//! [`NotificationDispatcher`] is the entry point: it checks the per-event channel gating in
//! `notifications_config`, renders the message from [`templates`], and hands it to the email
//! ([`email`]) and SMS ([`sms`]) senders. Channels are attempted independently and nothing is
//! retried.

pub mod dispatcher;
pub mod email;
pub mod sms;
pub mod templates;

use chrono::{DateTime, Utc};

use crate::db::models::{notification_settings::NotificationEvent, profiles::ProfileDBResponse};

pub use dispatcher::{ChannelOutcome, DispatchOutcome, NotificationDispatcher};

/// Who a notification goes to. A channel is skipped when its address is missing.
#[derive(Debug, Clone, Default)]
pub struct Recipient {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<&ProfileDBResponse> for Recipient {
    fn from(profile: &ProfileDBResponse) -> Self {
        Self {
            name: profile.full_name.clone(),
            email: Some(profile.email.clone()),
            phone: profile.phone.clone(),
        }
    }
}

/// Event data rendered into the message.
#[derive(Debug, Clone)]
pub enum NotificationPayload {
    AppointmentBooked {
        patient_name: String,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
        reason: Option<String>,
    },
    SubscriptionExpiring {
        ends_at: DateTime<Utc>,
        remaining_days: i64,
        trial: bool,
    },
    SubscriptionExpired {
        ended_at: Option<DateTime<Utc>>,
        trial: bool,
    },
    /// Sample message for an event, sent from the admin "send test" action.
    Test { event: NotificationEvent },
}

impl NotificationPayload {
    pub fn event(&self) -> NotificationEvent {
        match self {
            NotificationPayload::AppointmentBooked { .. } => NotificationEvent::AppointmentBooked,
            NotificationPayload::SubscriptionExpiring { .. } => NotificationEvent::SubscriptionExpiring,
            NotificationPayload::SubscriptionExpired { .. } => NotificationEvent::SubscriptionExpired,
            NotificationPayload::Test { event } => *event,
        }
    }
}
