//! Database models for profiles.

use crate::api::models::profiles::Role;
use crate::subscription::{
    resolver::SubscriptionRecord,
    status::{SubscriptionStatus, SubscriptionTier},
};
use crate::types::{ClinicId, ProfileId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for creating a new profile
#[derive(Debug, Clone)]
pub struct ProfileCreateDBRequest {
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub subscription_status: SubscriptionStatus,
    pub tier: SubscriptionTier,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub clinic_id: Option<ClinicId>,
}

impl ProfileCreateDBRequest {
    /// A self-registered doctor starting a free trial.
    pub fn trial_doctor(email: String, trial_ends_at: DateTime<Utc>) -> Self {
        Self {
            email,
            full_name: None,
            phone: None,
            role: Role::Doctor,
            subscription_status: SubscriptionStatus::Trial,
            tier: SubscriptionTier::Free,
            trial_ends_at: Some(trial_ends_at),
            subscription_end_date: None,
            clinic_id: None,
        }
    }
}

/// Database request for updating contact details
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdateDBRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

/// Database request for changing subscription fields.
///
/// `None` leaves a column unchanged. The doubly optional fields distinguish "leave alone"
/// (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct SubscriptionUpdateDBRequest {
    pub subscription_status: Option<SubscriptionStatus>,
    pub tier: Option<SubscriptionTier>,
    pub trial_ends_at: Option<Option<DateTime<Utc>>>,
    pub subscription_end_date: Option<Option<DateTime<Utc>>>,
    pub clinic_id: Option<Option<ClinicId>>,
}

/// Database response for a profile
#[derive(Debug, Clone, FromRow)]
pub struct ProfileDBResponse {
    pub id: ProfileId,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub subscription_status: SubscriptionStatus,
    pub tier: SubscriptionTier,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub clinic_id: Option<ClinicId>,
    pub expiry_warning_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A profile the expiry sweep just deactivated, with the status it had before.
#[derive(Debug, Clone, FromRow)]
pub struct LapsedProfileDBResponse {
    #[sqlx(flatten)]
    pub profile: ProfileDBResponse,
    pub previous_status: SubscriptionStatus,
}

impl ProfileDBResponse {
    pub fn subscription(&self) -> SubscriptionRecord {
        SubscriptionRecord {
            status: self.subscription_status,
            tier: self.tier,
            trial_ends_at: self.trial_ends_at,
            subscription_end_date: self.subscription_end_date,
            clinic_id: self.clinic_id,
        }
    }

    /// End of the period currently running: the trial end for trials, otherwise the paid end.
    pub fn current_period_end(&self) -> Option<DateTime<Utc>> {
        if self.subscription_status == SubscriptionStatus::Trial {
            self.trial_ends_at
        } else {
            self.subscription_end_date
        }
    }
}
