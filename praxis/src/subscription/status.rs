//! Subscription state enums shared by profiles and clinics.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of an individual (profile-level) subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Cancelled,
    Inactive,
    PendingApproval,
}

impl SubscriptionStatus {
    /// Statuses whose access is bounded by `subscription_end_date`.
    pub fn is_paid_period(self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "subscription_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Enterprise,
    /// Never expires.
    Lifetime,
}

/// Lifecycle of a clinic account. New clinics wait for platform approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "clinic_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClinicStatus {
    PendingApproval,
    Active,
    Inactive,
}
