//! API request/response models for profiles and their subscription access.

use super::{double_option, pagination::Pagination};
use crate::db::models::profiles::{ProfileDBResponse, SubscriptionUpdateDBRequest};
use crate::subscription::{
    resolver::EffectiveAccess,
    status::{SubscriptionStatus, SubscriptionTier},
};
use crate::types::{ClinicId, ProfileId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// What a profile does in the practice. Drives permissions, see [`crate::auth::permissions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "profile_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doctor,
    Assistant,
    ClinicAdmin,
    PlatformAdmin,
}

/// The authenticated caller, resolved from the identity header.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: ProfileId,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub clinic_id: Option<ClinicId>,
}

impl CurrentUser {
    pub fn is_platform_admin(&self) -> bool {
        self.role == Role::PlatformAdmin
    }
}

impl From<ProfileDBResponse> for CurrentUser {
    fn from(db: ProfileDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            full_name: db.full_name,
            role: db.role,
            clinic_id: db.clinic_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ProfileId,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub subscription_status: SubscriptionStatus,
    pub tier: SubscriptionTier,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub clinic_id: Option<ClinicId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProfileDBResponse> for ProfileResponse {
    fn from(db: ProfileDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            full_name: db.full_name,
            phone: db.phone,
            role: db.role,
            subscription_status: db.subscription_status,
            tier: db.tier,
            trial_ends_at: db.trial_ends_at,
            subscription_end_date: db.subscription_end_date,
            clinic_id: db.clinic_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Access decision for a profile, as rendered by the dashboard banner and lock screen.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileAccessResponse {
    #[schema(value_type = String, format = "uuid")]
    pub profile_id: ProfileId,
    /// Whether features are usable right now, taking a clinic lock into account
    pub has_access: bool,
    #[serde(flatten)]
    pub access: EffectiveAccess,
    pub evaluated_at: DateTime<Utc>,
}

/// Admin change to a profile's subscription. Send `null` to clear a date or leave a clinic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionUpdate {
    pub subscription_status: Option<SubscriptionStatus>,
    pub tier: Option<SubscriptionTier>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub trial_ends_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub subscription_end_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub clinic_id: Option<Option<ClinicId>>,
}

impl From<SubscriptionUpdate> for SubscriptionUpdateDBRequest {
    fn from(api: SubscriptionUpdate) -> Self {
        Self {
            subscription_status: api.subscription_status,
            tier: api.tier,
            trial_ends_at: api.trial_ends_at,
            subscription_end_date: api.subscription_end_date,
            clinic_id: api.clinic_id,
        }
    }
}

/// Query parameters for listing profiles
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListProfilesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only profiles with this role
    pub role: Option<Role>,

    /// Only members of this clinic
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub clinic_id: Option<ClinicId>,
}
