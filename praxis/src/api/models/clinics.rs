//! API request/response models for clinics.

use super::{double_option, pagination::Pagination};
use crate::db::models::clinics::{ClinicCreateDBRequest, ClinicDBResponse, ClinicSubscriptionUpdateDBRequest, ClinicUpdateDBRequest};
use crate::subscription::{resolver::ClinicAccess, status::ClinicStatus};
use crate::types::ClinicId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClinicCreate {
    pub name: String,
    pub max_doctors: Option<i32>,
    pub max_patients: Option<i32>,
}

impl From<ClinicCreate> for ClinicCreateDBRequest {
    fn from(api: ClinicCreate) -> Self {
        Self {
            name: api.name,
            // New clinics wait for a platform admin to approve them
            subscription_status: ClinicStatus::PendingApproval,
            subscription_end_date: None,
            max_doctors: api.max_doctors.unwrap_or(5),
            max_patients: api.max_patients.unwrap_or(1000),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ClinicUpdate {
    pub name: Option<String>,
    pub max_doctors: Option<i32>,
    pub max_patients: Option<i32>,
}

impl From<ClinicUpdate> for ClinicUpdateDBRequest {
    fn from(api: ClinicUpdate) -> Self {
        Self {
            name: api.name,
            max_doctors: api.max_doctors,
            max_patients: api.max_patients,
        }
    }
}

/// Approve, deactivate or extend a clinic. Send `null` as the end date for an open-ended plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ClinicSubscriptionUpdate {
    pub subscription_status: Option<ClinicStatus>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub subscription_end_date: Option<Option<DateTime<Utc>>>,
}

impl From<ClinicSubscriptionUpdate> for ClinicSubscriptionUpdateDBRequest {
    fn from(api: ClinicSubscriptionUpdate) -> Self {
        Self {
            subscription_status: api.subscription_status,
            subscription_end_date: api.subscription_end_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClinicResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ClinicId,
    pub name: String,
    pub subscription_status: ClinicStatus,
    pub subscription_end_date: Option<DateTime<Utc>>,
    /// Informational only, not enforced
    pub max_doctors: i32,
    /// Informational only, not enforced
    pub max_patients: i32,
    /// Number of doctors attached to the clinic (only included on single-clinic reads)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ClinicDBResponse> for ClinicResponse {
    fn from(db: ClinicDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            subscription_status: db.subscription_status,
            subscription_end_date: db.subscription_end_date,
            max_doctors: db.max_doctors,
            max_patients: db.max_patients,
            doctor_count: None,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl ClinicResponse {
    pub fn with_doctor_count(mut self, count: i64) -> Self {
        self.doctor_count = Some(count);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClinicAccessResponse {
    #[schema(value_type = String, format = "uuid")]
    pub clinic_id: ClinicId,
    #[serde(flatten)]
    pub access: ClinicAccess,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListClinicsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only clinics in this state, e.g. `pending_approval` for the approval queue
    pub status: Option<ClinicStatus>,
}
