//! API request/response models for appointments.

use super::pagination::Pagination;
use crate::db::models::appointments::{AppointmentDBResponse, AppointmentSource, AppointmentStatus};
use crate::types::{AppointmentId, ProfileId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Unauthenticated booking request from the public booking page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicBookingRequest {
    #[schema(value_type = String, format = "uuid")]
    pub doctor_id: ProfileId,
    pub patient_name: String,
    pub patient_phone: String,
    pub patient_email: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    /// Defaults to the configured booking duration
    pub duration_minutes: Option<i32>,
    pub reason: Option<String>,
}

/// What the public booking page gets back. Deliberately omits patient details.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicBookingResponse {
    #[schema(value_type = String, format = "uuid")]
    pub appointment_id: AppointmentId,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AppointmentUpdate {
    pub status: Option<AppointmentStatus>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppointmentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AppointmentId,
    #[schema(value_type = String, format = "uuid")]
    pub doctor_id: ProfileId,
    pub patient_name: String,
    pub patient_phone: String,
    pub patient_email: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub source: AppointmentSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AppointmentDBResponse> for AppointmentResponse {
    fn from(db: AppointmentDBResponse) -> Self {
        Self {
            id: db.id,
            doctor_id: db.doctor_id,
            patient_name: db.patient_name,
            patient_phone: db.patient_phone,
            patient_email: db.patient_email,
            scheduled_at: db.scheduled_at,
            duration_minutes: db.duration_minutes,
            reason: db.reason,
            status: db.status,
            source: db.source,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListAppointmentsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Doctor whose calendar to list. Defaults to the caller.
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub doctor_id: Option<ProfileId>,

    pub status: Option<AppointmentStatus>,

    /// Only appointments starting at or after this instant
    pub from: Option<DateTime<Utc>>,

    /// Only appointments starting before this instant
    pub until: Option<DateTime<Utc>>,
}
