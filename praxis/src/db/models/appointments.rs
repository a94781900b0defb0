//! Database models for appointments.

use crate::types::{AppointmentId, ProfileId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "appointment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

/// Where an appointment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "appointment_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AppointmentSource {
    PublicBooking,
    Staff,
}

#[derive(Debug, Clone)]
pub struct AppointmentCreateDBRequest {
    pub doctor_id: ProfileId,
    pub patient_name: String,
    pub patient_phone: String,
    pub patient_email: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub source: AppointmentSource,
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentUpdateDBRequest {
    pub status: Option<AppointmentStatus>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AppointmentDBResponse {
    pub id: AppointmentId,
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
