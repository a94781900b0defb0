//! Database models for clinics.

use crate::subscription::{resolver::ClinicRecord, status::ClinicStatus};
use crate::types::ClinicId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct ClinicCreateDBRequest {
    pub name: String,
    pub subscription_status: ClinicStatus,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub max_doctors: i32,
    pub max_patients: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ClinicUpdateDBRequest {
    pub name: Option<String>,
    pub max_doctors: Option<i32>,
    pub max_patients: Option<i32>,
}

/// Approve, deactivate or extend a clinic. `Some(None)` clears the end date.
#[derive(Debug, Clone, Default)]
pub struct ClinicSubscriptionUpdateDBRequest {
    pub subscription_status: Option<ClinicStatus>,
    pub subscription_end_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ClinicDBResponse {
    pub id: ClinicId,
    pub name: String,
    pub subscription_status: ClinicStatus,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub max_doctors: i32,
    pub max_patients: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClinicDBResponse {
    pub fn subscription(&self) -> ClinicRecord {
        ClinicRecord {
            status: self.subscription_status,
            subscription_end_date: self.subscription_end_date,
        }
    }
}
