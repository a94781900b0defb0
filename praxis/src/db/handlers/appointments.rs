//! Database repository for appointments.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::appointments::{AppointmentCreateDBRequest, AppointmentDBResponse, AppointmentStatus, AppointmentUpdateDBRequest},
};
use crate::types::{AppointmentId, ProfileId, abbrev_uuid};
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const APPOINTMENT_COLUMNS: &str = "id, doctor_id, patient_name, patient_phone, patient_email, scheduled_at, \
     duration_minutes, reason, status, source, created_at, updated_at";

/// Filter for listing appointments
#[derive(Debug, Clone)]
pub struct AppointmentFilter {
    pub skip: i64,
    pub limit: i64,
    pub doctor_id: Option<ProfileId>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            doctor_id: None,
            status: None,
            from: None,
            until: None,
        }
    }
}

pub struct Appointments<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Appointments<'c> {
    type CreateRequest = AppointmentCreateDBRequest;
    type UpdateRequest = AppointmentUpdateDBRequest;
    type Response = AppointmentDBResponse;
    type Id = AppointmentId;
    type Filter = AppointmentFilter;

    #[instrument(skip(self, request), fields(doctor_id = %abbrev_uuid(&request.doctor_id), scheduled_at = %request.scheduled_at), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let appointment = sqlx::query_as::<_, AppointmentDBResponse>(&format!(
            r#"
            INSERT INTO appointments (id, doctor_id, patient_name, patient_phone, patient_email, scheduled_at,
                                      duration_minutes, reason, status, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(request.doctor_id)
        .bind(&request.patient_name)
        .bind(&request.patient_phone)
        .bind(&request.patient_email)
        .bind(request.scheduled_at)
        .bind(request.duration_minutes)
        .bind(&request.reason)
        .bind(request.status)
        .bind(request.source)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(appointment)
    }

    #[instrument(skip(self), fields(appointment_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let appointment =
            sqlx::query_as::<_, AppointmentDBResponse>(&format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1"))
                .bind(id)
                .fetch_optional(&mut *self.db)
                .await?;

        Ok(appointment)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let appointments = sqlx::query_as::<_, AppointmentDBResponse>(&format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS} FROM appointments
            WHERE ($1::uuid IS NULL OR doctor_id = $1)
              AND ($2::appointment_status IS NULL OR status = $2)
              AND ($3::timestamptz IS NULL OR scheduled_at >= $3)
              AND ($4::timestamptz IS NULL OR scheduled_at < $4)
            ORDER BY scheduled_at
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(filter.doctor_id)
        .bind(filter.status)
        .bind(filter.from)
        .bind(filter.until)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(appointments)
    }

    #[instrument(skip(self), fields(appointment_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(appointment_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let appointment = sqlx::query_as::<_, AppointmentDBResponse>(&format!(
            r#"
            UPDATE appointments SET
                status = COALESCE($2, status),
                scheduled_at = COALESCE($3, scheduled_at),
                duration_minutes = COALESCE($4, duration_minutes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.status)
        .bind(request.scheduled_at)
        .bind(request.duration_minutes)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(appointment)
    }
}

impl<'c> Appointments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Whether the doctor has a non-cancelled appointment overlapping `[start, start + duration)`.
    /// `exclude` skips one appointment, for rescheduling.
    #[instrument(skip(self), fields(doctor_id = %abbrev_uuid(&doctor_id)), err)]
    pub async fn has_overlap(
        &mut self,
        doctor_id: ProfileId,
        start: DateTime<Utc>,
        duration_minutes: i32,
        exclude: Option<AppointmentId>,
    ) -> Result<bool> {
        let end = start + TimeDelta::minutes(i64::from(duration_minutes));
        let overlap = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM appointments
                WHERE doctor_id = $1
                  AND status <> 'cancelled'
                  AND ($4::uuid IS NULL OR id <> $4)
                  AND scheduled_at < $3
                  AND scheduled_at + make_interval(mins => duration_minutes) > $2
            )
            "#,
        )
        .bind(doctor_id)
        .bind(start)
        .bind(end)
        .bind(exclude)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(overlap)
    }
}
