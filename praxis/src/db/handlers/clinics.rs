//! Database repository for clinics.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::clinics::{ClinicCreateDBRequest, ClinicDBResponse, ClinicSubscriptionUpdateDBRequest, ClinicUpdateDBRequest},
};
use crate::subscription::status::ClinicStatus;
use crate::types::{ClinicId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const CLINIC_COLUMNS: &str =
    "id, name, subscription_status, subscription_end_date, max_doctors, max_patients, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct ClinicFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<ClinicStatus>,
}

impl ClinicFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, status: None }
    }
}

pub struct Clinics<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Clinics<'c> {
    type CreateRequest = ClinicCreateDBRequest;
    type UpdateRequest = ClinicUpdateDBRequest;
    type Response = ClinicDBResponse;
    type Id = ClinicId;
    type Filter = ClinicFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let clinic = sqlx::query_as::<_, ClinicDBResponse>(&format!(
            r#"
            INSERT INTO clinics (id, name, subscription_status, subscription_end_date, max_doctors, max_patients)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {CLINIC_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(request.subscription_status)
        .bind(request.subscription_end_date)
        .bind(request.max_doctors)
        .bind(request.max_patients)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(clinic)
    }

    #[instrument(skip(self), fields(clinic_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let clinic = sqlx::query_as::<_, ClinicDBResponse>(&format!("SELECT {CLINIC_COLUMNS} FROM clinics WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(clinic)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let clinics = sqlx::query_as::<_, ClinicDBResponse>(&format!(
            r#"
            SELECT {CLINIC_COLUMNS} FROM clinics
            WHERE ($1::clinic_status IS NULL OR subscription_status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(clinics)
    }

    #[instrument(skip(self), fields(clinic_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM clinics WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(clinic_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let clinic = sqlx::query_as::<_, ClinicDBResponse>(&format!(
            r#"
            UPDATE clinics SET
                name = COALESCE($2, name),
                max_doctors = COALESCE($3, max_doctors),
                max_patients = COALESCE($4, max_patients),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CLINIC_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.name)
        .bind(request.max_doctors)
        .bind(request.max_patients)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(clinic)
    }
}

impl<'c> Clinics<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(clinic_id = %abbrev_uuid(&id)), err)]
    pub async fn update_subscription(&mut self, id: ClinicId, request: &ClinicSubscriptionUpdateDBRequest) -> Result<ClinicDBResponse> {
        let clinic = sqlx::query_as::<_, ClinicDBResponse>(&format!(
            r#"
            UPDATE clinics SET
                subscription_status = COALESCE($2, subscription_status),
                subscription_end_date = CASE WHEN $3 THEN $4 ELSE subscription_end_date END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CLINIC_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.subscription_status)
        .bind(request.subscription_end_date.is_some())
        .bind(request.subscription_end_date.flatten())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(clinic)
    }

    /// Deactivate active clinics whose end date is at or before `now`.
    #[instrument(skip(self), err)]
    pub async fn expire_lapsed(&mut self, now: DateTime<Utc>) -> Result<Vec<ClinicDBResponse>> {
        let clinics = sqlx::query_as::<_, ClinicDBResponse>(&format!(
            r#"
            UPDATE clinics SET subscription_status = 'inactive', updated_at = NOW()
            WHERE subscription_status = 'active' AND subscription_end_date <= $1
            RETURNING {CLINIC_COLUMNS}
            "#
        ))
        .bind(now)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(clinics)
    }
}
