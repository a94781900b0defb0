//! Database repository for profiles.

use crate::types::{ClinicId, ProfileId, abbrev_uuid};
use crate::{
    api::models::profiles::Role,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::profiles::{
            LapsedProfileDBResponse, ProfileCreateDBRequest, ProfileDBResponse, ProfileUpdateDBRequest, SubscriptionUpdateDBRequest,
        },
    },
};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const PROFILE_COLUMNS: &str = "id, email, full_name, phone, role, subscription_status, tier, trial_ends_at, \
     subscription_end_date, clinic_id, expiry_warning_sent_at, created_at, updated_at";

/// Filter for listing profiles
#[derive(Debug, Clone)]
pub struct ProfileFilter {
    pub skip: i64,
    pub limit: i64,
    pub role: Option<Role>,
    pub clinic_id: Option<ClinicId>,
}

impl ProfileFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            role: None,
            clinic_id: None,
        }
    }
}

pub struct Profiles<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Profiles<'c> {
    type CreateRequest = ProfileCreateDBRequest;
    type UpdateRequest = ProfileUpdateDBRequest;
    type Response = ProfileDBResponse;
    type Id = ProfileId;
    type Filter = ProfileFilter;

    #[instrument(skip(self, request), fields(email = %request.email, role = ?request.role), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(&format!(
            r#"
            INSERT INTO profiles (id, email, full_name, phone, role, subscription_status, tier,
                                  trial_ends_at, subscription_end_date, clinic_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&request.email)
        .bind(&request.full_name)
        .bind(&request.phone)
        .bind(request.role)
        .bind(request.subscription_status)
        .bind(request.tier)
        .bind(request.trial_ends_at)
        .bind(request.subscription_end_date)
        .bind(request.clinic_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(profile)
    }

    #[instrument(skip(self), fields(profile_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(profile)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let profiles = sqlx::query_as::<_, ProfileDBResponse>(&format!(
            r#"
            SELECT {PROFILE_COLUMNS} FROM profiles
            WHERE ($1::profile_role IS NULL OR role = $1)
              AND ($2::uuid IS NULL OR clinic_id = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.role)
        .bind(filter.clinic_id)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(profiles)
    }

    #[instrument(skip(self), fields(profile_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(profile_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(&format!(
            r#"
            UPDATE profiles SET
                full_name = COALESCE($2, full_name),
                phone = COALESCE($3, phone),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.full_name)
        .bind(&request.phone)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(profile)
    }
}

impl<'c> Profiles<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<ProfileDBResponse>> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE lower(email) = lower($1)"))
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(profile)
    }

    /// Change subscription fields. Moving either end date starts a new period, so the expiry
    /// warning marker is cleared as well.
    #[instrument(skip(self, request), fields(profile_id = %abbrev_uuid(&id)), err)]
    pub async fn update_subscription(&mut self, id: ProfileId, request: &SubscriptionUpdateDBRequest) -> Result<ProfileDBResponse> {
        let dates_changed = request.trial_ends_at.is_some() || request.subscription_end_date.is_some();

        let profile = sqlx::query_as::<_, ProfileDBResponse>(&format!(
            r#"
            UPDATE profiles SET
                subscription_status = COALESCE($2, subscription_status),
                tier = COALESCE($3, tier),
                trial_ends_at = CASE WHEN $4 THEN $5 ELSE trial_ends_at END,
                subscription_end_date = CASE WHEN $6 THEN $7 ELSE subscription_end_date END,
                clinic_id = CASE WHEN $8 THEN $9 ELSE clinic_id END,
                expiry_warning_sent_at = CASE WHEN $10 THEN NULL ELSE expiry_warning_sent_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.subscription_status)
        .bind(request.tier)
        .bind(request.trial_ends_at.is_some())
        .bind(request.trial_ends_at.flatten())
        .bind(request.subscription_end_date.is_some())
        .bind(request.subscription_end_date.flatten())
        .bind(request.clinic_id.is_some())
        .bind(request.clinic_id.flatten())
        .bind(dates_changed)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(profile)
    }

    /// Lock the profile row until the surrounding transaction ends. Used to serialize bookings
    /// per doctor.
    #[instrument(skip(self), fields(profile_id = %abbrev_uuid(&id)), err)]
    pub async fn lock(&mut self, id: ProfileId) -> Result<bool> {
        let row = sqlx::query_scalar::<_, Uuid>("SELECT id FROM profiles WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.is_some())
    }

    #[instrument(skip(self), fields(clinic_id = %abbrev_uuid(&clinic_id)), err)]
    pub async fn count_by_clinic(&mut self, clinic_id: ClinicId, role: Option<Role>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles WHERE clinic_id = $1 AND ($2::profile_role IS NULL OR role = $2)")
            .bind(clinic_id)
            .bind(role)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Deactivate individual subscriptions whose trial or paid period ended at or before `now`.
    ///
    /// Clinic members and lifetime plans are never touched. Returns the profiles that changed,
    /// each with the status it had before.
    #[instrument(skip(self), err)]
    pub async fn expire_lapsed(&mut self, now: DateTime<Utc>) -> Result<Vec<LapsedProfileDBResponse>> {
        let profiles = sqlx::query_as::<_, LapsedProfileDBResponse>(&format!(
            r#"
            WITH lapsed AS (
                SELECT id AS lapsed_id, subscription_status AS previous_status FROM profiles
                WHERE clinic_id IS NULL
                  AND tier <> 'lifetime'
                  AND (
                    (subscription_status = 'trial' AND trial_ends_at <= $1)
                    OR (subscription_status IN ('active', 'cancelled') AND subscription_end_date <= $1)
                  )
                FOR UPDATE
            )
            UPDATE profiles SET subscription_status = 'inactive', updated_at = NOW()
            FROM lapsed
            WHERE profiles.id = lapsed.lapsed_id
            RETURNING {PROFILE_COLUMNS}, lapsed.previous_status
            "#
        ))
        .bind(now)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(profiles)
    }

    /// Profiles whose current period ends in `(now, until]` and that have not been warned yet.
    #[instrument(skip(self), err)]
    pub async fn list_expiring_unwarned(&mut self, now: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<ProfileDBResponse>> {
        let profiles = sqlx::query_as::<_, ProfileDBResponse>(&format!(
            r#"
            SELECT {PROFILE_COLUMNS} FROM profiles
            WHERE clinic_id IS NULL
              AND tier <> 'lifetime'
              AND expiry_warning_sent_at IS NULL
              AND (
                (subscription_status = 'trial' AND trial_ends_at > $1 AND trial_ends_at <= $2)
                OR (subscription_status IN ('active', 'cancelled') AND subscription_end_date > $1 AND subscription_end_date <= $2)
              )
            ORDER BY created_at
            "#
        ))
        .bind(now)
        .bind(until)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(profiles)
    }

    #[instrument(skip(self), fields(profile_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_expiry_warned(&mut self, id: ProfileId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE profiles SET expiry_warning_sent_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}
