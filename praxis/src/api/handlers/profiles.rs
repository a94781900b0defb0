use crate::api::models::profiles::{CurrentUser, ListProfilesQuery, ProfileAccessResponse, ProfileResponse, SubscriptionUpdate};
use crate::auth::permissions::{RequiresPermission, operation, owns_profile, require, resource};
use crate::db::handlers::{Profiles, Repository, profiles::ProfileFilter};
use crate::db::models::profiles::ProfileDBResponse;
use crate::errors::{Error, Result};
use crate::subscription::load_effective_access;
use crate::types::{Operation, ProfileId, ProfileIdOrCurrent, Resource};
use crate::{AppState, types::abbrev_uuid};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use sqlx::PgConnection;

/// Load `id`, checking the caller may read it.
async fn readable_profile(conn: &mut PgConnection, current_user: &CurrentUser, id: ProfileId) -> Result<ProfileDBResponse> {
    let profile = Profiles::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Profile".to_string(),
        id: id.to_string(),
    })?;
    require(
        current_user,
        Resource::Profiles,
        Operation::ReadAll,
        Operation::ReadOwn,
        owns_profile(current_user, &profile),
        "profile",
    )?;
    Ok(profile)
}

#[utoipa::path(
    get,
    path = "/profiles",
    tag = "profiles",
    summary = "List profiles",
    params(ListProfilesQuery),
    responses(
        (status = 200, description = "List of profiles", body = Vec<ProfileResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_profiles(
    State(state): State<AppState>,
    Query(query): Query<ListProfilesQuery>,
    _: RequiresPermission<resource::Profiles, operation::ReadAll>,
) -> Result<Json<Vec<ProfileResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let (skip, limit) = query.pagination.params();
    let filter = ProfileFilter {
        role: query.role,
        clinic_id: query.clinic_id,
        ..ProfileFilter::new(skip, limit)
    };

    let profiles = Profiles::new(&mut conn).list(&filter).await?;
    Ok(Json(profiles.into_iter().map(ProfileResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/profiles/{profile_id}",
    tag = "profiles",
    summary = "Get profile",
    params(("profile_id" = String, Path, description = "Profile ID (UUID) or 'current'")),
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Profile not found"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileIdOrCurrent>,
    current_user: CurrentUser,
) -> Result<Json<ProfileResponse>> {
    let id = profile_id.resolve(current_user.id);
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = readable_profile(&mut conn, &current_user, id).await?;
    Ok(Json(ProfileResponse::from(profile)))
}

#[utoipa::path(
    get,
    path = "/profiles/{profile_id}/access",
    tag = "profiles",
    summary = "Get subscription access",
    description = "Whether the profile can use practice features now, with banner colour, remaining days and any clinic lock.",
    params(("profile_id" = String, Path, description = "Profile ID (UUID) or 'current'")),
    responses(
        (status = 200, description = "Access decision", body = ProfileAccessResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Profile not found"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile_access(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileIdOrCurrent>,
    current_user: CurrentUser,
) -> Result<Json<ProfileAccessResponse>> {
    let id = profile_id.resolve(current_user.id);
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = readable_profile(&mut conn, &current_user, id).await?;

    let now = Utc::now();
    let access = load_effective_access(&mut conn, &state.resolver, &profile, now).await?;
    Ok(Json(ProfileAccessResponse {
        profile_id: profile.id,
        has_access: access.has_access(),
        access,
        evaluated_at: now,
    }))
}

#[utoipa::path(
    patch,
    path = "/profiles/{profile_id}/subscription",
    tag = "profiles",
    summary = "Update subscription",
    description = "Platform admins only. Changing either period date re-arms the expiry warning.",
    request_body = SubscriptionUpdate,
    params(("profile_id" = uuid::Uuid, Path, description = "Profile ID")),
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 400, description = "Invalid clinic reference"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Profile not found"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all, fields(profile_id = %abbrev_uuid(&profile_id)))]
pub async fn update_profile_subscription(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
    current_user: RequiresPermission<resource::Subscriptions, operation::UpdateAll>,
    Json(update): Json<SubscriptionUpdate>,
) -> Result<Json<ProfileResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Profiles::new(&mut conn).update_subscription(profile_id, &update.into()).await?;

    tracing::info!(
        admin = %abbrev_uuid(&current_user.id),
        status = ?profile.subscription_status,
        tier = ?profile.tier,
        "Updated profile subscription"
    );
    Ok(Json(ProfileResponse::from(profile)))
}
