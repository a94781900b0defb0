use crate::api::models::clinics::{
    ClinicAccessResponse, ClinicCreate, ClinicResponse, ClinicSubscriptionUpdate, ClinicUpdate, ListClinicsQuery,
};
use crate::api::models::profiles::{CurrentUser, Role};
use crate::auth::permissions::{RequiresPermission, operation, require, resource};
use crate::db::handlers::{Clinics, Profiles, Repository, clinics::ClinicFilter};
use crate::db::models::clinics::ClinicDBResponse;
use crate::errors::{Error, Result};
use crate::subscription::resolve_clinic_access;
use crate::types::{ClinicId, Operation, Resource, abbrev_uuid};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use sqlx::PgConnection;

async fn find_clinic(conn: &mut PgConnection, id: ClinicId) -> Result<ClinicDBResponse> {
    Clinics::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Clinic".to_string(),
        id: id.to_string(),
    })
}

fn is_member(user: &CurrentUser, id: ClinicId) -> bool {
    user.clinic_id == Some(id)
}

#[utoipa::path(
    get,
    path = "/clinics",
    tag = "clinics",
    summary = "List clinics",
    params(ListClinicsQuery),
    responses(
        (status = 200, description = "List of clinics", body = Vec<ClinicResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_clinics(
    State(state): State<AppState>,
    Query(query): Query<ListClinicsQuery>,
    _: RequiresPermission<resource::Clinics, operation::ReadAll>,
) -> Result<Json<Vec<ClinicResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let (skip, limit) = query.pagination.params();
    let filter = ClinicFilter {
        status: query.status,
        ..ClinicFilter::new(skip, limit)
    };

    let clinics = Clinics::new(&mut conn).list(&filter).await?;
    Ok(Json(clinics.into_iter().map(ClinicResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/clinics",
    tag = "clinics",
    summary = "Create clinic",
    description = "New clinics start pending approval.",
    request_body = ClinicCreate,
    responses(
        (status = 201, description = "Clinic created", body = ClinicResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_clinic(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Clinics, operation::CreateAll>,
    Json(create): Json<ClinicCreate>,
) -> Result<(StatusCode, Json<ClinicResponse>)> {
    if create.name.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Clinic name must not be empty".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let clinic = Clinics::new(&mut conn).create(&create.into()).await?;
    Ok((StatusCode::CREATED, Json(ClinicResponse::from(clinic).with_doctor_count(0))))
}

#[utoipa::path(
    get,
    path = "/clinics/{clinic_id}",
    tag = "clinics",
    summary = "Get clinic",
    params(("clinic_id" = uuid::Uuid, Path, description = "Clinic ID")),
    responses(
        (status = 200, description = "Clinic with its doctor count", body = ClinicResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Clinic not found"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all, fields(clinic_id = %abbrev_uuid(&clinic_id)))]
pub async fn get_clinic(
    State(state): State<AppState>,
    Path(clinic_id): Path<ClinicId>,
    current_user: CurrentUser,
) -> Result<Json<ClinicResponse>> {
    require(
        &current_user,
        Resource::Clinics,
        Operation::ReadAll,
        Operation::ReadOwn,
        is_member(&current_user, clinic_id),
        "clinic",
    )?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let clinic = find_clinic(&mut conn, clinic_id).await?;
    let doctors = Profiles::new(&mut conn).count_by_clinic(clinic_id, Some(Role::Doctor)).await?;
    Ok(Json(ClinicResponse::from(clinic).with_doctor_count(doctors)))
}

#[utoipa::path(
    patch,
    path = "/clinics/{clinic_id}",
    tag = "clinics",
    summary = "Update clinic",
    request_body = ClinicUpdate,
    params(("clinic_id" = uuid::Uuid, Path, description = "Clinic ID")),
    responses(
        (status = 200, description = "Updated clinic", body = ClinicResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Clinic not found"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all, fields(clinic_id = %abbrev_uuid(&clinic_id)))]
pub async fn update_clinic(
    State(state): State<AppState>,
    Path(clinic_id): Path<ClinicId>,
    current_user: CurrentUser,
    Json(update): Json<ClinicUpdate>,
) -> Result<Json<ClinicResponse>> {
    require(
        &current_user,
        Resource::Clinics,
        Operation::UpdateAll,
        Operation::UpdateOwn,
        is_member(&current_user, clinic_id),
        "clinic",
    )?;
    if update.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(Error::BadRequest {
            message: "Clinic name must not be empty".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let clinic = Clinics::new(&mut conn).update(clinic_id, &update.into()).await?;
    Ok(Json(ClinicResponse::from(clinic)))
}

#[utoipa::path(
    get,
    path = "/clinics/{clinic_id}/access",
    tag = "clinics",
    summary = "Get clinic access",
    description = "Whether members of the clinic can use practice features, and the lock reason if not.",
    params(("clinic_id" = uuid::Uuid, Path, description = "Clinic ID")),
    responses(
        (status = 200, description = "Clinic access decision", body = ClinicAccessResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Clinic not found"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all, fields(clinic_id = %abbrev_uuid(&clinic_id)))]
pub async fn get_clinic_access(
    State(state): State<AppState>,
    Path(clinic_id): Path<ClinicId>,
    current_user: CurrentUser,
) -> Result<Json<ClinicAccessResponse>> {
    require(
        &current_user,
        Resource::Clinics,
        Operation::ReadAll,
        Operation::ReadOwn,
        is_member(&current_user, clinic_id),
        "clinic",
    )?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let clinic = find_clinic(&mut conn, clinic_id).await?;
    let now = Utc::now();
    Ok(Json(ClinicAccessResponse {
        clinic_id,
        access: resolve_clinic_access(&clinic.subscription(), now),
        evaluated_at: now,
    }))
}

#[utoipa::path(
    patch,
    path = "/clinics/{clinic_id}/subscription",
    tag = "clinics",
    summary = "Update clinic subscription",
    description = "Platform admins only: approve, deactivate or extend a clinic.",
    request_body = ClinicSubscriptionUpdate,
    params(("clinic_id" = uuid::Uuid, Path, description = "Clinic ID")),
    responses(
        (status = 200, description = "Updated clinic", body = ClinicResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Clinic not found"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all, fields(clinic_id = %abbrev_uuid(&clinic_id)))]
pub async fn update_clinic_subscription(
    State(state): State<AppState>,
    Path(clinic_id): Path<ClinicId>,
    current_user: RequiresPermission<resource::Subscriptions, operation::UpdateAll>,
    Json(update): Json<ClinicSubscriptionUpdate>,
) -> Result<Json<ClinicResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let clinic = Clinics::new(&mut conn).update_subscription(clinic_id, &update.into()).await?;

    tracing::info!(
        admin = %abbrev_uuid(&current_user.id),
        status = ?clinic.subscription_status,
        "Updated clinic subscription"
    );
    Ok(Json(ClinicResponse::from(clinic)))
}

#[cfg(test)]
mod tests {
    use crate::api::models::clinics::{ClinicAccessResponse, ClinicResponse};
    use crate::api::models::profiles::Role;
    use crate::db::handlers::Profiles;
    use crate::db::models::profiles::SubscriptionUpdateDBRequest;
    use crate::subscription::resolver::{LockReason, StatusColor};
    use crate::subscription::status::ClinicStatus;
    use crate::test_utils::{auth_header, create_test_app, create_test_config, create_test_profile};
    use chrono::{TimeDelta, Utc};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_clinic_approval_flow(pool: PgPool) {
        let admin = create_test_profile(&pool, Role::PlatformAdmin).await;
        let doctor = create_test_profile(&pool, Role::Doctor).await;
        let config = create_test_config();
        let (name, value) = auth_header(&config, &admin);
        let (server, _bg) = create_test_app(pool.clone(), config).await;

        let response = server
            .post("/admin/api/v1/clinics")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "name": "Northside Practice" }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let clinic: ClinicResponse = response.json();
        assert_eq!(clinic.subscription_status, ClinicStatus::PendingApproval);
        assert_eq!(clinic.max_doctors, 5);

        let response = server
            .get(&format!("/admin/api/v1/clinics/{}/access", clinic.id))
            .add_header(name.clone(), value.clone())
            .await;
        let access: ClinicAccessResponse = response.json();
        assert!(!access.access.has_access);
        assert_eq!(access.access.lock_reason, Some(LockReason::PendingApproval));

        let pending = server
            .get("/admin/api/v1/clinics?status=pending_approval")
            .add_header(name.clone(), value.clone())
            .await;
        let pending: Vec<ClinicResponse> = pending.json();
        assert_eq!(pending.len(), 1);

        let end = Utc::now() + TimeDelta::days(3);
        let response = server
            .patch(&format!("/admin/api/v1/clinics/{}/subscription", clinic.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({ "subscription_status": "active", "subscription_end_date": end }))
            .await;
        response.assert_status_ok();

        let response = server
            .get(&format!("/admin/api/v1/clinics/{}/access", clinic.id))
            .add_header(name.clone(), value.clone())
            .await;
        let access: ClinicAccessResponse = response.json();
        assert!(access.access.has_access);
        assert_eq!(access.access.status_color, StatusColor::Orange);

        // Attach a doctor and check the count
        let mut conn = pool.acquire().await.unwrap();
        Profiles::new(&mut conn)
            .update_subscription(
                doctor.id,
                &SubscriptionUpdateDBRequest {
                    clinic_id: Some(Some(clinic.id)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let response = server
            .get(&format!("/admin/api/v1/clinics/{}", clinic.id))
            .add_header(name, value)
            .await;
        let clinic: ClinicResponse = response.json();
        assert_eq!(clinic.doctor_count, Some(1));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_members_only_see_their_clinic(pool: PgPool) {
        let admin = create_test_profile(&pool, Role::PlatformAdmin).await;
        let doctor = create_test_profile(&pool, Role::Doctor).await;
        let config = create_test_config();
        let (admin_name, admin_value) = auth_header(&config, &admin);
        let (name, value) = auth_header(&config, &doctor);
        let (server, _bg) = create_test_app(pool.clone(), config).await;

        let clinic: ClinicResponse = server
            .post("/admin/api/v1/clinics")
            .add_header(admin_name, admin_value)
            .json(&json!({ "name": "Elsewhere" }))
            .await
            .json();

        let response = server
            .get(&format!("/admin/api/v1/clinics/{}", clinic.id))
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status_forbidden();

        let response = server
            .post("/admin/api/v1/clinics")
            .add_header(name, value)
            .json(&json!({ "name": "Mine" }))
            .await;
        response.assert_status_forbidden();
    }
}
