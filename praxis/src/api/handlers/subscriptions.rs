use crate::auth::permissions::{RequiresPermission, operation, resource};
use crate::errors::Result;
use crate::subscription::sweep::{SweepReport, run_expiry_sweep};
use crate::AppState;
use axum::{Json, extract::State};
use chrono::Utc;

#[utoipa::path(
    post,
    path = "/subscriptions/sweep",
    tag = "subscriptions",
    summary = "Run the expiry sweep",
    description = "Runs the periodic expiry sweep now, on this replica, whether or not it is leader.",
    responses(
        (status = 200, description = "What the sweep changed", body = SweepReport),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn trigger_expiry_sweep(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::System, operation::SystemAccess>,
) -> Result<Json<SweepReport>> {
    tracing::info!(admin = %current_user.email, "Expiry sweep triggered manually");
    let report = run_expiry_sweep(&state.db, &state.dispatcher, Utc::now()).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use crate::api::models::profiles::Role;
    use crate::db::handlers::{Profiles, Repository};
    use crate::db::models::profiles::SubscriptionUpdateDBRequest;
    use crate::subscription::status::SubscriptionStatus;
    use crate::subscription::sweep::SweepReport;
    use crate::test_utils::{auth_header, create_test_app, create_test_config, create_test_profile};
    use chrono::{TimeDelta, Utc};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_manual_sweep(pool: PgPool) {
        let admin = create_test_profile(&pool, Role::PlatformAdmin).await;
        let doctor = create_test_profile(&pool, Role::Doctor).await;
        let config = create_test_config();
        let (name, value) = auth_header(&config, &admin);
        let (doctor_name, doctor_value) = auth_header(&config, &doctor);
        let (server, _bg) = create_test_app(pool.clone(), config).await;

        let mut conn = pool.acquire().await.unwrap();
        Profiles::new(&mut conn)
            .update_subscription(
                doctor.id,
                &SubscriptionUpdateDBRequest {
                    trial_ends_at: Some(Some(Utc::now() - TimeDelta::minutes(5))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        server
            .post("/admin/api/v1/subscriptions/sweep")
            .add_header(doctor_name, doctor_value)
            .await
            .assert_status_forbidden();

        let report: SweepReport = server
            .post("/admin/api/v1/subscriptions/sweep")
            .add_header(name, value)
            .await
            .json();
        assert_eq!(report.profiles_expired, 1);
        assert_eq!(report.notification_failures, 0);

        let doctor = Profiles::new(&mut conn).get_by_id(doctor.id).await.unwrap().unwrap();
        assert_eq!(doctor.subscription_status, SubscriptionStatus::Inactive);
    }
}
