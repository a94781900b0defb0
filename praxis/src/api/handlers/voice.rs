//! Microphone arbitration between the dictation widgets a user has open.
//!
//! Each profile has its own coordinator, so one doctor's recording never affects another's.

use crate::api::models::voice::{RecordingRequest, RecordingResponse, ReleaseResponse};
use crate::auth::permissions::{RequiresPermission, operation, resource};
use crate::db::handlers::{Profiles, Repository};
use crate::errors::{Error, Result};
use crate::subscription::require_access;
use crate::types::abbrev_uuid;
use crate::voice::{ActiveRecording, StopCallback};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

#[utoipa::path(
    post,
    path = "/voice/recordings",
    tag = "voice",
    summary = "Request the microphone",
    description = "Under the `preempt` policy the current holder is stopped and the caller takes over. Under `reject` the request is refused while someone else records.",
    request_body = RecordingRequest,
    responses(
        (status = 200, description = "Whether the microphone was granted", body = RecordingResponse),
        (status = 400, description = "Empty recorder id"),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Subscription required"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn request_recording(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Voice, operation::CreateOwn>,
    Json(request): Json<RecordingRequest>,
) -> Result<Json<RecordingResponse>> {
    if request.recorder_id.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "recorder_id must not be empty".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Profiles::new(&mut conn).get_by_id(current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "Profile".to_string(),
        id: current_user.id.to_string(),
    })?;
    require_access(&mut conn, &state.resolver, &profile).await?;

    let coordinator = state.recordings.coordinator_for(current_user.id);
    let profile_id = abbrev_uuid(&current_user.id);
    let recorder_id = request.recorder_id.clone();
    let on_stop: StopCallback = Box::new(move || {
        metrics::counter!("praxis_voice_preemptions_total").increment(1);
        info!(profile_id = %profile_id, recorder_id = %recorder_id, "Recording stopped by another recorder");
    });

    let grant = coordinator.request(request.recorder_id, Some(on_stop));
    Ok(Json(RecordingResponse {
        granted: grant.granted,
        preempted: grant.preempted,
        active: coordinator.current(),
    }))
}

#[utoipa::path(
    get,
    path = "/voice/recordings/current",
    tag = "voice",
    summary = "Current recording",
    responses(
        (status = 200, description = "The recorder holding the caller's microphone, or null", body = Option<ActiveRecording>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn current_recording(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Voice, operation::ReadOwn>,
) -> Result<Json<Option<ActiveRecording>>> {
    Ok(Json(state.recordings.current(current_user.id)))
}

#[utoipa::path(
    delete,
    path = "/voice/recordings/{recorder_id}",
    tag = "voice",
    summary = "Release the microphone",
    description = "Only the current holder can release. Releasing as anyone else is a no-op.",
    params(("recorder_id" = String, Path, description = "Recorder releasing the microphone")),
    responses(
        (status = 200, description = "Whether the recorder held the microphone", body = ReleaseResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn release_recording(
    State(state): State<AppState>,
    Path(recorder_id): Path<String>,
    current_user: RequiresPermission<resource::Voice, operation::DeleteOwn>,
) -> Result<Json<ReleaseResponse>> {
    let released = state.recordings.release(current_user.id, &recorder_id);
    Ok(Json(ReleaseResponse { released }))
}

#[cfg(test)]
mod tests {
    use crate::api::models::profiles::Role;
    use crate::api::models::voice::{RecordingResponse, ReleaseResponse};
    use crate::db::handlers::Profiles;
    use crate::db::models::profiles::SubscriptionUpdateDBRequest;
    use crate::subscription::status::SubscriptionStatus;
    use crate::test_utils::{auth_header, create_test_app, create_test_config, create_test_profile};
    use crate::voice::{ActiveRecording, ContentionPolicy};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_second_recorder_preempts_first(pool: PgPool) {
        let doctor = create_test_profile(&pool, Role::Doctor).await;
        let config = create_test_config();
        let (name, value) = auth_header(&config, &doctor);
        let (server, _bg) = create_test_app(pool, config).await;

        let first: RecordingResponse = server
            .post("/admin/api/v1/voice/recordings")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "recorder_id": "notes" }))
            .await
            .json();
        assert!(first.granted);
        assert_eq!(first.preempted, None);

        let second: RecordingResponse = server
            .post("/admin/api/v1/voice/recordings")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "recorder_id": "prescription" }))
            .await
            .json();
        assert!(second.granted);
        assert_eq!(second.preempted.as_deref(), Some("notes"));

        // The stopped recorder can no longer release
        let released: ReleaseResponse = server
            .delete("/admin/api/v1/voice/recordings/notes")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert!(!released.released);

        let current: Option<ActiveRecording> = server
            .get("/admin/api/v1/voice/recordings/current")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(current.map(|c| c.recorder_id).as_deref(), Some("prescription"));

        let released: ReleaseResponse = server
            .delete("/admin/api/v1/voice/recordings/prescription")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert!(released.released);

        let current: Option<ActiveRecording> = server
            .get("/admin/api/v1/voice/recordings/current")
            .add_header(name, value)
            .await
            .json();
        assert!(current.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reject_policy_keeps_holder(pool: PgPool) {
        let doctor = create_test_profile(&pool, Role::Doctor).await;
        let colleague = create_test_profile(&pool, Role::Doctor).await;
        let mut config = create_test_config();
        config.voice.contention_policy = ContentionPolicy::Reject;
        let (name, value) = auth_header(&config, &doctor);
        let (colleague_name, colleague_value) = auth_header(&config, &colleague);
        let (server, _bg) = create_test_app(pool, config).await;

        server
            .post("/admin/api/v1/voice/recordings")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "recorder_id": "notes" }))
            .await
            .assert_status_ok();

        let refused: RecordingResponse = server
            .post("/admin/api/v1/voice/recordings")
            .add_header(name, value)
            .json(&json!({ "recorder_id": "prescription" }))
            .await
            .json();
        assert!(!refused.granted);
        assert_eq!(refused.active.map(|a| a.recorder_id).as_deref(), Some("notes"));

        // Another profile has its own microphone
        let other: RecordingResponse = server
            .post("/admin/api/v1/voice/recordings")
            .add_header(colleague_name, colleague_value)
            .json(&json!({ "recorder_id": "prescription" }))
            .await
            .json();
        assert!(other.granted);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_recording_requires_subscription(pool: PgPool) {
        let doctor = create_test_profile(&pool, Role::Doctor).await;
        let config = create_test_config();
        let (name, value) = auth_header(&config, &doctor);
        let (server, _bg) = create_test_app(pool.clone(), config).await;

        let mut conn = pool.acquire().await.unwrap();
        Profiles::new(&mut conn)
            .update_subscription(
                doctor.id,
                &SubscriptionUpdateDBRequest {
                    subscription_status: Some(SubscriptionStatus::Inactive),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        server
            .post("/admin/api/v1/voice/recordings")
            .add_header(name, value)
            .json(&json!({ "recorder_id": "notes" }))
            .await
            .assert_status(StatusCode::PAYMENT_REQUIRED);
    }
}
