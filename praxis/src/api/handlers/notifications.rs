use crate::api::models::notifications::{
    NotificationSettingResponse, NotificationSettingUpdate, SmtpSettingsResponse, SmtpSettingsUpdate, SmtpTestRequest,
    SmtpTestResponse, TestNotificationRequest,
};
use crate::auth::permissions::{RequiresPermission, operation, resource};
use crate::db::handlers::{NotificationSettings, Profiles, Repository};
use crate::db::models::notification_settings::SmtpSettingsDBRequest;
use crate::errors::{Error, Result};
use crate::notifications::{DispatchOutcome, NotificationPayload, Recipient, email::SmtpParams};
use crate::AppState;
use axum::{Json, extract::State};
use tracing::info;

#[utoipa::path(
    get,
    path = "/notifications/settings",
    tag = "notifications",
    summary = "List notification settings",
    description = "Which channels are enabled for each notification event.",
    responses(
        (status = 200, description = "Per-event channel settings", body = Vec<NotificationSettingResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_notification_settings(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Notifications, operation::ReadAll>,
) -> Result<Json<Vec<NotificationSettingResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let settings = NotificationSettings::new(&mut conn).list().await?;
    Ok(Json(settings.into_iter().map(NotificationSettingResponse::from).collect()))
}

#[utoipa::path(
    put,
    path = "/notifications/settings",
    tag = "notifications",
    summary = "Update notification settings",
    description = "Applies every entry or none of them.",
    request_body = Vec<NotificationSettingUpdate>,
    responses(
        (status = 200, description = "Settings after the update", body = Vec<NotificationSettingResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_notification_settings(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Notifications, operation::UpdateAll>,
    Json(updates): Json<Vec<NotificationSettingUpdate>>,
) -> Result<Json<Vec<NotificationSettingResponse>>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut settings = NotificationSettings::new(&mut tx);
    for update in &updates {
        settings.upsert(update.event, update.email_enabled, update.sms_enabled).await?;
    }
    let all = settings.list().await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(admin = %current_user.email, changed = updates.len(), "Updated notification settings");
    Ok(Json(all.into_iter().map(NotificationSettingResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/notifications/smtp",
    tag = "notifications",
    summary = "Get SMTP override",
    responses(
        (status = 200, description = "Stored SMTP settings", body = SmtpSettingsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No override stored; the configured transport is in use"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_smtp_settings(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Notifications, operation::ReadAll>,
) -> Result<Json<SmtpSettingsResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let settings = NotificationSettings::new(&mut conn).get_smtp().await?.ok_or_else(|| Error::NotFound {
        resource: "SMTP settings".to_string(),
        id: "smtp".to_string(),
    })?;
    Ok(Json(SmtpSettingsResponse::from(settings)))
}

#[utoipa::path(
    put,
    path = "/notifications/smtp",
    tag = "notifications",
    summary = "Store SMTP override",
    description = "Replaces the configured email transport while `enabled`. The password is stored encrypted and requires `encryption_key`.",
    request_body = SmtpSettingsUpdate,
    responses(
        (status = 200, description = "Stored SMTP settings", body = SmtpSettingsResponse),
        (status = 400, description = "Invalid settings"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_smtp_settings(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Notifications, operation::UpdateAll>,
    Json(update): Json<SmtpSettingsUpdate>,
) -> Result<Json<SmtpSettingsResponse>> {
    if update.host.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "SMTP host is required".to_string(),
        });
    }
    if update.port == 0 {
        return Err(Error::BadRequest {
            message: "SMTP port must be between 1 and 65535".to_string(),
        });
    }
    if !update.from_email.contains('@') {
        return Err(Error::BadRequest {
            message: "Sender email address is invalid".to_string(),
        });
    }

    let password_encrypted = match update.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => {
            let cipher = state.cipher.as_ref().ok_or_else(|| Error::BadRequest {
                message: "Storing an SMTP password requires encryption_key to be configured".to_string(),
            })?;
            Some(cipher.encrypt(password)?)
        }
        None => None,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let settings = NotificationSettings::new(&mut conn)
        .upsert_smtp(&SmtpSettingsDBRequest {
            host: update.host.trim().to_string(),
            port: i32::from(update.port),
            username: update.username,
            password_encrypted,
            use_tls: update.use_tls,
            from_email: update.from_email,
            from_name: update.from_name,
            enabled: update.enabled,
        })
        .await?;

    info!(admin = %current_user.email, host = %settings.host, enabled = settings.enabled, "Stored SMTP override");
    Ok(Json(SmtpSettingsResponse::from(settings)))
}

#[utoipa::path(
    post,
    path = "/notifications/smtp/test",
    tag = "notifications",
    summary = "Test SMTP connection",
    description = "Connects with the given parameters, or with the transport currently in use when no host is given. Failures are reported in the body.",
    request_body = SmtpTestRequest,
    responses(
        (status = 200, description = "Connection test result", body = SmtpTestResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn test_smtp_settings(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Notifications, operation::UpdateAll>,
    Json(request): Json<SmtpTestRequest>,
) -> Result<Json<SmtpTestResponse>> {
    let params = request.host.as_deref().map(|host| SmtpParams {
        host,
        port: request.port.unwrap_or(587),
        username: request.username.as_deref().unwrap_or(""),
        password: request.password.as_deref(),
        use_tls: request.use_tls.unwrap_or(true),
    });

    let response = match state.dispatcher.test_smtp_connection(params).await {
        Ok(()) => SmtpTestResponse {
            success: true,
            message: "Connection successful".to_string(),
        },
        Err(message) => SmtpTestResponse { success: false, message },
    };
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/notifications/test",
    tag = "notifications",
    summary = "Send test notification",
    description = "Sends a sample message for the event to the caller, on every channel, ignoring the event's settings.",
    request_body = TestNotificationRequest,
    responses(
        (status = 200, description = "Per-channel outcome", body = DispatchOutcome),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn send_test_notification(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Notifications, operation::UpdateAll>,
    Json(request): Json<TestNotificationRequest>,
) -> Result<Json<DispatchOutcome>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Profiles::new(&mut conn).get_by_id(current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "Profile".to_string(),
        id: current_user.id.to_string(),
    })?;

    let outcome = state
        .dispatcher
        .dispatch_ungated(&Recipient::from(&profile), &NotificationPayload::Test { event: request.event })
        .await;
    Ok(Json(outcome))
}
