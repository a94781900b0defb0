use crate::api::models::appointments::{
    AppointmentResponse, AppointmentUpdate, ListAppointmentsQuery, PublicBookingRequest, PublicBookingResponse,
};
use crate::api::models::profiles::{CurrentUser, Role};
use crate::auth::permissions::{has_permission, owns_profile, require};
use crate::config::BookingConfig;
use crate::db::handlers::{Appointments, Profiles, Repository, appointments::AppointmentFilter};
use crate::db::models::appointments::{AppointmentCreateDBRequest, AppointmentSource, AppointmentStatus, AppointmentUpdateDBRequest};
use crate::db::models::profiles::ProfileDBResponse;
use crate::errors::{Error, Result};
use crate::notifications::{NotificationPayload, Recipient};
use crate::subscription::{load_effective_access, require_access};
use crate::types::{AppointmentId, Operation, ProfileId, Resource, abbrev_uuid};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgConnection;
use tracing::{info, warn};

/// Appointment lengths accepted from any caller.
const DURATION_RANGE: std::ops::RangeInclusive<i32> = 5..=240;

const PHONE_LENGTH: std::ops::RangeInclusive<usize> = 7..=20;

fn bad_request(message: impl Into<String>) -> Error {
    Error::BadRequest { message: message.into() }
}

fn check_duration(minutes: i32) -> Result<()> {
    if !DURATION_RANGE.contains(&minutes) {
        return Err(bad_request(format!(
            "Duration must be between {} and {} minutes",
            DURATION_RANGE.start(),
            DURATION_RANGE.end()
        )));
    }
    Ok(())
}

/// Check a public booking against the booking rules and return its duration in minutes.
pub fn validate_booking(request: &PublicBookingRequest, rules: &BookingConfig, now: DateTime<Utc>) -> Result<i32> {
    if request.patient_name.trim().is_empty() {
        return Err(bad_request("Patient name is required"));
    }

    let phone = request.patient_phone.trim();
    let phone_chars_ok = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'));
    if !PHONE_LENGTH.contains(&phone.len()) || !phone_chars_ok || !phone.chars().any(|c| c.is_ascii_digit()) {
        return Err(bad_request("Patient phone number is invalid"));
    }

    if let Some(email) = request.patient_email.as_deref().map(str::trim)
        && !email.is_empty()
        && !email.contains('@')
    {
        return Err(bad_request("Patient email address is invalid"));
    }

    let min_lead = TimeDelta::from_std(rules.min_lead_time).unwrap_or(TimeDelta::zero());
    if request.scheduled_at < now + min_lead {
        return Err(bad_request("Appointment is too soon"));
    }
    if request.scheduled_at > now + TimeDelta::days(i64::from(rules.max_days_ahead)) {
        return Err(bad_request(format!(
            "Appointments can be booked at most {} days ahead",
            rules.max_days_ahead
        )));
    }

    let duration = request.duration_minutes.unwrap_or(rules.default_duration_minutes);
    check_duration(duration)?;
    Ok(duration)
}

async fn find_profile(conn: &mut PgConnection, id: ProfileId) -> Result<ProfileDBResponse> {
    Profiles::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Profile".to_string(),
        id: id.to_string(),
    })
}

/// Gate practice features on the caller's own subscription. Platform admins are never gated.
async fn require_caller_access(state: &AppState, conn: &mut PgConnection, user: &CurrentUser) -> Result<()> {
    if user.role == Role::PlatformAdmin {
        return Ok(());
    }
    let profile = find_profile(&mut *conn, user.id).await?;
    require_access(conn, &state.resolver, &profile).await
}

#[utoipa::path(
    get,
    path = "/appointments",
    tag = "appointments",
    summary = "List appointments",
    description = "Lists a doctor's calendar, defaulting to the caller's own. Requires an active subscription.",
    params(ListAppointmentsQuery),
    responses(
        (status = 200, description = "Appointments ordered by start time", body = Vec<AppointmentResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Subscription required"),
        (status = 403, description = "Forbidden"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_appointments(
    State(state): State<AppState>,
    Query(query): Query<ListAppointmentsQuery>,
    current_user: CurrentUser,
) -> Result<Json<Vec<AppointmentResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    require_caller_access(&state, &mut conn, &current_user).await?;

    let doctor_id = match query.doctor_id {
        Some(id) if id != current_user.id => {
            let doctor = find_profile(&mut conn, id).await?;
            require(
                &current_user,
                Resource::Appointments,
                Operation::ReadAll,
                Operation::ReadOwn,
                owns_profile(&current_user, &doctor),
                "appointments",
            )?;
            Some(id)
        }
        Some(id) => Some(id),
        // Admins see every calendar when no doctor is named
        None if has_permission(&current_user, Resource::Appointments, Operation::ReadAll) => None,
        None => Some(current_user.id),
    };

    let (skip, limit) = query.pagination.params();
    let filter = AppointmentFilter {
        doctor_id,
        status: query.status,
        from: query.from,
        until: query.until,
        ..AppointmentFilter::new(skip, limit)
    };
    let appointments = Appointments::new(&mut conn).list(&filter).await?;
    Ok(Json(appointments.into_iter().map(AppointmentResponse::from).collect()))
}

#[utoipa::path(
    patch,
    path = "/appointments/{appointment_id}",
    tag = "appointments",
    summary = "Update appointment",
    description = "Confirm, cancel, complete or reschedule an appointment.",
    request_body = AppointmentUpdate,
    params(("appointment_id" = uuid::Uuid, Path, description = "Appointment ID")),
    responses(
        (status = 200, description = "Updated appointment", body = AppointmentResponse),
        (status = 400, description = "Invalid duration"),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Subscription required"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Appointment not found"),
        (status = 409, description = "Overlaps another appointment"),
    ),
    security(("X-Praxis-User" = []))
)]
#[tracing::instrument(skip_all, fields(appointment_id = %abbrev_uuid(&appointment_id)))]
pub async fn update_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<AppointmentId>,
    current_user: CurrentUser,
    Json(update): Json<AppointmentUpdate>,
) -> Result<Json<AppointmentResponse>> {
    if let Some(minutes) = update.duration_minutes {
        check_duration(minutes)?;
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    require_caller_access(&state, &mut tx, &current_user).await?;

    let existing = Appointments::new(&mut tx).get_by_id(appointment_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Appointment".to_string(),
        id: appointment_id.to_string(),
    })?;
    let doctor = find_profile(&mut tx, existing.doctor_id).await?;
    require(
        &current_user,
        Resource::Appointments,
        Operation::UpdateAll,
        Operation::UpdateOwn,
        owns_profile(&current_user, &doctor),
        "appointment",
    )?;

    let status = update.status.unwrap_or(existing.status);
    let scheduled_at = update.scheduled_at.unwrap_or(existing.scheduled_at);
    let duration = update.duration_minutes.unwrap_or(existing.duration_minutes);
    let moved = scheduled_at != existing.scheduled_at || duration != existing.duration_minutes;
    let reactivated = existing.status == AppointmentStatus::Cancelled && status != AppointmentStatus::Cancelled;

    if status != AppointmentStatus::Cancelled && (moved || reactivated) {
        Profiles::new(&mut tx).lock(doctor.id).await?;
        if Appointments::new(&mut tx)
            .has_overlap(doctor.id, scheduled_at, duration, Some(appointment_id))
            .await?
        {
            return Err(Error::Conflict {
                message: "The doctor already has an appointment at this time".to_string(),
            });
        }
    }

    let appointment = Appointments::new(&mut tx)
        .update(
            appointment_id,
            &AppointmentUpdateDBRequest {
                status: update.status,
                scheduled_at: update.scheduled_at,
                duration_minutes: update.duration_minutes,
            },
        )
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(AppointmentResponse::from(appointment)))
}

#[utoipa::path(
    post,
    path = "/public/appointments",
    tag = "public",
    summary = "Book an appointment",
    description = "Unauthenticated booking from a doctor's public page. The doctor is notified once the booking is stored.",
    request_body = PublicBookingRequest,
    responses(
        (status = 201, description = "Appointment requested", body = PublicBookingResponse),
        (status = 400, description = "Invalid booking"),
        (status = 404, description = "Doctor not found"),
        (status = 409, description = "Doctor unavailable or time slot taken"),
    )
)]
#[tracing::instrument(skip_all, fields(doctor_id = %abbrev_uuid(&request.doctor_id)))]
pub async fn book_appointment(
    State(state): State<AppState>,
    Json(request): Json<PublicBookingRequest>,
) -> Result<(StatusCode, Json<PublicBookingResponse>)> {
    let now = Utc::now();
    let duration = validate_booking(&request, &state.config.booking, now)?;
    let doctor_not_found = || Error::NotFound {
        resource: "Doctor".to_string(),
        id: request.doctor_id.to_string(),
    };

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    // Serializes concurrent bookings for the same doctor
    if !Profiles::new(&mut tx).lock(request.doctor_id).await? {
        return Err(doctor_not_found());
    }
    let doctor = find_profile(&mut tx, request.doctor_id).await?;
    if doctor.role != Role::Doctor {
        return Err(doctor_not_found());
    }

    let access = load_effective_access(&mut tx, &state.resolver, &doctor, now).await?;
    if !access.has_access() {
        return Err(Error::Conflict {
            message: "This doctor is not accepting bookings".to_string(),
        });
    }

    if Appointments::new(&mut tx)
        .has_overlap(doctor.id, request.scheduled_at, duration, None)
        .await?
    {
        return Err(Error::Conflict {
            message: "This time slot is no longer available".to_string(),
        });
    }

    let optional = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let appointment = Appointments::new(&mut tx)
        .create(&AppointmentCreateDBRequest {
            doctor_id: doctor.id,
            patient_name: request.patient_name.trim().to_string(),
            patient_phone: request.patient_phone.trim().to_string(),
            patient_email: optional(request.patient_email.clone()),
            scheduled_at: request.scheduled_at,
            duration_minutes: duration,
            reason: optional(request.reason.clone()),
            status: AppointmentStatus::Pending,
            source: AppointmentSource::PublicBooking,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    metrics::counter!("praxis_public_bookings_total").increment(1);
    info!(appointment_id = %abbrev_uuid(&appointment.id), "Public booking stored");

    let outcome = state
        .dispatcher
        .dispatch(
            &Recipient::from(&doctor),
            &NotificationPayload::AppointmentBooked {
                patient_name: appointment.patient_name.clone(),
                scheduled_at: appointment.scheduled_at,
                duration_minutes: appointment.duration_minutes,
                reason: appointment.reason.clone(),
            },
        )
        .await;
    if outcome.any_failed() {
        warn!(?outcome, "Booking notification failed");
    }

    Ok((
        StatusCode::CREATED,
        Json(PublicBookingResponse {
            appointment_id: appointment.id,
            scheduled_at: appointment.scheduled_at,
            duration_minutes: appointment.duration_minutes,
            status: appointment.status,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailTransportConfig;
    use crate::db::models::profiles::SubscriptionUpdateDBRequest;
    use crate::subscription::status::SubscriptionStatus;
    use crate::test_utils::{auth_header, create_test_app, create_test_config, create_test_profile};
    use serde_json::json;
    use sqlx::PgPool;
    use uuid::Uuid;

    fn booking(scheduled_at: DateTime<Utc>) -> PublicBookingRequest {
        PublicBookingRequest {
            doctor_id: Uuid::new_v4(),
            patient_name: "Ana Ruiz".to_string(),
            patient_phone: "+34 (600) 123-456".to_string(),
            patient_email: Some("ana@example.org".to_string()),
            scheduled_at,
            duration_minutes: None,
            reason: None,
        }
    }

    #[test]
    fn test_validate_booking_defaults_duration() {
        let now = Utc::now();
        let rules = BookingConfig::default();
        let duration = validate_booking(&booking(now + TimeDelta::days(2)), &rules, now).unwrap();
        assert_eq!(duration, rules.default_duration_minutes);
    }

    #[test]
    fn test_validate_booking_rejections() {
        let now = Utc::now();
        let rules = BookingConfig::default();
        let valid = booking(now + TimeDelta::days(2));

        let cases = [
            PublicBookingRequest {
                patient_name: "  ".to_string(),
                ..valid.clone()
            },
            PublicBookingRequest {
                patient_phone: "12345".to_string(),
                ..valid.clone()
            },
            PublicBookingRequest {
                patient_phone: "call me maybe".to_string(),
                ..valid.clone()
            },
            PublicBookingRequest {
                patient_email: Some("not-an-email".to_string()),
                ..valid.clone()
            },
            PublicBookingRequest {
                scheduled_at: now + TimeDelta::minutes(5),
                ..valid.clone()
            },
            PublicBookingRequest {
                scheduled_at: now - TimeDelta::days(1),
                ..valid.clone()
            },
            PublicBookingRequest {
                scheduled_at: now + TimeDelta::days(i64::from(rules.max_days_ahead) + 1),
                ..valid.clone()
            },
            PublicBookingRequest {
                duration_minutes: Some(4),
                ..valid.clone()
            },
            PublicBookingRequest {
                duration_minutes: Some(241),
                ..valid.clone()
            },
        ];

        for case in cases {
            let result = validate_booking(&case, &rules, now);
            assert!(matches!(result, Err(Error::BadRequest { .. })), "accepted {case:?}");
        }

        // An empty email is treated as absent
        let blank_email = PublicBookingRequest {
            patient_email: Some(String::new()),
            ..valid
        };
        assert!(validate_booking(&blank_email, &rules, now).is_ok());
    }

    fn outbox_count(config: &crate::config::Config) -> usize {
        let EmailTransportConfig::File { path } = &config.email.transport else {
            panic!("expected file transport");
        };
        std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_public_booking_and_overlap(pool: PgPool) {
        let doctor = create_test_profile(&pool, Role::Doctor).await;
        let config = create_test_config();
        let (server, _bg) = create_test_app(pool.clone(), config.clone()).await;

        let start = Utc::now() + TimeDelta::days(3);
        let body = json!({
            "doctor_id": doctor.id,
            "patient_name": "Ana Ruiz",
            "patient_phone": "+34 600 123 456",
            "scheduled_at": start,
            "duration_minutes": 30,
        });

        let response = server.post("/public/appointments").json(&body).await;
        response.assert_status(StatusCode::CREATED);
        let booked: PublicBookingResponse = response.json();
        assert_eq!(booked.status, AppointmentStatus::Pending);
        assert_eq!(booked.duration_minutes, 30);

        // The doctor was emailed
        assert_eq!(outbox_count(&config), 1);

        // Overlapping slot
        let overlapping = json!({
            "doctor_id": doctor.id,
            "patient_name": "Ben",
            "patient_phone": "600123456",
            "scheduled_at": start + TimeDelta::minutes(15),
        });
        let response = server.post("/public/appointments").json(&overlapping).await;
        response.assert_status(StatusCode::CONFLICT);

        // Adjacent slot is fine
        let adjacent = json!({
            "doctor_id": doctor.id,
            "patient_name": "Ben",
            "patient_phone": "600123456",
            "scheduled_at": start + TimeDelta::minutes(30),
        });
        let response = server.post("/public/appointments").json(&adjacent).await;
        response.assert_status(StatusCode::CREATED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_public_booking_rejects_unavailable_doctors(pool: PgPool) {
        let doctor = create_test_profile(&pool, Role::Doctor).await;
        let assistant = create_test_profile(&pool, Role::Assistant).await;
        let (server, _bg) = create_test_app(pool.clone(), create_test_config()).await;
        let start = Utc::now() + TimeDelta::days(3);

        let body = |doctor_id: Uuid| {
            json!({
                "doctor_id": doctor_id,
                "patient_name": "Ana",
                "patient_phone": "600123456",
                "scheduled_at": start,
            })
        };

        server
            .post("/public/appointments")
            .json(&body(Uuid::new_v4()))
            .await
            .assert_status_not_found();
        server
            .post("/public/appointments")
            .json(&body(assistant.id))
            .await
            .assert_status_not_found();

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
            .post("/public/appointments")
            .json(&body(doctor.id))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_doctor_manages_own_calendar(pool: PgPool) {
        let doctor = create_test_profile(&pool, Role::Doctor).await;
        let other = create_test_profile(&pool, Role::Doctor).await;
        let config = create_test_config();
        let (name, value) = auth_header(&config, &doctor);
        let (other_name, other_value) = auth_header(&config, &other);
        let (server, _bg) = create_test_app(pool.clone(), config).await;

        let start = Utc::now() + TimeDelta::days(3);
        let mut ids = Vec::new();
        for offset in [0, 60] {
            let booked: PublicBookingResponse = server
                .post("/public/appointments")
                .json(&json!({
                    "doctor_id": doctor.id,
                    "patient_name": "Ana",
                    "patient_phone": "600123456",
                    "scheduled_at": start + TimeDelta::minutes(offset),
                }))
                .await
                .json();
            ids.push(booked.appointment_id);
        }

        let listed: Vec<AppointmentResponse> = server
            .get("/admin/api/v1/appointments")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(listed.len(), 2);

        // Someone else's calendar
        server
            .get(&format!("/admin/api/v1/appointments?doctor_id={}", doctor.id))
            .add_header(other_name.clone(), other_value.clone())
            .await
            .assert_status_forbidden();
        server
            .patch(&format!("/admin/api/v1/appointments/{}", ids[0]))
            .add_header(other_name, other_value)
            .json(&json!({ "status": "confirmed" }))
            .await
            .assert_status_forbidden();

        let response = server
            .patch(&format!("/admin/api/v1/appointments/{}", ids[0]))
            .add_header(name.clone(), value.clone())
            .json(&json!({ "status": "confirmed" }))
            .await;
        response.assert_status_ok();
        let confirmed: AppointmentResponse = response.json();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

        // Stretching into the next appointment
        server
            .patch(&format!("/admin/api/v1/appointments/{}", ids[0]))
            .add_header(name.clone(), value.clone())
            .json(&json!({ "duration_minutes": 90 }))
            .await
            .assert_status(StatusCode::CONFLICT);

        server
            .patch(&format!("/admin/api/v1/appointments/{}", ids[0]))
            .add_header(name, value)
            .json(&json!({ "duration_minutes": 300 }))
            .await
            .assert_status_bad_request();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_listing_requires_active_subscription(pool: PgPool) {
        let doctor = create_test_profile(&pool, Role::Doctor).await;
        let config = create_test_config();
        let (name, value) = auth_header(&config, &doctor);
        let (server, _bg) = create_test_app(pool.clone(), config).await;

        let mut conn = pool.acquire().await.unwrap();
        Profiles::new(&mut conn)
            .update_subscription(
                doctor.id,
                &SubscriptionUpdateDBRequest {
                    trial_ends_at: Some(Some(Utc::now() - TimeDelta::hours(1))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let response = server.get("/admin/api/v1/appointments").add_header(name, value).await;
        response.assert_status(StatusCode::PAYMENT_REQUIRED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["code"], "trial_expired");
    }
}
