//! OpenAPI document for the management and public booking APIs.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::{api, notifications, subscription, voice};

/// The identity proxy header used by every management endpoint.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "X-Praxis-User".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-praxis-user",
                    "Email address of the signed-in user, set by the identity proxy in front of this service.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Praxis API", description = "Subscription-gated backend for medical practices."),
    servers(
        (url = "/admin/api/v1", description = "Management API"),
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::profiles::list_profiles,
        api::handlers::profiles::get_profile,
        api::handlers::profiles::get_profile_access,
        api::handlers::profiles::update_profile_subscription,
        api::handlers::clinics::list_clinics,
        api::handlers::clinics::create_clinic,
        api::handlers::clinics::get_clinic,
        api::handlers::clinics::update_clinic,
        api::handlers::clinics::get_clinic_access,
        api::handlers::clinics::update_clinic_subscription,
        api::handlers::appointments::list_appointments,
        api::handlers::appointments::update_appointment,
        api::handlers::appointments::book_appointment,
        api::handlers::notifications::list_notification_settings,
        api::handlers::notifications::update_notification_settings,
        api::handlers::notifications::get_smtp_settings,
        api::handlers::notifications::update_smtp_settings,
        api::handlers::notifications::test_smtp_settings,
        api::handlers::notifications::send_test_notification,
        api::handlers::voice::request_recording,
        api::handlers::voice::current_recording,
        api::handlers::voice::release_recording,
        api::handlers::subscriptions::trigger_expiry_sweep,
    ),
    components(
        schemas(
            api::models::profiles::Role,
            api::models::profiles::CurrentUser,
            api::models::profiles::ProfileResponse,
            api::models::profiles::ProfileAccessResponse,
            api::models::profiles::SubscriptionUpdate,
            api::models::clinics::ClinicCreate,
            api::models::clinics::ClinicUpdate,
            api::models::clinics::ClinicSubscriptionUpdate,
            api::models::clinics::ClinicResponse,
            api::models::clinics::ClinicAccessResponse,
            api::models::appointments::PublicBookingRequest,
            api::models::appointments::PublicBookingResponse,
            api::models::appointments::AppointmentUpdate,
            api::models::appointments::AppointmentResponse,
            api::models::notifications::NotificationSettingResponse,
            api::models::notifications::NotificationSettingUpdate,
            api::models::notifications::SmtpSettingsResponse,
            api::models::notifications::SmtpSettingsUpdate,
            api::models::notifications::SmtpTestRequest,
            api::models::notifications::SmtpTestResponse,
            api::models::notifications::TestNotificationRequest,
            api::models::voice::RecordingRequest,
            api::models::voice::RecordingResponse,
            api::models::voice::ReleaseResponse,
            notifications::ChannelOutcome,
            notifications::DispatchOutcome,
            subscription::AccessDecision,
            subscription::ClinicAccess,
            subscription::EffectiveAccess,
            subscription::sweep::SweepReport,
            voice::ActiveRecording,
            voice::ContentionPolicy,
        )
    ),
    tags(
        (name = "profiles", description = "Doctors, staff and administrators, and their subscription state."),
        (name = "clinics", description = "Clinic accounts. New clinics wait for platform approval."),
        (name = "appointments", description = "Doctor calendars. Listing and changes require an active subscription."),
        (name = "public", description = "Unauthenticated endpoints for patients. Served at the root, outside `/admin/api/v1`."),
        (name = "notifications", description = "Email and SMS notification settings. Platform admins only."),
        (name = "voice", description = "Microphone arbitration between a user's dictation widgets."),
        (name = "subscriptions", description = "Subscription maintenance."),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_security_scheme_and_paths() {
        let doc = ApiDoc::openapi();
        let components = doc.components.as_ref().unwrap();
        assert!(components.security_schemes.contains_key("X-Praxis-User"));
        assert!(doc.paths.paths.contains_key("/profiles/{profile_id}"));
        assert!(doc.paths.paths.contains_key("/public/appointments"));
        assert!(components.schemas.contains_key("SweepReport"));
    }

    #[test]
    fn test_list_queries_describe_ids_as_uuids() {
        use utoipa::PartialSchema;

        let profiles = serde_json::to_string(&api::models::profiles::ListProfilesQuery::schema()).unwrap();
        assert!(profiles.contains("\"clinic_id\""));
        assert!(profiles.contains("\"uuid\""));

        let appointments = serde_json::to_string(&api::models::appointments::ListAppointmentsQuery::schema()).unwrap();
        assert!(appointments.contains("\"doctor_id\""));
        assert!(appointments.contains("\"uuid\""));
    }
}
