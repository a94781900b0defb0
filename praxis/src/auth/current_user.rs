use crate::{
    AppState,
    api::models::profiles::CurrentUser,
    db::{
        errors::DbError,
        handlers::{Profiles, Repository},
        models::profiles::ProfileCreateDBRequest,
    },
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info, instrument, trace};

/// Extract the profile from the identity proxy header if present.
/// Returns:
/// - None: No proxy header present
/// - Some(Ok(user)): Header present and profile found (or created)
/// - Some(Err(error)): Header present but the profile is unknown or the lookup failed
#[instrument(skip(parts, config, db))]
async fn try_proxy_header_auth(parts: &Parts, config: &crate::config::Config, db: &PgPool) -> Option<Result<CurrentUser>> {
    let email = parts
        .headers
        .get(&config.auth.proxy_header.header_name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|email| !email.is_empty())?;

    let mut conn = match db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(DbError::from(e).into())),
    };
    let mut profiles = Profiles::new(&mut conn);

    match profiles.get_by_email(email).await {
        Ok(Some(profile)) => Some(Ok(profile.into())),
        Ok(None) if config.auth.proxy_header.auto_create_profiles => {
            let trial_period = chrono::Duration::from_std(config.subscription.default_trial_period).unwrap_or(chrono::Duration::days(14));
            let request = ProfileCreateDBRequest::trial_doctor(email.to_string(), Utc::now() + trial_period);
            match profiles.create(&request).await {
                Ok(profile) => {
                    info!(profile_id = %profile.id, "Created trial profile for new proxy-header user");
                    metrics::counter!("praxis_profiles_auto_created_total").increment(1);
                    Some(Ok(profile.into()))
                }
                // A concurrent request may have created it first
                Err(DbError::UniqueViolation { .. }) => match profiles.get_by_email(email).await {
                    Ok(Some(profile)) => Some(Ok(profile.into())),
                    Ok(None) => Some(Err(Error::Unauthenticated { message: None })),
                    Err(e) => Some(Err(e.into())),
                },
                Err(e) => Some(Err(e.into())),
            }
        }
        Ok(None) => Some(Err(Error::Unauthenticated {
            message: Some("No profile exists for this account".to_string()),
        })),
        Err(e) => Some(Err(e.into())),
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_proxy_header_auth(parts, &state.config, &state.db).await {
            Some(Ok(user)) => {
                debug!("Found proxy header authenticated user: {}", user.id);
                Ok(user)
            }
            Some(Err(e)) => {
                trace!("Proxy header authentication failed: {:?}", e);
                Err(e)
            }
            None => {
                trace!("No identity header present");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}
