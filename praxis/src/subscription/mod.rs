//! Subscription state, access resolution and the periodic expiry sweep.
//!
//! [`resolver`] is pure. The helpers here load a profile's clinic and feed both into it, for
//! handlers that gate features on the caller's access.

pub mod resolver;
pub mod status;
pub mod sweep;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::{
    db::{
        errors::DbError,
        handlers::{Clinics, Repository},
        models::profiles::ProfileDBResponse,
    },
    errors::Error,
};

pub use resolver::{AccessDecision, AccessResolver, ClinicAccess, EffectiveAccess, resolve_clinic_access, resolve_effective_access};

/// Effective access for `profile` at `now`, including its clinic's lock if it has one.
pub async fn load_effective_access(
    conn: &mut PgConnection,
    resolver: &AccessResolver,
    profile: &ProfileDBResponse,
    now: DateTime<Utc>,
) -> Result<EffectiveAccess, DbError> {
    let clinic = match profile.clinic_id {
        Some(clinic_id) => Clinics::new(conn).get_by_id(clinic_id).await?.map(|c| c.subscription()),
        None => None,
    };
    let record = profile.subscription();
    Ok(resolve_effective_access(resolver, Some(&record), clinic.as_ref(), now))
}

/// `Err(SubscriptionRequired)` unless `profile` may use gated features right now.
pub async fn require_access(conn: &mut PgConnection, resolver: &AccessResolver, profile: &ProfileDBResponse) -> Result<(), Error> {
    let access = load_effective_access(conn, resolver, profile, Utc::now()).await?;
    match access.denial() {
        None => Ok(()),
        Some((code, message)) => Err(Error::SubscriptionRequired {
            code: code.to_string(),
            message: message.to_string(),
        }),
    }
}
