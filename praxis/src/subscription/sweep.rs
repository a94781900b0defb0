//! Periodic subscription expiry sweep.
//!
//! Deactivates lapsed individual subscriptions and clinics, and warns profiles whose period
//! ends within [`WARNING_WINDOW_DAYS`]. Each period is warned once: the profile is stamped with
//! `expiry_warning_sent_at`, which is cleared whenever its dates change.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

use super::{
    resolver::{WARNING_WINDOW_DAYS, remaining_days},
    status::SubscriptionStatus,
};
use crate::{
    db::{
        errors::DbError,
        handlers::{Clinics, Profiles},
    },
    errors::Error,
    notifications::{NotificationDispatcher, NotificationPayload, Recipient},
};

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SweepReport {
    pub profiles_expired: usize,
    pub clinics_expired: usize,
    pub warnings_sent: usize,
    /// Notifications where at least one channel failed. They are not retried.
    pub notification_failures: usize,
}

#[instrument(skip_all, err)]
pub async fn run_expiry_sweep(pool: &PgPool, dispatcher: &NotificationDispatcher, now: DateTime<Utc>) -> Result<SweepReport, Error> {
    let mut conn = pool.acquire().await.map_err(DbError::from)?;
    let mut report = SweepReport::default();

    let expired = Profiles::new(&mut conn).expire_lapsed(now).await?;
    report.profiles_expired = expired.len();
    for lapsed in &expired {
        let trial = lapsed.previous_status == SubscriptionStatus::Trial;
        let ended_at = if trial {
            lapsed.profile.trial_ends_at
        } else {
            lapsed.profile.subscription_end_date
        };
        let outcome = dispatcher
            .dispatch(
                &Recipient::from(&lapsed.profile),
                &NotificationPayload::SubscriptionExpired { ended_at, trial },
            )
            .await;
        if outcome.any_failed() {
            report.notification_failures += 1;
        }
    }

    report.clinics_expired = Clinics::new(&mut conn).expire_lapsed(now).await?.len();

    let until = now + TimeDelta::days(WARNING_WINDOW_DAYS);
    let expiring = Profiles::new(&mut conn).list_expiring_unwarned(now, until).await?;
    for profile in &expiring {
        let Some(ends_at) = profile.current_period_end() else {
            continue;
        };
        let outcome = dispatcher
            .dispatch(
                &Recipient::from(profile),
                &NotificationPayload::SubscriptionExpiring {
                    ends_at,
                    remaining_days: remaining_days(ends_at, now),
                    trial: profile.subscription_status == SubscriptionStatus::Trial,
                },
            )
            .await;
        if outcome.any_failed() {
            report.notification_failures += 1;
        }
        Profiles::new(&mut conn).mark_expiry_warned(profile.id, now).await?;
        report.warnings_sent += 1;
    }

    Ok(report)
}

/// Run [`run_expiry_sweep`] every `interval` while this replica is leader, until `shutdown`.
pub async fn run_expiry_sweeper(
    pool: PgPool,
    dispatcher: NotificationDispatcher,
    interval: Duration,
    is_leader: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    info!(interval = ?interval, "Starting subscription expiry sweeper");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => {
                info!("Subscription expiry sweeper shutting down");
                return;
            }
        }

        if !is_leader.load(Ordering::Relaxed) {
            debug!("Not leader, skipping expiry sweep");
            continue;
        }

        match run_expiry_sweep(&pool, &dispatcher, Utc::now()).await {
            Ok(report) => {
                metrics::counter!("praxis_subscriptions_expired_total").increment((report.profiles_expired + report.clinics_expired) as u64);
                info!(
                    profiles_expired = report.profiles_expired,
                    clinics_expired = report.clinics_expired,
                    warnings_sent = report.warnings_sent,
                    notification_failures = report.notification_failures,
                    "Expiry sweep finished"
                );
            }
            Err(e) => error!(error = %e, "Expiry sweep failed"),
        }
    }
}
