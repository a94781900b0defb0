//! Subscription access resolution.
//!
//! Everything here is pure: callers load the profile or clinic, pass in `now`, and get back a
//! decision. Nothing is cached, so a decision is recomputed on every read of the record.
//!
//! Two levels exist:
//!
//! - [`AccessResolver::resolve_profile`] produces the soft decision shown as a banner (colour and
//!   remaining days) for an individual subscription. Clinic members always get full access here.
//! - [`resolve_clinic_access`] decides whether a clinic itself is usable. A denied clinic yields a
//!   [`LockReason`], which locks every member out regardless of their own decision.

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::status::{ClinicStatus, SubscriptionStatus, SubscriptionTier};
use crate::types::ClinicId;

/// Days before the end of a period at which the banner turns orange.
pub const WARNING_WINDOW_DAYS: i64 = 7;

/// The subscription fields of a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub status: SubscriptionStatus,
    pub tier: SubscriptionTier,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub clinic_id: Option<ClinicId>,
}

/// The subscription fields of a clinic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicRecord {
    pub status: ClinicStatus,
    pub subscription_end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatusColor {
    Green,
    Orange,
    Red,
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    /// Membership of a clinic grants enterprise access.
    ClinicOverride,
    Lifetime,
    TrialActive,
    SubscriptionActive,
    TrialExpired,
    SubscriptionExpired,
    Inactive,
    PendingApproval,
    NoProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccessDecision {
    pub has_access: bool,
    pub status_color: StatusColor,
    /// Whole days left in the current period, rounded up. `None` when the period never ends.
    pub remaining_days: Option<i64>,
    /// Tier to report to the client. Clinic members are reported as enterprise.
    pub tier: Option<SubscriptionTier>,
    pub reason: AccessReason,
}

/// Hard lock applied to every member of a clinic that cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    PendingApproval,
    Inactive,
    /// Status is active but the end date has passed.
    Expired,
}

impl LockReason {
    pub fn code(self) -> &'static str {
        match self {
            LockReason::PendingApproval => "clinic_pending_approval",
            LockReason::Inactive => "clinic_inactive",
            LockReason::Expired => "clinic_expired",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            LockReason::PendingApproval => "Your clinic is waiting for approval",
            LockReason::Inactive => "Your clinic account is inactive",
            LockReason::Expired => "Your clinic subscription has expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClinicAccess {
    pub has_access: bool,
    pub status_color: StatusColor,
    pub remaining_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_reason: Option<LockReason>,
}

/// Whole days between `now` and `end`, rounded up and never negative.
pub fn remaining_days(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let delta = end - now;
    if delta <= TimeDelta::zero() {
        return 0;
    }
    let whole = delta.num_days();
    if delta - TimeDelta::days(whole) > TimeDelta::zero() {
        whole + 1
    } else {
        whole
    }
}

/// Green above the warning window, orange inside it, red once nothing is left.
pub fn status_color(remaining_days: i64) -> StatusColor {
    if remaining_days > WARNING_WINDOW_DAYS {
        StatusColor::Green
    } else if remaining_days > 0 {
        StatusColor::Orange
    } else {
        StatusColor::Red
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccessResolver {
    legacy_lifetime_sentinel_year: Option<i32>,
}

impl AccessResolver {
    pub fn new(legacy_lifetime_sentinel_year: Option<i32>) -> Self {
        Self {
            legacy_lifetime_sentinel_year,
        }
    }

    pub fn is_lifetime(&self, record: &SubscriptionRecord) -> bool {
        if record.tier == SubscriptionTier::Lifetime {
            return true;
        }
        match (self.legacy_lifetime_sentinel_year, record.subscription_end_date) {
            (Some(year), Some(end)) => end.year() > year,
            _ => false,
        }
    }

    /// Resolve a profile's own access. `None` means the profile could not be found.
    pub fn resolve_profile(&self, record: Option<&SubscriptionRecord>, now: DateTime<Utc>) -> AccessDecision {
        let Some(record) = record else {
            return AccessDecision {
                has_access: false,
                status_color: StatusColor::Red,
                remaining_days: Some(0),
                tier: None,
                reason: AccessReason::NoProfile,
            };
        };

        if record.clinic_id.is_some() {
            return AccessDecision {
                has_access: true,
                status_color: StatusColor::Green,
                remaining_days: None,
                tier: Some(SubscriptionTier::Enterprise),
                reason: AccessReason::ClinicOverride,
            };
        }

        if self.is_lifetime(record) {
            return AccessDecision {
                has_access: true,
                status_color: StatusColor::Green,
                remaining_days: None,
                tier: Some(SubscriptionTier::Lifetime),
                reason: AccessReason::Lifetime,
            };
        }

        let end_date = if record.status == SubscriptionStatus::Trial {
            record.trial_ends_at
        } else {
            record.subscription_end_date
        };
        let remaining = end_date.map(|end| remaining_days(end, now)).unwrap_or(0);

        let paid = record.status.is_paid_period() && record.subscription_end_date.is_some_and(|end| end > now);
        let trial = record.status == SubscriptionStatus::Trial && record.trial_ends_at.is_some_and(|end| end > now);

        let reason = match record.status {
            SubscriptionStatus::Trial if trial => AccessReason::TrialActive,
            SubscriptionStatus::Trial => AccessReason::TrialExpired,
            SubscriptionStatus::Active | SubscriptionStatus::Cancelled if paid => AccessReason::SubscriptionActive,
            SubscriptionStatus::Active | SubscriptionStatus::Cancelled => AccessReason::SubscriptionExpired,
            SubscriptionStatus::Inactive => AccessReason::Inactive,
            SubscriptionStatus::PendingApproval => AccessReason::PendingApproval,
        };

        AccessDecision {
            has_access: paid || trial,
            status_color: status_color(remaining),
            remaining_days: Some(remaining),
            tier: Some(record.tier),
            reason,
        }
    }
}

/// Resolve whether a clinic is usable. Clinics without an end date never expire.
pub fn resolve_clinic_access(clinic: &ClinicRecord, now: DateTime<Utc>) -> ClinicAccess {
    let remaining = clinic.subscription_end_date.map(|end| remaining_days(end, now));

    let lock_reason = match clinic.status {
        ClinicStatus::PendingApproval => Some(LockReason::PendingApproval),
        ClinicStatus::Inactive => Some(LockReason::Inactive),
        ClinicStatus::Active => match clinic.subscription_end_date {
            Some(end) if end <= now => Some(LockReason::Expired),
            _ => None,
        },
    };
    let has_access = lock_reason.is_none();

    // No end date: nothing to count down, so colour follows the lock alone
    let color = match remaining {
        Some(days) => status_color(days),
        None if has_access => StatusColor::Green,
        None => StatusColor::Red,
    };

    ClinicAccess {
        has_access,
        status_color: color,
        remaining_days: remaining,
        lock_reason,
    }
}

/// The combined view used to gate features: a profile's own decision plus, for clinic members,
/// the clinic's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EffectiveAccess {
    pub profile: AccessDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinic: Option<ClinicAccess>,
}

impl EffectiveAccess {
    pub fn has_access(&self) -> bool {
        self.profile.has_access && self.clinic.as_ref().is_none_or(|clinic| clinic.has_access)
    }

    /// Machine-readable code and message for a `402` response, if access is denied.
    pub fn denial(&self) -> Option<(&'static str, &'static str)> {
        if let Some(reason) = self.clinic.as_ref().and_then(|clinic| clinic.lock_reason) {
            return Some((reason.code(), reason.message()));
        }
        if self.profile.has_access {
            return None;
        }
        Some(match self.profile.reason {
            AccessReason::TrialExpired => ("trial_expired", "Your free trial has ended"),
            AccessReason::PendingApproval => ("pending_approval", "Your account is waiting for approval"),
            AccessReason::NoProfile => ("no_profile", "No profile found for this account"),
            AccessReason::Inactive => ("inactive", "Your subscription is inactive"),
            _ => ("subscription_expired", "Your subscription has expired"),
        })
    }
}

/// Combine a profile decision with its clinic's, when the profile belongs to one.
pub fn resolve_effective_access(
    resolver: &AccessResolver,
    record: Option<&SubscriptionRecord>,
    clinic: Option<&ClinicRecord>,
    now: DateTime<Utc>,
) -> EffectiveAccess {
    let profile = resolver.resolve_profile(record, now);
    let clinic = match (record.and_then(|r| r.clinic_id), clinic) {
        (Some(_), Some(clinic)) => Some(resolve_clinic_access(clinic, now)),
        _ => None,
    };
    EffectiveAccess { profile, clinic }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    fn record(status: SubscriptionStatus) -> SubscriptionRecord {
        SubscriptionRecord {
            status,
            tier: SubscriptionTier::Pro,
            trial_ends_at: None,
            subscription_end_date: None,
            clinic_id: None,
        }
    }

    const ALL_STATUSES: [SubscriptionStatus; 5] = [
        SubscriptionStatus::Trial,
        SubscriptionStatus::Active,
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::Inactive,
        SubscriptionStatus::PendingApproval,
    ];

    fn offsets() -> Vec<Option<TimeDelta>> {
        vec![
            None,
            Some(TimeDelta::days(-30)),
            Some(TimeDelta::days(-1)),
            Some(TimeDelta::zero()),
            Some(TimeDelta::seconds(1)),
            Some(TimeDelta::days(7)),
            Some(TimeDelta::days(8)),
            Some(TimeDelta::days(400)),
        ]
    }

    #[test]
    fn test_clinic_override_always_grants_access() {
        let resolver = AccessResolver::default();
        for status in ALL_STATUSES {
            for trial in offsets() {
                for end in offsets() {
                    let mut r = record(status);
                    r.trial_ends_at = trial.map(|d| now() + d);
                    r.subscription_end_date = end.map(|d| now() + d);
                    r.clinic_id = Some(Uuid::new_v4());

                    let decision = resolver.resolve_profile(Some(&r), now());
                    assert!(decision.has_access, "{r:?}");
                    assert_eq!(decision.tier, Some(SubscriptionTier::Enterprise));
                    assert_eq!(decision.remaining_days, None);
                    assert_eq!(decision.reason, AccessReason::ClinicOverride);
                }
            }
        }
    }

    #[test]
    fn test_trial_access_is_strict() {
        let resolver = AccessResolver::default();
        let mut r = record(SubscriptionStatus::Trial);

        r.trial_ends_at = Some(now() + TimeDelta::seconds(1));
        assert!(resolver.resolve_profile(Some(&r), now()).has_access);

        r.trial_ends_at = Some(now());
        let decision = resolver.resolve_profile(Some(&r), now());
        assert!(!decision.has_access);
        assert_eq!(decision.reason, AccessReason::TrialExpired);

        r.trial_ends_at = Some(now() - TimeDelta::hours(1));
        assert!(!resolver.resolve_profile(Some(&r), now()).has_access);
    }

    #[test]
    fn test_trial_ignores_subscription_end_date() {
        let resolver = AccessResolver::default();
        let mut r = record(SubscriptionStatus::Trial);
        r.trial_ends_at = Some(now() - TimeDelta::days(1));
        r.subscription_end_date = Some(now() + TimeDelta::days(30));

        let decision = resolver.resolve_profile(Some(&r), now());
        assert!(!decision.has_access);
        assert_eq!(decision.remaining_days, Some(0));
    }

    #[test]
    fn test_paid_period_access_is_strict() {
        let resolver = AccessResolver::default();
        for status in [SubscriptionStatus::Active, SubscriptionStatus::Cancelled] {
            let mut r = record(status);

            r.subscription_end_date = Some(now() + TimeDelta::milliseconds(1));
            assert!(resolver.resolve_profile(Some(&r), now()).has_access);

            r.subscription_end_date = Some(now());
            assert!(!resolver.resolve_profile(Some(&r), now()).has_access);

            r.subscription_end_date = None;
            let decision = resolver.resolve_profile(Some(&r), now());
            assert!(!decision.has_access);
            assert_eq!(decision.remaining_days, Some(0));
        }
    }

    #[test]
    fn test_inactive_and_pending_never_grant_access() {
        let resolver = AccessResolver::default();
        for status in [SubscriptionStatus::Inactive, SubscriptionStatus::PendingApproval] {
            for end in offsets() {
                let mut r = record(status);
                r.subscription_end_date = end.map(|d| now() + d);
                r.trial_ends_at = end.map(|d| now() + d);
                assert!(!resolver.resolve_profile(Some(&r), now()).has_access);
            }
        }
    }

    #[test]
    fn test_remaining_days_never_negative() {
        let resolver = AccessResolver::default();
        for status in ALL_STATUSES {
            for end in offsets() {
                let mut r = record(status);
                r.trial_ends_at = end.map(|d| now() + d);
                r.subscription_end_date = end.map(|d| now() + d);

                let days = resolver.resolve_profile(Some(&r), now()).remaining_days.unwrap();
                assert!(days >= 0);
                if end.is_none_or(|d| d <= TimeDelta::zero()) {
                    assert_eq!(days, 0);
                }
            }
        }
    }

    #[test]
    fn test_remaining_days_rounds_up() {
        assert_eq!(remaining_days(now() + TimeDelta::seconds(1), now()), 1);
        assert_eq!(remaining_days(now() + TimeDelta::days(1), now()), 1);
        assert_eq!(remaining_days(now() + TimeDelta::days(1) + TimeDelta::seconds(1), now()), 2);
        assert_eq!(remaining_days(now(), now()), 0);
        assert_eq!(remaining_days(now() - TimeDelta::days(3), now()), 0);
    }

    #[test]
    fn test_status_color_boundaries() {
        assert_eq!(status_color(0), StatusColor::Red);
        assert_eq!(status_color(1), StatusColor::Orange);
        assert_eq!(status_color(7), StatusColor::Orange);
        assert_eq!(status_color(8), StatusColor::Green);

        // Exactly one colour per value across the range
        for days in 0..30 {
            let color = status_color(days);
            let expected = if days > 7 {
                StatusColor::Green
            } else if days > 0 {
                StatusColor::Orange
            } else {
                StatusColor::Red
            };
            assert_eq!(color, expected);
        }
    }

    #[test]
    fn test_trial_two_days_left() {
        let mut r = record(SubscriptionStatus::Trial);
        r.trial_ends_at = Some(now() + TimeDelta::days(2));

        let decision = AccessResolver::default().resolve_profile(Some(&r), now());
        assert!(decision.has_access);
        assert_eq!(decision.remaining_days, Some(2));
        assert_eq!(decision.status_color, StatusColor::Orange);
    }

    #[test]
    fn test_active_expired_yesterday() {
        let mut r = record(SubscriptionStatus::Active);
        r.subscription_end_date = Some(now() - TimeDelta::days(1));

        let decision = AccessResolver::default().resolve_profile(Some(&r), now());
        assert!(!decision.has_access);
        assert_eq!(decision.remaining_days, Some(0));
        assert_eq!(decision.status_color, StatusColor::Red);
    }

    #[test]
    fn test_inactive_clinic_member_is_overridden() {
        let mut r = record(SubscriptionStatus::Inactive);
        r.clinic_id = Some(Uuid::new_v4());

        let decision = AccessResolver::default().resolve_profile(Some(&r), now());
        assert!(decision.has_access);
    }

    #[test]
    fn test_missing_profile_is_denied() {
        let decision = AccessResolver::default().resolve_profile(None, now());
        assert!(!decision.has_access);
        assert_eq!(decision.remaining_days, Some(0));
        assert_eq!(decision.status_color, StatusColor::Red);
        assert_eq!(decision.reason, AccessReason::NoProfile);
    }

    #[test]
    fn test_lifetime_tier() {
        let mut r = record(SubscriptionStatus::Inactive);
        r.tier = SubscriptionTier::Lifetime;

        let decision = AccessResolver::default().resolve_profile(Some(&r), now());
        assert!(decision.has_access);
        assert_eq!(decision.remaining_days, None);
        assert_eq!(decision.status_color, StatusColor::Green);
        assert_eq!(decision.reason, AccessReason::Lifetime);
    }

    #[test]
    fn test_legacy_sentinel_only_when_configured() {
        let mut r = record(SubscriptionStatus::Active);
        r.subscription_end_date = Some(Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap());

        let plain = AccessResolver::default().resolve_profile(Some(&r), now());
        assert_eq!(plain.reason, AccessReason::SubscriptionActive);
        assert!(plain.remaining_days.is_some());

        let legacy = AccessResolver::new(Some(2099)).resolve_profile(Some(&r), now());
        assert_eq!(legacy.reason, AccessReason::Lifetime);
        assert_eq!(legacy.remaining_days, None);
    }

    #[test]
    fn test_colour_follows_remaining_days_even_when_denied() {
        let mut r = record(SubscriptionStatus::Inactive);
        r.subscription_end_date = Some(now() + TimeDelta::days(30));

        let decision = AccessResolver::default().resolve_profile(Some(&r), now());
        assert!(!decision.has_access);
        assert_eq!(decision.status_color, StatusColor::Green);
    }

    #[test]
    fn test_clinic_access() {
        let active = ClinicRecord {
            status: ClinicStatus::Active,
            subscription_end_date: None,
        };
        let access = resolve_clinic_access(&active, now());
        assert!(access.has_access);
        assert_eq!(access.remaining_days, None);
        assert_eq!(access.status_color, StatusColor::Green);

        let expiring = ClinicRecord {
            status: ClinicStatus::Active,
            subscription_end_date: Some(now() + TimeDelta::days(3)),
        };
        let access = resolve_clinic_access(&expiring, now());
        assert!(access.has_access);
        assert_eq!(access.remaining_days, Some(3));
        assert_eq!(access.status_color, StatusColor::Orange);

        let expired = ClinicRecord {
            status: ClinicStatus::Active,
            subscription_end_date: Some(now()),
        };
        let access = resolve_clinic_access(&expired, now());
        assert!(!access.has_access);
        assert_eq!(access.lock_reason, Some(LockReason::Expired));

        let pending = ClinicRecord {
            status: ClinicStatus::PendingApproval,
            subscription_end_date: Some(now() + TimeDelta::days(30)),
        };
        let access = resolve_clinic_access(&pending, now());
        assert!(!access.has_access);
        assert_eq!(access.lock_reason, Some(LockReason::PendingApproval));

        let inactive = ClinicRecord {
            status: ClinicStatus::Inactive,
            subscription_end_date: None,
        };
        let access = resolve_clinic_access(&inactive, now());
        assert_eq!(access.lock_reason, Some(LockReason::Inactive));
        assert_eq!(access.status_color, StatusColor::Red);
    }

    #[test]
    fn test_effective_access_applies_clinic_lock() {
        let resolver = AccessResolver::default();
        let mut r = record(SubscriptionStatus::Inactive);
        r.clinic_id = Some(Uuid::new_v4());
        let clinic = ClinicRecord {
            status: ClinicStatus::Inactive,
            subscription_end_date: None,
        };

        let effective = resolve_effective_access(&resolver, Some(&r), Some(&clinic), now());
        assert!(effective.profile.has_access);
        assert!(!effective.has_access());
        assert_eq!(effective.denial().map(|(code, _)| code), Some("clinic_inactive"));
    }

    #[test]
    fn test_effective_access_without_clinic() {
        let resolver = AccessResolver::default();
        let mut r = record(SubscriptionStatus::Trial);
        r.trial_ends_at = Some(now() - TimeDelta::days(1));

        let effective = resolve_effective_access(&resolver, Some(&r), None, now());
        assert!(effective.clinic.is_none());
        assert!(!effective.has_access());
        assert_eq!(effective.denial().map(|(code, _)| code), Some("trial_expired"));

        r.trial_ends_at = Some(now() + TimeDelta::days(10));
        let effective = resolve_effective_access(&resolver, Some(&r), None, now());
        assert!(effective.has_access());
        assert_eq!(effective.denial(), None);
    }
}
