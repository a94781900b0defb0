//! Test utilities for integration testing.

use crate::api::models::profiles::Role;
use crate::config::{
    BackgroundServicesConfig, Config, DatabaseConfig, EmailConfig, EmailTransportConfig, ExpirySweepConfig, LeaderElectionConfig,
    PoolSettings,
};
use crate::db::{
    handlers::{Profiles, Repository},
    models::profiles::{ProfileCreateDBRequest, ProfileDBResponse},
};
use crate::subscription::status::{SubscriptionStatus, SubscriptionTier};
use axum_test::TestServer;
use chrono::{TimeDelta, Utc};
use sqlx::PgPool;
use std::sync::Once;
use uuid::Uuid;

static CRYPTO_PROVIDER: Once = Once::new();

/// Install the rustls crypto provider once per test binary (main.rs does this in production).
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

pub async fn create_test_app(pool: PgPool, config: Config) -> (TestServer, crate::BackgroundServices) {
    install_crypto_provider();

    let app = crate::Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application");

    app.into_test_server()
}

pub fn create_test_config() -> Config {
    // Each config gets its own mail directory so tests can count the messages they sent
    let email_dir = std::env::temp_dir().join(format!("praxis-test-emails-{}", Uuid::new_v4()));

    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig {
            // Will get overriden by the sqlx::test pool
            url: "Something".to_string(),
            pool: PoolSettings {
                max_connections: 1,
                min_connections: 0,
                ..Default::default()
            },
        },
        admin_email: "admin@test.com".to_string(),
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: email_dir.to_string_lossy().to_string(),
            },
            from_email: "noreply@test.com".to_string(),
            from_name: "Praxis Test".to_string(),
            reply_to: None,
        },
        background_services: BackgroundServicesConfig {
            expiry_sweep: ExpirySweepConfig {
                enabled: false,
                ..Default::default()
            },
            leader_election: LeaderElectionConfig { enabled: false },
        },
        ..Default::default()
    }
}

/// Insert a profile with a unique email.
///
/// Platform admins get an active lifetime plan; everyone else starts a 14 day trial.
pub async fn create_test_profile(pool: &PgPool, role: Role) -> ProfileDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let email = format!("{}-{}@example.org", role_slug(role), Uuid::new_v4().simple());

    let request = match role {
        Role::PlatformAdmin => ProfileCreateDBRequest {
            email,
            full_name: Some("Test Admin".to_string()),
            phone: None,
            role,
            subscription_status: SubscriptionStatus::Active,
            tier: SubscriptionTier::Lifetime,
            trial_ends_at: None,
            subscription_end_date: None,
            clinic_id: None,
        },
        _ => ProfileCreateDBRequest {
            full_name: Some("Test User".to_string()),
            role,
            ..ProfileCreateDBRequest::trial_doctor(email, Utc::now() + TimeDelta::days(14))
        },
    };

    Profiles::new(&mut conn).create(&request).await.expect("Failed to create test profile")
}

/// Identity proxy header for `profile`, as `(name, value)`.
pub fn auth_header(config: &Config, profile: &ProfileDBResponse) -> (String, String) {
    (config.auth.proxy_header.header_name.clone(), profile.email.clone())
}

fn role_slug(role: Role) -> &'static str {
    match role {
        Role::PlatformAdmin => "admin",
        Role::ClinicAdmin => "clinic-admin",
        Role::Doctor => "doctor",
        Role::Assistant => "assistant",
    }
}
