//! # praxis: backend for subscription-gated medical practices
//!
//! `praxis` serves the management API behind a practice dashboard: doctors, assistants and clinic
//! administrators sign in through an identity proxy, and every practice feature is gated on the
//! caller's subscription. Individual doctors run on a trial or a paid plan; members of a clinic
//! inherit the clinic's plan, and a clinic that is pending approval, inactive or expired locks
//! out all of its members.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); all state lives in PostgreSQL.
//!
//! - The **API layer** ([`api`]) exposes the management API at `/admin/api/v1/*` and an
//!   unauthenticated booking endpoint at `/public/appointments`.
//! - The **authentication layer** ([`auth`]) resolves the identity proxy header to a profile and
//!   checks role permissions.
//! - The **subscription layer** ([`subscription`]) turns a profile and its clinic into an access
//!   decision, and runs the periodic expiry sweep.
//! - **Notifications** ([`notifications`]) go out by email (SMTP or file transport) and SMS,
//!   gated per event by the `notifications_config` table.
//! - **Voice** ([`voice`]) arbitrates the microphone between a user's dictation widgets.
//! - The **database layer** ([`db`]) is a set of repositories over `&mut PgConnection`.
//!
//! Background services run next to the server: leader election over a PostgreSQL advisory lock,
//! and the expiry sweep on the elected leader.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use praxis::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = praxis::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     praxis::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
pub mod api;
pub mod auth;
pub mod config;
mod crypto;
pub mod db;
pub mod errors;
mod leader_election;
pub mod notifications;
mod openapi;
pub mod subscription;
pub mod telemetry;
pub mod types;
pub mod voice;

#[cfg(test)]
pub mod test_utils;

use crate::{
    api::models::profiles::Role,
    config::CorsOrigin,
    crypto::SecretCipher,
    db::{
        errors::DbError,
        handlers::{Profiles, Repository},
        models::profiles::ProfileCreateDBRequest,
    },
    notifications::NotificationDispatcher,
    openapi::ApiDoc,
    subscription::{
        AccessResolver,
        status::{SubscriptionStatus, SubscriptionTier},
    },
    types::ProfileId,
    voice::RecordingRegistry,
};
use axum::http::HeaderValue;
use axum::{
    Router, http,
    routing::{delete, get, patch, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// How often a follower retries the leader lock, and the leader checks its session.
const LEADER_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .resolver(resolver)
///     .recordings(recordings)
///     .dispatcher(dispatcher)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub resolver: AccessResolver,
    pub recordings: RecordingRegistry,
    pub dispatcher: NotificationDispatcher,
    pub cipher: Option<SecretCipher>,
}

/// Get the praxis database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial platform administrator if no profile exists for `email`.
///
/// Idempotent. An existing profile is left as it is, even if it is not an administrator.
#[instrument(skip_all)]
pub async fn create_initial_admin_profile(email: &str, db: &PgPool) -> Result<ProfileId, DbError> {
    let mut tx = db.begin().await?;
    let mut profiles = Profiles::new(&mut tx);

    if let Some(existing) = profiles.get_by_email(email).await? {
        if existing.role != Role::PlatformAdmin {
            warn!(profile_id = %existing.id, "Configured admin_email belongs to a non-admin profile");
        }
        tx.commit().await?;
        return Ok(existing.id);
    }

    let created = profiles
        .create(&ProfileCreateDBRequest {
            email: email.to_string(),
            full_name: None,
            phone: None,
            role: Role::PlatformAdmin,
            subscription_status: SubscriptionStatus::Active,
            tier: SubscriptionTier::Lifetime,
            trial_ends_at: None,
            subscription_end_date: None,
            clinic_id: None,
        })
        .await?;

    tx.commit().await?;
    info!(profile_id = %created.id, "Created initial platform admin profile");
    Ok(created.id)
}

/// Connect, migrate and make sure the admin profile exists.
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    info!("Connecting to database");
    let pool = config.database.pool.pool_options().connect(&config.database.url).await?;
    migrator().run(&pool).await?;

    create_initial_admin_profile(&config.admin_email, &pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create initial admin profile: {}", e))?;

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::CONTENT_TYPE])
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: management API, public booking, API docs, CORS, tracing and
/// optional Prometheus metrics.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::{appointments, clinics, notifications, profiles, subscriptions, voice};

    let api_routes = Router::new()
        // Profiles
        .route("/profiles", get(profiles::list_profiles))
        .route("/profiles/{profile_id}", get(profiles::get_profile))
        .route("/profiles/{profile_id}/access", get(profiles::get_profile_access))
        .route("/profiles/{profile_id}/subscription", patch(profiles::update_profile_subscription))
        // Clinics
        .route("/clinics", get(clinics::list_clinics).post(clinics::create_clinic))
        .route("/clinics/{clinic_id}", get(clinics::get_clinic).patch(clinics::update_clinic))
        .route("/clinics/{clinic_id}/access", get(clinics::get_clinic_access))
        .route("/clinics/{clinic_id}/subscription", patch(clinics::update_clinic_subscription))
        // Appointments
        .route("/appointments", get(appointments::list_appointments))
        .route("/appointments/{appointment_id}", patch(appointments::update_appointment))
        // Notifications
        .route(
            "/notifications/settings",
            get(notifications::list_notification_settings).put(notifications::update_notification_settings),
        )
        .route(
            "/notifications/smtp",
            get(notifications::get_smtp_settings).put(notifications::update_smtp_settings),
        )
        .route("/notifications/smtp/test", post(notifications::test_smtp_settings))
        .route("/notifications/test", post(notifications::send_test_notification))
        // Voice
        .route("/voice/recordings", post(voice::request_recording))
        .route("/voice/recordings/current", get(voice::current_recording))
        .route("/voice/recordings/{recorder_id}", delete(voice::release_recording))
        // Subscriptions
        .route("/subscriptions/sweep", post(subscriptions::trigger_expiry_sweep))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/public/appointments", post(appointments::book_appointment))
        .with_state(state.clone())
        .nest("/admin/api/v1", api_routes)
        .route("/admin/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/admin/docs", ApiDoc::openapi()));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks running next to the HTTP server: leader election and the expiry sweep.
///
/// Dropping this cancels the shutdown token through `drop_guard`, which stops every task.
pub struct BackgroundServices {
    is_leader: Arc<AtomicBool>,
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Whether this replica currently runs leader-only work.
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Relaxed)
    }

    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

fn setup_background_services(
    pool: PgPool,
    dispatcher: NotificationDispatcher,
    config: &Config,
    shutdown_token: CancellationToken,
) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    let is_leader = Arc::new(AtomicBool::new(false));
    if config.background_services.leader_election.enabled {
        info!("Starting leader election - will attempt to acquire leadership");
        background_tasks.push(tokio::spawn(leader_election::leader_election_task(
            pool.clone(),
            is_leader.clone(),
            leader_election::LEADER_LOCK_ID,
            LEADER_CHECK_INTERVAL,
            shutdown_token.clone(),
        )));
    } else {
        info!("Launching without leader election: running as leader");
        is_leader.store(true, Ordering::Relaxed);
    }

    let sweep = &config.background_services.expiry_sweep;
    if sweep.enabled {
        background_tasks.push(tokio::spawn(subscription::sweep::run_expiry_sweeper(
            pool,
            dispatcher,
            sweep.interval,
            is_leader.clone(),
            shutdown_token.clone(),
        )));
    } else {
        info!("Subscription expiry sweep disabled by configuration");
    }

    BackgroundServices {
        is_leader,
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. [`Application::new`] connects to the database, runs migrations, creates the admin profile
///    and starts background services.
/// 2. [`Application::serve`] binds the listener and handles requests until the shutdown future
///    resolves, then stops background services and closes the pool.
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Like [`Application::new`], but reuse `pool` instead of connecting (used by tests).
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting praxis with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => {
                create_initial_admin_profile(&config.admin_email, &pool)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to create initial admin profile: {}", e))?;
                pool
            }
            None => setup_database(&config).await?,
        };

        let cipher = config.encryption_key.as_deref().map(SecretCipher::from_base64_key).transpose()?;
        if cipher.is_none() {
            info!("No encryption_key configured: SMTP passwords cannot be stored");
        }

        let dispatcher = NotificationDispatcher::new(pool.clone(), &config, cipher.clone())?;
        let bg_services = setup_background_services(pool.clone(), dispatcher.clone(), &config, CancellationToken::new());

        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .resolver(AccessResolver::new(config.subscription.legacy_lifetime_sentinel_year))
            .recordings(RecordingRegistry::new(config.voice.contention_policy))
            .dispatcher(dispatcher)
            .maybe_cipher(cipher)
            .build();

        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Praxis listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Stopping background services...");
        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{create_test_app, create_test_config};

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_initial_admin_profile_is_idempotent(pool: PgPool) {
        let first = create_initial_admin_profile("root@example.org", &pool).await.unwrap();
        let second = create_initial_admin_profile("root@example.org", &pool).await.unwrap();
        assert_eq!(first, second);

        let mut conn = pool.acquire().await.unwrap();
        let admin = Profiles::new(&mut conn).get_by_id(first).await.unwrap().unwrap();
        assert_eq!(admin.role, Role::PlatformAdmin);
        assert_eq!(admin.tier, SubscriptionTier::Lifetime);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_application_integration(pool: PgPool) {
        let (server, bg) = create_test_app(pool, create_test_config()).await;
        assert!(bg.is_leader());

        let health = server.get("/healthz").await;
        health.assert_status_ok();
        assert_eq!(health.text(), "OK");

        let doc = server.get("/admin/openapi.json").await;
        doc.assert_status_ok();
        assert!(doc.text().contains("Praxis API"));

        bg.shutdown().await;
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_build_router_with_metrics_enabled(pool: PgPool) {
        let mut config = create_test_config();
        config.enable_metrics = true;
        let (server, _bg) = create_test_app(pool, config).await;

        server.get("/healthz").await.assert_status_ok();
        let metrics = server.get("/internal/metrics").await;
        metrics.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_build_router_with_metrics_disabled(pool: PgPool) {
        let (server, _bg) = create_test_app(pool, create_test_config()).await;
        server.get("/internal/metrics").await.assert_status_not_found();
    }

    #[test]
    fn test_cors_layer_accepts_configured_origins() {
        let mut config = Config::default();
        config.auth.security.cors.allowed_origins = vec![CorsOrigin::Url("https://app.example.org".parse().unwrap())];
        assert!(create_cors_layer(&config).is_ok());
    }
}
