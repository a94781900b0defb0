use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{instrument, warn};
use utoipa::ToSchema;

use super::{
    NotificationPayload, Recipient,
    email::{EmailService, SmtpParams},
    sms::SmsGateway,
    templates::Templates,
};
use crate::{
    config::Config,
    crypto::SecretCipher,
    db::{errors::DbError, handlers::NotificationSettings, models::notification_settings::NotificationEvent},
    errors::Error,
};

/// Result of one delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelOutcome {
    Sent,
    Skipped { reason: String },
    Failed { message: String },
}

impl ChannelOutcome {
    fn skipped(reason: &str) -> Self {
        ChannelOutcome::Skipped { reason: reason.to_string() }
    }

    fn label(&self) -> &'static str {
        match self {
            ChannelOutcome::Sent => "sent",
            ChannelOutcome::Skipped { .. } => "skipped",
            ChannelOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DispatchOutcome {
    pub event: NotificationEvent,
    pub email: ChannelOutcome,
    pub sms: ChannelOutcome,
}

impl DispatchOutcome {
    pub fn any_failed(&self) -> bool {
        matches!(self.email, ChannelOutcome::Failed { .. }) || matches!(self.sms, ChannelOutcome::Failed { .. })
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    db: PgPool,
    email: Arc<EmailService>,
    reply_to: Option<String>,
    sms: Option<SmsGateway>,
    templates: Arc<Templates>,
    cipher: Option<SecretCipher>,
}

impl NotificationDispatcher {
    pub fn new(db: PgPool, config: &Config, cipher: Option<SecretCipher>) -> anyhow::Result<Self> {
        let email = EmailService::new(&config.email)?;
        let sms = SmsGateway::from_config(&config.sms)?;
        let templates = Templates::new(&config.email.from_name, &config.dashboard_url)?;

        Ok(Self {
            db,
            email: Arc::new(email),
            reply_to: config.email.reply_to.clone(),
            sms,
            templates: Arc::new(templates),
            cipher,
        })
    }

    /// Send `payload` on every channel enabled for its event in `notifications_config`.
    #[instrument(skip_all, fields(event = %payload.event()))]
    pub async fn dispatch(&self, recipient: &Recipient, payload: &NotificationPayload) -> DispatchOutcome {
        let event = payload.event();
        let (email_enabled, sms_enabled) = match self.channels_enabled(event).await {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(error = %e, "Failed to load notification settings");
                let failed = ChannelOutcome::Failed {
                    message: "Could not load notification settings".to_string(),
                };
                return self.record(DispatchOutcome {
                    event,
                    email: failed.clone(),
                    sms: failed,
                });
            }
        };

        self.deliver(recipient, payload, email_enabled, sms_enabled).await
    }

    /// Send `payload` on both channels regardless of the event's gating.
    #[instrument(skip_all, fields(event = %payload.event()))]
    pub async fn dispatch_ungated(&self, recipient: &Recipient, payload: &NotificationPayload) -> DispatchOutcome {
        self.deliver(recipient, payload, true, true).await
    }

    /// `(email, sms)` gating for `event`. A missing row disables both.
    async fn channels_enabled(&self, event: NotificationEvent) -> Result<(bool, bool), Error> {
        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        let setting = NotificationSettings::new(&mut conn).get(event).await?;
        Ok(setting.map(|s| (s.email_enabled, s.sms_enabled)).unwrap_or((false, false)))
    }

    async fn deliver(&self, recipient: &Recipient, payload: &NotificationPayload, email_enabled: bool, sms_enabled: bool) -> DispatchOutcome {
        let email = match (&recipient.email, email_enabled) {
            (_, false) => ChannelOutcome::skipped("disabled"),
            (None, true) => ChannelOutcome::skipped("no_email_address"),
            (Some(address), true) => self.send_email(address, recipient.name.as_deref(), payload).await,
        };

        let sms = match (&recipient.phone, sms_enabled, &self.sms) {
            (_, false, _) => ChannelOutcome::skipped("disabled"),
            (None, true, _) => ChannelOutcome::skipped("no_phone_number"),
            (Some(_), true, None) => ChannelOutcome::skipped("sms_not_configured"),
            (Some(phone), true, Some(gateway)) => self.send_sms(gateway, phone, payload).await,
        };

        self.record(DispatchOutcome {
            event: payload.event(),
            email,
            sms,
        })
    }

    async fn send_email(&self, address: &str, name: Option<&str>, payload: &NotificationPayload) -> ChannelOutcome {
        let result = async {
            let rendered = self.templates.render_email(payload, name)?;
            let service = self.active_email_service().await?;
            service.send_email(address, name, &rendered.subject, &rendered.html).await
        }
        .await;

        match result {
            Ok(()) => ChannelOutcome::Sent,
            Err(e) => {
                warn!(error = %e, "Email notification failed");
                ChannelOutcome::Failed { message: e.to_string() }
            }
        }
    }

    async fn send_sms(&self, gateway: &SmsGateway, phone: &str, payload: &NotificationPayload) -> ChannelOutcome {
        let text = match self.templates.render_sms(payload) {
            Ok(text) => text,
            Err(e) => return ChannelOutcome::Failed { message: e.to_string() },
        };

        match gateway.send(phone, &text).await {
            Ok(_) => ChannelOutcome::Sent,
            Err(e) => {
                warn!(error = %e, "SMS notification failed");
                ChannelOutcome::Failed { message: e.to_string() }
            }
        }
    }

    fn record(&self, outcome: DispatchOutcome) -> DispatchOutcome {
        for (channel, result) in [("email", &outcome.email), ("sms", &outcome.sms)] {
            metrics::counter!(
                "praxis_notifications_total",
                "event" => outcome.event.as_str(),
                "channel" => channel,
                "outcome" => result.label()
            )
            .increment(1);
        }
        outcome
    }

    /// The stored SMTP override when enabled, otherwise the configured transport.
    async fn active_email_service(&self) -> Result<Arc<EmailService>, Error> {
        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        let Some(settings) = NotificationSettings::new(&mut conn).get_smtp().await?.filter(|s| s.enabled) else {
            return Ok(self.email.clone());
        };

        let password = match (&settings.password_encrypted, &self.cipher) {
            (Some(encrypted), Some(cipher)) => Some(cipher.decrypt(encrypted)?),
            (Some(_), None) => {
                return Err(Error::Internal {
                    operation: "decrypt stored SMTP password: no encryption_key configured".to_string(),
                });
            }
            (None, _) => None,
        };

        Ok(Arc::new(EmailService::from_smtp_settings(
            &settings,
            password.as_deref(),
            self.reply_to.clone(),
        )?))
    }

    /// Check SMTP connectivity with `params`, or with whatever transport notifications use now.
    pub async fn test_smtp_connection(&self, params: Option<SmtpParams<'_>>) -> Result<(), String> {
        let service = match params {
            Some(params) => EmailService::smtp(&params, "noreply@localhost", "Praxis", None).map(Arc::new),
            None => self.active_email_service().await,
        }
        .map_err(|e| e.to_string())?;

        service.test_connection().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::EmailTransportConfig,
        db::models::notification_settings::SmtpSettingsDBRequest,
        test_utils::{create_test_config, install_crypto_provider},
    };
    use chrono::Utc;
    use std::path::Path;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    fn booked() -> NotificationPayload {
        NotificationPayload::AppointmentBooked {
            patient_name: "Jane Roe".to_string(),
            scheduled_at: Utc::now(),
            duration_minutes: 30,
            reason: None,
        }
    }

    fn recipient(phone: Option<&str>) -> Recipient {
        Recipient {
            name: Some("Dr Grey".to_string()),
            email: Some("dr@example.org".to_string()),
            phone: phone.map(str::to_string),
        }
    }

    fn outbox_count(config: &Config) -> usize {
        let EmailTransportConfig::File { path } = &config.email.transport else {
            panic!("expected file transport");
        };
        std::fs::read_dir(Path::new(path)).map(|d| d.count()).unwrap_or(0)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_dispatch_follows_channel_gating(pool: PgPool) {
        let config = create_test_config();
        let dispatcher = NotificationDispatcher::new(pool.clone(), &config, None).unwrap();

        let outcome = dispatcher.dispatch(&recipient(Some("+1 555 0100 200")), &booked()).await;
        assert_eq!(outcome.event, NotificationEvent::AppointmentBooked);
        assert_eq!(outcome.email, ChannelOutcome::Sent);
        // Enabled for this event, but no gateway in the test config
        assert_eq!(outcome.sms, ChannelOutcome::skipped("sms_not_configured"));
        assert_eq!(outbox_count(&config), 1);

        let mut conn = pool.acquire().await.unwrap();
        NotificationSettings::new(&mut conn)
            .upsert(NotificationEvent::AppointmentBooked, false, false)
            .await
            .unwrap();

        let outcome = dispatcher.dispatch(&recipient(None), &booked()).await;
        assert_eq!(outcome.email, ChannelOutcome::skipped("disabled"));
        assert_eq!(outcome.sms, ChannelOutcome::skipped("disabled"));
        assert_eq!(outbox_count(&config), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_addresses_are_skipped(pool: PgPool) {
        let config = create_test_config();
        let dispatcher = NotificationDispatcher::new(pool, &config, None).unwrap();

        let outcome = dispatcher.dispatch(&Recipient::default(), &booked()).await;
        assert_eq!(outcome.email, ChannelOutcome::skipped("no_email_address"));
        assert_eq!(outcome.sms, ChannelOutcome::skipped("no_phone_number"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_sms_failure_does_not_block_email(pool: PgPool) {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 3})))
            .mount(&server)
            .await;

        let mut config = create_test_config();
        config.sms.enabled = true;
        config.sms.gateway_url = Some(server.uri().parse().unwrap());
        let dispatcher = NotificationDispatcher::new(pool, &config, None).unwrap();

        let outcome = dispatcher.dispatch(&recipient(Some("+15550100200")), &booked()).await;
        assert_eq!(outcome.email, ChannelOutcome::Sent);
        assert_eq!(
            outcome.sms,
            ChannelOutcome::Failed {
                message: "Invalid recipient phone number".to_string()
            }
        );
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_stored_password_without_key_fails_email(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        NotificationSettings::new(&mut conn)
            .upsert_smtp(&SmtpSettingsDBRequest {
                host: "smtp.example.org".to_string(),
                port: 587,
                username: "mailer".to_string(),
                password_encrypted: Some("ciphertext".to_string()),
                use_tls: true,
                from_email: "clinic@example.org".to_string(),
                from_name: "Clinic".to_string(),
                enabled: true,
            })
            .await
            .unwrap();

        let dispatcher = NotificationDispatcher::new(pool, &config, None).unwrap();
        let outcome = dispatcher.dispatch(&recipient(None), &booked()).await;
        assert!(matches!(outcome.email, ChannelOutcome::Failed { .. }));
        assert_eq!(outbox_count(&config), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_ungated_dispatch_ignores_settings(pool: PgPool) {
        let config = create_test_config();
        let dispatcher = NotificationDispatcher::new(pool, &config, None).unwrap();

        // Expired notifications are email-only by default; the ungated path still tries SMS
        let payload = NotificationPayload::Test {
            event: NotificationEvent::SubscriptionExpired,
        };
        let outcome = dispatcher.dispatch_ungated(&recipient(Some("+15550100200")), &payload).await;
        assert_eq!(outcome.email, ChannelOutcome::Sent);
        assert_eq!(outcome.sms, ChannelOutcome::skipped("sms_not_configured"));
    }
}
