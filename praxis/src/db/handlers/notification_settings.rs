//! Database repository for `notifications_config` and `smtp_settings`.
//!
//! Both tables are keyed configuration rather than entities, so this repository does not
//! implement [`crate::db::handlers::Repository`].

use crate::db::{
    errors::{DbError, Result},
    models::notification_settings::{NotificationEvent, NotificationSettingDBResponse, SmtpSettingsDBRequest, SmtpSettingsDBResponse},
};
use sqlx::PgConnection;
use tracing::instrument;

pub struct NotificationSettings<'c> {
    db: &'c mut PgConnection,
}

impl<'c> NotificationSettings<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn list(&mut self) -> Result<Vec<NotificationSettingDBResponse>> {
        let settings = sqlx::query_as::<_, NotificationSettingDBResponse>(
            "SELECT event, email_enabled, sms_enabled, updated_at FROM notifications_config ORDER BY event",
        )
        .fetch_all(&mut *self.db)
        .await?;

        Ok(settings)
    }

    /// Channel gating for one event. A missing row means every channel is off.
    #[instrument(skip(self), err)]
    pub async fn get(&mut self, event: NotificationEvent) -> Result<Option<NotificationSettingDBResponse>> {
        let setting = sqlx::query_as::<_, NotificationSettingDBResponse>(
            "SELECT event, email_enabled, sms_enabled, updated_at FROM notifications_config WHERE event = $1",
        )
        .bind(event)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(setting)
    }

    #[instrument(skip(self), err)]
    pub async fn upsert(&mut self, event: NotificationEvent, email_enabled: bool, sms_enabled: bool) -> Result<NotificationSettingDBResponse> {
        let setting = sqlx::query_as::<_, NotificationSettingDBResponse>(
            r#"
            INSERT INTO notifications_config (event, email_enabled, sms_enabled, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (event) DO UPDATE SET
                email_enabled = EXCLUDED.email_enabled,
                sms_enabled = EXCLUDED.sms_enabled,
                updated_at = NOW()
            RETURNING event, email_enabled, sms_enabled, updated_at
            "#,
        )
        .bind(event)
        .bind(email_enabled)
        .bind(sms_enabled)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(setting)
    }

    #[instrument(skip(self), err)]
    pub async fn get_smtp(&mut self) -> Result<Option<SmtpSettingsDBResponse>> {
        let settings = sqlx::query_as::<_, SmtpSettingsDBResponse>(
            r#"
            SELECT host, port, username, password_encrypted, use_tls, from_email, from_name, enabled, updated_at
            FROM smtp_settings WHERE id = 1
            "#,
        )
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(settings)
    }

    /// Store the SMTP override. A `None` password keeps the stored one.
    #[instrument(skip(self, request), fields(host = %request.host, port = request.port), err)]
    pub async fn upsert_smtp(&mut self, request: &SmtpSettingsDBRequest) -> Result<SmtpSettingsDBResponse> {
        let settings = sqlx::query_as::<_, SmtpSettingsDBResponse>(
            r#"
            INSERT INTO smtp_settings (id, host, port, username, password_encrypted, use_tls, from_email, from_name, enabled, updated_at)
            VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (id) DO UPDATE SET
                host = EXCLUDED.host,
                port = EXCLUDED.port,
                username = EXCLUDED.username,
                password_encrypted = COALESCE(EXCLUDED.password_encrypted, smtp_settings.password_encrypted),
                use_tls = EXCLUDED.use_tls,
                from_email = EXCLUDED.from_email,
                from_name = EXCLUDED.from_name,
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            RETURNING host, port, username, password_encrypted, use_tls, from_email, from_name, enabled, updated_at
            "#,
        )
        .bind(&request.host)
        .bind(request.port)
        .bind(&request.username)
        .bind(&request.password_encrypted)
        .bind(request.use_tls)
        .bind(&request.from_email)
        .bind(&request.from_name)
        .bind(request.enabled)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_seeded_settings(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = NotificationSettings::new(&mut conn);

        let settings = repo.list().await.unwrap();
        assert_eq!(settings.len(), 3);

        let booked = repo.get(NotificationEvent::AppointmentBooked).await.unwrap().unwrap();
        assert!(booked.email_enabled);
        assert!(booked.sms_enabled);

        let expiring = repo.get(NotificationEvent::SubscriptionExpiring).await.unwrap().unwrap();
        assert!(expiring.email_enabled);
        assert!(!expiring.sms_enabled);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_upsert_setting(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = NotificationSettings::new(&mut conn);

        let updated = repo.upsert(NotificationEvent::AppointmentBooked, false, true).await.unwrap();
        assert!(!updated.email_enabled);
        assert!(updated.sms_enabled);

        let reread = repo.get(NotificationEvent::AppointmentBooked).await.unwrap().unwrap();
        assert!(!reread.email_enabled);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_smtp_password_kept_when_omitted(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = NotificationSettings::new(&mut conn);

        assert!(repo.get_smtp().await.unwrap().is_none());

        let mut request = SmtpSettingsDBRequest {
            host: "smtp.example.org".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password_encrypted: Some("ciphertext".to_string()),
            use_tls: true,
            from_email: "clinic@example.org".to_string(),
            from_name: "Clinic".to_string(),
            enabled: true,
        };
        repo.upsert_smtp(&request).await.unwrap();

        request.host = "smtp2.example.org".to_string();
        request.password_encrypted = None;
        let stored = repo.upsert_smtp(&request).await.unwrap();
        assert_eq!(stored.host, "smtp2.example.org");
        assert_eq!(stored.password_encrypted.as_deref(), Some("ciphertext"));
    }
}
