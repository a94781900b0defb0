//! Message templates for every notification event.
//!
//! Emails are HTML (auto-escaped, sharing `base.html`); SMS bodies are plain text.

use minijinja::{Environment, context};

use super::NotificationPayload;
use crate::errors::Error;

const BASE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{% block title %}{% endblock %}</title>
    <style>
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
        .container { max-width: 600px; margin: 0 auto; padding: 20px; }
        .footer { margin-top: 30px; font-size: 12px; color: #666; }
    </style>
</head>
<body>
    <div class="container">
        <p>{% if name %}Hello {{ name }},{% else %}Hello,{% endif %}</p>
        {% block content %}{% endblock %}
        <div class="footer">
            <p>This is an automated message from {{ product }}, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#;

const APPOINTMENT_BOOKED_HTML: &str = r#"{% extends "base.html" %}
{% block title %}New appointment request{% endblock %}
{% block content %}
<p>{{ patient_name }} requested an appointment on <strong>{{ scheduled_at }}</strong> ({{ duration_minutes }} minutes).</p>
{% if reason %}<p>Reason given: {{ reason }}</p>{% endif %}
<p>The request is pending until you confirm it in your <a href="{{ dashboard_url }}/appointments">calendar</a>.</p>
{% endblock %}"#;

const SUBSCRIPTION_EXPIRING_HTML: &str = r#"{% extends "base.html" %}
{% block title %}Your subscription is ending soon{% endblock %}
{% block content %}
<p>Your {{ plan }} ends on <strong>{{ ends_at }}</strong>, {{ remaining_days }} day{{ "s" if remaining_days != 1 }} from now.</p>
<p>Renew from your <a href="{{ dashboard_url }}/subscription">subscription page</a> to keep access to your practice tools.</p>
{% endblock %}"#;

const SUBSCRIPTION_EXPIRED_HTML: &str = r#"{% extends "base.html" %}
{% block title %}Your subscription has ended{% endblock %}
{% block content %}
<p>Your {{ plan }} ended on <strong>{{ ended_at }}</strong> and practice features are now locked.</p>
<p>Your data is kept. Renew from your <a href="{{ dashboard_url }}/subscription">subscription page</a> to unlock it.</p>
{% endblock %}"#;

const TEST_HTML: &str = r#"{% extends "base.html" %}
{% block title %}Test notification{% endblock %}
{% block content %}
<p>This is a test of the {{ event }} notification. If you can read this, delivery works.</p>
{% endblock %}"#;

const APPOINTMENT_BOOKED_SMS: &str =
    "{{ product }}: new appointment request from {{ patient_name }} on {{ scheduled_at }}. Confirm it in your calendar.";
const SUBSCRIPTION_EXPIRING_SMS: &str =
    "{{ product }}: your {{ plan }} ends in {{ remaining_days }} day{{ \"s\" if remaining_days != 1 }}. Renew to keep access.";
const SUBSCRIPTION_EXPIRED_SMS: &str = "{{ product }}: your {{ plan }} has ended. Renew to unlock your practice tools.";
const TEST_SMS: &str = "{{ product }}: test of the {{ event }} notification.";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

pub struct Templates {
    env: Environment<'static>,
    product: String,
    dashboard_url: String,
}

impl Templates {
    pub fn new(product: &str, dashboard_url: &str) -> Result<Self, Error> {
        let mut env = Environment::new();
        let templates = [
            ("base.html", BASE_HTML),
            ("appointment_booked.html", APPOINTMENT_BOOKED_HTML),
            ("subscription_expiring.html", SUBSCRIPTION_EXPIRING_HTML),
            ("subscription_expired.html", SUBSCRIPTION_EXPIRED_HTML),
            ("test.html", TEST_HTML),
            ("appointment_booked.txt", APPOINTMENT_BOOKED_SMS),
            ("subscription_expiring.txt", SUBSCRIPTION_EXPIRING_SMS),
            ("subscription_expired.txt", SUBSCRIPTION_EXPIRED_SMS),
            ("test.txt", TEST_SMS),
        ];
        for (name, source) in templates {
            env.add_template(name, source).map_err(|e| Error::Internal {
                operation: format!("compile template {name}: {e}"),
            })?;
        }

        Ok(Self {
            env,
            product: product.to_string(),
            dashboard_url: dashboard_url.trim_end_matches('/').to_string(),
        })
    }

    fn template_stem(payload: &NotificationPayload) -> &'static str {
        match payload {
            NotificationPayload::AppointmentBooked { .. } => "appointment_booked",
            NotificationPayload::SubscriptionExpiring { .. } => "subscription_expiring",
            NotificationPayload::SubscriptionExpired { .. } => "subscription_expired",
            NotificationPayload::Test { .. } => "test",
        }
    }

    fn subject(payload: &NotificationPayload) -> String {
        match payload {
            NotificationPayload::AppointmentBooked { patient_name, .. } => format!("New appointment request from {patient_name}"),
            NotificationPayload::SubscriptionExpiring { remaining_days, .. } => {
                format!("Your subscription ends in {remaining_days} day{}", if *remaining_days == 1 { "" } else { "s" })
            }
            NotificationPayload::SubscriptionExpired { .. } => "Your subscription has ended".to_string(),
            NotificationPayload::Test { .. } => "Test notification".to_string(),
        }
    }

    fn context(&self, payload: &NotificationPayload, recipient_name: Option<&str>) -> minijinja::Value {
        let base = context! {
            name => recipient_name,
            product => &self.product,
            dashboard_url => &self.dashboard_url,
        };
        let specific = match payload {
            NotificationPayload::AppointmentBooked {
                patient_name,
                scheduled_at,
                duration_minutes,
                reason,
            } => context! {
                patient_name => patient_name,
                scheduled_at => scheduled_at.format(DATE_FORMAT).to_string(),
                duration_minutes => duration_minutes,
                reason => reason,
            },
            NotificationPayload::SubscriptionExpiring { ends_at, remaining_days, trial } => context! {
                ends_at => ends_at.format(DATE_FORMAT).to_string(),
                remaining_days => remaining_days,
                plan => if *trial { "free trial" } else { "subscription" },
            },
            NotificationPayload::SubscriptionExpired { ended_at, trial } => context! {
                ended_at => ended_at.map(|d| d.format(DATE_FORMAT).to_string()),
                plan => if *trial { "free trial" } else { "subscription" },
            },
            NotificationPayload::Test { event } => context! {
                event => event.as_str(),
            },
        };
        context! { ..base, ..specific }
    }

    pub fn render_email(&self, payload: &NotificationPayload, recipient_name: Option<&str>) -> Result<RenderedEmail, Error> {
        let name = format!("{}.html", Self::template_stem(payload));
        let html = self.render(&name, payload, recipient_name)?;
        Ok(RenderedEmail {
            subject: Self::subject(payload),
            html,
        })
    }

    pub fn render_sms(&self, payload: &NotificationPayload) -> Result<String, Error> {
        let name = format!("{}.txt", Self::template_stem(payload));
        self.render(&name, payload, None)
    }

    fn render(&self, name: &str, payload: &NotificationPayload, recipient_name: Option<&str>) -> Result<String, Error> {
        let template = self.env.get_template(name).map_err(|e| Error::Internal {
            operation: format!("load template {name}: {e}"),
        })?;
        template.render(self.context(payload, recipient_name)).map_err(|e| Error::Internal {
            operation: format!("render template {name}: {e}"),
        })
    }
}
