//! Email delivery over SMTP, or to `.eml` files for development and tests.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::{self, authentication::Credentials},
};
use std::path::Path;

use crate::{
    config::{EmailConfig, EmailTransportConfig},
    db::models::notification_settings::SmtpSettingsDBResponse,
    errors::Error,
};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    reply_to: Option<String>,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

/// Connection settings for an SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpParams<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub password: Option<&'a str>,
    pub use_tls: bool,
}

fn smtp_transport(params: &SmtpParams<'_>) -> Result<AsyncSmtpTransport<Tokio1Executor>, Error> {
    if !params.use_tls {
        tracing::warn!(host = params.host, "SMTP TLS is disabled - this is not recommended for production");
    }

    let mut builder = if params.use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(params.host)
    } else {
        Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(params.host))
    }
    .map_err(|e| Error::Internal {
        operation: format!("create SMTP transport: {e}"),
    })?
    .port(params.port);

    if !params.username.is_empty() {
        builder = builder.credentials(Credentials::new(
            params.username.to_string(),
            params.password.unwrap_or_default().to_string(),
        ));
    }

    Ok(builder.build())
}

impl EmailService {
    /// Build the service from the static configuration.
    pub fn new(config: &EmailConfig) -> Result<Self, Error> {
        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => EmailTransport::Smtp(smtp_transport(&SmtpParams {
                host,
                port: *port,
                username,
                password: Some(password.as_str()),
                use_tls: *use_tls,
            })?),
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            reply_to: config.reply_to.clone(),
        })
    }

    /// Build an SMTP service from ad-hoc parameters, e.g. the stored override or a connectivity test.
    pub fn smtp(params: &SmtpParams<'_>, from_email: &str, from_name: &str, reply_to: Option<String>) -> Result<Self, Error> {
        Ok(Self {
            transport: EmailTransport::Smtp(smtp_transport(params)?),
            from_email: from_email.to_string(),
            from_name: from_name.to_string(),
            reply_to,
        })
    }

    /// Build an SMTP service from the database override. `password` is the decrypted secret.
    pub fn from_smtp_settings(settings: &SmtpSettingsDBResponse, password: Option<&str>, reply_to: Option<String>) -> Result<Self, Error> {
        let port = u16::try_from(settings.port).map_err(|_| Error::Internal {
            operation: format!("use stored SMTP port {}", settings.port),
        })?;
        Self::smtp(
            &SmtpParams {
                host: &settings.host,
                port,
                username: &settings.username,
                password,
                use_tls: settings.use_tls,
            },
            &settings.from_email,
            &settings.from_name,
            reply_to,
        )
    }

    pub async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = if let Some(name) = to_name {
            format!("{name} <{to_email}>")
        } else {
            to_email.to_string()
        }
        .parse::<Mailbox>()
        .map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let mut builder = Message::builder().from(from).to(to).subject(subject).header(ContentType::TEXT_HTML);
        if let Some(reply_to) = &self.reply_to {
            let reply_to = reply_to.parse::<Mailbox>().map_err(|e| Error::Internal {
                operation: format!("parse reply-to email: {e}"),
            })?;
            builder = builder.reply_to(reply_to);
        }

        let message = builder.body(body.to_string()).map_err(|e| Error::Internal {
            operation: format!("build email message: {e}"),
        })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {}", describe_smtp_error(&e)),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }

    /// Open a connection to the relay and report the translated failure, if any.
    /// The file transport always succeeds.
    pub async fn test_connection(&self) -> Result<(), String> {
        match &self.transport {
            EmailTransport::Smtp(smtp) => match smtp.test_connection().await {
                Ok(true) => Ok(()),
                Ok(false) => Err("SMTP server did not accept the connection".to_string()),
                Err(e) => Err(describe_smtp_error(&e)),
            },
            EmailTransport::File(_) => Ok(()),
        }
    }
}

/// Human-readable meaning of an SMTP reply code.
pub fn smtp_code_message(code: u16) -> Option<&'static str> {
    let message = match code {
        421 => "SMTP service not available, the server is closing the connection",
        450 => "Mailbox temporarily unavailable",
        451 => "The server aborted the request because of a local error",
        452 => "The server has insufficient storage",
        454 => "TLS is temporarily unavailable on the server",
        500..=504 => "The server rejected the command",
        530 => "The server requires authentication",
        534 => "The authentication mechanism is too weak for the server",
        535 => "Authentication failed, check the username and password",
        550 => "Mailbox unavailable",
        551 => "The recipient is not local to the server",
        552 => "The recipient's mailbox is full",
        553 => "The mailbox name is not allowed",
        554 => "The server rejected the transaction",
        _ => return None,
    };
    Some(message)
}

pub fn describe_smtp_error(err: &smtp::Error) -> String {
    if let Some(code) = err.status() {
        let code = code.to_string();
        return match code.parse::<u16>().ok().and_then(smtp_code_message) {
            Some(message) => format!("{message} (SMTP {code})"),
            None => format!("Unexpected SMTP response {code}: {err}"),
        };
    }
    if err.is_timeout() {
        "Connection to the SMTP server timed out".to_string()
    } else if err.is_tls() {
        format!("TLS negotiation with the SMTP server failed: {err}")
    } else {
        format!("Could not talk to the SMTP server: {err}")
    }
}
