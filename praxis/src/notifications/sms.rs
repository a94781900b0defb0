//! SMS delivery through an HTTP JSON gateway.
//!
//! The gateway receives `POST {gateway_url}` with `{"to", "from", "text"}` and a bearer token,
//! and answers `{"code": N, "message_id": ...}` where `0` means accepted. Any other code is
//! translated through [`gateway_code_message`].

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::config::SmsConfig;

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("{message}")]
    Gateway { code: i64, message: String },
    #[error("SMS gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("SMS gateway returned HTTP {status} without a result code")]
    InvalidResponse { status: u16 },
    #[error("Invalid phone number: {0}")]
    InvalidRecipient(String),
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    from: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    code: i64,
    #[serde(default)]
    message_id: Option<String>,
}

/// Human-readable meaning of a gateway result code.
pub fn gateway_code_message(code: i64) -> String {
    let message = match code {
        1 => "Invalid gateway API key",
        2 => "Insufficient account balance",
        3 => "Invalid recipient phone number",
        4 => "Message text is empty or too long",
        5 => "Sender ID is not approved",
        6 => "Recipient has opted out of messages",
        7 => "Gateway rate limit exceeded",
        8 => "Destination country is not supported",
        9 => "Gateway internal error",
        _ => return format!("Unknown SMS gateway error (code {code})"),
    };
    message.to_string()
}

/// Strip formatting characters, keeping a leading `+`.
pub fn normalize_phone(phone: &str) -> Result<String, SmsError> {
    let trimmed = phone.trim();
    let mut normalized = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' => normalized.push(c),
            '+' if i == 0 => normalized.push(c),
            ' ' | '-' | '(' | ')' => {}
            _ => return Err(SmsError::InvalidRecipient(phone.to_string())),
        }
    }
    if normalized.trim_start_matches('+').len() < 7 {
        return Err(SmsError::InvalidRecipient(phone.to_string()));
    }
    Ok(normalized)
}

#[derive(Debug, Clone)]
pub struct SmsGateway {
    client: Client,
    url: Url,
    api_key: Option<String>,
    sender_id: String,
}

impl SmsGateway {
    /// `None` when SMS delivery is disabled or has no gateway.
    pub fn from_config(config: &SmsConfig) -> anyhow::Result<Option<Self>> {
        let Some(url) = config.gateway_url.clone().filter(|_| config.enabled) else {
            return Ok(None);
        };
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Some(Self {
            client,
            url,
            api_key: config.api_key.clone(),
            sender_id: config.sender_id.clone(),
        }))
    }

    /// Send one message and return the gateway's message id, if it gave one.
    #[instrument(skip(self, text), err)]
    pub async fn send(&self, to: &str, text: &str) -> Result<Option<String>, SmsError> {
        let to = normalize_phone(to)?;
        let mut request = self.client.post(self.url.clone()).json(&SendRequest {
            to: &to,
            from: &self.sender_id,
            text,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Gateways report failures in the body, sometimes with a non-2xx status
        let parsed = match serde_json::from_str::<SendResponse>(&body) {
            Ok(parsed) => parsed,
            Err(_) => return Err(SmsError::InvalidResponse { status: status.as_u16() }),
        };

        if parsed.code == 0 {
            tracing::debug!(message_id = ?parsed.message_id, "SMS accepted by gateway");
            Ok(parsed.message_id)
        } else {
            Err(SmsError::Gateway {
                code: parsed.code,
                message: gateway_code_message(parsed.code),
            })
        }
    }
}
