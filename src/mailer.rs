use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// OutboundMail
///
/// A plain-text message for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Transport(String),
    #[error("mail relay rejected the message with status {0}")]
    Rejected(u16),
}

/// Mailer
///
/// Outbound mail boundary. Delivery is always best-effort; callers log
/// failures and move on.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError>;
}

/// HttpMailRelay
///
/// Posts messages as JSON to an HTTP mail relay (`MAIL_RELAY_URL`).
#[derive(Clone)]
pub struct HttpMailRelay {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailRelay {
    pub fn new(url: &str, api_key: Option<&str>, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            api_key: api_key.map(str::to_string),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailRelay {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "from": self.from,
                "to": mail.to,
                "subject": mail.subject,
                "text": mail.body,
            }));

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }

        tracing::debug!(to = %mail.to, subject = %mail.subject, "Mail relayed");
        Ok(())
    }
}

/// LogMailer
///
/// Used when no relay is configured: the message is only logged.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        tracing::debug!(to = %mail.to, subject = %mail.subject, body = %mail.body, "Mail (not sent, no relay configured)");
        Ok(())
    }
}

/// RecordingMailer
///
/// Test double that keeps every message it was asked to send.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<OutboundMail>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Transport("simulated relay outage".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(mail);
        }
        Ok(())
    }
}

pub type MailerState = Arc<dyn Mailer>;
