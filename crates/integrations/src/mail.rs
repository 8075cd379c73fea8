//! Transactional mail.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail configuration: {0}")]
    Config(String),

    #[error("mail provider request failed")]
    Http(#[from] reqwest::Error),

    #[error("mail provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendGridMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl SendGridMailer {
    pub fn new(client: reqwest::Client, api_key: &str, from: &str) -> Self {
        Self {
            client,
            endpoint: SENDGRID_ENDPOINT.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }

    pub(crate) fn payload(&self, email: &Email) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": { "email": self.from },
            "subject": email.subject,
            "content": [{ "type": "text/plain", "value": email.text }],
        })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!(to = %email.to, subject = %email.subject, "mail accepted by sendgrid");
        Ok(())
    }
}

/// Logs recipient and subject; the body may hold credentials and is never
/// written out.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "mail delivery skipped (log mailer)");
        Ok(())
    }
}
