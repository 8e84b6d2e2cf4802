//! Email senders.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use super::NotificationError;

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotificationError>;
}

fn mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse()
        .map_err(|_| NotificationError::Address(address.to_string()))
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// Sends through an SMTP relay using STARTTLS.
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotificationError> {
        let from = mailbox(&settings.from)?;
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?.port(settings.port);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotificationError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(mailbox(to)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        self.transport.send(message).await?;
        debug!(to, "Sent email over SMTP");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SendGridSettings {
    pub api_key: String,
    pub from: String,
    /// Override for the v3 mail endpoint.
    pub url: Option<String>,
}

/// Sends through the SendGrid v3 HTTP API.
pub struct SendGridEmailSender {
    client: Client,
    settings: SendGridSettings,
}

impl SendGridEmailSender {
    pub fn new(client: Client, settings: SendGridSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl EmailSender for SendGridEmailSender {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotificationError> {
        let payload = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.settings.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
        });
        let resp = self
            .client
            .post(self.settings.url.as_deref().unwrap_or(SENDGRID_URL))
            .bearer_auth(&self.settings.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(to, "Sent email through SendGrid");
        Ok(())
    }
}

/// Logs the message instead of sending it.
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotificationError> {
        info!(to, subject, len = body.len(), "Email (not sent, no transport configured)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_from_address_is_rejected() {
        let settings = SmtpSettings {
            host: "localhost".into(),
            port: 587,
            username: None,
            password: None,
            from: "not an address".into(),
        };
        assert!(matches!(
            SmtpEmailSender::new(&settings),
            Err(NotificationError::Address(_))
        ));
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        LogEmailSender.send_email("a@example.com", "s", "b").await.unwrap();
    }
}
