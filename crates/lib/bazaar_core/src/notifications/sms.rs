//! SMS senders.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use super::NotificationError;

const SINCH_BASE_URL: &str = "https://sms.api.sinch.com/xms/v1";

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone)]
pub struct SinchSettings {
    pub service_plan_id: String,
    pub api_token: String,
    /// Sender number or alphanumeric id.
    pub from: String,
    pub base_url: Option<String>,
}

/// Sends through the Sinch REST batches endpoint.
pub struct SinchSmsSender {
    client: Client,
    settings: SinchSettings,
}

impl SinchSmsSender {
    pub fn new(client: Client, settings: SinchSettings) -> Self {
        Self { client, settings }
    }

    fn batches_url(&self) -> String {
        let base = self.settings.base_url.as_deref().unwrap_or(SINCH_BASE_URL);
        format!("{}/{}/batches", base.trim_end_matches('/'), self.settings.service_plan_id)
    }
}

#[async_trait]
impl SmsSender for SinchSmsSender {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError> {
        let resp = self
            .client
            .post(self.batches_url())
            .bearer_auth(&self.settings.api_token)
            .json(&json!({ "from": self.settings.from, "to": [to], "body": body }))
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
        debug!(to, "Sent SMS through Sinch");
        Ok(())
    }
}

/// Logs the message instead of sending it.
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError> {
        info!(to, len = body.len(), "SMS (not sent, no transport configured)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_url_includes_plan() {
        let sender = SinchSmsSender::new(
            Client::new(),
            SinchSettings {
                service_plan_id: "plan-1".into(),
                api_token: "t".into(),
                from: "Bazaar".into(),
                base_url: Some("https://eu.sms.api.sinch.com/xms/v1/".into()),
            },
        );
        assert_eq!(sender.batches_url(), "https://eu.sms.api.sinch.com/xms/v1/plan-1/batches");
    }
}
