//! Notification dispatch to registered users by email or SMS.
//!
//! Receivers are contact strings; they are matched against stored users and
//! each match gets one best-effort delivery attempt. Nothing is retried.

pub mod email;
pub mod sms;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub use email::{EmailSender, LogEmailSender, SendGridEmailSender, SendGridSettings, SmtpEmailSender, SmtpSettings};
pub use sms::{LogSmsSender, SinchSettings, SinchSmsSender, SmsSender};

use crate::error::{DomainError, Validator};
use crate::models::auth::User;
use crate::store::{ContactKind, Database};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Could not build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMethod {
    Email,
    Sms,
}

impl SendMethod {
    pub fn parse(method: &str) -> Option<Self> {
        match method.trim().to_ascii_lowercase().as_str() {
            "email" => Some(SendMethod::Email),
            "sms" => Some(SendMethod::Sms),
            _ => None,
        }
    }

    fn contact_kind(self) -> ContactKind {
        match self {
            SendMethod::Email => ContactKind::Email,
            SendMethod::Sms => ContactKind::Phone,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    /// Free-form tag identifying why the notification is sent.
    pub use_case: Option<String>,
    pub send_method: Option<String>,
    #[serde(default)]
    pub receivers: Vec<String>,
    pub subject: Option<String>,
    pub message: String,
}

/// Per-receiver result of a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOutcome {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
    /// Receivers that matched no user.
    pub unresolved: Vec<String>,
}

impl NotificationRequest {
    fn validate(&self) -> Result<SendMethod, DomainError> {
        let has_use_case = self.use_case.as_deref().is_some_and(|u| !u.trim().is_empty());
        let has_receivers = self.receivers.iter().any(|r| !r.trim().is_empty());
        let method = self.send_method.as_deref().map(str::trim).filter(|m| !m.is_empty());

        Validator::new()
            .check(has_use_case, "notification.use_case_required", "A use case is required")
            .check(has_receivers, "notification.receivers_required", "At least one receiver is required")
            .check(method.is_some(), "notification.send_method_required", "A send method is required")
            .finish()?;

        method.and_then(SendMethod::parse).ok_or_else(|| {
            DomainError::validation(
                "notification.unsupported_method",
                format!("Send method \"{}\" is not supported", method.unwrap_or_default()),
            )
        })
    }
}

pub struct NotificationService {
    db: Arc<dyn Database>,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
}

impl NotificationService {
    pub fn new(db: Arc<dyn Database>, email: Arc<dyn EmailSender>, sms: Arc<dyn SmsSender>) -> Self {
        Self { db, email, sms }
    }

    pub async fn send(&self, request: NotificationRequest) -> Result<NotificationOutcome, DomainError> {
        let method = request.validate()?;
        let receivers: Vec<String> = request
            .receivers
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        let tx = self.db.begin().await?;
        let users = tx.find_users_by_contacts(method.contact_kind(), &receivers).await;
        tx.rollback().await?;
        let users = users?;

        let mut outcome = NotificationOutcome::default();
        let mut matched = HashSet::new();
        for user in &users {
            let Some(address) = contact(user, method) else {
                continue;
            };
            matched.insert(address.to_lowercase());
            let result = match method {
                SendMethod::Email => {
                    let subject = request.subject.as_deref().unwrap_or_default();
                    self.email.send_email(address, subject, &request.message).await
                }
                SendMethod::Sms => self.sms.send_sms(address, &request.message).await,
            };
            match result {
                Ok(()) => outcome.delivered.push(address.to_string()),
                Err(e) => {
                    warn!(user_id = %user.id, method = ?method, error = %e, "Notification delivery failed");
                    outcome.failed.push(address.to_string());
                }
            }
        }
        outcome.unresolved = receivers
            .into_iter()
            .filter(|r| !matched.contains(&r.to_lowercase()))
            .collect();

        info!(
            use_case = request.use_case.as_deref().unwrap_or_default(),
            method = ?method,
            delivered = outcome.delivered.len(),
            failed = outcome.failed.len(),
            unresolved = outcome.unresolved.len(),
            "Dispatched notification"
        );
        Ok(outcome)
    }
}

fn contact(user: &User, method: SendMethod) -> Option<&str> {
    match method {
        SendMethod::Email => Some(user.email.as_str()),
        SendMethod::Sms => user.phone_number.as_deref(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::models::auth::NewUser;
    use crate::store::memory::MemoryDatabase;

    #[derive(Default)]
    struct RecordingEmail {
        sent: Mutex<Vec<String>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl EmailSender for RecordingEmail {
        async fn send_email(&self, to: &str, _subject: &str, _body: &str) -> Result<(), NotificationError> {
            if self.fail_for.as_deref() == Some(to) {
                return Err(NotificationError::Address(to.to_string()));
            }
            self.sent.lock().unwrap().push(to.to_string());
            Ok(())
        }
    }

    async fn seed_user(db: &MemoryDatabase, name: &str, email: &str, phone: Option<&str>) {
        let tx = db.begin().await.unwrap();
        tx.create_user(NewUser {
            user_name: name.into(),
            email: email.into(),
            phone_number: phone.map(Into::into),
            password_hash: None,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    fn request(method: &str, receivers: &[&str]) -> NotificationRequest {
        NotificationRequest {
            use_case: Some("reminder".into()),
            send_method: Some(method.into()),
            receivers: receivers.iter().map(|r| r.to_string()).collect(),
            subject: Some("Hello".into()),
            message: "Your list is due".into(),
        }
    }

    #[tokio::test]
    async fn validation_runs_before_any_lookup() {
        let db = MemoryDatabase::new();
        let service = NotificationService::new(Arc::new(db.clone()), Arc::new(LogEmailSender), Arc::new(LogSmsSender));
        db.fail_next("find_users_by_contacts");

        let err = service
            .send(NotificationRequest {
                message: "hi".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        match err {
            DomainError::Validation(details) => assert_eq!(details.len(), 3),
            other => panic!("unexpected {other:?}"),
        }

        let err = service.send(request("pigeon", &["a@b.c"])).await.unwrap_err();
        assert_eq!(err.code(), Some("notification.unsupported_method"));
    }

    #[tokio::test]
    async fn email_fan_out_reports_each_receiver() {
        let db = MemoryDatabase::new();
        seed_user(&db, "ann", "ann@example.com", None).await;
        seed_user(&db, "bob", "bob@example.com", None).await;
        let email = Arc::new(RecordingEmail {
            fail_for: Some("bob@example.com".into()),
            ..Default::default()
        });
        let service = NotificationService::new(Arc::new(db), email.clone(), Arc::new(LogSmsSender));

        let outcome = service
            .send(request("Email", &["ANN@example.com", "bob@example.com", "nobody@example.com"]))
            .await
            .unwrap();

        assert_eq!(outcome.delivered, vec!["ann@example.com"]);
        assert_eq!(outcome.failed, vec!["bob@example.com"]);
        assert_eq!(outcome.unresolved, vec!["nobody@example.com"]);
        assert_eq!(email.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sms_matches_phone_numbers() {
        let db = MemoryDatabase::new();
        seed_user(&db, "ann", "ann@example.com", Some("+15550100")).await;
        let service = NotificationService::new(Arc::new(db), Arc::new(LogEmailSender), Arc::new(LogSmsSender));

        let outcome = service.send(request("sms", &["+15550100", "+15550199"])).await.unwrap();
        assert_eq!(outcome.delivered, vec!["+15550100"]);
        assert_eq!(outcome.unresolved, vec!["+15550199"]);
    }
}
