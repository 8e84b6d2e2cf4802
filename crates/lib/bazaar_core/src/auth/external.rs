//! External identity providers (Google, Facebook).
//!
//! The client obtains a provider access token; we verify it against the
//! provider and read the account's email.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::DomainError;

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const FACEBOOK_GRAPH_URL: &str = "https://graph.facebook.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalProvider {
    Google,
    Facebook,
}

impl ExternalProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            ExternalProvider::Google => "google",
            ExternalProvider::Facebook => "facebook",
        }
    }
}

/// Identity asserted by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: ExternalProvider,
    pub email: String,
    pub name: Option<String>,
}

#[async_trait]
pub trait ExternalAuthVerifier: Send + Sync {
    async fn verify(
        &self,
        provider: ExternalProvider,
        access_token: &str,
    ) -> Result<ExternalIdentity, DomainError>;
}

#[derive(Debug, Clone, Default)]
pub struct ExternalAuthConfig {
    pub google_client_id: Option<String>,
    pub facebook_app_id: Option<String>,
    pub facebook_app_secret: Option<String>,
    /// Overrides for the provider endpoints.
    pub google_tokeninfo_url: Option<String>,
    pub facebook_graph_url: Option<String>,
}

/// Verifies provider tokens over HTTPS.
pub struct HttpExternalAuth {
    client: Client,
    config: ExternalAuthConfig,
}

#[derive(Deserialize)]
struct GoogleTokenInfo {
    aud: Option<String>,
    azp: Option<String>,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct FacebookDebugToken {
    data: FacebookDebugData,
}

#[derive(Deserialize)]
struct FacebookDebugData {
    app_id: Option<String>,
    #[serde(default)]
    is_valid: bool,
}

#[derive(Deserialize)]
struct FacebookProfile {
    email: Option<String>,
    name: Option<String>,
}

fn rejected(provider: ExternalProvider) -> DomainError {
    DomainError::unauthorized(
        "auth.external_token_invalid",
        format!("The {} access token was rejected", provider.as_str()),
    )
}

fn not_configured(provider: ExternalProvider) -> DomainError {
    DomainError::validation(
        "auth.external_provider_not_configured",
        format!("Login with {} is not configured", provider.as_str()),
    )
}

fn unreachable(provider: ExternalProvider, e: reqwest::Error) -> DomainError {
    warn!(provider = provider.as_str(), error = %e, "External provider request failed");
    DomainError::failure(
        "auth.external_provider_unavailable",
        format!("Could not reach {}", provider.as_str()),
    )
}

impl HttpExternalAuth {
    pub fn new(client: Client, config: ExternalAuthConfig) -> Self {
        Self { client, config }
    }

    async fn verify_google(&self, access_token: &str) -> Result<ExternalIdentity, DomainError> {
        let provider = ExternalProvider::Google;
        let client_id = self
            .config
            .google_client_id
            .as_deref()
            .ok_or_else(|| not_configured(provider))?;
        let url = self
            .config
            .google_tokeninfo_url
            .as_deref()
            .unwrap_or(GOOGLE_TOKENINFO_URL);

        let resp = self
            .client
            .get(url)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| unreachable(provider, e))?;
        if !resp.status().is_success() {
            debug!(status = %resp.status(), "Google rejected token");
            return Err(rejected(provider));
        }
        let info: GoogleTokenInfo = resp.json().await.map_err(|e| unreachable(provider, e))?;

        let audience_ok = [info.aud.as_deref(), info.azp.as_deref()]
            .into_iter()
            .flatten()
            .any(|aud| aud == client_id);
        if !audience_ok {
            warn!("Google token issued for another client");
            return Err(rejected(provider));
        }
        let verified = match info.email_verified {
            Some(serde_json::Value::Bool(b)) => b,
            Some(serde_json::Value::String(s)) => s == "true",
            _ => false,
        };
        match info.email {
            Some(email) if verified => Ok(ExternalIdentity {
                provider,
                email,
                name: None,
            }),
            _ => Err(rejected(provider)),
        }
    }

    async fn verify_facebook(&self, access_token: &str) -> Result<ExternalIdentity, DomainError> {
        let provider = ExternalProvider::Facebook;
        let (Some(app_id), Some(app_secret)) = (
            self.config.facebook_app_id.as_deref(),
            self.config.facebook_app_secret.as_deref(),
        ) else {
            return Err(not_configured(provider));
        };
        let base = self
            .config
            .facebook_graph_url
            .as_deref()
            .unwrap_or(FACEBOOK_GRAPH_URL);

        let app_token = format!("{app_id}|{app_secret}");
        let resp = self
            .client
            .get(format!("{base}/debug_token"))
            .query(&[("input_token", access_token), ("access_token", app_token.as_str())])
            .send()
            .await
            .map_err(|e| unreachable(provider, e))?;
        if !resp.status().is_success() {
            return Err(rejected(provider));
        }
        let debug_token: FacebookDebugToken =
            resp.json().await.map_err(|e| unreachable(provider, e))?;
        if !debug_token.data.is_valid || debug_token.data.app_id.as_deref() != Some(app_id) {
            warn!("Facebook token invalid or issued for another app");
            return Err(rejected(provider));
        }

        let resp = self
            .client
            .get(format!("{base}/me"))
            .query(&[("fields", "id,name,email"), ("access_token", access_token)])
            .send()
            .await
            .map_err(|e| unreachable(provider, e))?;
        if !resp.status().is_success() {
            return Err(rejected(provider));
        }
        let profile: FacebookProfile = resp.json().await.map_err(|e| unreachable(provider, e))?;
        let email = profile.email.ok_or_else(|| {
            DomainError::validation(
                "auth.external_email_missing",
                "The Facebook account has no email address",
            )
        })?;
        Ok(ExternalIdentity {
            provider,
            email,
            name: profile.name,
        })
    }
}

#[async_trait]
impl ExternalAuthVerifier for HttpExternalAuth {
    async fn verify(
        &self,
        provider: ExternalProvider,
        access_token: &str,
    ) -> Result<ExternalIdentity, DomainError> {
        if access_token.trim().is_empty() {
            return Err(DomainError::validation(
                "auth.external_token_required",
                "An access token is required",
            ));
        }
        match provider {
            ExternalProvider::Google => self.verify_google(access_token).await,
            ExternalProvider::Facebook => self.verify_facebook(access_token).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_providers_are_validation_errors() {
        let auth = HttpExternalAuth::new(Client::new(), ExternalAuthConfig::default());
        for provider in [ExternalProvider::Google, ExternalProvider::Facebook] {
            let err = auth.verify(provider, "token").await.unwrap_err();
            assert_eq!(err.code(), Some("auth.external_provider_not_configured"));
        }
    }

    #[tokio::test]
    async fn blank_token_is_rejected_before_any_request() {
        let auth = HttpExternalAuth::new(Client::new(), ExternalAuthConfig::default());
        let err = auth.verify(ExternalProvider::Google, "  ").await.unwrap_err();
        assert_eq!(err.code(), Some("auth.external_token_required"));
    }

    #[test]
    fn provider_names_deserialize_lowercase() {
        let p: ExternalProvider = serde_json::from_str("\"facebook\"").unwrap();
        assert_eq!(p, ExternalProvider::Facebook);
    }
}
