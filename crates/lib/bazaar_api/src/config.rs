//! API server configuration.

use std::time::Duration;

use bazaar_core::auth::external::ExternalAuthConfig;
use bazaar_core::auth::jwt::{JwtSettings, resolve_jwt_secret};
use bazaar_core::auth::refresh_tokens::DEFAULT_LIFETIME_DAYS;
use bazaar_core::authz::AuthorizationCacheSettings;
use bazaar_core::notifications::{SendGridSettings, SinchSettings, SmtpSettings};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL. The in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Redis URL. The in-memory cache is used when absent.
    pub redis_url: Option<String>,
    pub jwt: JwtSettings,
    pub refresh_token_ttl_days: i64,
    pub authz_cache: AuthorizationCacheSettings,
    pub token_cleanup_interval: Duration,
    /// Marks auth cookies `Secure`.
    pub secure_cookies: bool,
    pub smtp: Option<SmtpSettings>,
    pub sendgrid: Option<SendGridSettings>,
    pub sinch: Option<SinchSettings>,
    pub external: ExternalAuthConfig,
}

impl ApiConfig {
    /// Defaults suitable for tests and local development.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            database_url: None,
            redis_url: None,
            jwt: JwtSettings::new(secret),
            refresh_token_ttl_days: DEFAULT_LIFETIME_DAYS,
            authz_cache: AuthorizationCacheSettings::default(),
            token_cleanup_interval: Duration::from_secs(3600),
            secure_cookies: false,
            smtp: None,
            sendgrid: None,
            sinch: None,
            external: ExternalAuthConfig::default(),
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// | Variable                      | Default                        |
    /// |-------------------------------|--------------------------------|
    /// | `BIND_ADDR`                   | `127.0.0.1:3100`               |
    /// | `DATABASE_URL`                | unset (in-memory store)        |
    /// | `REDIS_URL`                   | unset (in-memory cache)        |
    /// | `JWT_SECRET`                  | generated & persisted to file  |
    /// | `JWT_ISSUER` / `JWT_AUDIENCE` | `bazaar` / `bazaar-api`        |
    /// | `JWT_ACCESS_TTL_SECS`         | `900`                          |
    /// | `JWT_REFRESH_TTL_SECS`        | `604800`                       |
    /// | `REFRESH_TOKEN_TTL_DAYS`      | `7`                            |
    /// | `AUTHZ_CACHE_TTL_SECS`        | `3600`                         |
    /// | `AUTHZ_CACHE_SLIDING_SECS`    | `900`                          |
    /// | `ROLE_CLAIMS_CACHE_TTL_SECS`  | `3600`                         |
    /// | `TOKEN_CLEANUP_INTERVAL_SECS` | `3600`                         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), resolve_jwt_secret)
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        default_secret: impl FnOnce() -> String,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secret = var("JWT_SECRET").unwrap_or_else(default_secret);
        let mut config = Self::with_secret(secret);

        if let Some(addr) = var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.database_url = var("DATABASE_URL");
        config.redis_url = var("REDIS_URL");
        if let Some(issuer) = var("JWT_ISSUER") {
            config.jwt.issuer = issuer;
        }
        if let Some(audience) = var("JWT_AUDIENCE") {
            config.jwt.audience = audience;
        }
        if let Some(secs) = parse::<i64>(&var, "JWT_ACCESS_TTL_SECS")? {
            config.jwt.access_ttl = chrono::Duration::seconds(secs);
        }
        if let Some(secs) = parse::<i64>(&var, "JWT_REFRESH_TTL_SECS")? {
            config.jwt.refresh_ttl = chrono::Duration::seconds(secs);
        }
        if let Some(days) = parse(&var, "REFRESH_TOKEN_TTL_DAYS")? {
            config.refresh_token_ttl_days = days;
        }
        if let Some(secs) = parse(&var, "AUTHZ_CACHE_TTL_SECS")? {
            config.authz_cache.absolute_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&var, "AUTHZ_CACHE_SLIDING_SECS")? {
            config.authz_cache.sliding_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&var, "ROLE_CLAIMS_CACHE_TTL_SECS")? {
            config.authz_cache.role_claims_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&var, "TOKEN_CLEANUP_INTERVAL_SECS")? {
            config.token_cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(secure) = parse(&var, "SECURE_COOKIES")? {
            config.secure_cookies = secure;
        }

        config.smtp = match (var("SMTP_HOST"), var("SMTP_FROM")) {
            (Some(host), Some(from)) => Some(SmtpSettings {
                host,
                port: parse(&var, "SMTP_PORT")?.unwrap_or(587),
                username: var("SMTP_USERNAME"),
                password: var("SMTP_PASSWORD"),
                from,
            }),
            _ => None,
        };
        config.sendgrid = match (var("SENDGRID_API_KEY"), var("SENDGRID_FROM")) {
            (Some(api_key), Some(from)) => Some(SendGridSettings {
                api_key,
                from,
                url: None,
            }),
            _ => None,
        };
        config.sinch = match (
            var("SINCH_SERVICE_PLAN_ID"),
            var("SINCH_API_TOKEN"),
            var("SINCH_FROM"),
        ) {
            (Some(service_plan_id), Some(api_token), Some(from)) => Some(SinchSettings {
                service_plan_id,
                api_token,
                from,
                base_url: var("SINCH_BASE_URL"),
            }),
            _ => None,
        };
        config.external = ExternalAuthConfig {
            google_client_id: var("GOOGLE_CLIENT_ID"),
            facebook_app_id: var("FACEBOOK_APP_ID"),
            facebook_app_secret: var("FACEBOOK_APP_SECRET"),
            ..Default::default()
        };
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match var(key) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var: key, value }),
    }
}
