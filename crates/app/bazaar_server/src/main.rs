//! Bazaar API server binary.
//!
//! Chooses storage and cache backends from configuration, seeds default
//! roles, starts the refresh-token cleanup job and serves the HTTP API until
//! Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use bazaar_api::config::ApiConfig;
use bazaar_api::{AppState, Backends};
use bazaar_core::auth::external::HttpExternalAuth;
use bazaar_core::cache::DistributedCache;
use bazaar_core::cache::memory::MemoryCache;
use bazaar_core::cache::redis::RedisCache;
use bazaar_core::events::{EventDispatcher, LoggingEventHandler};
use bazaar_core::jobs::{RefreshTokenCleanupJob, spawn_job};
use bazaar_core::notifications::{
    EmailSender, LogEmailSender, LogSmsSender, SendGridEmailSender, SinchSmsSender, SmsSender,
    SmtpEmailSender,
};
use bazaar_core::store::Database;
use bazaar_core::store::memory::MemoryDatabase;
use bazaar_core::store::postgres::PgDatabase;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments. Flags override the environment.
#[derive(Parser, Debug)]
#[command(name = "bazaar_server", about = "Bazaar API server")]
struct Args {
    /// Address to listen on.
    #[arg(long)]
    bind: Option<String>,

    /// PostgreSQL connection URL. Without one the in-memory store is used.
    #[arg(long)]
    database_url: Option<String>,

    /// Redis URL for the authorization cache.
    #[arg(long)]
    redis_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bazaar_api=debug,bazaar_core=debug".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.database_url.is_some() {
        config.database_url = args.database_url;
    }
    if args.redis_url.is_some() {
        config.redis_url = args.redis_url;
    }

    info!(bind = %config.bind_addr, "starting bazaar_server");

    let db = open_database(&config, args.max_connections).await?;
    bazaar_core::seed::seed_defaults(db.as_ref()).await?;

    let http = reqwest::Client::new();
    let backends = Backends {
        db,
        cache: open_cache(&config).await,
        email: email_sender(&config, &http)?,
        sms: sms_sender(&config, &http),
        external: Arc::new(HttpExternalAuth::new(http.clone(), config.external.clone())),
        events: EventDispatcher::new().with_handler(Arc::new(LoggingEventHandler)),
    };
    let cleanup_interval = config.token_cleanup_interval;
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, backends);

    let shutdown = CancellationToken::new();
    let cleanup = spawn_job(
        Arc::new(RefreshTokenCleanupJob::new(state.refresh_tokens.clone())),
        cleanup_interval,
        shutdown.clone(),
    );

    let app = bazaar_api::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => {
                warn!(error = %e, "cannot listen for ctrl-c, running until killed");
                std::future::pending::<()>().await;
            }
        }
    })
    .await;

    shutdown.cancel();
    let _ = cleanup.await;
    result?;
    Ok(())
}

async fn open_database(
    config: &ApiConfig,
    max_connections: u32,
) -> Result<Arc<dyn Database>, Box<dyn std::error::Error>> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set, using the in-memory store");
        return Ok(Arc::new(MemoryDatabase::new()));
    };
    info!(max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(url)
        .await?;

    info!("running database migrations");
    bazaar_core::migrate::migrate(&pool).await?;
    Ok(Arc::new(PgDatabase::new(pool)))
}

/// Redis when configured and reachable, else process memory.
async fn open_cache(config: &ApiConfig) -> Arc<dyn DistributedCache> {
    if let Some(url) = config.redis_url.as_deref() {
        match RedisCache::connect(url).await {
            Ok(cache) => {
                info!("using redis cache");
                return Arc::new(cache.with_prefix("bazaar:"));
            }
            Err(e) => warn!(error = %e, "redis unavailable, falling back to the in-memory cache"),
        }
    }
    Arc::new(MemoryCache::new())
}

fn email_sender(
    config: &ApiConfig,
    http: &reqwest::Client,
) -> Result<Arc<dyn EmailSender>, Box<dyn std::error::Error>> {
    if let Some(smtp) = &config.smtp {
        info!(host = %smtp.host, "email via SMTP");
        return Ok(Arc::new(SmtpEmailSender::new(smtp)?));
    }
    if let Some(sendgrid) = &config.sendgrid {
        info!("email via SendGrid");
        return Ok(Arc::new(SendGridEmailSender::new(http.clone(), sendgrid.clone())));
    }
    warn!("no email transport configured, emails are only logged");
    Ok(Arc::new(LogEmailSender))
}

fn sms_sender(config: &ApiConfig, http: &reqwest::Client) -> Arc<dyn SmsSender> {
    match &config.sinch {
        Some(sinch) => {
            info!("SMS via Sinch");
            Arc::new(SinchSmsSender::new(http.clone(), sinch.clone()))
        }
        None => {
            warn!("no SMS transport configured, messages are only logged");
            Arc::new(LogSmsSender)
        }
    }
}
