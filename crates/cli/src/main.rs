//! Process entry point: configuration, telemetry, store bootstrap, health
//! endpoint, polling loop, graceful shutdown.

use std::sync::Arc;

use {
    clap::Parser,
    secrecy::{ExposeSecret, Secret},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    sesh_bot::{DefaultBackends, SessionMachine},
    sesh_config::{Config, RateLimitSettings},
    sesh_ratelimit::{AttemptStore, RateLimiter, SqliteAttemptStore},
};

#[derive(Parser)]
#[command(name = "sesh", about = "Telegram string-session generator bot")]
struct Cli {
    /// Bot token from @BotFather.
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    /// Telegram user id of the operator.
    #[arg(long, env = "OWNER_ID")]
    owner_id: i64,

    /// SQLite database path for the rate-limit store.
    #[arg(long, env = "DATABASE_PATH", default_value = "sesh.db")]
    database_path: String,

    /// Gate flow entry through the rate limiter.
    #[arg(
        long,
        env = "RATE_LIMIT_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    rate_limit_enabled: bool,

    /// Session-generation attempts allowed per user per window.
    #[arg(long, env = "MAX_ATTEMPTS_PER_WINDOW", default_value_t = 5)]
    max_attempts: u32,

    /// Rate-limit window in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 3600)]
    window_secs: u64,

    /// Port for the /health endpoint.
    #[arg(long, env = "HEALTH_PORT", default_value_t = 8080)]
    health_port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            bot_token: Secret::new(self.bot_token),
            owner_id: self.owner_id,
            database_path: self.database_path,
            rate_limit: RateLimitSettings {
                enabled: self.rate_limit_enabled,
                max_attempts: self.max_attempts,
                window_secs: self.window_secs,
            },
            health_port: self.health_port,
        }
    }
}

fn init_telemetry(log_level: &str, json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli.log_level, cli.json_logs);

    info!(version = env!("CARGO_PKG_VERSION"), "sesh starting");

    let config = cli.into_config();
    config.validate()?;

    let limiter = build_limiter(&config).await;
    let machine = Arc::new(SessionMachine::new(
        limiter,
        Arc::new(DefaultBackends::new()),
    ));

    let bot = teloxide::Bot::new(config.bot_token.expose_secret());
    let cancel = sesh_bot::bot::start_polling(bot, Arc::clone(&machine), config.owner_id).await?;

    let health = tokio::spawn(sesh_web::serve(config.health_port, cancel.clone()));

    shutdown_signal(&cancel).await;
    info!("shutting down");
    cancel.cancel();
    let _ = health.await;
    Ok(())
}

/// SQLite is the primary attempt store; failing to open it degrades to
/// in-memory counting rather than refusing to start.
async fn build_limiter(config: &Config) -> RateLimiter {
    if !config.rate_limit.enabled {
        info!("rate limiting disabled");
        return RateLimiter::disabled();
    }

    let primary: Option<Arc<dyn AttemptStore>> = match open_store(&config.database_path).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, path = config.database_path, "could not open the attempt store, counting in memory only");
            None
        },
    };

    RateLimiter::new(
        primary,
        config.rate_limit.max_attempts,
        config.rate_limit.window_secs,
    )
}

async fn open_store(path: &str) -> anyhow::Result<SqliteAttemptStore> {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options).await?;
    SqliteAttemptStore::migrate(&pool).await?;
    Ok(SqliteAttemptStore::new(pool))
}

/// Wait for SIGINT/SIGTERM, or for the polling loop to stop on its own
/// (token conflict).
async fn shutdown_signal(cancel: &CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = terminate() => info!("received SIGTERM"),
        _ = cancel.cancelled() => {},
    }
}

async fn terminate() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(_) => std::future::pending::<()>().await,
        }
    }
    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}
