//! Runtime configuration for the sesh bot.
//!
//! Values are gathered by the binary (flags and environment) and validated
//! here before anything connects to the network.

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BOT_TOKEN is required")]
    MissingBotToken,

    #[error("OWNER_ID is required and must be non-zero")]
    MissingOwnerId,

    #[error("rate limit ceiling must be at least 1")]
    ZeroRateLimitCeiling,

    #[error("rate limit window must be at least 1 second")]
    ZeroRateLimitWindow,
}

/// Rate-limiting knobs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Whether flow entry is gated at all.
    pub enabled: bool,
    /// Attempts allowed per user per window.
    pub max_attempts: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            window_secs: 3600,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bot token from @BotFather.
    pub bot_token: Secret<String>,

    /// Telegram user id of the operator; conflict warnings go here.
    pub owner_id: i64,

    /// SQLite database path for the rate-limit store.
    pub database_path: String,

    pub rate_limit: RateLimitSettings,

    /// Port for the plain-HTTP health endpoint.
    pub health_port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("database_path", &self.database_path)
            .field("rate_limit", &self.rate_limit)
            .field("health_port", &self.health_port)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: Secret::new(String::new()),
            owner_id: 0,
            database_path: "sesh.db".to_string(),
            rate_limit: RateLimitSettings::default(),
            health_port: 8080,
        }
    }
}

impl Config {
    /// Check required fields and value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.expose_secret().is_empty() {
            return Err(ConfigError::MissingBotToken);
        }
        if self.owner_id == 0 {
            return Err(ConfigError::MissingOwnerId);
        }
        if self.rate_limit.max_attempts == 0 {
            return Err(ConfigError::ZeroRateLimitCeiling);
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::ZeroRateLimitWindow);
        }
        Ok(())
    }
}
