//! Minimal framework config: token, API URL and log path only.
//! Loaded from the environment variables BOT_TOKEN, TELEGRAM_API_URL and LOG_FILE.

use anyhow::Result;
use std::env;

/// Minimal bot configuration (connectivity and logging only).
pub struct BotConfig {
    pub bot_token: String,
    pub api_url: Option<String>,
    pub log_file: Option<String>,
}

impl BotConfig {
    /// Loads from environment variables: BOT_TOKEN is required, TELEGRAM_API_URL and
    /// LOG_FILE are optional.
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").map_err(|_| anyhow::anyhow!("BOT_TOKEN not set"))?;
        let api_url = env::var("TELEGRAM_API_URL").ok();
        let log_file = env::var("LOG_FILE").ok();
        Ok(Self {
            bot_token,
            api_url,
            log_file,
        })
    }

    /// Builds from the given token, everything else unset.
    pub fn with_token(bot_token: String) -> Self {
        Self {
            bot_token,
            api_url: None,
            log_file: None,
        }
    }
}
