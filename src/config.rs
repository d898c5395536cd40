use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Process configuration, loaded once at startup. Everything except the
/// account credentials has a sane default so a bare `.env` with two lines
/// is enough to run.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub username: String,
    pub password: String,
    pub base_url: String,
    pub gen_api_url: String,
    pub gen_api_key: Option<String>,
    pub gen_model: String,
    pub data_dir: PathBuf,
    pub images_dir: Option<PathBuf>,
    pub post_interval_secs: u64,
    pub feed_walk_pause_secs: u64,
    pub feed_limit: usize,
    pub headless: bool,
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn parsed<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(default),
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            username: required("BOT_USERNAME")?,
            password: required("BOT_PASSWORD")?,
            base_url: env::var("BOT_BASE_URL")
                .unwrap_or_else(|_| "https://www.instagram.com".to_string()),
            gen_api_url: env::var("GEN_API_URL")
                .unwrap_or_else(|_| "http://localhost:11434/api/generate".to_string()),
            gen_api_key: env::var("GEN_API_KEY").ok(),
            gen_model: env::var("GEN_MODEL").unwrap_or_else(|_| "qwen3:8b".to_string()),
            data_dir: PathBuf::from(
                env::var("BOT_DATA_DIR").unwrap_or_else(|_| "./bot_data".to_string()),
            ),
            images_dir: env::var("BOT_IMAGES_DIR").ok().map(PathBuf::from),
            post_interval_secs: parsed("POST_INTERVAL_SECS", 3600)?,
            feed_walk_pause_secs: parsed("FEED_WALK_PAUSE_SECS", 45)?,
            feed_limit: parsed("FEED_LIMIT", 5)?,
            headless: parsed("BOT_HEADLESS", true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test because the process env is shared across test threads.
    #[test]
    fn env_loading() {
        std::env::remove_var("BOT_USERNAME");
        std::env::remove_var("BOT_PASSWORD");
        let err = BotConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(_)));

        std::env::set_var("BOT_USERNAME", "feedbot");
        std::env::set_var("BOT_PASSWORD", "hunter2");
        std::env::remove_var("POST_INTERVAL_SECS");
        let cfg = BotConfig::from_env().unwrap();
        assert_eq!(cfg.post_interval_secs, 3600);
        assert_eq!(cfg.feed_limit, 5);
        assert!(cfg.headless);
        std::env::remove_var("BOT_USERNAME");
        std::env::remove_var("BOT_PASSWORD");
    }
}
