use std::env;

use thiserror::Error;

use crate::DEFAULT_PORT;

/// Process configuration, read from the environment once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Where queued songs are sent for retrieval.
    /// Dispatch is skipped entirely when unset.
    pub downloader_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required env variable: {0}")]
    Missing(&'static str),
    #[error("{0} must be a number")]
    InvalidPort(&'static str),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("MIXTAPE_SERVER_PORT") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidPort("MIXTAPE_SERVER_PORT"))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            database_url: must("MIXTAPE_DATABASE_URL")?,
            downloader_url: env::var("MIXTAPE_DOWNLOADER_URL").ok(),
        })
    }
}

fn must(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}
