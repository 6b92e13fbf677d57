use std::collections::HashMap;
use thiserror::Error;

use crate::domain::JobConfig;

/// Process configuration, read once at startup.
///
/// Job thresholds and point rates are NOT here on purpose: they are
/// snapshotted into each job row at creation (see [`JobConfig`]), so
/// changing process defaults never rewrites history.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub keepa_api_url: String,
    pub keepa_api_key: String,
    pub sp_api_base_url: String,
    pub sp_api_access_token: String,
    pub sp_api_marketplace_id: String,
    pub sp_api_seller_id: String,
    pub rakuten_api_url: String,
    pub rakuten_app_id: String,
    pub cache_ttl_seconds: i64,
    pub rate_limit_keepa: f64,
    pub rate_limit_sp_api: f64,
    pub rate_limit_rakuten: f64,
    pub pipeline_concurrency: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |name: &str| {
            env_map
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
        };
        let with_default =
            |name: &str, default: &str| env_map.get(name).cloned().unwrap_or_else(|| default.to_string());

        let port = with_default("PORT", "8080").parse::<u16>().map_err(|_| {
            ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
        })?;

        let cache_ttl_seconds = with_default("CACHE_TTL_SECONDS", "86400")
            .parse::<i64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "CACHE_TTL_SECONDS".to_string(),
                    "must be a valid i64".to_string(),
                )
            })?;

        let parse_rate = |name: &str, default: &str| {
            with_default(name, default).parse::<f64>().map_err(|_| {
                ConfigError::InvalidValue(name.to_string(), "must be a valid f64".to_string())
            })
        };

        let pipeline_concurrency = with_default("PIPELINE_CONCURRENCY", "4")
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PIPELINE_CONCURRENCY".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path: required("DATABASE_PATH")?,
            keepa_api_url: with_default("KEEPA_API_URL", "https://api.keepa.com"),
            keepa_api_key: required("KEEPA_API_KEY")?,
            sp_api_base_url: with_default(
                "SP_API_BASE_URL",
                "https://sellingpartnerapi-fe.amazon.com",
            ),
            sp_api_access_token: required("SP_API_ACCESS_TOKEN")?,
            // amazon.co.jp
            sp_api_marketplace_id: with_default("SP_API_MARKETPLACE_ID", "A1VC38T7YXB528"),
            sp_api_seller_id: with_default("SP_API_SELLER_ID", ""),
            rakuten_api_url: with_default("RAKUTEN_API_URL", "https://app.rakuten.co.jp"),
            rakuten_app_id: required("RAKUTEN_APP_ID")?,
            cache_ttl_seconds,
            rate_limit_keepa: parse_rate("RATE_LIMIT_KEEPA", "0.5")?,
            rate_limit_sp_api: parse_rate("RATE_LIMIT_SP_API", "1.0")?,
            rate_limit_rakuten: parse_rate("RATE_LIMIT_RAKUTEN", "1.0")?,
            pipeline_concurrency,
        })
    }

    /// Defaults applied when a create-job request leaves thresholds or
    /// point rates unset.
    pub fn default_job_config(&self) -> JobConfig {
        JobConfig::default()
    }
}
