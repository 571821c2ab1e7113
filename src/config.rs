// Process configuration, read once at startup

use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::metrics::INDEXER_MAX_PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub indexer_url: String,
    pub dao_subgraph_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub sync_poll_interval: Duration,
    pub listing: ListingSettings,
}

/// Knobs the listing pipeline reads on every request.
#[derive(Debug, Clone)]
pub struct ListingSettings {
    /// Decimal exponent of the chain's token; base units / 10^decimals
    pub token_decimals: u32,
    pub request_timeout: Duration,
    pub default_page_limit: usize,
    pub max_page_limit: usize,
    pub indexer_page_size: usize,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            token_decimals: 18,
            request_timeout: Duration::from_millis(10_000),
            default_page_limit: 10,
            max_page_limit: 100,
            indexer_page_size: INDEXER_MAX_PAGE_SIZE,
        }
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} must be set in environment", name))
}

fn optional<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} is not valid: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = ListingSettings::default();
        let indexer_page_size: usize = optional("INDEXER_PAGE_SIZE", defaults.indexer_page_size)?;
        if indexer_page_size > INDEXER_MAX_PAGE_SIZE {
            warn!(
                "INDEXER_PAGE_SIZE {} exceeds the indexer maximum, using {}",
                indexer_page_size, INDEXER_MAX_PAGE_SIZE
            );
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            indexer_url: required("INDEXER_URL")?,
            dao_subgraph_url: required("DAO_SUBGRAPH_URL")?,
            port: optional("PORT", 4000)?,
            db_max_connections: optional("DB_MAX_CONNECTIONS", 5)?,
            sync_poll_interval: Duration::from_secs(optional("SYNC_POLL_INTERVAL_SECS", 5)?),
            listing: ListingSettings {
                token_decimals: optional("TOKEN_DECIMALS", defaults.token_decimals)?,
                request_timeout: Duration::from_millis(optional(
                    "REQUEST_TIMEOUT_MS",
                    defaults.request_timeout.as_millis() as u64,
                )?),
                default_page_limit: optional("DEFAULT_PAGE_LIMIT", defaults.default_page_limit)?,
                max_page_limit: optional("MAX_PAGE_LIMIT", defaults.max_page_limit)?,
                indexer_page_size: indexer_page_size.min(INDEXER_MAX_PAGE_SIZE),
            },
        })
    }
}
