//! Runtime configuration.
//!
//! Every setting has a default that matches the production services, and can
//! be overridden through environment variables (optionally loaded from a
//! `.env` file by the binary).

use std::{env, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

/// Default location of the session cache
pub const DEFAULT_CACHE_FILE: &str = "/var/tmp/tesla_cron.json";

/// Base URL of the SSO service issuing access tokens
const DEFAULT_AUTH_URL: &str = "https://auth.tesla.com";

/// Base URL of the owner API
const DEFAULT_API_URL: &str = "https://owner-api.teslamotors.com";

/// OAuth client ID registered for owner API access
const DEFAULT_CLIENT_ID: &str = "ownerapi";

/// Hourly day-ahead spot prices published by Energinet
const DEFAULT_PRICE_URL: &str = "https://api.energidataservice.dk/dataset/Elspotprices";

const DEFAULT_PRICE_AREA: &str = "DK2";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON file holding the SSO sessions, keyed by e-mail
    pub cache_file: PathBuf,
    pub auth_url: String,
    pub api_url: String,

    /// Signed-command proxy. Vehicle commands go here instead of `api_url` when set.
    pub proxy_url: Option<String>,
    pub client_id: String,

    /// Delay between polls while waiting for a vehicle to come online
    pub wake_interval: Duration,
    pub wake_attempts: u32,

    pub price_url: String,
    pub price_area: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            auth_url: DEFAULT_AUTH_URL.into(),
            api_url: DEFAULT_API_URL.into(),
            proxy_url: None,
            client_id: DEFAULT_CLIENT_ID.into(),
            wake_interval: Duration::from_secs(15),
            wake_attempts: 4,
            price_url: DEFAULT_PRICE_URL.into(),
            price_area: DEFAULT_PRICE_AREA.into(),
        }
    }
}

impl Config {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = lookup("TESLA_CACHE_FILE") {
            config.cache_file = PathBuf::from(path);
        }
        if let Some(url) = lookup("TESLA_AUTH_URL") {
            config.auth_url = trim_url(url);
        }
        if let Some(url) = lookup("TESLA_API_URL") {
            config.api_url = trim_url(url);
        }
        config.proxy_url = lookup("TESLA_PROXY_URL")
            .filter(|url| !url.is_empty())
            .map(trim_url);
        if let Some(client_id) = lookup("TESLA_CLIENT_ID") {
            config.client_id = client_id;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "TESLA_WAKE_INTERVAL_SECS")? {
            config.wake_interval = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, "TESLA_WAKE_ATTEMPTS")? {
            config.wake_attempts = attempts;
        }
        if let Some(url) = lookup("SPOT_PRICE_URL") {
            config.price_url = url;
        }
        if let Some(area) = lookup("SPOT_PRICE_AREA") {
            config.price_area = area;
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
