//! Configuration loader and validator for the storefront admin client.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::wizard::currency::{is_currency_code, CurrencyTable};

/// Environment variable that overrides `api.token` when set.
pub const TOKEN_ENV: &str = "STOREFRONT_API_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub api: Api,
    pub currency: Currency,
}

/// Client behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub search_debounce_ms: u64,
    pub page_size: u32,
}

/// Admin REST endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    pub token: String,
    pub tenant: String,
}

/// Base currency and conversion rates (units of base per one unit of the keyed currency).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Currency {
    pub base: String,
    #[serde(default)]
    pub rates: BTreeMap<String, f64>,
}

impl App {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

impl Config {
    /// Conversion table built from the `currency` section.
    pub fn currency_table(&self) -> CurrencyTable {
        CurrencyTable::new(
            self.currency.base.clone(),
            self.currency
                .rates
                .iter()
                .map(|(code, rate)| (code.clone(), *rate)),
        )
    }

    /// Parsed `api.base_url`, normalized to end with a slash so relative joins keep the prefix.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.api.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|_| ConfigError::Invalid("api.base_url must be an absolute URL"))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - `STOREFRONT_API_TOKEN` replaces `api.token` when present.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            cfg.api.token = token;
        }
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.request_timeout_ms == 0 {
        return Err(ConfigError::Invalid("app.request_timeout_ms must be > 0"));
    }
    if cfg.app.page_size == 0 || cfg.app.page_size > 500 {
        return Err(ConfigError::Invalid("app.page_size must be within 1..=500"));
    }

    let url = cfg.base_url()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Invalid("api.base_url must use http or https"));
    }
    if cfg.api.token.trim().is_empty() {
        return Err(ConfigError::Invalid("api.token must be non-empty"));
    }
    if cfg.api.tenant.trim().is_empty() {
        return Err(ConfigError::Invalid("api.tenant must be non-empty"));
    }

    if !is_currency_code(&cfg.currency.base) {
        return Err(ConfigError::Invalid("currency.base must be a 3-letter ISO code"));
    }
    for (code, rate) in &cfg.currency.rates {
        if !is_currency_code(code) {
            return Err(ConfigError::Invalid("currency.rates keys must be 3-letter ISO codes"));
        }
        if !rate.is_finite() || *rate <= 0.0 {
            return Err(ConfigError::Invalid("currency.rates values must be > 0"));
        }
    }

    Ok(())
}

/// Returns the example YAML shipped with the binary.
pub fn example() -> &'static str {
    r#"app:
  request_timeout_ms: 10000
  search_debounce_ms: 250
  page_size: 25

api:
  base_url: "https://admin.example.com/api/v1/"
  token: "YOUR_ADMIN_API_TOKEN"
  tenant: "acme-store"

currency:
  base: "USD"
  rates:
    EUR: 1.08
    GBP: 1.27
    PKR: 0.0036
"#
}
