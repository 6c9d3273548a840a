use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::scrapers::types::SearchSpec;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_BASE_URL: &str = "https://www.carousell.sg/";
pub const DEFAULT_LISTINGS_PATH: &str = "carousell_listings.csv";
const FALLBACK_FILE_NAME: &str = "carousell_listings.csv";

const SEARCH_ITEMS_KEY: &str = "SEARCH_ITEMS";

fn default_max_listings() -> usize {
    48
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_listings_path() -> PathBuf {
    PathBuf::from(DEFAULT_LISTINGS_PATH)
}
fn default_poll_interval() -> u64 {
    3600
}
fn default_retry_backoff() -> u64 {
    60
}
fn default_liveness_check() -> u64 {
    60
}
fn default_render_timeout() -> u64 {
    45
}

/// Telegram chat ids are integers but may be written as strings
#[derive(Deserialize)]
#[serde(untagged)]
enum ChatId {
    Text(String),
    Number(i64),
}

fn chat_id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<ChatId>::deserialize(deserializer)?.map(|id| match id {
        ChatId::Text(text) => text,
        ChatId::Number(number) => number.to_string(),
    }))
}

/// Scraper configuration, read from a JSON document at startup
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    pub search_items: Vec<SearchSpec>,
    /// Cards processed per search per iteration
    #[serde(default = "default_max_listings", rename = "MAX_LISTINGS_TO_SCRAPE")]
    pub max_listings: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default, deserialize_with = "chat_id_text")]
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_listings_path")]
    pub listings_path: PathBuf,
    /// Defaults to `~/Desktop/carousell_listings.csv`
    #[serde(default)]
    pub fallback_listings_path: Option<PathBuf>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_liveness_check")]
    pub liveness_check_secs: u64,
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!(path = %path.display(), "Loading configuration...");
        let raw = read(path)?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!(
            searches = config.search_items.len(),
            max_listings = config.max_listings,
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_listings == 0 {
            return Err(ConfigError::Invalid(
                "MAX_LISTINGS_TO_SCRAPE must be at least 1".into(),
            ));
        }
        if self.liveness_check_secs == 0 {
            return Err(ConfigError::Invalid(
                "LIVENESS_CHECK_SECS must be at least 1".into(),
            ));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("BASE_URL {}: {e}", self.base_url)))?;
        if self.search_items.is_empty() {
            warn!("SEARCH_ITEMS is empty; iterations will do nothing");
        }
        Ok(())
    }

    /// Second write location for when the primary store is locked
    pub fn fallback_path(&self) -> Option<PathBuf> {
        self.fallback_listings_path
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join("Desktop").join(FALLBACK_FILE_NAME)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn liveness_check(&self) -> Duration {
        Duration::from_secs(self.liveness_check_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

/// Append a search to `SEARCH_ITEMS`, leaving every other key untouched
pub fn append_search_item(path: &Path, spec: &SearchSpec) -> Result<(), ConfigError> {
    let raw = read(path)?;
    let mut document: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    let root = document
        .as_object_mut()
        .ok_or_else(|| ConfigError::Invalid("configuration root must be an object".into()))?;
    let item = serde_json::to_value(spec).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    match root
        .entry(SEARCH_ITEMS_KEY)
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(items) => items.push(item),
        _ => {
            return Err(ConfigError::Invalid(format!(
                "{SEARCH_ITEMS_KEY} must be a list"
            )))
        }
    }

    let pretty = serde_json::to_string_pretty(&document).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, pretty).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}
