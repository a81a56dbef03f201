use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;

use crate::archive::DEFAULT_ARCHIVE_CAPACITY;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::status::DEFAULT_CLEAR_DELAY;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:10000";
pub const DEFAULT_DATA_DIR: &str = ".webtextextract";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_AUTO_EXTRACT_DELAY: Duration = Duration::from_millis(1_500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend_url: String,
    pub data_dir: PathBuf,
    pub history_capacity: usize,
    pub archive_capacity: usize,
    pub request_timeout: Duration,
    pub status_clear_delay: Duration,
    pub auto_extract_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            archive_capacity: DEFAULT_ARCHIVE_CAPACITY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            status_clear_delay: DEFAULT_CLEAR_DELAY,
            auto_extract_delay: DEFAULT_AUTO_EXTRACT_DELAY,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = var("WEBTEXTEXTRACT_BACKEND_URL") {
            config.backend_url = url;
        }
        if let Some(dir) = var("WEBTEXTEXTRACT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = var("WEBTEXTEXTRACT_HISTORY_CAPACITY") {
            let capacity = raw.parse::<usize>().with_context(|| {
                format!("invalid WEBTEXTEXTRACT_HISTORY_CAPACITY={raw:?}. expected a positive integer")
            })?;
            if capacity == 0 {
                anyhow::bail!("WEBTEXTEXTRACT_HISTORY_CAPACITY must be >= 1");
            }
            config.history_capacity = capacity;
        }
        if let Some(raw) = var("WEBTEXTEXTRACT_REQUEST_TIMEOUT_SECS") {
            let secs = raw.parse::<u64>().with_context(|| {
                format!("invalid WEBTEXTEXTRACT_REQUEST_TIMEOUT_SECS={raw:?}. expected seconds")
            })?;
            if secs == 0 {
                anyhow::bail!("WEBTEXTEXTRACT_REQUEST_TIMEOUT_SECS must be >= 1");
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
