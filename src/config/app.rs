// src/config/app.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use crate::categorize::DEFAULT_CATEGORIES_PATH;
use crate::ingest::providers::newsapi::DEFAULT_ENDPOINT;
use crate::symbols::DEFAULT_SYMBOLS_PATH;

pub const DEFAULT_APP_CONFIG_PATH: &str = "config/app.toml";
pub const ENV_APP_CONFIG_PATH: &str = "APP_CONFIG_PATH";

fn default_query() -> String {
    "prophecy".to_string()
}
fn default_page_size() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    // NewsAPI free plan only serves page 1
    1
}
fn default_window_days() -> i64 {
    7
}
fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}
fn default_interval_secs() -> u64 {
    24 * 3600
}
fn default_cutoff_days() -> i64 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    /// "ENV" (or empty) means: read from NEWS_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Also run one search per dictionary symbol.
    #[serde(default)]
    pub by_symbols: bool,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            query: default_query(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            window_days: default_window_days(),
            endpoint: default_endpoint(),
            by_symbols: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub symbols: PathBuf,
    pub categories: PathBuf,
    pub events_dir: PathBuf,
    pub tagged_dir: PathBuf,
    pub decoded_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub state_dir: PathBuf,
    pub users_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            symbols: PathBuf::from(DEFAULT_SYMBOLS_PATH),
            categories: PathBuf::from(DEFAULT_CATEGORIES_PATH),
            events_dir: PathBuf::from("data/events"),
            tagged_dir: PathBuf::from("data/events_tagged"),
            decoded_dir: PathBuf::from("data/events_decoded"),
            archive_dir: PathBuf::from("data/archived"),
            state_dir: PathBuf::from("data/state"),
            users_dir: PathBuf::from("data/users"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Run the daily pipeline inside the server process.
    #[serde(default)]
    pub schedule: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_cutoff_days")]
    pub cutoff_days: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            schedule: false,
            interval_secs: default_interval_secs(),
            cutoff_days: default_cutoff_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    /// `$APP_CONFIG_PATH`, else `config/app.toml`; a missing file means defaults.
    /// Environment overrides are applied on top in both cases.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_APP_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_APP_CONFIG_PATH));
        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;

        // Sanitize
        cfg.news.page_size = cfg.news.page_size.clamp(1, 100);
        cfg.news.max_pages = cfg.news.max_pages.max(1);
        if cfg.news.window_days <= 0 {
            cfg.news.window_days = default_window_days();
        }
        if cfg.pipeline.interval_secs == 0 {
            cfg.pipeline.interval_secs = default_interval_secs();
        }
        Ok(cfg)
    }

    /// Env overrides, using the variable names the deployment already sets.
    pub fn apply_env(&mut self) {
        fn var(name: &str) -> Option<String> {
            env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        if let Some(v) = var("NEWS_QUERY") {
            self.news.query = v;
        }
        if let Some(n) = var("NEWS_PAGE_SIZE").and_then(|v| v.trim().parse::<u32>().ok()) {
            self.news.page_size = n.clamp(1, 100);
        }
        if let Some(n) = var("NEWS_MAX_PAGES").and_then(|v| v.trim().parse::<u32>().ok()) {
            self.news.max_pages = n.max(1);
        }
        if let Some(v) = var("EVENTS_DIR") {
            self.paths.events_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ARCHIVED_DIR") {
            self.paths.archive_dir = PathBuf::from(v);
        }
        if let Some(v) = var(crate::symbols::ENV_SYMBOLS_PATH) {
            self.paths.symbols = PathBuf::from(v);
        }
        if let Some(v) = var(crate::categorize::ENV_CATEGORIES_PATH) {
            self.paths.categories = PathBuf::from(v);
        }
        if let Some(v) = var("PIPELINE_SCHEDULE") {
            self.pipeline.schedule = v == "1" || v.eq_ignore_ascii_case("true");
        }
    }

    /// Resolved news API key: the configured value, or NEWS_API_KEY when the
    /// config says "ENV" or leaves it blank.
    pub fn news_api_key(&self) -> Option<String> {
        let k = self.news.api_key.trim();
        if k.is_empty() || k.eq_ignore_ascii_case("env") {
            env::var("NEWS_API_KEY").ok().filter(|v| !v.trim().is_empty())
        } else {
            Some(k.to_string())
        }
    }
}
