// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::article::null_as_empty;

/// Article record as returned by the upstream news API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawArticle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "urlToImage")]
    pub url_to_image: Option<String>,
    #[serde(default, rename = "publishedAt")]
    pub published_at: Option<String>,
    #[serde(default)]
    pub source: Option<RawSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawSource {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
}

/// Bounded publish-date window for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateWindow {
    /// `[now - days, now]`.
    pub fn trailing_days(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            from: now - Duration::days(days),
            to: now,
        }
    }

    pub fn from_param(&self) -> String {
        self.from.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    pub fn to_param(&self) -> String {
        self.to.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

/// One page request against a [`NewsSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: String,
    pub window: DateWindow,
    pub page: u32,
    pub page_size: u32,
}

/// What a page fetch produced. Hard failures are `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Articles(Vec<RawArticle>),
    /// Upstream refuses further pages (free-tier limit); not an error.
    PaginationLimit,
}

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_page(&self, req: &PageRequest) -> Result<PageOutcome>;
    fn name(&self) -> &'static str;
}
