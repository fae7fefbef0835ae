// src/ingest/providers/newsapi.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::types::{NewsSource, PageOutcome, PageRequest, RawArticle};

pub const DEFAULT_ENDPOINT: &str = "https://newsapi.org/v2/everything";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

/// Map an upstream response to a page outcome.
///
/// - 426 Upgrade Required, or an error body saying the result cap was hit on
///   page > 1, is the free-tier pagination limit.
/// - Any other non-2xx, or `status: "error"`, is a failure.
pub fn classify_response(status: StatusCode, page: u32, body: &str) -> Result<PageOutcome> {
    if status == StatusCode::UPGRADE_REQUIRED {
        return Ok(PageOutcome::PaginationLimit);
    }

    let env: Option<Envelope> = serde_json::from_str(body).ok();
    let code = env.as_ref().and_then(|e| e.code.clone()).unwrap_or_default();
    if page > 1 && matches!(code.as_str(), "maximumResultsReached" | "parameterInvalid") {
        return Ok(PageOutcome::PaginationLimit);
    }

    if !status.is_success() {
        let msg = env
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| body.chars().take(200).collect());
        return Err(anyhow!("news api http {}: {}", status.as_u16(), msg));
    }

    let env = env.ok_or_else(|| anyhow!("news api returned non-json body"))?;
    if env.status.as_deref() == Some("error") {
        return Err(anyhow!(
            "news api error {}: {}",
            code,
            env.message.unwrap_or_default()
        ));
    }
    Ok(PageOutcome::Articles(env.articles))
}

/// NewsAPI.org `/v2/everything` client.
pub struct NewsApiSource {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl NewsApiSource {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("prophecy-decoder/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .context("building news http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl NewsSource for NewsApiSource {
    async fn fetch_page(&self, req: &PageRequest) -> Result<PageOutcome> {
        let t0 = std::time::Instant::now();
        let page = req.page.to_string();
        let page_size = req.page_size.to_string();
        let from = req.window.from_param();
        let to = req.window.to_param();
        let params = [
            ("apiKey", self.api_key.as_str()),
            ("q", req.query.as_str()),
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("sortBy", "publishedAt"),
            ("language", "en"),
            ("pageSize", page_size.as_str()),
            ("page", page.as_str()),
        ];

        let resp = match self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                counter!("ingest_provider_errors_total").increment(1);
                return Err(e).context("news api request");
            }
        };
        let status = resp.status();
        let body = resp.text().await.context("news api .text()")?;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_fetch_ms").record(ms);

        classify_response(status, req.page, &body)
    }

    fn name(&self) -> &'static str {
        "NewsAPI"
    }
}
