// src/ingest/mod.rs
pub mod providers;
pub mod types;

use anyhow::Result;
use chrono::NaiveDate;
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::article::Article;
use crate::batch::{batch_file_name, slugify, write_batch};
use crate::ingest::types::{DateWindow, NewsSource, PageOutcome, PageRequest, RawArticle};
use crate::symbols::{Symbol, SymbolDictionary};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 1;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_pages_total", "Pages fetched from the news source.");
        describe_counter!("ingest_articles_total", "Articles normalized from upstream.");
        describe_counter!(
            "ingest_provider_errors_total",
            "News source fetch/parse errors."
        );
        describe_counter!(
            "ingest_pagination_limit_total",
            "Runs stopped by the upstream pagination limit."
        );
        describe_histogram!("ingest_fetch_ms", "Page fetch time in milliseconds.");
    });
}

/// Normalize a text field: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Upstream record → stored article. Missing fields become `""`.
pub fn normalize_article(raw: RawArticle) -> Article {
    let text = |v: Option<String>| normalize_text(v.as_deref().unwrap_or_default());
    let plain = |v: Option<String>| v.unwrap_or_default().trim().to_string();
    let source = raw.source.unwrap_or_default();
    Article {
        headline: text(raw.title),
        description: text(raw.description),
        content: text(raw.content),
        author: text(raw.author),
        url: plain(raw.url),
        url_to_image: plain(raw.url_to_image),
        published_at: plain(raw.published_at),
        source: source.name,
        source_id: source.id,
        ..Article::default()
    }
}

/// Why the page loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Upstream returned an empty page.
    Exhausted,
    /// `max_pages` pages were read.
    MaxPages,
    /// Upstream refused the next page (free-tier limit).
    PaginationLimit,
    /// A request failed; earlier pages are kept.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub articles: Vec<Article>,
    pub pages: u32,
    pub stop: StopReason,
}

/// Paginated fetch + normalization over a [`NewsSource`].
#[derive(Clone)]
pub struct NewsIngestor {
    source: Arc<dyn NewsSource>,
    page_size: u32,
    max_pages: u32,
}

impl NewsIngestor {
    pub fn new(source: Arc<dyn NewsSource>) -> Self {
        Self {
            source,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn page_size(mut self, n: u32) -> Self {
        self.page_size = n.clamp(1, 100);
        self
    }

    pub fn max_pages(mut self, n: u32) -> Self {
        self.max_pages = n.max(1);
        self
    }

    /// Fetch up to `max_pages` pages for `query` within `window`.
    /// Never fails: errors stop the loop and whatever was collected is returned.
    pub async fn fetch(&self, query: &str, window: DateWindow) -> FetchOutcome {
        ensure_metrics_described();

        let mut articles = Vec::new();
        let mut pages = 0u32;
        let mut stop = StopReason::MaxPages;

        for page in 1..=self.max_pages {
            let req = PageRequest {
                query: query.to_string(),
                window,
                page,
                page_size: self.page_size,
            };
            tracing::info!(target: "ingest", page, query, source = self.source.name(), "fetching page");

            match self.source.fetch_page(&req).await {
                Ok(PageOutcome::Articles(raw)) => {
                    pages += 1;
                    counter!("ingest_pages_total").increment(1);
                    if raw.is_empty() {
                        stop = StopReason::Exhausted;
                        break;
                    }
                    counter!("ingest_articles_total").increment(raw.len() as u64);
                    articles.extend(raw.into_iter().map(normalize_article));
                }
                Ok(PageOutcome::PaginationLimit) => {
                    tracing::warn!(target: "ingest", page, "pagination limit reached (page > 1 requires paid plan)");
                    counter!("ingest_pagination_limit_total").increment(1);
                    stop = StopReason::PaginationLimit;
                    break;
                }
                Err(e) => {
                    tracing::error!(target: "ingest", page, error = ?e, source = self.source.name(), "page fetch failed");
                    counter!("ingest_provider_errors_total").increment(1);
                    stop = StopReason::Failed(format!("{e:#}"));
                    break;
                }
            }
        }

        if articles.is_empty() {
            tracing::warn!(target: "ingest", query, stop = ?stop, "no articles fetched");
        } else {
            tracing::info!(target: "ingest", query, count = articles.len(), pages, "fetch complete");
        }

        FetchOutcome {
            articles,
            pages,
            stop,
        }
    }

    /// One search per symbol (keywords OR-ed), saved as `events_<symbol-slug>_<date>.json`.
    /// Symbols without keywords and searches with no results are skipped.
    pub async fn fetch_for_symbols(
        &self,
        dict: &SymbolDictionary,
        window: DateWindow,
        dir: &Path,
        date: NaiveDate,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (name, sym) in dict.iter() {
            let Some(query) = symbol_query(sym) else {
                continue;
            };
            tracing::info!(target: "ingest", symbol = name, "searching for symbol");
            let out = self.fetch(&query, window).await;
            if out.articles.is_empty() {
                tracing::info!(target: "ingest", symbol = name, "no results");
                continue;
            }
            written.push(save_batch(dir, &slugify(name), date, &out.articles)?);
        }
        Ok(written)
    }
}

/// `kw1 OR "multi word"` search string for a symbol; `None` without keywords.
pub fn symbol_query(sym: &Symbol) -> Option<String> {
    let parts: Vec<String> = sym
        .keywords
        .iter()
        .map(|k| k.trim().replace('"', ""))
        .filter(|k| !k.is_empty())
        .map(|k| if k.contains(' ') { format!("\"{k}\"") } else { k })
        .collect();
    (!parts.is_empty()).then(|| parts.join(" OR "))
}

/// Persist a fetched batch to `dir/events_<slug>_<date>.json`.
pub fn save_batch(dir: &Path, query: &str, date: NaiveDate, articles: &[Article]) -> Result<PathBuf> {
    let path = dir.join(batch_file_name(query, date));
    write_batch(&path, articles)?;
    tracing::info!(target: "ingest", count = articles.len(), path = %path.display(), "saved batch");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::RawSource;

    #[test]
    fn normalize_text_strips_markup() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p> \u{201C}ok\u{201D} ";
        assert_eq!(normalize_text(s), "Hello, world \"ok\"");
    }

    #[test]
    fn normalize_article_defaults_missing_fields() {
        let raw = RawArticle {
            title: Some("Quake <b>hits</b>".into()),
            url: Some(" https://x.test/a ".into()),
            source: Some(RawSource {
                name: "Wire".into(),
                id: String::new(),
            }),
            ..RawArticle::default()
        };
        let a = normalize_article(raw);
        assert_eq!(a.headline, "Quake hits");
        assert_eq!(a.description, "");
        assert_eq!(a.author, "");
        assert_eq!(a.url, "https://x.test/a");
        assert_eq!(a.source, "Wire");
        assert!(a.categories.is_none());
    }

    #[test]
    fn symbol_query_quotes_phrases() {
        let sym = Symbol {
            keywords: vec!["microchip".into(), "mark of the beast".into(), " ".into()],
            ..Symbol::default()
        };
        assert_eq!(
            symbol_query(&sym).as_deref(),
            Some("microchip OR \"mark of the beast\"")
        );
        assert_eq!(symbol_query(&Symbol::default()), None);
    }
}
