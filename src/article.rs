// src/article.rs
use serde::{Deserialize, Deserializer, Serialize};

use crate::categorize::Category;

/// One normalized news item as stored in the batch files.
///
/// Field names on disk follow the upstream API (`urlToImage`, `publishedAt`)
/// so batches written by earlier runs stay readable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headline: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub author: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(default, rename = "urlToImage", deserialize_with = "null_as_empty")]
    pub url_to_image: String,
    #[serde(default, rename = "publishedAt", deserialize_with = "null_as_empty")]
    pub published_at: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source_id: String,

    // Enrichment (categorizer / event decoder)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_symbols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_verses: Option<Vec<String>>,
}

// Upstream records (and older batch files) carry `null` for absent fields.
pub(crate) fn null_as_empty<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

impl Article {
    pub fn with_headline(headline: &str, description: &str) -> Self {
        Self {
            headline: headline.to_string(),
            description: description.to_string(),
            ..Self::default()
        }
    }

    /// Headline and description, the text the categorizer looks at.
    pub fn summary_text(&self) -> String {
        format!("{} {}", self.headline, self.description)
    }

    /// Headline, description and body, the text the event decoder looks at.
    pub fn full_text(&self) -> String {
        format!("{} {} {}", self.headline, self.description, self.content)
    }
}
