// src/categorize.rs
//! Coarse topical tagging of articles (wars, disasters, crime, ...).
//!
//! - Keyword table is built in and can be overridden from TOML.
//! - Matching uses the same whole-word policy as the symbol decoder, so
//!   "war" no longer tags a story about a "warranty".
//! - An article always gets at least one category: `general` is the fallback.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::article::Article;
use crate::batch::{read_batch, write_batch};
use crate::matcher::{compile_terms, normalize_for_matching, CompiledTerm};

pub const DEFAULT_CATEGORIES_PATH: &str = "config/categories.toml";
pub const ENV_CATEGORIES_PATH: &str = "CATEGORIES_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    WarsConflicts,
    NaturalDisasters,
    Economic,
    Crime,
    Politics,
    Health,
    SocialMorality,
    General,
}

impl Category {
    /// Keyword-bearing categories in reporting order (`General` is the fallback only).
    pub const TAGGED: [Category; 7] = [
        Category::WarsConflicts,
        Category::NaturalDisasters,
        Category::Economic,
        Category::Crime,
        Category::Politics,
        Category::Health,
        Category::SocialMorality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::WarsConflicts => "wars_conflicts",
            Category::NaturalDisasters => "natural_disasters",
            Category::Economic => "economic",
            Category::Crime => "crime",
            Category::Politics => "politics",
            Category::Health => "health",
            Category::SocialMorality => "social_morality",
            Category::General => "general",
        }
    }
}

#[derive(Debug, Deserialize)]
struct CategoriesFile {
    keywords: BTreeMap<Category, Vec<String>>,
}

#[derive(Debug)]
pub struct Categorizer {
    table: Vec<(Category, Vec<CompiledTerm>)>,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::from_table(default_table())
    }
}

impl Categorizer {
    fn from_table(table: BTreeMap<Category, Vec<String>>) -> Self {
        let table = Category::TAGGED
            .iter()
            .filter_map(|cat| {
                let words = table.get(cat)?;
                let terms = compile_terms(words.iter().map(String::as_str));
                (!terms.is_empty()).then_some((*cat, terms))
            })
            .collect();
        Self { table }
    }

    /// Parse a `[keywords]` table, e.g. `wars_conflicts = ["war", "missile"]`.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: CategoriesFile = toml::from_str(s).context("parsing categories toml")?;
        Ok(Self::from_table(file.keywords))
    }

    /// Load from a TOML file; falls back to the built-in table on any error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|s| Self::from_toml_str(&s))
        {
            Ok(c) => {
                info!(target: "categorize", path = %path.display(), "category table loaded");
                c
            }
            Err(e) => {
                warn!(target: "categorize", path = %path.display(), error = %e, "using built-in category table");
                Self::default()
            }
        }
    }

    /// `$CATEGORIES_PATH`, then `config/categories.toml`, then the built-in table.
    pub fn from_env() -> Self {
        let path = std::env::var(ENV_CATEGORIES_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CATEGORIES_PATH));
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Self::default()
        }
    }

    /// Categories for free text. Never empty.
    pub fn categorize_text(&self, text: &str) -> Vec<Category> {
        let norm = normalize_for_matching(text);
        let mut out: Vec<Category> = self
            .table
            .iter()
            .filter(|(_, terms)| terms.iter().any(|t| t.is_match(&norm)))
            .map(|(cat, _)| *cat)
            .collect();
        if out.is_empty() {
            out.push(Category::General);
        }
        out
    }

    /// Categories for an article's headline + description. Never empty.
    pub fn categorize(&self, article: &Article) -> Vec<Category> {
        self.categorize_text(&article.summary_text())
    }

    /// Pipeline stage: tag every article of `input` and write the batch to `output`.
    /// A missing or corrupt input is treated as an empty batch.
    pub fn categorize_file(&self, input: &Path, output: &Path) -> Result<usize> {
        let mut articles = read_batch(input);
        for a in articles.iter_mut() {
            a.categories = Some(self.categorize(a));
        }
        write_batch(output, &articles)?;
        info!(
            target: "categorize",
            count = articles.len(),
            output = %output.display(),
            "tagged batch"
        );
        Ok(articles.len())
    }
}

/// Built-in keyword table. Inflected forms are listed explicitly because
/// matching is whole-word.
pub fn default_table() -> BTreeMap<Category, Vec<String>> {
    let raw: [(Category, &[&str]); 7] = [
        (
            Category::WarsConflicts,
            &[
                "war", "wars", "conflict", "conflicts", "strike", "strikes", "airstrike",
                "airstrikes", "bomb", "bombs", "bombing", "attack", "attacks", "missile",
                "missiles",
            ],
        ),
        (
            Category::NaturalDisasters,
            &[
                "earthquake", "earthquakes", "flood", "floods", "flooding", "wildfire",
                "wildfires", "eruption", "eruptions", "tsunami", "tsunamis", "hurricane",
                "hurricanes",
            ],
        ),
        (
            Category::Economic,
            &[
                "inflation", "recession", "crash", "unemployment", "foreclosure",
                "foreclosures",
            ],
        ),
        (
            Category::Crime,
            &[
                "shooting", "shootings", "murder", "murders", "serial killer", "rape",
                "abduction", "abductions",
            ],
        ),
        (
            Category::Politics,
            &["coup", "impeachment", "corruption", "resignation"],
        ),
        (
            Category::Health,
            &[
                "outbreak", "outbreaks", "virus", "pandemic", "epidemic", "ebola", "covid",
            ],
        ),
        (
            Category::SocialMorality,
            &[
                "lgbt", "scandal", "scandals", "hypocrisy", "child abuse", "drag queen",
                "drag queens", "abortion",
            ],
        ),
    ];
    raw.into_iter()
        .map(|(cat, words)| (cat, words.iter().map(|w| w.to_string()).collect()))
        .collect()
}
