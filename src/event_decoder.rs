// src/event_decoder.rs
//! Pipeline glue: runs the symbol decoder over each tagged article and
//! records the matched symbol slugs and their scripture references.

use anyhow::Result;
use std::path::Path;
use tracing::{debug, info};

use crate::article::Article;
use crate::batch::{read_batch, slugify, write_batch};
use crate::decoder::Decoder;

/// Tag used when no symbol matched (same fallback as the categorizer).
pub const GENERAL_SYMBOL: &str = "general";

/// Decode one article in place. Returns `false` when the article already
/// carries `matched_symbols` and was left untouched.
pub fn decode_event(decoder: &Decoder, article: &mut Article) -> bool {
    if article.matched_symbols.is_some() {
        return false;
    }

    let mut symbols: Vec<String> = Vec::new();
    let mut verses: Vec<String> = Vec::new();
    for m in decoder.find_matches(&article.full_text()) {
        let slug = slugify(&m.name);
        if !slug.is_empty() && !symbols.contains(&slug) {
            symbols.push(slug);
        }
        for v in m.symbol.scriptures {
            if !verses.contains(&v) {
                verses.push(v);
            }
        }
    }
    if symbols.is_empty() {
        symbols.push(GENERAL_SYMBOL.to_string());
    }

    debug!(target: "decoder", symbols = ?symbols, "event decoded");
    article.matched_symbols = Some(symbols);
    article.matched_verses = Some(verses);
    true
}

/// Pipeline stage: decode every article of `input` and write to `output`.
/// A missing or corrupt input is treated as an empty batch.
pub fn decode_file(decoder: &Decoder, input: &Path, output: &Path) -> Result<usize> {
    let mut articles = read_batch(input);
    let mut decoded = 0usize;
    for a in articles.iter_mut() {
        if decode_event(decoder, a) {
            decoded += 1;
        }
    }
    write_batch(output, &articles)?;
    info!(
        target: "decoder",
        total = articles.len(),
        decoded,
        output = %output.display(),
        "decoded batch"
    );
    Ok(articles.len())
}
