// src/decoder.rs
//! Symbol decoder: scans free text for the keywords of every symbol in the
//! dictionary and reports each matching symbol once, in dictionary order.

use metrics::counter;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::debug;

use crate::matcher::{compile_terms, normalize_for_matching, CompiledTerm};
use crate::symbols::{Symbol, SymbolDictionary};

/// Message carried by the single "no match" entry.
pub const NO_MATCH_MESSAGE: &str = "No symbolic meaning detected in this prophecy.";

/// One symbol found in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMatch {
    pub name: String,
    pub symbol: Symbol,
    /// The candidate term that triggered the match (a keyword or the name itself).
    pub term: String,
}

/// An entry of the decoded sequence. `NoMatch` only ever appears alone.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEntry {
    Symbol(SymbolMatch),
    NoMatch,
}

// Wire shape: `{"<name>": {metadata}}` or `{"message": "..."}`.
impl Serialize for DecodedEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            DecodedEntry::Symbol(m) => map.serialize_entry(&m.name, &m.symbol)?,
            DecodedEntry::NoMatch => map.serialize_entry("message", NO_MATCH_MESSAGE)?,
        }
        map.end()
    }
}

/// Result of [`Decoder::decode`]. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeResult {
    pub decoded: Vec<DecodedEntry>,
}

impl DecodeResult {
    fn from_matches(matches: Vec<SymbolMatch>) -> Self {
        if matches.is_empty() {
            return Self {
                decoded: vec![DecodedEntry::NoMatch],
            };
        }
        Self {
            decoded: matches.into_iter().map(DecodedEntry::Symbol).collect(),
        }
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self.decoded.as_slice(), [DecodedEntry::NoMatch])
    }

    pub fn matches(&self) -> impl Iterator<Item = &SymbolMatch> {
        self.decoded.iter().filter_map(|e| match e {
            DecodedEntry::Symbol(m) => Some(m),
            DecodedEntry::NoMatch => None,
        })
    }

    pub fn symbol_names(&self) -> Vec<&str> {
        self.matches().map(|m| m.name.as_str()).collect()
    }
}

#[derive(Debug)]
struct CompiledSymbol {
    name: String,
    symbol: Symbol,
    terms: Vec<CompiledTerm>,
}

/// Holds the compiled dictionary. Immutable after construction; share it
/// behind an `Arc` between request handlers.
#[derive(Debug, Default)]
pub struct Decoder {
    symbols: Vec<CompiledSymbol>,
}

impl Decoder {
    pub fn new(dict: SymbolDictionary) -> Self {
        let symbols = dict
            .iter()
            .map(|(name, sym)| {
                let candidates = sym
                    .keywords
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(name));
                CompiledSymbol {
                    name: name.to_string(),
                    symbol: sym.clone(),
                    terms: compile_terms(candidates),
                }
            })
            .collect();
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.name.clone()).collect()
    }

    /// The dictionary this decoder was built from, in file order.
    pub fn dictionary(&self) -> SymbolDictionary {
        SymbolDictionary::from_entries(
            self.symbols
                .iter()
                .map(|s| (s.name.clone(), s.symbol.clone()))
                .collect(),
        )
    }

    /// Matching symbols without the sentinel; empty when nothing matched.
    pub fn find_matches(&self, text: &str) -> Vec<SymbolMatch> {
        let norm = normalize_for_matching(text);
        if norm.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        for cs in &self.symbols {
            // First hit wins; remaining candidates of this symbol are not checked.
            if let Some(hit) = cs.terms.iter().find(|t| t.is_match(&norm)) {
                out.push(SymbolMatch {
                    name: cs.name.clone(),
                    symbol: cs.symbol.clone(),
                    term: hit.term.clone(),
                });
            }
        }
        out
    }

    /// Decode `text`. Returns the single [`DecodedEntry::NoMatch`] entry when
    /// nothing matched (including empty input or an empty dictionary).
    pub fn decode(&self, text: &str) -> DecodeResult {
        let matches = self.find_matches(text);
        counter!("decode_calls_total").increment(1);
        if matches.is_empty() {
            counter!("decode_no_match_total").increment(1);
        }
        debug!(
            target: "decoder",
            id = %text_id(text),
            matched = ?matches.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            "decoded"
        );
        DecodeResult::from_matches(matches)
    }
}

/// Short anonymized id for log lines; raw user text is never logged.
pub(crate) fn text_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
