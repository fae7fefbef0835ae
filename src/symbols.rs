// src/symbols.rs
//! Symbol dictionary: the static, hand-curated mapping from symbolic terms
//! ("666", "beast", ...) to keywords, scripture references and commentary.
//!
//! - Loaded once at startup and never mutated afterwards.
//! - Two file layouts are accepted (object keyed by name, or a `symbols` list).
//! - A missing or malformed file yields an empty dictionary; every decode then
//!   degrades to "no symbolic meaning detected".

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_SYMBOLS_PATH: &str = "config/symbols.json";
pub const ENV_SYMBOLS_PATH: &str = "SYMBOLS_PATH";

/// Metadata attached to one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    /// Alternate spellings / phrases that indicate this symbol.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Scripture references, e.g. "Revelation 13:18".
    #[serde(default, alias = "verses", alias = "references")]
    pub scriptures: Vec<String>,
    /// Interpretive commentary.
    #[serde(default, alias = "interpretation", alias = "description")]
    pub meaning: String,
    /// Any other curated fields; echoed back untouched in decode output.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Ordered, read-only symbol dictionary (iteration order = file order).
#[derive(Debug, Clone, Default)]
pub struct SymbolDictionary {
    entries: Vec<(String, Symbol)>,
}

impl SymbolDictionary {
    pub fn from_entries(entries: Vec<(String, Symbol)>) -> Self {
        Self { entries }
    }

    /// Load from `path`. Never fails: a missing or malformed file is logged
    /// and produces an empty dictionary.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(target: "decoder", path = %path.display(), error = %e, "symbol dictionary unreadable; using empty dictionary");
                return Self::default();
            }
        };
        match Self::from_json_str(&content) {
            Ok(dict) => {
                info!(target: "decoder", path = %path.display(), symbols = dict.len(), "symbol dictionary loaded");
                dict
            }
            Err(e) => {
                warn!(target: "decoder", path = %path.display(), error = ?e, "symbol dictionary malformed; using empty dictionary");
                Self::default()
            }
        }
    }

    /// Resolve `$SYMBOLS_PATH` or fall back to `config/symbols.json`.
    pub fn from_env() -> Self {
        let path = std::env::var(ENV_SYMBOLS_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SYMBOLS_PATH));
        Self::load(path)
    }

    /// Strict parse. Accepts
    /// `{ "<name>": { ... } }` or `{ "symbols": [ { "symbol": "<name>", ... } ] }`.
    /// Individual entries that are not objects (or fail to parse) are skipped.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(s).context("parsing symbol dictionary json")?;
        let obj = root
            .as_object()
            .ok_or_else(|| anyhow!("symbol dictionary must be a JSON object"))?;

        let mut entries: Vec<(String, Symbol)> = Vec::new();
        match obj.get("symbols") {
            Some(Value::Array(list)) => {
                for item in list {
                    let Some(fields) = item.as_object() else {
                        continue;
                    };
                    let name = fields
                        .get("symbol")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .unwrap_or_default();
                    if name.is_empty() {
                        warn!(target: "decoder", "symbol entry without a name skipped");
                        continue;
                    }
                    if entries.iter().any(|(n, _)| n == name) {
                        warn!(target: "decoder", symbol = name, "duplicate symbol entry skipped");
                        continue;
                    }
                    if let Some(mut sym) = parse_symbol(name, item) {
                        sym.extra.remove("symbol");
                        entries.push((name.to_string(), sym));
                    }
                }
            }
            _ => {
                for (name, item) in obj {
                    if !item.is_object() {
                        continue;
                    }
                    if let Some(sym) = parse_symbol(name, item) {
                        entries.push((name.clone(), sym));
                    }
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }
}

fn parse_symbol(name: &str, item: &Value) -> Option<Symbol> {
    match serde_json::from_value::<Symbol>(item.clone()) {
        Ok(sym) => Some(sym),
        Err(e) => {
            warn!(target: "decoder", symbol = name, error = %e, "symbol entry malformed; skipped");
            None
        }
    }
}
