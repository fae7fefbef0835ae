// src/batch.rs
//! Dated batch files: naming, date parsing, and JSON read/write helpers.
//!
//! A batch is a JSON array of [`Article`]s named `events_<slug>_<YYYY-MM-DD>.json`.
//! The date is parsed back from the name by later stages and the archiver;
//! both `YYYY-MM-DD` and `YYYY_MM_DD` are accepted.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::article::Article;

pub const BATCH_PREFIX: &str = "events_";
pub const BATCH_EXT: &str = ".json";

/// Filesystem-safe slug: lowercase, whitespace and `/` become `_`, quotes dropped.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars() {
        match c {
            '"' | '\'' => {}
            c if c.is_whitespace() || c == '/' || c == '\\' => out.push('_'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => out.extend(c.to_lowercase()),
            _ => {}
        }
    }
    out
}

/// `events_<slug>_<YYYY-MM-DD>.json`, or `events_<YYYY-MM-DD>.json` when the slug is empty.
pub fn batch_file_name(query: &str, date: NaiveDate) -> String {
    let slug = slugify(query);
    let day = date.format("%Y-%m-%d");
    if slug.is_empty() {
        format!("{BATCH_PREFIX}{day}{BATCH_EXT}")
    } else {
        format!("{BATCH_PREFIX}{slug}_{day}{BATCH_EXT}")
    }
}

pub fn is_batch_file_name(name: &str) -> bool {
    name.starts_with(BATCH_PREFIX) && name.ends_with(BATCH_EXT)
}

/// Date embedded at the end of a batch file name.
pub fn parse_batch_date(file_name: &str) -> Option<NaiveDate> {
    static RE_DATE: OnceCell<Regex> = OnceCell::new();
    let re = RE_DATE.get_or_init(|| {
        Regex::new(r"(?:^|_)(\d{4})([-_])(\d{2})([-_])(\d{2})\.json$").expect("batch date regex")
    });
    let caps = re.captures(file_name)?;
    // Separators must agree: 2024-01_01 is not a date we wrote.
    if caps[2] != caps[4] {
        return None;
    }
    let y = caps[1].parse().ok()?;
    let m = caps[3].parse().ok()?;
    let d = caps[5].parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

/// Query slug of a batch file name (`events_prophecy_2024-01-01.json` → `prophecy`).
pub fn batch_slug(file_name: &str) -> Option<String> {
    parse_batch_date(file_name)?;
    let stem = file_name.strip_prefix(BATCH_PREFIX)?.strip_suffix(BATCH_EXT)?;
    // date is always the trailing 10 chars
    let head = stem.get(..stem.len().checked_sub(10)?)?;
    Some(head.trim_end_matches('_').to_string())
}

/// All batch files in `dir` with a parseable date, oldest first.
pub fn list_batches(dir: &Path) -> Vec<(NaiveDate, PathBuf)> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return out;
    };
    for e in entries.flatten() {
        let name = e.file_name().to_string_lossy().to_string();
        if !is_batch_file_name(&name) {
            continue;
        }
        if let Some(date) = parse_batch_date(&name) {
            out.push((date, e.path()));
        }
    }
    out.sort();
    out
}

/// Newest batch in `dir` (by parsed date, then name).
pub fn latest_batch(dir: &Path) -> Option<PathBuf> {
    list_batches(dir).pop().map(|(_, p)| p)
}

/// Read a batch. Missing or corrupt files are logged and read as empty.
pub fn read_batch(path: &Path) -> Vec<Article> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(target: "pipeline", path = %path.display(), error = %e, "batch unreadable; treating as empty");
            return Vec::new();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!(target: "pipeline", path = %path.display(), error = %e, "batch malformed; treating as empty");
            Vec::new()
        }
    }
}

pub fn write_batch(path: &Path, articles: &[Article]) -> Result<()> {
    write_json_atomic(path, &articles)
}

/// Write pretty JSON to a temp file next to `path`, then rename over it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }
    let body = serde_json::to_vec_pretty(value).context("serializing json")?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
    Ok(())
}
