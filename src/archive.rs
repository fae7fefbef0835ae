// src/archive.rs
//! Moves dated batch files older than a cutoff from an active directory to
//! cold storage, recording each move in an append-only JSON log.

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::batch::{is_batch_file_name, parse_batch_date, write_json_atomic};

pub const ARCHIVE_LOG_FILE: &str = "archive_log.json";
pub const DEFAULT_CUTOFF_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLogEntry {
    pub filename: String,
    /// RFC 3339 / ISO-8601 timestamp of the move.
    pub archived_at: String,
}

#[derive(Debug, Clone)]
pub struct Archiver {
    active_dir: PathBuf,
    archive_dir: PathBuf,
    cutoff_days: i64,
}

impl Archiver {
    pub fn new(active_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            active_dir: active_dir.into(),
            archive_dir: archive_dir.into(),
            cutoff_days: DEFAULT_CUTOFF_DAYS,
        }
    }

    pub fn cutoff_days(mut self, days: i64) -> Self {
        self.cutoff_days = days.max(0);
        self
    }

    pub fn log_path(&self) -> PathBuf {
        self.archive_dir.join(ARCHIVE_LOG_FILE)
    }

    /// Archive every batch whose embedded date is more than `cutoff_days`
    /// before `today`. Returns the archived file names.
    ///
    /// Files with an unparseable date, or whose name already exists in the
    /// archive, stay where they are (logged).
    pub fn archive_old(&self, today: NaiveDate) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.active_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(target: "archive", dir = %self.active_dir.display(), "active directory missing; nothing to archive");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("reading active dir {}", self.active_dir.display())
                })
            }
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| is_batch_file_name(n))
            .collect();
        names.sort();

        let mut archived = Vec::new();
        for name in names {
            let Some(date) = parse_batch_date(&name) else {
                warn!(target: "archive", file = %name, "skipping file with invalid date");
                continue;
            };
            if (today - date).num_days() <= self.cutoff_days {
                continue;
            }

            let src = self.active_dir.join(&name);
            let dst = self.archive_dir.join(&name);
            if dst.exists() {
                warn!(target: "archive", file = %name, "already present in archive; left in place");
                continue;
            }
            move_file(&src, &dst)?;
            if let Err(e) = self.append_log(&name) {
                // an archived file must always have a log entry
                move_file(&dst, &src)
                    .with_context(|| format!("restoring {name} after log failure"))?;
                return Err(e).with_context(|| format!("logging archive of {name}"));
            }
            info!(target: "archive", file = %name, "archived");
            archived.push(name);
        }
        Ok(archived)
    }

    fn append_log(&self, filename: &str) -> Result<()> {
        let path = self.log_path();
        let mut log = read_archive_log(&self.archive_dir);
        log.push(ArchiveLogEntry {
            filename: filename.to_string(),
            archived_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        write_json_atomic(&path, &log)
    }
}

/// Entries of `<archive_dir>/archive_log.json`, oldest first. A missing or
/// corrupt log reads as empty.
pub fn read_archive_log(archive_dir: &Path) -> Vec<ArchiveLogEntry> {
    let path = archive_dir.join(ARCHIVE_LOG_FILE);
    let Ok(raw) = fs::read_to_string(&path) else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(target: "archive", path = %path.display(), error = %e, "archive log unreadable; starting a new one");
        Vec::new()
    })
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to)
                .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
            fs::remove_file(from).with_context(|| format!("removing {}", from.display()))?;
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("moving {} to {}", from.display(), to.display())),
    }
}
