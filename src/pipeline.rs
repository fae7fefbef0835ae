// src/pipeline.rs
//! Daily pipeline: ingest → categorize → decode → archive.
//!
//! Stages run strictly in order and the first failure stops the run. A lock
//! file keeps two runners from overlapping, and a `last_run` marker keeps the
//! pipeline to one successful run per day unless forced.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::archive::Archiver;
use crate::batch::latest_batch;
use crate::categorize::Categorizer;
use crate::config::AppConfig;
use crate::decoder::Decoder;
use crate::event_decoder::decode_file;
use crate::ingest::types::{DateWindow, NewsSource};
use crate::ingest::{save_batch, NewsIngestor, StopReason};

pub const LOCK_FILE: &str = "pipeline.lock";
pub const LAST_RUN_FILE: &str = "last_run";
/// A lock older than this is assumed to belong to a crashed run.
pub const STALE_LOCK_SECS: u64 = 6 * 3600;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline runs by outcome.");
        describe_histogram!("pipeline_stage_ms", "Stage wall time in milliseconds.");
        describe_gauge!(
            "pipeline_last_success_ts",
            "Unix time of the last completed pipeline run."
        );
    });
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub events_dir: PathBuf,
    pub tagged_dir: PathBuf,
    pub decoded_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub state_dir: PathBuf,
    pub query: String,
    pub window_days: i64,
    pub page_size: u32,
    pub max_pages: u32,
    pub by_symbols: bool,
    pub cutoff_days: i64,
}

impl PipelineConfig {
    pub fn from_app(cfg: &AppConfig) -> Self {
        Self {
            events_dir: cfg.paths.events_dir.clone(),
            tagged_dir: cfg.paths.tagged_dir.clone(),
            decoded_dir: cfg.paths.decoded_dir.clone(),
            archive_dir: cfg.paths.archive_dir.clone(),
            state_dir: cfg.paths.state_dir.clone(),
            query: cfg.news.query.clone(),
            window_days: cfg.news.window_days,
            page_size: cfg.news.page_size,
            max_pages: cfg.news.max_pages,
            by_symbols: cfg.news.by_symbols,
            cutoff_days: cfg.pipeline.cutoff_days,
        }
    }

    /// All directories under one root, as laid out by default.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            events_dir: root.join("events"),
            tagged_dir: root.join("events_tagged"),
            decoded_dir: root.join("events_decoded"),
            archive_dir: root.join("archived"),
            state_dir: root.join("state"),
            query: "prophecy".to_string(),
            window_days: 7,
            page_size: crate::ingest::DEFAULT_PAGE_SIZE,
            max_pages: crate::ingest::DEFAULT_MAX_PAGES,
            by_symbols: false,
            cutoff_days: crate::archive::DEFAULT_CUTOFF_DAYS,
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    pub fn last_run_path(&self) -> PathBuf {
        self.state_dir.join(LAST_RUN_FILE)
    }
}

/// Exclusive run lock backed by a file created with `create_new`.
/// The file is removed when the guard drops.
#[derive(Debug)]
pub struct PipelineLock {
    path: PathBuf,
}

impl PipelineLock {
    /// `Ok(None)` when another run holds the lock.
    pub fn acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        match Self::try_create(path) {
            Ok(lock) => Ok(Some(lock)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !is_stale(path) {
                    return Ok(None);
                }
                warn!(target: "pipeline", path = %path.display(), "removing stale pipeline lock");
                let _ = fs::remove_file(path);
                match Self::try_create(path) {
                    Ok(lock) => Ok(Some(lock)),
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
                    Err(e) => Err(e).with_context(|| format!("creating lock {}", path.display())),
                }
            }
            Err(e) => Err(e).with_context(|| format!("creating lock {}", path.display())),
        }
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;
        let _ = writeln!(f, "{} {}", std::process::id(), Utc::now().to_rfc3339());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PipelineLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(target: "pipeline", path = %self.path.display(), error = %e, "failed to remove pipeline lock");
        }
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age.as_secs() > STALE_LOCK_SECS)
}

/// Date of the last completed run, if any.
pub fn read_last_run(path: &Path) -> Option<NaiveDate> {
    let raw = fs::read_to_string(path).ok()?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn write_last_run(path: &Path, day: NaiveDate) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, format!("{}\n", day.format("%Y-%m-%d")))
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming onto {}", path.display()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    LockHeld,
    AlreadyRanToday,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub fetched: usize,
    pub stop: Option<StopReason>,
    pub ingested: Vec<PathBuf>,
    pub tagged: Vec<PathBuf>,
    pub decoded: Vec<PathBuf>,
    pub archived: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum PipelineReport {
    Completed(RunSummary),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Categorize,
    Decode,
    Archive,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Categorize => "categorize",
            Stage::Decode => "decode",
            Stage::Archive => "archive",
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ingest" | "fetch" => Ok(Stage::Ingest),
            "categorize" => Ok(Stage::Categorize),
            "decode" => Ok(Stage::Decode),
            "archive" => Ok(Stage::Archive),
            other => Err(anyhow!("unknown stage `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub fetched: usize,
    pub stop: Option<StopReason>,
    pub files: Vec<PathBuf>,
}

/// Fetch the configured query (and, if enabled, one query per symbol) and
/// save non-empty results as today's batches.
pub async fn ingest_stage(
    cfg: &PipelineConfig,
    source: Option<Arc<dyn NewsSource>>,
    decoder: &Decoder,
    today: NaiveDate,
) -> Result<IngestReport> {
    let source = source.ok_or_else(|| anyhow!("NEWS_API_KEY not set; cannot ingest"))?;
    let ingestor = NewsIngestor::new(source)
        .page_size(cfg.page_size)
        .max_pages(cfg.max_pages);
    let window = DateWindow::trailing_days(Utc::now(), cfg.window_days);

    let out = ingestor.fetch(&cfg.query, window).await;
    let mut report = IngestReport {
        fetched: out.articles.len(),
        stop: Some(out.stop),
        files: Vec::new(),
    };
    if out.articles.is_empty() {
        warn!(target: "ingest", query = %cfg.query, "no articles fetched; nothing to save");
    } else {
        report
            .files
            .push(save_batch(&cfg.events_dir, &cfg.query, today, &out.articles)?);
    }

    if cfg.by_symbols {
        let dict = decoder.dictionary();
        let files = ingestor
            .fetch_for_symbols(&dict, window, &cfg.events_dir, today)
            .await?;
        report.files.extend(files);
    }
    Ok(report)
}

fn output_for(input: &Path, dir: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .ok_or_else(|| anyhow!("batch path {} has no file name", input.display()))?;
    Ok(dir.join(name))
}

pub fn categorize_stage(
    cfg: &PipelineConfig,
    categorizer: &Categorizer,
    inputs: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    if inputs.is_empty() {
        info!(target: "pipeline", "no new batch to categorize");
    }
    let mut written = Vec::with_capacity(inputs.len());
    for input in inputs {
        let output = output_for(input, &cfg.tagged_dir)?;
        categorizer.categorize_file(input, &output)?;
        written.push(output);
    }
    Ok(written)
}

pub fn decode_stage(cfg: &PipelineConfig, decoder: &Decoder, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if inputs.is_empty() {
        info!(target: "pipeline", "no new batch to decode");
    }
    let mut written = Vec::with_capacity(inputs.len());
    for input in inputs {
        let output = output_for(input, &cfg.decoded_dir)?;
        decode_file(decoder, input, &output)?;
        written.push(output);
    }
    Ok(written)
}

/// Archive each stage directory into `<archive_dir>/<stage dir name>`.
pub fn archive_stage(cfg: &PipelineConfig, today: NaiveDate) -> Result<Vec<String>> {
    let mut archived = Vec::new();
    for dir in [&cfg.events_dir, &cfg.tagged_dir, &cfg.decoded_dir] {
        let sub = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "events".to_string());
        let moved = Archiver::new(dir.clone(), cfg.archive_dir.join(&sub))
            .cutoff_days(cfg.cutoff_days)
            .archive_old(today)?;
        archived.extend(moved.into_iter().map(|n| format!("{sub}/{n}")));
    }
    Ok(archived)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("stage task failed: {e}"))?
}

fn timed(stage: Stage, started: Instant) {
    histogram!("pipeline_stage_ms", "stage" => stage.as_str())
        .record(started.elapsed().as_secs_f64() * 1000.0);
}

/// Run every stage in order for `today`.
///
/// Returns `Skipped` without touching any data when the lock is held or the
/// pipeline already completed today (unless `force`). A failing stage aborts
/// the run and leaves `last_run` unchanged.
pub async fn run_pipeline(
    cfg: &PipelineConfig,
    decoder: Arc<Decoder>,
    categorizer: Arc<Categorizer>,
    source: Option<Arc<dyn NewsSource>>,
    today: NaiveDate,
    force: bool,
) -> Result<PipelineReport> {
    ensure_metrics_described();

    let Some(_lock) = PipelineLock::acquire(&cfg.lock_path())? else {
        warn!(target: "pipeline", "another run holds the pipeline lock; skipping");
        counter!("pipeline_runs_total", "outcome" => "skipped").increment(1);
        return Ok(PipelineReport::Skipped(SkipReason::LockHeld));
    };
    if !force && read_last_run(&cfg.last_run_path()) == Some(today) {
        info!(target: "pipeline", %today, "pipeline already ran today; skipping");
        counter!("pipeline_runs_total", "outcome" => "skipped").increment(1);
        return Ok(PipelineReport::Skipped(SkipReason::AlreadyRanToday));
    }

    info!(target: "pipeline", %today, "starting daily pipeline");
    match run_stages(cfg, decoder, categorizer, source, today).await {
        Ok(summary) => {
            write_last_run(&cfg.last_run_path(), today)?;
            counter!("pipeline_runs_total", "outcome" => "completed").increment(1);
            gauge!("pipeline_last_success_ts").set(Utc::now().timestamp() as f64);
            info!(
                target: "pipeline",
                fetched = summary.fetched,
                decoded = summary.decoded.len(),
                archived = summary.archived.len(),
                "daily pipeline finished"
            );
            Ok(PipelineReport::Completed(summary))
        }
        Err(e) => {
            counter!("pipeline_runs_total", "outcome" => "failed").increment(1);
            error!(target: "pipeline", error = ?e, "pipeline halted");
            Err(e)
        }
    }
}

async fn run_stages(
    cfg: &PipelineConfig,
    decoder: Arc<Decoder>,
    categorizer: Arc<Categorizer>,
    source: Option<Arc<dyn NewsSource>>,
    today: NaiveDate,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    let t = Instant::now();
    let ingest = ingest_stage(cfg, source, &decoder, today)
        .await
        .context("stage ingest")?;
    timed(Stage::Ingest, t);
    summary.fetched = ingest.fetched;
    summary.stop = ingest.stop;
    summary.ingested = ingest.files;
    if summary.ingested.is_empty() {
        warn!(target: "pipeline", "ingest saved no batch; categorize and decode have nothing to do");
    }

    let t = Instant::now();
    let (c, inputs) = (cfg.clone(), summary.ingested.clone());
    summary.tagged = blocking(move || categorize_stage(&c, &categorizer, &inputs))
        .await
        .context("stage categorize")?;
    timed(Stage::Categorize, t);

    let t = Instant::now();
    let (c, inputs) = (cfg.clone(), summary.tagged.clone());
    summary.decoded = blocking(move || decode_stage(&c, &decoder, &inputs))
        .await
        .context("stage decode")?;
    timed(Stage::Decode, t);

    let t = Instant::now();
    let c = cfg.clone();
    summary.archived = blocking(move || archive_stage(&c, today))
        .await
        .context("stage archive")?;
    timed(Stage::Archive, t);

    Ok(summary)
}

/// Run a single stage on the newest available batch.
///
/// Holds the pipeline lock for the duration, so a standalone stage never
/// overlaps a full run. Returns the skip reason when the lock is held.
pub async fn run_stage(
    stage: Stage,
    cfg: &PipelineConfig,
    decoder: Arc<Decoder>,
    categorizer: Arc<Categorizer>,
    source: Option<Arc<dyn NewsSource>>,
    today: NaiveDate,
) -> Result<Option<SkipReason>> {
    let Some(_lock) = PipelineLock::acquire(&cfg.lock_path())? else {
        warn!(target: "pipeline", stage = stage.as_str(), "another run holds the pipeline lock; skipping");
        return Ok(Some(SkipReason::LockHeld));
    };

    let t = Instant::now();
    match stage {
        Stage::Ingest => {
            let r = ingest_stage(cfg, source, &decoder, today).await?;
            info!(target: "pipeline", fetched = r.fetched, files = r.files.len(), "ingest done");
        }
        Stage::Categorize => {
            let c = cfg.clone();
            let inputs: Vec<PathBuf> = latest_batch(&c.events_dir).into_iter().collect();
            let out = blocking(move || categorize_stage(&c, &categorizer, &inputs)).await?;
            info!(target: "pipeline", files = out.len(), "categorize done");
        }
        Stage::Decode => {
            let c = cfg.clone();
            let inputs: Vec<PathBuf> = latest_batch(&c.tagged_dir).into_iter().collect();
            let out = blocking(move || decode_stage(&c, &decoder, &inputs)).await?;
            info!(target: "pipeline", files = out.len(), "decode done");
        }
        Stage::Archive => {
            let c = cfg.clone();
            let out = blocking(move || archive_stage(&c, today)).await?;
            info!(target: "pipeline", files = out.len(), "archive done");
        }
    }
    timed(stage, t);
    Ok(None)
}

/// Spawn the in-process daily runner. The first tick fires immediately; the
/// already-ran-today guard makes restarts harmless.
pub fn spawn_daily_scheduler(
    cfg: PipelineConfig,
    decoder: Arc<Decoder>,
    categorizer: Arc<Categorizer>,
    source: Option<Arc<dyn NewsSource>>,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(60)));
        loop {
            ticker.tick().await;
            let today = Local::now().date_naive();
            match run_pipeline(
                &cfg,
                decoder.clone(),
                categorizer.clone(),
                source.clone(),
                today,
                false,
            )
            .await
            {
                Ok(PipelineReport::Completed(_)) => {}
                Ok(PipelineReport::Skipped(reason)) => {
                    info!(target: "pipeline", reason = ?reason, "scheduled run skipped");
                }
                Err(e) => {
                    error!(target: "pipeline", error = ?e, "scheduled run failed");
                }
            }
        }
    })
}

/// Fail fast when a directory the pipeline writes to exists as a file.
pub fn check_dirs(cfg: &PipelineConfig) -> Result<()> {
    for dir in [
        &cfg.events_dir,
        &cfg.tagged_dir,
        &cfg.decoded_dir,
        &cfg.archive_dir,
        &cfg.state_dir,
    ] {
        if dir.is_file() {
            bail!("{} exists and is not a directory", dir.display());
        }
    }
    Ok(())
}
