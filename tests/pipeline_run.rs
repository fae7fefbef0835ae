// tests/pipeline_run.rs
//
// End-to-end daily pipeline over temp directories and a canned news source.

use std::fs;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use prophecy_decoder::batch::{batch_file_name, read_batch, write_batch};
use prophecy_decoder::categorize::{Categorizer, Category};
use prophecy_decoder::article::Article;
use prophecy_decoder::ingest::types::{NewsSource, PageOutcome, PageRequest, RawArticle};
use prophecy_decoder::pipeline::{
    read_last_run, run_pipeline, run_stage, PipelineConfig, PipelineLock, PipelineReport,
    SkipReason, Stage,
};
use prophecy_decoder::{Decoder, SymbolDictionary};

struct CannedSource;

#[async_trait]
impl NewsSource for CannedSource {
    async fn fetch_page(&self, req: &PageRequest) -> Result<PageOutcome> {
        if req.page > 1 {
            return Ok(PageOutcome::PaginationLimit);
        }
        Ok(PageOutcome::Articles(vec![
            RawArticle {
                title: Some("Missile strikes as war widens".into()),
                description: Some("Analysts cite the 666 rumor".into()),
                ..RawArticle::default()
            },
            RawArticle {
                title: Some("Local bakery wins award".into()),
                ..RawArticle::default()
            },
        ]))
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

struct QuietSource;

#[async_trait]
impl NewsSource for QuietSource {
    async fn fetch_page(&self, _req: &PageRequest) -> Result<PageOutcome> {
        Ok(PageOutcome::Articles(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "quiet"
    }
}

fn decoder() -> Arc<Decoder> {
    let json = r#"{
        "666": { "keywords": [], "scriptures": ["Revelation 13:18"] },
        "Wars and Rumors": { "keywords": ["war"], "scriptures": ["Matthew 24:6"] }
    }"#;
    Arc::new(Decoder::new(SymbolDictionary::from_json_str(json).unwrap()))
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn source() -> Option<Arc<dyn NewsSource>> {
    Some(Arc::new(CannedSource))
}

#[tokio::test]
async fn full_run_writes_every_stage_and_marks_the_day() {
    let root = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig::rooted_at(root.path());
    let today = day(2024, 2, 1);

    // a stale batch from last month should be archived by the same run
    write_batch(
        &cfg.events_dir.join(batch_file_name("prophecy", day(2024, 1, 1))),
        &[Article::with_headline("old", "")],
    )
    .unwrap();

    let report = run_pipeline(
        &cfg,
        decoder(),
        Arc::new(Categorizer::default()),
        source(),
        today,
        false,
    )
    .await
    .unwrap();

    let PipelineReport::Completed(summary) = report else {
        panic!("expected a completed run");
    };
    assert_eq!(summary.fetched, 2);

    let name = batch_file_name("prophecy", today);
    assert_eq!(name, "events_prophecy_2024-02-01.json");
    assert!(cfg.events_dir.join(&name).exists());

    let tagged = read_batch(&cfg.tagged_dir.join(&name));
    assert_eq!(tagged.len(), 2);
    assert_eq!(tagged[0].categories.as_deref(), Some(&[Category::WarsConflicts][..]));
    assert_eq!(tagged[1].categories.as_deref(), Some(&[Category::General][..]));

    let decoded = read_batch(&cfg.decoded_dir.join(&name));
    assert_eq!(
        decoded[0].matched_symbols.as_deref(),
        Some(&["666".to_string(), "wars_and_rumors".to_string()][..])
    );
    assert_eq!(decoded[1].matched_symbols.as_deref(), Some(&["general".to_string()][..]));

    assert_eq!(summary.archived, vec!["events/events_prophecy_2024-01-01.json".to_string()]);
    assert!(cfg
        .archive_dir
        .join("events")
        .join("events_prophecy_2024-01-01.json")
        .exists());

    assert_eq!(read_last_run(&cfg.last_run_path()), Some(today));
    assert!(!cfg.lock_path().exists(), "lock must be released");
}

#[tokio::test]
async fn second_run_same_day_is_skipped_unless_forced() {
    let root = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig::rooted_at(root.path());
    let today = day(2024, 2, 1);
    let cat = Arc::new(Categorizer::default());

    let first = run_pipeline(&cfg, decoder(), cat.clone(), source(), today, false)
        .await
        .unwrap();
    assert!(matches!(first, PipelineReport::Completed(_)));

    let second = run_pipeline(&cfg, decoder(), cat.clone(), source(), today, false)
        .await
        .unwrap();
    assert!(matches!(second, PipelineReport::Skipped(SkipReason::AlreadyRanToday)));

    let forced = run_pipeline(&cfg, decoder(), cat, source(), today, true)
        .await
        .unwrap();
    assert!(matches!(forced, PipelineReport::Completed(_)));
}

#[tokio::test]
async fn held_lock_skips_without_touching_data() {
    let root = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig::rooted_at(root.path());

    let _held = PipelineLock::acquire(&cfg.lock_path()).unwrap().expect("lock");
    let report = run_pipeline(
        &cfg,
        decoder(),
        Arc::new(Categorizer::default()),
        source(),
        day(2024, 2, 1),
        true,
    )
    .await
    .unwrap();
    assert!(matches!(report, PipelineReport::Skipped(SkipReason::LockHeld)));
    assert!(!cfg.events_dir.exists());
}

#[tokio::test]
async fn failing_ingest_halts_the_run() {
    let root = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig::rooted_at(root.path());

    let err = run_pipeline(
        &cfg,
        decoder(),
        Arc::new(Categorizer::default()),
        None,
        day(2024, 2, 1),
        false,
    )
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("NEWS_API_KEY"));

    // later stages never ran and the day is not marked
    assert!(!cfg.tagged_dir.exists());
    assert!(!cfg.decoded_dir.exists());
    assert_eq!(read_last_run(&cfg.last_run_path()), None);
    assert!(!cfg.lock_path().exists());
    assert!(fs::read_dir(&cfg.state_dir).unwrap().next().is_none());
}

#[tokio::test]
async fn empty_ingest_does_not_reprocess_older_batches() {
    let root = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig::rooted_at(root.path());
    let today = day(2024, 2, 1);

    // yesterday's batch is recent enough to stay in place
    let older = batch_file_name("prophecy", day(2024, 1, 31));
    write_batch(&cfg.events_dir.join(&older), &[Article::with_headline("old war", "")]).unwrap();

    let report = run_pipeline(
        &cfg,
        decoder(),
        Arc::new(Categorizer::default()),
        Some(Arc::new(QuietSource)),
        today,
        false,
    )
    .await
    .unwrap();
    let PipelineReport::Completed(summary) = report else {
        panic!("expected a completed run");
    };
    assert_eq!(summary.fetched, 0);
    assert!(summary.ingested.is_empty());
    assert!(summary.tagged.is_empty());
    assert!(summary.decoded.is_empty());
    assert!(!cfg.tagged_dir.join(&older).exists());
    assert!(!cfg.decoded_dir.join(&older).exists());
}

#[tokio::test]
async fn standalone_stage_picks_latest_batch() {
    let root = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig::rooted_at(root.path());
    let name = batch_file_name("prophecy", day(2024, 1, 31));
    write_batch(&cfg.events_dir.join(&name), &[Article::with_headline("Local bakery", "")]).unwrap();

    let skipped = run_stage(
        Stage::Categorize,
        &cfg,
        decoder(),
        Arc::new(Categorizer::default()),
        None,
        day(2024, 2, 1),
    )
    .await
    .unwrap();
    assert_eq!(skipped, None);
    assert_eq!(read_batch(&cfg.tagged_dir.join(&name)).len(), 1);
    assert!(!cfg.lock_path().exists(), "lock must be released");
}

#[tokio::test]
async fn standalone_stage_waits_for_held_lock() {
    let root = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig::rooted_at(root.path());
    let stale = batch_file_name("prophecy", day(2024, 1, 1));
    write_batch(&cfg.events_dir.join(&stale), &[Article::with_headline("old", "")]).unwrap();

    let _held = PipelineLock::acquire(&cfg.lock_path()).unwrap().expect("lock");
    let skipped = run_stage(
        Stage::Archive,
        &cfg,
        decoder(),
        Arc::new(Categorizer::default()),
        None,
        day(2024, 2, 1),
    )
    .await
    .unwrap();
    assert_eq!(skipped, Some(SkipReason::LockHeld));
    assert!(cfg.events_dir.join(&stale).exists());
    assert!(!cfg.archive_dir.exists());
}
