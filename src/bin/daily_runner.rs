//! Daily pipeline runner (cron entrypoint).
//!
//! Usage: `daily_runner [--force] [ingest|categorize|decode|archive]`
//! Without a stage, runs the whole pipeline once. Exits non-zero when a stage fails.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use prophecy_decoder::{
    categorize::Categorizer,
    config::AppConfig,
    ingest::{providers::newsapi::NewsApiSource, types::NewsSource},
    pipeline::{check_dirs, run_pipeline, run_stage, PipelineConfig, PipelineReport, Stage},
    Decoder, SymbolDictionary,
};

async fn run(force: bool, stage: Option<Stage>) -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let pcfg = PipelineConfig::from_app(&cfg);
    check_dirs(&pcfg)?;

    let decoder = Arc::new(Decoder::new(SymbolDictionary::load(&cfg.paths.symbols)));
    let categorizer = Arc::new(Categorizer::load_from_file(&cfg.paths.categories));
    let source: Option<Arc<dyn NewsSource>> = match cfg.news_api_key() {
        Some(key) => Some(Arc::new(NewsApiSource::with_endpoint(key, &cfg.news.endpoint)?)),
        None => None,
    };
    let today = Local::now().date_naive();

    if let Some(stage) = stage {
        if let Some(reason) = run_stage(stage, &pcfg, decoder, categorizer, source, today).await? {
            tracing::info!(stage = stage.as_str(), reason = ?reason, "stage skipped");
        }
        return Ok(());
    }

    match run_pipeline(&pcfg, decoder, categorizer, source, today, force).await? {
        PipelineReport::Completed(s) => {
            tracing::info!(
                fetched = s.fetched,
                ingested = s.ingested.len(),
                decoded = s.decoded.len(),
                archived = s.archived.len(),
                "run complete"
            );
        }
        PipelineReport::Skipped(reason) => {
            tracing::info!(reason = ?reason, "run skipped");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    prophecy_decoder::init_tracing();

    let mut force = false;
    let mut stage = None;
    for arg in std::env::args().skip(1) {
        if arg == "--force" || arg == "-f" {
            force = true;
            continue;
        }
        match arg.parse::<Stage>() {
            Ok(s) => stage = Some(s),
            Err(e) => {
                eprintln!("{e}\nusage: daily_runner [--force] [ingest|categorize|decode|archive]");
                return ExitCode::from(2);
            }
        }
    }

    match run(force, stage).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "daily runner failed");
            ExitCode::FAILURE
        }
    }
}
