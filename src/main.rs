//! Prophecy decoder service: binary entrypoint.
//! Boots the Axum HTTP server with the symbol decoder, categorizer, user store
//! and, when enabled, the in-process daily news pipeline.

use std::sync::Arc;

use prophecy_decoder::{
    api::{self, AppState},
    categorize::Categorizer,
    config::AppConfig,
    ingest::{providers::newsapi::NewsApiSource, types::NewsSource},
    metrics::Metrics,
    pipeline::{spawn_daily_scheduler, PipelineConfig},
    store::{DocumentStore, FileDocumentStore},
    Decoder, SymbolDictionary,
};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    prophecy_decoder::init_tracing();

    let cfg = AppConfig::load()?;

    let dict = SymbolDictionary::load(&cfg.paths.symbols);
    if dict.is_empty() {
        tracing::warn!(path = %cfg.paths.symbols.display(), "symbol dictionary is empty; every decode will report no match");
    }
    let decoder = Arc::new(Decoder::new(dict));
    let categorizer = Arc::new(Categorizer::load_from_file(&cfg.paths.categories));
    let store: Arc<dyn DocumentStore> = Arc::new(FileDocumentStore::new(&cfg.paths.users_dir));

    if cfg.pipeline.schedule {
        let source: Option<Arc<dyn NewsSource>> = match cfg.news_api_key() {
            Some(key) => Some(Arc::new(NewsApiSource::with_endpoint(key, &cfg.news.endpoint)?)),
            None => {
                tracing::warn!("NEWS_API_KEY not set; scheduled runs will fail at ingest");
                None
            }
        };
        spawn_daily_scheduler(
            PipelineConfig::from_app(&cfg),
            decoder.clone(),
            categorizer.clone(),
            source,
            cfg.pipeline.interval_secs,
        );
    }

    let metrics = Metrics::init(decoder.len())?;
    let state = AppState::new(decoder, categorizer, store, &cfg.paths.decoded_dir);
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
