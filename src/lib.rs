// src/lib.rs
// Public library surface for the server, the daily runner and integration tests.

pub mod archive;
pub mod article;
pub mod batch;
pub mod categorize;
pub mod config;
pub mod decoder;
pub mod event_decoder;
pub mod ingest;
pub mod matcher;
pub mod pipeline;
pub mod store;
pub mod symbols;

// HTTP surface
pub mod api;
pub mod metrics;

// ---- Re-exports for stable public API ----
// `crate_root::api::router` and `crate_root::router` both work
pub use crate::api::{router, AppState};
pub use crate::decoder::Decoder;
pub use crate::symbols::SymbolDictionary;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` picks the filter
/// (default `info`); `LOG_FORMAT=json` switches to JSON lines.
/// Safe to call more than once: later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
