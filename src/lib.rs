//! SupportLens — conversation intelligence pipeline.
//!
//! Answers natural-language questions about customer support conversations:
//! interprets the query's timeframe, retrieves matching conversations
//! through interchangeable backends with automatic fallback, compresses
//! them into a token budget, and drives a language-model analysis step
//! that degrades gracefully when the model's output is malformed.
//!
//! The CLI and web transports are external consumers of
//! [`pipeline::processor::QueryProcessor`]; nothing in this crate routes
//! HTTP or renders output.

pub mod config;
pub mod models;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for embedding applications.
///
/// Honors `RUST_LOG` when set, otherwise falls back to the crate default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
