/// Application-level constants
pub const APP_NAME: &str = "SupportLens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{}=info", env!("CARGO_PKG_NAME"))
}

/// Documented ceiling of the conversation platform: 83 requests per
/// 10-second window. The REST source's token bucket matches it exactly.
pub const RATE_LIMIT_MAX_REQUESTS: u32 = 83;
pub const RATE_LIMIT_WINDOW_SECS: u64 = 10;

/// Default page size for paginated conversation search.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// How many message-hydration requests may run concurrently. Kept small so
/// hydration bursts stay well inside the rate ceiling.
pub const DEFAULT_HYDRATION_CONCURRENCY: usize = 4;

/// Default token budget for compressed conversations sent to the model.
pub const DEFAULT_TOKEN_BUDGET: usize = 12_000;

/// Per-backend attempt timeout applied by the fallback fetcher.
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 60;

/// Default per-model-call timeout for the analysis step.
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;

/// Default analysis model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
