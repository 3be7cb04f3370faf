pub mod adapter;
pub mod rate_limit;
pub mod rest;
pub mod wire;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{Conversation, ConversationFilters};

/// Failure of a single conversation source.
///
/// The fallback fetcher treats every variant except `Cancelled` as grounds
/// to advance to the next source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited by upstream{}", retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,
}

/// A conversation the source chose to skip instead of failing the query.
///
/// Partial-failure semantics: one bad record never aborts the whole fetch;
/// it is recorded here with its reason instead.
#[derive(Debug, Clone)]
pub struct SkippedConversation {
    pub id: String,
    pub reason: String,
}

/// What one source returned for a search.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub conversations: Vec<Conversation>,
    pub skipped: Vec<SkippedConversation>,
}

/// Any backend capable of retrieving conversations matching filters.
///
/// Implementations know nothing about fallback ordering; that policy lives
/// exclusively in the fetcher which holds these as trait objects.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    /// Stable name for observability ("rest", "mcp-cached", ...).
    fn name(&self) -> &str;

    /// Retrieve all conversations matching `filters`, deduplicated by id.
    async fn search(
        &self,
        filters: &ConversationFilters,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, SourceError>;

    /// Cheap liveness pre-check so the fetcher can skip a dead backend
    /// without paying for a full search attempt.
    async fn health_check(&self) -> bool;
}
