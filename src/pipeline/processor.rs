//! End-to-end query orchestration.
//!
//! One natural-language question goes through four stages: interpret
//! the timeframe, fetch conversations, compress them to budget, and
//! analyze with the model. Each stage reports progress to an observer,
//! and a failure is annotated with the stage it happened in so the
//! caller can tell the user something actionable.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{AnalysisResult, ConversationFilters, ProgressEvent, Stage};
use crate::pipeline::analysis::{AnalysisEngine, AnalysisError, ChatModel};
use crate::pipeline::compress::ConversationCompressor;
use crate::pipeline::fetch::{FallbackConversationFetcher, FetchError};
use crate::pipeline::sources::SourceError;
use crate::pipeline::timeframe;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Cap on fetched conversations. `None` lets the timeframe decide.
    pub max_conversations: Option<usize>,
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {kind}")]
pub struct QueryError {
    pub stage: Stage,
    pub kind: QueryErrorKind,
}

#[derive(Debug, Error)]
pub enum QueryErrorKind {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("query cancelled")]
    Cancelled,
}

/// Coarse failure classes for user-facing messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Connectivity,
    Auth,
    RateLimit,
    Analysis,
    Cancelled,
}

impl QueryError {
    fn new(stage: Stage, kind: impl Into<QueryErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match &self.kind {
            QueryErrorKind::Cancelled => ErrorCategory::Cancelled,
            QueryErrorKind::Analysis(_) => ErrorCategory::Analysis,
            QueryErrorKind::Fetch(FetchError::Cancelled) => ErrorCategory::Cancelled,
            QueryErrorKind::Fetch(FetchError::AllSourcesFailed { attempts }) => {
                // Auth is the most specific signal; surface it even when
                // another source also happened to be unreachable.
                if attempts.iter().any(|(_, e)| matches!(e, SourceError::Auth(_))) {
                    ErrorCategory::Auth
                } else if attempts
                    .iter()
                    .any(|(_, e)| matches!(e, SourceError::RateLimited { .. }))
                {
                    ErrorCategory::RateLimit
                } else {
                    ErrorCategory::Connectivity
                }
            }
        }
    }

    pub fn suggested_action(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Connectivity => "check source availability and network, then retry",
            ErrorCategory::Auth => "check the API credentials for the failing source",
            ErrorCategory::RateLimit => "wait a minute, then retry",
            ErrorCategory::Analysis => "retry; if it persists, check the model endpoint",
            ErrorCategory::Cancelled => "no action needed",
        }
    }
}

pub struct QueryProcessor<M: ChatModel> {
    fetcher: FallbackConversationFetcher,
    compressor: ConversationCompressor,
    engine: AnalysisEngine<M>,
}

impl<M: ChatModel> QueryProcessor<M> {
    pub fn new(
        fetcher: FallbackConversationFetcher,
        compressor: ConversationCompressor,
        engine: AnalysisEngine<M>,
    ) -> Self {
        Self {
            fetcher,
            compressor,
            engine,
        }
    }

    /// Run a query against the current wall clock.
    pub async fn process(
        &self,
        query: &str,
        options: &QueryOptions,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, QueryError> {
        self.process_at(query, options, observer, cancel, Utc::now())
            .await
    }

    /// Run a query with an explicit "now", so relative timeframes and
    /// result timestamps are reproducible.
    pub async fn process_at(
        &self,
        query: &str,
        options: &QueryOptions,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, QueryError> {
        let run_id = uuid::Uuid::new_v4();
        tracing::info!(%run_id, query, "Processing query");

        // 1. Interpret the timeframe.
        emit(observer, Stage::Interpreting, "Interpreting timeframe", 5);
        if cancel.is_cancelled() {
            return Err(QueryError::new(Stage::Interpreting, QueryErrorKind::Cancelled));
        }
        let time_frame = timeframe::interpret(query, now);
        tracing::info!(window = %time_frame.description, "Timeframe interpreted");

        // 2. Fetch conversations for the window.
        emit(
            observer,
            Stage::Fetching,
            &format!("Fetching conversations ({})", time_frame.description),
            25,
        );
        let mut filters = ConversationFilters::for_range(time_frame.start, time_frame.end);
        filters.limit = options.max_conversations;
        let report = self
            .fetcher
            .fetch(&filters, cancel)
            .await
            .map_err(|e| QueryError::new(Stage::Fetching, e))?;

        // 3. Nothing in the window: report cleanly without a model call.
        if report.conversations.is_empty() {
            tracing::info!(window = %time_frame.description, "No conversations in window");
            emit(observer, Stage::Done, "No conversations found", 100);
            return Ok(AnalysisResult::empty(
                time_frame,
                self.engine.model_name(),
                now,
            ));
        }

        // 4. Compress to the token budget.
        emit(
            observer,
            Stage::Compressing,
            &format!("Compressing {} conversations", report.conversations.len()),
            55,
        );
        let compressed = self.compressor.compress(&report.conversations);

        // 5. Analyze, racing cancellation. Dropping the analyze future
        // aborts the in-flight model request.
        emit(observer, Stage::Analyzing, "Analyzing with model", 75);
        let result = tokio::select! {
            () = cancel.cancelled() => {
                return Err(QueryError::new(Stage::Analyzing, QueryErrorKind::Cancelled));
            }
            result = self.engine.analyze(query, &time_frame, &compressed, now) => {
                result.map_err(|e| QueryError::new(Stage::Analyzing, e))?
            }
        };

        emit(
            observer,
            Stage::Done,
            &format!("Found {} insights", result.insights.len()),
            100,
        );
        Ok(result)
    }
}

fn emit(observer: &dyn ProgressObserver, stage: Stage, message: &str, percent: u8) {
    observer.on_progress(&ProgressEvent::new(stage, message, percent));
}
