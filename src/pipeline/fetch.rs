//! Ordered fallback across conversation sources.
//!
//! Sources are tried strictly in the order they were registered; the
//! first one to return conversations wins and no later source is
//! consulted. Each attempt runs under its own wall-clock timeout so a
//! wedged backend costs one bounded attempt rather than the whole fetch.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::models::{Conversation, ConversationFilters};
use crate::pipeline::sources::{ConversationSource, SkippedConversation, SourceError};

#[derive(Debug, Error)]
pub enum FetchError {
    /// Every registered source was tried and none produced a result.
    #[error("all conversation sources failed ({})", describe_attempts(.attempts))]
    AllSourcesFailed {
        attempts: Vec<(String, SourceError)>,
    },
    #[error("fetch cancelled")]
    Cancelled,
}

fn describe_attempts(attempts: &[(String, SourceError)]) -> String {
    attempts
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// What a fetch actually did, kept for diagnostics and progress text.
#[derive(Debug)]
pub struct FetchReport {
    pub conversations: Vec<Conversation>,
    pub skipped: Vec<SkippedConversation>,
    /// Name of the source that ultimately answered.
    pub source: String,
    /// Sources tried before the winning one, with why they lost.
    pub attempts: Vec<(String, SourceError)>,
}

pub struct FallbackConversationFetcher {
    sources: Vec<Arc<dyn ConversationSource>>,
    attempt_timeout: Duration,
}

impl FallbackConversationFetcher {
    pub fn new(sources: Vec<Arc<dyn ConversationSource>>) -> Self {
        Self {
            sources,
            attempt_timeout: Duration::from_secs(config::DEFAULT_ATTEMPT_TIMEOUT_SECS),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Try each source in priority order until one succeeds.
    ///
    /// An unhealthy source is skipped without burning its full attempt
    /// timeout. Cancellation stops the cascade immediately rather than
    /// falling through to the next source.
    pub async fn fetch(
        &self,
        filters: &ConversationFilters,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, FetchError> {
        let mut attempts: Vec<(String, SourceError)> = Vec::new();

        for source in &self.sources {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let name = source.name().to_string();

            if !source.health_check().await {
                tracing::warn!(source = %name, "Source unhealthy, skipping");
                attempts.push((
                    name,
                    SourceError::Connectivity("health check failed".into()),
                ));
                continue;
            }

            let attempt = tokio::time::timeout(self.attempt_timeout, source.search(filters, cancel));
            match attempt.await {
                Ok(Ok(outcome)) => {
                    tracing::info!(
                        source = %name,
                        conversations = outcome.conversations.len(),
                        skipped = outcome.skipped.len(),
                        "Fetch succeeded"
                    );
                    return Ok(FetchReport {
                        conversations: outcome.conversations,
                        skipped: outcome.skipped,
                        source: name,
                        attempts,
                    });
                }
                Ok(Err(SourceError::Cancelled)) => return Err(FetchError::Cancelled),
                Ok(Err(err)) => {
                    tracing::warn!(source = %name, error = %err, "Source failed, trying next");
                    attempts.push((name, err));
                }
                Err(_) => {
                    tracing::warn!(source = %name, "Source attempt timed out, trying next");
                    attempts.push((
                        name,
                        SourceError::Timeout {
                            elapsed_secs: self.attempt_timeout.as_secs(),
                        },
                    ));
                }
            }
        }

        Err(FetchError::AllSourcesFailed { attempts })
    }
}
