//! REST-paginating conversation source.
//!
//! Drives the platform's paginated search endpoint, hydrates message
//! threads with follow-up fetches when the search payload carries
//! summaries only, and keeps every request inside the documented rate
//! ceiling via a token bucket.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::models::ConversationFilters;

use super::rate_limit::TokenBucket;
use super::wire::{ApiConversation, ApiMessage};
use super::{ConversationSource, FetchOutcome, SkippedConversation, SourceError};

#[derive(Debug, Clone)]
pub struct RestSourceConfig {
    pub base_url: String,
    pub api_token: String,
    pub page_size: usize,
    pub request_timeout: Duration,
    pub hydration_concurrency: usize,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
}

impl RestSourceConfig {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            page_size: config::DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
            hydration_concurrency: config::DEFAULT_HYDRATION_CONCURRENCY,
            rate_limit_max_requests: config::RATE_LIMIT_MAX_REQUESTS,
            rate_limit_window: Duration::from_secs(config::RATE_LIMIT_WINDOW_SECS),
        }
    }
}

/// Direct HTTP client against the platform's search/list endpoints.
pub struct RestConversationSource {
    config: RestSourceConfig,
    client: reqwest::Client,
    bucket: TokenBucket,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    created_after: DateTime<Utc>,
    created_before: DateTime<Utc>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    customer: Option<&'a str>,
    per_page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    starting_after: Option<&'a str>,
}

#[derive(Deserialize)]
struct SearchResponse {
    conversations: Vec<ApiConversation>,
    #[serde(default)]
    pages: Pages,
}

#[derive(Deserialize, Default)]
struct Pages {
    /// Cursor for the next page; absent when the upstream is done.
    #[serde(default)]
    next: Option<String>,
}

impl RestConversationSource {
    pub fn new(config: RestSourceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");
        let bucket = TokenBucket::new(config.rate_limit_max_requests, config.rate_limit_window);

        Self {
            config: RestSourceConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            client,
            bucket,
        }
    }

    async fn fetch_page(
        &self,
        filters: &ConversationFilters,
        cursor: Option<&str>,
    ) -> Result<SearchResponse, SourceError> {
        let url = format!("{}/conversations/search", self.config.base_url);
        let body = SearchRequest {
            created_after: filters.start_date,
            created_before: filters.end_date,
            tags: &filters.tags,
            customer: filters.customer_identifier.as_deref(),
            per_page: self.config.page_size,
            starting_after: cursor,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let response = self.check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))
    }

    async fn fetch_thread(&self, id: &str) -> Result<Vec<ApiMessage>, SourceError> {
        let url = format!("{}/conversations/{}", self.config.base_url, id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let response = self.check_status(response).await?;
        let detail: ApiConversation = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;
        Ok(detail.messages.unwrap_or_default())
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, SourceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SourceError::Auth(format!("platform returned {status}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(SourceError::RateLimited { retry_after_secs });
        }
        let body = response.text().await.unwrap_or_default();
        Err(SourceError::InvalidResponse(format!("{status}: {body}")))
    }

    fn transport_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout {
                elapsed_secs: self.config.request_timeout.as_secs(),
            }
        } else {
            SourceError::Connectivity(e.to_string())
        }
    }

    /// Fetch message threads for summary-only conversations.
    ///
    /// Requests run concurrently (bounded) and may complete out of order;
    /// threads are re-associated to their owning conversation by id.
    /// A failed hydration skips that conversation instead of aborting.
    async fn hydrate(
        &self,
        summaries: Vec<ApiConversation>,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, SourceError> {
        let needs_thread: Vec<String> = summaries
            .iter()
            .filter(|c| !c.has_messages())
            .map(|c| c.id.clone())
            .collect();

        let mut threads: HashMap<String, Vec<ApiMessage>> = HashMap::new();
        let mut skipped: Vec<SkippedConversation> = Vec::new();

        let mut results = stream::iter(needs_thread)
            .map(|id| async move {
                self.bucket.acquire(cancel).await?;
                if cancel.is_cancelled() {
                    return Err(SourceError::Cancelled);
                }
                let thread = self.fetch_thread(&id).await;
                Ok::<_, SourceError>((id, thread))
            })
            .buffer_unordered(self.config.hydration_concurrency.max(1));

        while let Some(result) = results.next().await {
            let (id, thread) = result?;
            match thread {
                Ok(messages) => {
                    threads.insert(id, messages);
                }
                Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
                Err(e) => {
                    tracing::warn!(conversation_id = %id, error = %e, "Hydration failed, skipping conversation");
                    skipped.push(SkippedConversation {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        drop(results);

        let skipped_ids: HashSet<&str> = skipped.iter().map(|s| s.id.as_str()).collect();
        let conversations = summaries
            .into_iter()
            .filter(|c| !skipped_ids.contains(c.id.as_str()))
            .map(|mut c| {
                if !c.has_messages() {
                    c.messages = threads.remove(&c.id);
                }
                c.into_conversation()
            })
            .collect();

        Ok(FetchOutcome {
            conversations,
            skipped,
        })
    }
}

#[async_trait]
impl ConversationSource for RestConversationSource {
    fn name(&self) -> &str {
        "rest"
    }

    async fn search(
        &self,
        filters: &ConversationFilters,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, SourceError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut summaries: Vec<ApiConversation> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            // A cancelled query stops issuing new page requests.
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            self.bucket.acquire(cancel).await?;

            let page = self.fetch_page(filters, cursor.as_deref()).await?;
            for conversation in page.conversations {
                // Pages can overlap under concurrent upstream writes;
                // an id is only ever admitted once.
                if seen.insert(conversation.id.clone()) {
                    summaries.push(conversation);
                }
            }

            if let Some(limit) = filters.limit {
                if summaries.len() >= limit {
                    summaries.truncate(limit);
                    break;
                }
            }

            match page.pages.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            conversations = summaries.len(),
            "REST search pagination complete"
        );
        self.hydrate(summaries, cancel).await
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/ping", self.config.base_url);
        match self.client.get(&url).bearer_auth(&self.config.api_token).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn filters() -> ConversationFilters {
        ConversationFilters::for_range(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
        )
    }

    fn source(server: &MockServer) -> RestConversationSource {
        RestConversationSource::new(RestSourceConfig::new(server.uri(), "test-token"))
    }

    fn conv_json(id: &str, with_messages: bool) -> serde_json::Value {
        let messages = if with_messages {
            json!([{
                "id": format!("{id}-m1"),
                "author": "customer",
                "body": "It broke",
                "created_at": "2024-01-05T10:00:00Z"
            }])
        } else {
            serde_json::Value::Null
        };
        json!({
            "id": id,
            "created_at": "2024-01-05T09:00:00Z",
            "messages": messages,
            "customer": format!("{id}@example.com"),
            "tags": ["billing"]
        })
    }

    fn page_json(ids: std::ops::Range<usize>, next: Option<&str>) -> serde_json::Value {
        json!({
            "conversations": ids.map(|i| conv_json(&format!("c{i}"), true)).collect::<Vec<_>>(),
            "pages": { "next": next }
        })
    }

    #[tokio::test]
    async fn paginates_until_upstream_signals_completion() {
        let server = MockServer::start().await;

        // 120 conversations at page size 50 → exactly 3 requests.
        Mock::given(method("POST"))
            .and(path("/conversations/search"))
            .and(body_partial_json(json!({ "starting_after": "cursor1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(50..100, Some("cursor2"))))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conversations/search"))
            .and(body_partial_json(json!({ "starting_after": "cursor2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(100..120, None)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conversations/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(0..50, Some("cursor1"))))
            .expect(1)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let outcome = source(&server).search(&filters(), &cancel).await.unwrap();

        assert_eq!(outcome.conversations.len(), 120);
        let unique: HashSet<&str> = outcome.conversations.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(unique.len(), 120);
    }

    #[tokio::test]
    async fn overlapping_pages_never_duplicate_an_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/conversations/search"))
            .and(body_partial_json(json!({ "starting_after": "cursor1" })))
            // c4 also appeared on page one (concurrent upstream write).
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(4..8, None)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conversations/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(0..5, Some("cursor1"))))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let outcome = source(&server).search(&filters(), &cancel).await.unwrap();
        assert_eq!(outcome.conversations.len(), 8);
    }

    #[tokio::test]
    async fn user_limit_stops_pagination_early() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/conversations/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(0..50, Some("more"))))
            .expect(1)
            .mount(&server)
            .await;

        let mut f = filters();
        f.limit = Some(30);
        let cancel = CancellationToken::new();
        let outcome = source(&server).search(&f, &cancel).await.unwrap();
        assert_eq!(outcome.conversations.len(), 30);
    }

    #[tokio::test]
    async fn summary_payloads_are_hydrated_and_failures_skipped() {
        let server = MockServer::start().await;

        let page = json!({
            "conversations": [conv_json("good", false), conv_json("bad", false)],
            "pages": { "next": null }
        });
        Mock::given(method("POST"))
            .and(path("/conversations/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations/good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "good",
                "created_at": "2024-01-05T09:00:00Z",
                "messages": [
                    {"id": "m2", "author": "agent", "body": "Fixed", "created_at": "2024-01-05T11:00:00Z"},
                    {"id": "m1", "author": "customer", "body": "Broken", "created_at": "2024-01-05T10:00:00Z"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations/bad"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let outcome = source(&server).search(&filters(), &cancel).await.unwrap();

        assert_eq!(outcome.conversations.len(), 1);
        assert_eq!(outcome.conversations[0].id, "good");
        // Thread arrived out of order; it must come back chronological.
        assert_eq!(outcome.conversations[0].messages[0].id, "m1");
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].id, "bad");
        assert!(outcome.skipped[0].reason.contains("500"));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/search"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let err = source(&server).search(&filters(), &cancel).await.unwrap_err();
        assert!(matches!(err, SourceError::Auth(_)));
    }

    #[tokio::test]
    async fn upstream_throttle_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/search"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let err = source(&server).search(&filters(), &cancel).await.unwrap_err();
        match err {
            SourceError::RateLimited { retry_after_secs } => {
                assert_eq!(retry_after_secs, Some(12));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_query_stops_before_the_first_page() {
        let server = MockServer::start().await;
        Mock::given(path_regex(".*"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = source(&server).search(&filters(), &cancel).await.unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));
    }

    #[tokio::test]
    async fn health_check_reflects_ping_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        assert!(source(&server).health_check().await);

        let down = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&down)
            .await;
        assert!(!source(&down).health_check().await);
    }
}
