//! Protocol-adapter conversation source (MCP-style tool invocation).
//!
//! Opens a session over a persistent WebSocket channel, issues a JSON
//! `search` tool call, and awaits the matching response frame. Real-world
//! adapters sometimes accept a request and never deliver a response, so
//! both the connect and the response wait carry bounded timeouts; on
//! either timeout the call fails cleanly instead of hanging.
//!
//! Different upstream deployments (a caching one, a pass-through one)
//! share this type and differ only in their [`AdapterEndpoint`].

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::models::ConversationFilters;

use super::wire::ApiConversation;
use super::{ConversationSource, FetchOutcome, SourceError};

type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Debug, Clone)]
pub struct AdapterEndpoint {
    /// Stable name for observability ("mcp-cached", "mcp-passthrough").
    pub name: String,
    pub url: String,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
}

impl AdapterEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(30),
        }
    }
}

/// Conversation source backed by a tool-invocation adapter deployment.
pub struct ProtocolAdapterSource {
    endpoint: AdapterEndpoint,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a str>,
}

#[derive(Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Serialize)]
struct SearchArguments<'a> {
    created_after: DateTime<Utc>,
    created_before: DateTime<Utc>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    customer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
}

impl ProtocolAdapterSource {
    pub fn new(endpoint: AdapterEndpoint) -> Self {
        Self { endpoint }
    }

    async fn connect(
        &self,
    ) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, SourceError> {
        let connected = timeout(self.endpoint.connect_timeout, connect_async(&self.endpoint.url))
            .await
            .map_err(|_| SourceError::Timeout {
                elapsed_secs: self.endpoint.connect_timeout.as_secs(),
            })?;
        let (ws, _) = connected.map_err(|e| SourceError::Connectivity(e.to_string()))?;
        Ok(ws)
    }

    /// Await the response frame carrying `want_id`, skipping unrelated
    /// frames, within the endpoint's response-wait budget.
    async fn await_response(
        &self,
        reader: &mut WsReader,
        want_id: u64,
        cancel: &CancellationToken,
    ) -> Result<Value, SourceError> {
        let deadline = Instant::now() + self.endpoint.response_timeout;

        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(SourceError::Timeout {
                    elapsed_secs: self.endpoint.response_timeout.as_secs(),
                })?;

            let frame = tokio::select! {
                () = cancel.cancelled() => return Err(SourceError::Cancelled),
                frame = timeout(remaining, reader.next()) => frame.map_err(|_| SourceError::Timeout {
                    elapsed_secs: self.endpoint.response_timeout.as_secs(),
                })?,
            };

            match frame {
                None => {
                    return Err(SourceError::Connectivity(
                        "channel closed before response arrived".into(),
                    ))
                }
                Some(Err(e)) => return Err(SourceError::Connectivity(e.to_string())),
                Some(Ok(WsMessage::Text(text))) => {
                    let response: RpcResponse = serde_json::from_str(&text)
                        .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;
                    if response.id != want_id {
                        continue;
                    }
                    if let Some(error) = response.error {
                        return Err(SourceError::Connectivity(error.message));
                    }
                    return Ok(response.result.unwrap_or(Value::Null));
                }
                // Pings, pongs, binary frames: not ours.
                Some(Ok(_)) => continue,
            }
        }
    }
}

#[async_trait]
impl ConversationSource for ProtocolAdapterSource {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn search(
        &self,
        filters: &ConversationFilters,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, SourceError> {
        let ws = self.connect().await?;
        let (mut writer, mut reader) = ws.split();

        // Session handshake.
        let open = RpcRequest {
            id: 0,
            method: "session/open",
            params: Value::Object(serde_json::Map::new()),
            session: None,
        };
        let payload = serde_json::to_string(&open)
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;
        writer
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| SourceError::Connectivity(e.to_string()))?;

        let opened = self.await_response(&mut reader, 0, cancel).await?;
        let session_id = opened
            .get("session_id")
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::InvalidResponse("missing session_id".into()))?
            .to_string();

        // Search tool call on the established session.
        let arguments = SearchArguments {
            created_after: filters.start_date,
            created_before: filters.end_date,
            tags: &filters.tags,
            customer: filters.customer_identifier.as_deref(),
            limit: filters.limit,
        };
        let call = RpcRequest {
            id: 1,
            method: "tools/call",
            params: serde_json::json!({
                "name": "search",
                "arguments": arguments,
            }),
            session: Some(&session_id),
        };
        let payload = serde_json::to_string(&call)
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;
        writer
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| SourceError::Connectivity(e.to_string()))?;

        let result = self.await_response(&mut reader, 1, cancel).await?;

        let status = result.get("status").and_then(Value::as_str).unwrap_or("");
        if status != "ok" {
            return Err(SourceError::Connectivity(format!(
                "adapter returned status {status:?}"
            )));
        }

        let raw = result.get("conversations").cloned().unwrap_or(Value::Array(vec![]));
        let api_conversations: Vec<ApiConversation> = serde_json::from_value(raw)
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        let mut seen: HashSet<String> = HashSet::new();
        let conversations = api_conversations
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .map(ApiConversation::into_conversation)
            .collect();

        tracing::debug!(adapter = %self.endpoint.name, "Adapter search complete");
        Ok(FetchOutcome {
            conversations,
            skipped: Vec::new(),
        })
    }

    async fn health_check(&self) -> bool {
        match timeout(self.endpoint.connect_timeout, connect_async(&self.endpoint.url)).await {
            Ok(Ok(_)) => true,
            _ => false,
        }
    }
}
