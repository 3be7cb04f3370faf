//! Wire representation of conversations as the platform returns them.
//!
//! Shared by the REST source and the protocol adapters: both upstreams
//! serialize conversations the same way, they only differ in transport.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AuthorRole, Conversation, Message};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub id: String,
    /// Free-form upstream role; anything that is not "customer" (bots,
    /// admins, teammates) maps to the agent side.
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConversation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Absent when the search endpoint returns summaries only; the REST
    /// source hydrates the thread with a follow-up fetch in that case.
    pub messages: Option<Vec<ApiMessage>>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ApiMessage {
    fn into_message(self) -> Message {
        let author_role = if self.author == "customer" {
            AuthorRole::Customer
        } else {
            AuthorRole::Agent
        };
        Message {
            id: self.id,
            author_role,
            body: self.body,
            created_at: self.created_at,
        }
    }
}

impl ApiConversation {
    /// Convert to the domain model. Messages are reordered chronologically
    /// here so no caller ever sees an upstream-ordered thread.
    pub fn into_conversation(self) -> Conversation {
        let mut messages: Vec<Message> = self
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(ApiMessage::into_message)
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Conversation {
            id: self.id,
            created_at: self.created_at,
            messages,
            customer_identifier: self.customer,
            tags: self.tags.into_iter().collect::<BTreeSet<_>>(),
        }
    }

    pub fn has_messages(&self) -> bool {
        self.messages.is_some()
    }
}
