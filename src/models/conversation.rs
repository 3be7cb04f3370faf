use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message within a support conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    Customer,
    Agent,
}

impl AuthorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
        }
    }
}

/// A single message inside a conversation. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author_role: AuthorRole,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A threaded exchange between a customer and support agent(s).
///
/// Messages are kept in chronological order regardless of fetch order.
/// The compressor derives new conversations instead of mutating these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub customer_identifier: Option<String>,
    pub tags: BTreeSet<String>,
}

impl Conversation {
    /// Index of the first customer-authored message (opening signal).
    /// Falls back to the first message when no customer turn exists.
    pub fn first_customer_index(&self) -> Option<usize> {
        if self.messages.is_empty() {
            return None;
        }
        Some(
            self.messages
                .iter()
                .position(|m| m.author_role == AuthorRole::Customer)
                .unwrap_or(0),
        )
    }

    /// Index of the last message (resolution/close-out signal).
    pub fn last_index(&self) -> Option<usize> {
        self.messages.len().checked_sub(1)
    }
}

/// Search filters sent to a conversation source.
///
/// `limit = None` means no cap: the fetch runs until the upstream signals
/// completion. A cap is always a user-supplied ceiling, never inferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationFilters {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub customer_identifier: Option<String>,
    pub limit: Option<usize>,
}

impl ConversationFilters {
    pub fn for_range(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            start_date,
            end_date,
            tags: Vec::new(),
            customer_identifier: None,
            limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn msg(id: &str, role: AuthorRole, at_secs: i64) -> Message {
        Message {
            id: id.into(),
            author_role: role,
            body: "body".into(),
            created_at: Utc.timestamp_opt(at_secs, 0).unwrap(),
        }
    }

    #[test]
    fn first_customer_index_skips_agent_preamble() {
        let conv = Conversation {
            id: "c1".into(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            messages: vec![
                msg("m1", AuthorRole::Agent, 0),
                msg("m2", AuthorRole::Customer, 1),
                msg("m3", AuthorRole::Agent, 2),
            ],
            customer_identifier: None,
            tags: BTreeSet::new(),
        };
        assert_eq!(conv.first_customer_index(), Some(1));
        assert_eq!(conv.last_index(), Some(2));
    }

    #[test]
    fn agent_only_conversation_falls_back_to_first_message() {
        let conv = Conversation {
            id: "c1".into(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            messages: vec![msg("m1", AuthorRole::Agent, 0)],
            customer_identifier: None,
            tags: BTreeSet::new(),
        };
        assert_eq!(conv.first_customer_index(), Some(0));
    }

    #[test]
    fn empty_conversation_has_no_anchor_indices() {
        let conv = Conversation {
            id: "c1".into(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            messages: vec![],
            customer_identifier: None,
            tags: BTreeSet::new(),
        };
        assert_eq!(conv.first_customer_index(), None);
        assert_eq!(conv.last_index(), None);
    }

    #[test]
    fn author_role_serializes_snake_case() {
        let json = serde_json::to_string(&AuthorRole::Customer).unwrap();
        assert_eq!(json, "\"customer\"");
    }

    #[test]
    fn filters_default_to_no_cap() {
        let filters = ConversationFilters::for_range(
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(10, 0).unwrap(),
        );
        assert!(filters.limit.is_none());
        assert!(filters.tags.is_empty());
    }
}
