//! Token-budget compression of fetched conversations.
//!
//! Model context is the scarce resource, so before analysis the
//! conversation set is pruned down to an estimated token budget. The
//! first customer message and the final message of every conversation
//! always survive; middle turns are shed lowest-value-first, and if
//! shedding is not enough the longest remaining bodies are truncated.
//! The whole pass is deterministic for a given input.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config;
use crate::models::{AuthorRole, Conversation};

/// Rough heuristic shared with the cost estimator: one token per four
/// characters of text.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated rendering overhead per message (role tag, spacing).
const MESSAGE_OVERHEAD_TOKENS: usize = 4;
/// Estimated rendering overhead per conversation (header line).
const CONVERSATION_OVERHEAD_TOKENS: usize = 15;
/// Truncation never cuts a body below this many characters.
const MIN_BODY_CHARS: usize = 240;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// The pruned conversation set plus bookkeeping about what was cut.
#[derive(Debug)]
pub struct CompressedConversations {
    pub conversations: Vec<Conversation>,
    pub estimated_tokens: usize,
    pub original_messages: usize,
    pub retained_messages: usize,
}

impl CompressedConversations {
    /// Render the retained set as the analysis prompt body.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for conversation in &self.conversations {
            out.push_str(&format!(
                "## Conversation {} ({})",
                conversation.id,
                conversation.created_at.format("%Y-%m-%d")
            ));
            if !conversation.tags.is_empty() {
                let tags: Vec<&str> = conversation.tags.iter().map(String::as_str).collect();
                out.push_str(&format!(" [tags: {}]", tags.join(", ")));
            }
            out.push('\n');
            for message in &conversation.messages {
                out.push_str(&format!(
                    "[{}] {}\n",
                    message.author_role.as_str(),
                    message.body
                ));
            }
            out.push('\n');
        }
        out
    }
}

pub struct ConversationCompressor {
    token_budget: usize,
}

impl Default for ConversationCompressor {
    fn default() -> Self {
        Self::new(config::DEFAULT_TOKEN_BUDGET)
    }
}

/// A droppable middle message, keyed for deterministic ordering.
struct Candidate {
    conv_idx: usize,
    msg_idx: usize,
    role: AuthorRole,
    body_chars: usize,
    created_at: DateTime<Utc>,
    id: String,
}

impl ConversationCompressor {
    pub fn new(token_budget: usize) -> Self {
        Self { token_budget }
    }

    pub fn compress(&self, conversations: &[Conversation]) -> CompressedConversations {
        let mut kept: Vec<Conversation> = conversations.to_vec();
        let original_messages: usize = kept.iter().map(|c| c.messages.len()).sum();

        // Anchor messages survive every pruning decision.
        let mut protected: HashSet<(usize, usize)> = HashSet::new();
        for (conv_idx, conversation) in kept.iter().enumerate() {
            if let Some(first) = conversation.first_customer_index() {
                protected.insert((conv_idx, first));
            }
            if let Some(last) = conversation.last_index() {
                protected.insert((conv_idx, last));
            }
        }

        let mut estimate = Self::estimate_set(&kept);
        if estimate <= self.token_budget {
            return CompressedConversations {
                estimated_tokens: estimate,
                original_messages,
                retained_messages: original_messages,
                conversations: kept,
            };
        }

        // Phase 1: shed unprotected middle turns, least valuable first.
        // Agent turns go before customer turns, longer bodies before
        // shorter, older before newer.
        let mut candidates: Vec<Candidate> = Vec::new();
        for (conv_idx, conversation) in kept.iter().enumerate() {
            for (msg_idx, message) in conversation.messages.iter().enumerate() {
                if protected.contains(&(conv_idx, msg_idx)) {
                    continue;
                }
                candidates.push(Candidate {
                    conv_idx,
                    msg_idx,
                    role: message.author_role,
                    body_chars: message.body.chars().count(),
                    created_at: message.created_at,
                    id: message.id.clone(),
                });
            }
        }
        candidates.sort_by(|a, b| {
            let role_weight = |r: AuthorRole| match r {
                AuthorRole::Agent => 0u8,
                AuthorRole::Customer => 1,
            };
            role_weight(a.role)
                .cmp(&role_weight(b.role))
                .then(b.body_chars.cmp(&a.body_chars))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let mut dropped: HashSet<(usize, usize)> = HashSet::new();
        for candidate in &candidates {
            if estimate <= self.token_budget {
                break;
            }
            dropped.insert((candidate.conv_idx, candidate.msg_idx));
            estimate = estimate
                .saturating_sub(candidate.body_chars.div_ceil(CHARS_PER_TOKEN))
                .saturating_sub(MESSAGE_OVERHEAD_TOKENS);
        }
        if !dropped.is_empty() {
            for (conv_idx, conversation) in kept.iter_mut().enumerate() {
                let mut msg_idx = 0;
                conversation.messages.retain(|_| {
                    let keep = !dropped.contains(&(conv_idx, msg_idx));
                    msg_idx += 1;
                    keep
                });
            }
            estimate = Self::estimate_set(&kept);
        }

        // Phase 2: still over budget with only anchors left, so trim
        // the longest remaining bodies down to a floor.
        if estimate > self.token_budget {
            let mut order: Vec<(usize, usize, usize)> = kept
                .iter()
                .enumerate()
                .flat_map(|(conv_idx, c)| {
                    c.messages
                        .iter()
                        .enumerate()
                        .map(move |(msg_idx, m)| (m.body.chars().count(), conv_idx, msg_idx))
                })
                .collect();
            order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

            for (body_chars, conv_idx, msg_idx) in order {
                if estimate <= self.token_budget || body_chars <= MIN_BODY_CHARS {
                    break;
                }
                let message = &mut kept[conv_idx].messages[msg_idx];
                let mut truncated: String =
                    message.body.chars().take(MIN_BODY_CHARS).collect();
                truncated.push('…');
                message.body = truncated;
                estimate = Self::estimate_set(&kept);
            }
        }

        let retained_messages = kept.iter().map(|c| c.messages.len()).sum();
        CompressedConversations {
            estimated_tokens: estimate,
            original_messages,
            retained_messages,
            conversations: kept,
        }
    }

    fn estimate_set(conversations: &[Conversation]) -> usize {
        conversations
            .iter()
            .map(|c| {
                CONVERSATION_OVERHEAD_TOKENS
                    + c.messages
                        .iter()
                        .map(|m| estimate_tokens(&m.body) + MESSAGE_OVERHEAD_TOKENS)
                        .sum::<usize>()
            })
            .sum()
    }
}
