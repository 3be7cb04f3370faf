//! The analysis engine: prompt in, `AnalysisResult` out.

use chrono::{DateTime, Utc};

use crate::models::{AnalysisResult, SummaryMeta, TimeFrame};
use crate::pipeline::compress::CompressedConversations;

use super::cost::cost_of;
use super::model::ChatModel;
use super::parse::parse_insights;
use super::prompt::{build_analysis_prompt, ANALYSIS_SYSTEM_PROMPT};
use super::AnalysisError;

pub struct AnalysisEngine<M: ChatModel> {
    model: M,
}

impl<M: ChatModel> AnalysisEngine<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Run one analysis pass over the compressed conversation set.
    ///
    /// Transport and timeout failures propagate; a reply that merely
    /// deviates from the JSON contract is salvaged by the parser and
    /// never fails the run.
    pub async fn analyze(
        &self,
        query: &str,
        time_frame: &TimeFrame,
        compressed: &CompressedConversations,
        analyzed_at: DateTime<Utc>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let user_prompt = build_analysis_prompt(query, time_frame, compressed);

        tracing::debug!(
            conversations = compressed.conversations.len(),
            prompt_tokens_estimate = compressed.estimated_tokens,
            model = %self.model.model_name(),
            "Requesting analysis"
        );

        let completion = self
            .model
            .complete(ANALYSIS_SYSTEM_PROMPT, &user_prompt)
            .await?;

        let insights = parse_insights(&completion.text);
        let cost = cost_of(&completion, &user_prompt);

        tracing::info!(
            insights = insights.len(),
            tokens = cost.tokens_used,
            "Analysis complete"
        );

        Ok(AnalysisResult {
            insights,
            summary: SummaryMeta {
                total_conversations: compressed.conversations.len(),
                total_messages: compressed.original_messages,
                analyzed_at,
            },
            cost,
            time_range: time_frame.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorRole, Conversation, Message};
    use crate::pipeline::analysis::model::{MockChatModel, TokenUsage};
    use crate::pipeline::compress::ConversationCompressor;
    use chrono::TimeZone;

    fn window() -> TimeFrame {
        TimeFrame::new(
            Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
            "yesterday",
        )
    }

    fn one_conversation() -> Vec<Conversation> {
        vec![Conversation {
            id: "c1".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 9, 9, 0, 0).unwrap(),
            messages: vec![Message {
                id: "m1".to_string(),
                author_role: AuthorRole::Customer,
                body: "The export keeps failing".to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 1, 9, 9, 0, 0).unwrap(),
            }],
            customer_identifier: Some("jo@example.com".to_string()),
            tags: Default::default(),
        }]
    }

    #[tokio::test]
    async fn structured_reply_flows_through_to_the_result() {
        let model = MockChatModel::new(vec![
            r#"[{ "category": "BUG", "title": "Export failures", "description": "d", "priority_score": 70 }]"#.to_string(),
        ])
        .with_usage(TokenUsage {
            prompt_tokens: 500,
            completion_tokens: 50,
            total_tokens: 550,
        });
        let engine = AnalysisEngine::new(model);
        let compressed = ConversationCompressor::default().compress(&one_conversation());

        let result = engine
            .analyze("what broke?", &window(), &compressed, Utc::now())
            .await
            .unwrap();

        assert_eq!(result.insights.len(), 1);
        assert_eq!(result.insights[0].id, "insight-1");
        assert_eq!(result.summary.total_conversations, 1);
        assert_eq!(result.summary.total_messages, 1);
        assert_eq!(result.cost.tokens_used, 550);
        assert_eq!(result.time_range.description, "yesterday");
    }

    #[tokio::test]
    async fn off_contract_reply_is_salvaged_not_fatal() {
        let model = MockChatModel::new(vec![
            "- Exports time out\n- Billing page 404s".to_string(),
        ]);
        let engine = AnalysisEngine::new(model);
        let compressed = ConversationCompressor::default().compress(&one_conversation());

        let result = engine
            .analyze("what broke?", &window(), &compressed, Utc::now())
            .await
            .unwrap();

        assert_eq!(result.insights.len(), 2);
        assert_eq!(result.insights[0].category, "GENERAL");
    }

    #[tokio::test]
    async fn empty_reply_propagates_as_an_error() {
        let model = MockChatModel::new(vec![String::new()]);
        let engine = AnalysisEngine::new(model);
        let compressed = ConversationCompressor::default().compress(&one_conversation());

        let err = engine
            .analyze("q", &window(), &compressed, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyResponse));
    }
}
