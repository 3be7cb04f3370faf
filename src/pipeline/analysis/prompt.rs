//! Prompt construction for the analysis call.

use crate::models::TimeFrame;
use crate::pipeline::compress::CompressedConversations;

/// System prompt pinning the output contract. The parser tolerates
/// deviations, but the schema here is what a compliant model returns.
pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a support-operations analyst. You read customer support conversations and extract actionable insights.

Respond with a JSON array of insight objects and nothing else. Each object has this shape:

{
  "id": "string (optional)",
  "category": "string, e.g. BUG, BILLING, UX, FEATURE_REQUEST, GENERAL",
  "title": "one-line summary",
  "description": "what is happening and the evidence for it",
  "impact": {
    "customer_count": integer,
    "percentage": number 0-100,
    "severity": "low" | "medium" | "high" | "critical"
  },
  "customer_refs": [{ "email": "string or null", "conversation_id": "string" }],
  "priority_score": integer 0-100,
  "recommendation": "concrete next step"
}

Ground every insight in the conversations you were given. Do not invent customers or conversation ids. If nothing noteworthy appears, return []."#;

/// Assemble the user prompt: the interpreted window, corpus stats, then
/// the rendered conversations.
pub fn build_analysis_prompt(
    query: &str,
    time_frame: &TimeFrame,
    compressed: &CompressedConversations,
) -> String {
    format!(
        "Analyst question: {query}\n\
         Time window: {} ({} to {})\n\
         Conversations: {} ({} of {} messages shown)\n\n\
         {}",
        time_frame.description,
        time_frame.start.format("%Y-%m-%dT%H:%M:%SZ"),
        time_frame.end.format("%Y-%m-%dT%H:%M:%SZ"),
        compressed.conversations.len(),
        compressed.retained_messages,
        compressed.original_messages,
        compressed.render()
    )
}
