use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timeframe::TimeFrame;

/// How severe an insight's customer impact is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Quantified customer impact of an insight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    #[serde(default)]
    pub customer_count: usize,
    #[serde(default)]
    pub percentage: f32,
    #[serde(default)]
    pub severity: Severity,
}

/// A customer reference backing an insight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    /// Absent when the conversation carried no customer identifier.
    #[serde(default)]
    pub email: Option<String>,
    pub conversation_id: String,
}

/// A structured, categorized finding extracted from conversation analysis.
///
/// Every field except the evidence text is defaulted so a partially
/// compliant model reply still deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub impact: Impact,
    #[serde(default)]
    pub customer_refs: Vec<CustomerRef>,
    /// 0–100; higher means more urgent.
    #[serde(default)]
    pub priority_score: u8,
    #[serde(default)]
    pub recommendation: String,
}

/// Token usage and estimated spend for one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostInfo {
    pub tokens_used: u64,
    pub estimated_cost_usd: f64,
    pub model_used: String,
}

impl CostInfo {
    pub fn zero(model: impl Into<String>) -> Self {
        Self {
            tokens_used: 0,
            estimated_cost_usd: 0.0,
            model_used: model.into(),
        }
    }
}

/// Metadata about the analyzed conversation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMeta {
    pub total_conversations: usize,
    pub total_messages: usize,
    pub analyzed_at: DateTime<Utc>,
}

/// The final output of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub insights: Vec<Insight>,
    pub summary: SummaryMeta,
    pub cost: CostInfo,
    pub time_range: TimeFrame,
}

impl AnalysisResult {
    /// A valid zero-conversation result. Not an error: the query simply
    /// matched nothing in the requested window.
    pub fn empty(time_range: TimeFrame, model: impl Into<String>, analyzed_at: DateTime<Utc>) -> Self {
        Self {
            insights: Vec::new(),
            summary: SummaryMeta {
                total_conversations: 0,
                total_messages: 0,
                analyzed_at,
            },
            cost: CostInfo::zero(model),
            time_range,
        }
    }
}
