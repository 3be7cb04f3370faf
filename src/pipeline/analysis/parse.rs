//! Dual-path insight parsing.
//!
//! Strict path: pull the JSON payload out of the reply (tolerating code
//! fences and surrounding prose) and deserialize it. Salvage path: when
//! no usable JSON exists, lift bullet or numbered lines into minimal
//! insights so an off-contract reply still yields something actionable.
//! This function never fails; the worst input produces an empty list.

use serde::Deserialize;

use crate::models::{Insight, Severity};

/// Wrapper shape some models produce instead of a bare array.
#[derive(Deserialize)]
struct InsightEnvelope {
    insights: Vec<Insight>,
}

pub fn parse_insights(text: &str) -> Vec<Insight> {
    if let Some(mut insights) = parse_json_payload(text) {
        normalize(&mut insights);
        return insights;
    }

    tracing::warn!("Model reply was not valid insight JSON, salvaging text");
    let mut insights = salvage_text(text);
    normalize(&mut insights);
    insights
}

fn parse_json_payload(text: &str) -> Option<Vec<Insight>> {
    let stripped = strip_code_fences(text);
    let candidate = extract_json_span(&stripped)?;

    if let Ok(list) = serde_json::from_str::<Vec<Insight>>(candidate) {
        return Some(list);
    }
    if let Ok(envelope) = serde_json::from_str::<InsightEnvelope>(candidate) {
        return Some(envelope.insights);
    }
    if let Ok(single) = serde_json::from_str::<Insight>(candidate) {
        // A lone object with no content is noise, not an insight.
        if single.title.is_empty() && single.description.is_empty() {
            return None;
        }
        return Some(vec![single]);
    }
    None
}

fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Slice from the first opening bracket to the last matching-kind
/// closing bracket. Good enough for prose-wrapped payloads.
fn extract_json_span(text: &str) -> Option<&str> {
    let open = text.find(['[', '{'])?;
    let close = match text.as_bytes()[open] {
        b'[' => text.rfind(']')?,
        _ => text.rfind('}')?,
    };
    if close <= open {
        return None;
    }
    Some(&text[open..=close])
}

fn salvage_text(text: &str) -> Vec<Insight> {
    let bullets: Vec<&str> = text
        .lines()
        .filter_map(bullet_body)
        .filter(|line| !line.is_empty())
        .collect();

    if !bullets.is_empty() {
        return bullets.into_iter().map(insight_from_line).collect();
    }

    // No structure at all: a single best-effort insight from the first
    // non-blank line.
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| vec![insight_from_line(line)])
        .unwrap_or_default()
}

fn bullet_body(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("• "))
    {
        return Some(rest.trim());
    }
    // "1. ..." / "12) ..."
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(body) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(body.trim());
        }
    }
    None
}

fn insight_from_line(line: &str) -> Insight {
    Insight {
        id: String::new(),
        category: "GENERAL".to_string(),
        title: line.to_string(),
        description: line.to_string(),
        impact: crate::models::Impact {
            customer_count: 0,
            percentage: 0.0,
            severity: Severity::Medium,
        },
        customer_refs: Vec::new(),
        priority_score: 50,
        recommendation: String::new(),
    }
}

/// Ids must be present and stable for a given reply so downstream
/// consumers can reference insights across runs; categories must never
/// be blank.
fn normalize(insights: &mut [Insight]) {
    for (idx, insight) in insights.iter_mut().enumerate() {
        if insight.id.trim().is_empty() {
            insight.id = format!("insight-{}", idx + 1);
        }
        if insight.category.trim().is_empty() {
            insight.category = "GENERAL".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_path_parses_a_bare_array() {
        let reply = r#"[
            {
                "id": "billing-export",
                "category": "BUG",
                "title": "CSV export fails",
                "description": "Exports over 10k rows 500",
                "impact": { "customer_count": 12, "percentage": 4.0, "severity": "high" },
                "customer_refs": [{ "email": "a@b.com", "conversation_id": "c1" }],
                "priority_score": 88,
                "recommendation": "Fix the export worker"
            }
        ]"#;

        let insights = parse_insights(reply);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].id, "billing-export");
        assert_eq!(insights[0].impact.severity, Severity::High);
        assert_eq!(insights[0].customer_refs[0].conversation_id, "c1");
    }

    #[test]
    fn strict_path_tolerates_fences_and_prose() {
        let reply = "Here is my analysis:\n```json\n[{\"category\": \"UX\", \"title\": \"Confusing settings\", \"description\": \"d\"}]\n```\nLet me know if you need more.";

        let insights = parse_insights(reply);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].category, "UX");
        // Missing ids are filled deterministically.
        assert_eq!(insights[0].id, "insight-1");
    }

    #[test]
    fn envelope_shape_is_accepted() {
        let reply = r#"{ "insights": [{ "title": "t", "description": "d" }] }"#;
        let insights = parse_insights(reply);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "t");
    }

    #[test]
    fn salvage_path_lifts_dash_lines_into_insights() {
        let reply = "Several customers are upset.\n- Exports time out for large accounts\n- Password reset emails arrive late";

        let insights = parse_insights(reply);
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].title, "Exports time out for large accounts");
        assert_eq!(insights[0].category, "GENERAL");
        assert_eq!(insights[0].impact.severity, Severity::Medium);
        assert_eq!(insights[0].priority_score, 50);
        assert_eq!(insights[1].id, "insight-2");
    }

    #[test]
    fn numbered_lines_also_salvage() {
        let reply = "1. Slow dashboard loads\n2) Broken SSO for Okta tenants";
        let insights = parse_insights(reply);
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[1].title, "Broken SSO for Okta tenants");
    }

    #[test]
    fn plain_prose_becomes_a_single_insight() {
        let insights = parse_insights("Everything looks healthy this week.");
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Everything looks healthy this week.");
    }

    #[test]
    fn empty_array_and_blank_text_yield_nothing() {
        assert!(parse_insights("[]").is_empty());
        assert!(parse_insights("   \n  ").is_empty());
    }

    #[test]
    fn malformed_json_falls_back_instead_of_failing() {
        let insights = parse_insights("[{ \"title\": \"unterminated\" ");
        // No closing bracket, no bullets: first line becomes the insight.
        assert_eq!(insights.len(), 1);
        assert!(insights[0].title.contains("unterminated"));
    }
}
