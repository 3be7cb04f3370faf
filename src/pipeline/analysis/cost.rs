//! Cost accounting for model calls.

use crate::models::CostInfo;
use crate::pipeline::compress::estimate_tokens;

use super::model::{ChatCompletion, TokenUsage};

/// Per-million-token prices, (input, output), USD. Unknown models fall
/// back to the most expensive listed tier so estimates stay pessimistic.
const MODEL_PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1", 2.00, 8.00),
];

fn prices_for(model: &str) -> (f64, f64) {
    MODEL_PRICES
        .iter()
        .find(|(name, _, _)| model.starts_with(name))
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or((2.50, 10.00))
}

/// Compute the cost of one completion. Uses backend-reported usage when
/// present, otherwise estimates from prompt and reply lengths.
pub fn cost_of(completion: &ChatCompletion, prompt: &str) -> CostInfo {
    let (prompt_tokens, completion_tokens, total) = match completion.usage {
        Some(TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }) => (prompt_tokens, completion_tokens, total_tokens),
        None => {
            let prompt_tokens = estimate_tokens(prompt) as u64;
            let completion_tokens = estimate_tokens(&completion.text) as u64;
            (
                prompt_tokens,
                completion_tokens,
                prompt_tokens + completion_tokens,
            )
        }
    };

    let (input_price, output_price) = prices_for(&completion.model);
    let estimated_cost_usd = (prompt_tokens as f64 * input_price
        + completion_tokens as f64 * output_price)
        / 1_000_000.0;

    CostInfo {
        tokens_used: total,
        estimated_cost_usd,
        model_used: completion.model.clone(),
    }
}
