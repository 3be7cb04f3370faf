//! LLM analysis of compressed conversations.
//!
//! The engine builds a structured-output prompt, calls the configured
//! chat model under a bounded timeout, and parses insights out of the
//! reply. Models drift: sometimes they return the requested JSON,
//! sometimes prose. Parsing therefore has a strict path and a salvage
//! path, and a malformed reply downgrades to a logged fallback instead
//! of failing the run.

pub mod cost;
pub mod engine;
pub mod model;
pub mod parse;
pub mod prompt;

use thiserror::Error;

pub use engine::AnalysisEngine;
pub use model::{ChatCompletion, ChatModel, HttpChatModel, MockChatModel, TokenUsage};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("model call failed: {0}")]
    ModelCall(String),
    #[error("model call timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },
    #[error("model returned an empty response")]
    EmptyResponse,
}
