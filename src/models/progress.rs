use serde::{Deserialize, Serialize};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Interpreting,
    Fetching,
    Compressing,
    Analyzing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interpreting => "interpreting",
            Self::Fetching => "fetching",
            Self::Compressing => "compressing",
            Self::Analyzing => "analyzing",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage-transition event emitted synchronously by the query processor.
/// Never persisted; the transport that forwards these (SSE, console) is an
/// external consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub message: String,
    /// 0–100.
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(stage: Stage, message: impl Into<String>, percent: u8) -> Self {
        Self {
            stage,
            message: message.into(),
            percent: percent.min(100),
        }
    }
}
