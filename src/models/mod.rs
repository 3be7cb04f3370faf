pub mod conversation;
pub mod insight;
pub mod progress;
pub mod timeframe;

pub use conversation::{AuthorRole, Conversation, ConversationFilters, Message};
pub use insight::{
    AnalysisResult, CostInfo, CustomerRef, Impact, Insight, Severity, SummaryMeta,
};
pub use progress::{ProgressEvent, Stage};
pub use timeframe::TimeFrame;
