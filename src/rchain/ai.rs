use serde::{Deserialize, Serialize};

use crate::rchain::tools::ToolCall;

/// Token accounting reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Assistant message returned by chat models.
#[derive(Debug, Clone, Default)]
pub struct AIMessage {
    /// Natural language content.
    pub content: String,
    /// Optional tool call requests emitted by the model.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}
