use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::rchain::tools::ToolCall;

/// Supported role values in chat requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// Human/user role.
    User,
    /// Assistant role.
    Assistant,
    /// Tool result role.
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Accepts the wire names plus the `human`/`ai` aliases used in chat templates.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" | "human" => Ok(Self::User),
            "assistant" | "ai" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(other.to_string()),
        }
    }
}

/// One role-tagged message in a chat-completions request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Builds a tool-result message associated with a tool call id.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// Ordered list of messages sent in one call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ChatRequest {
    messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Prepends a system message to an existing request.
    pub fn with_system(self, system: impl Into<String>) -> Self {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(ChatMessage::system(system));
        messages.extend(self.messages);
        Self { messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<&str> for ChatRequest {
    fn from(prompt: &str) -> Self {
        Self::new(vec![ChatMessage::user(prompt)])
    }
}

impl From<String> for ChatRequest {
    fn from(prompt: String) -> Self {
        Self::new(vec![ChatMessage::user(prompt)])
    }
}

impl From<Vec<ChatMessage>> for ChatRequest {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self::new(messages)
    }
}

impl From<ChatMessage> for ChatRequest {
    fn from(message: ChatMessage) -> Self {
        Self::new(vec![message])
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, ChatRequest, Role};
    use serde_json::json;

    #[test]
    fn role_aliases_parse() {
        assert_eq!("human".parse::<Role>(), Ok(Role::User));
        assert_eq!("AI".parse::<Role>(), Ok(Role::Assistant));
        assert_eq!(" system ".parse::<Role>(), Ok(Role::System));
        assert_eq!("narrator".parse::<Role>(), Err("narrator".to_string()));
    }

    #[test]
    fn plain_messages_serialize_without_tool_fields() {
        let request = ChatRequest::from("hi").with_system("be brief");
        let value = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(
            value,
            json!([
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"}
            ])
        );
    }

    #[test]
    fn tool_result_carries_call_id() {
        let message = ChatMessage::tool_result("call_1", "{}");
        let value = serde_json::to_value(&message).expect("message should serialize");
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
    }
}
