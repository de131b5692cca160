use async_trait::async_trait;

use crate::rchain::chat_models::{ChatError, ChatOpenAI};
use crate::rchain::messages::ChatRequest;

pub const JUDGE_TEMPERATURE: f32 = 0.0;
pub const JUDGE_MAX_TOKENS: u32 = 1000;

/// Text generator used by metrics to score test cases.
#[async_trait]
pub trait EvalModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Blocking generation. Do not call from an async worker thread.
    fn generate(&self, prompt: &str) -> Result<String, ChatError>;

    async fn a_generate(&self, prompt: &str) -> Result<String, ChatError>;
}

/// Adapts a chat client to [`EvalModel`]; every call is a fresh request.
#[derive(Debug, Clone)]
pub struct ChatEvalModel {
    chat: ChatOpenAI,
}

impl ChatEvalModel {
    /// Wraps `chat` with deterministic judge settings.
    pub fn new(chat: ChatOpenAI) -> Self {
        Self {
            chat: chat
                .temperature(JUDGE_TEMPERATURE)
                .max_tokens(JUDGE_MAX_TOKENS),
        }
    }

    /// Wraps `chat` keeping its own sampling settings.
    pub fn from_client(chat: ChatOpenAI) -> Self {
        Self { chat }
    }

    pub fn chat(&self) -> &ChatOpenAI {
        &self.chat
    }
}

#[async_trait]
impl EvalModel for ChatEvalModel {
    fn model_name(&self) -> &str {
        self.chat.model()
    }

    fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        Ok(self.chat.invoke(ChatRequest::from(prompt))?.content)
    }

    async fn a_generate(&self, prompt: &str) -> Result<String, ChatError> {
        Ok(self.chat.ainvoke(ChatRequest::from(prompt)).await?.content)
    }
}
