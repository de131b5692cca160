//! Lightweight LLM integration helpers.
//!
//! Typed wrappers around OpenAI-compatible chat-completions endpoints: a
//! registry of named configurations, prompt templates, the chat client with
//! its blocking, async, streaming and structured call shapes, and template
//! chains built on top of them.

/// Assistant response structures.
pub mod ai;
/// Template-to-model composition.
pub mod chain;
/// Chat model client and invocation patterns.
pub mod chat_models;
pub(crate) mod chat_runtime;
/// Role-tagged messages and requests.
pub mod messages;
/// Prompt templates with named placeholders.
pub mod prompt;
/// Named endpoint configurations and the client factory.
pub mod registry;
pub(crate) mod sse;
/// Schema-constrained output.
pub mod structured;
/// Tool schema and invocation payload helpers.
pub mod tools;

pub use ai::{AIMessage, Usage};
pub use chain::PromptChain;
pub use chat_models::{ChatError, ChatOpenAI, ClientSettings, TokenIter, TokenStream};
pub use messages::{ChatMessage, ChatRequest, Role};
pub use prompt::{ChatPromptTemplate, PromptError, PromptTemplate, PromptValues};
pub use registry::{ClientOverrides, Credential, ModelConfig, ModelId, ModelRegistry, RegistryError};
pub use structured::{AnswerWithJustification, StructuredChat, StructuredOutput};
