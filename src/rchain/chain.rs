use crate::rchain::ai::AIMessage;
use crate::rchain::chat_models::{ChatError, ChatOpenAI, TokenIter, TokenStream};
use crate::rchain::prompt::{ChatPromptTemplate, PromptValues};

/// A chat template piped into a model: values in, model output out.
///
/// Rendering happens before any request is sent, so a missing variable
/// fails without touching the network.
#[derive(Debug, Clone)]
pub struct PromptChain {
    template: ChatPromptTemplate,
    model: ChatOpenAI,
}

impl PromptChain {
    pub fn new(template: ChatPromptTemplate, model: ChatOpenAI) -> Self {
        Self { template, model }
    }

    pub fn template(&self) -> &ChatPromptTemplate {
        &self.template
    }

    pub fn model(&self) -> &ChatOpenAI {
        &self.model
    }

    pub fn invoke(&self, values: &PromptValues) -> Result<AIMessage, ChatError> {
        let request = self.template.render(values)?;
        self.model.invoke(request)
    }

    pub fn stream(&self, values: &PromptValues) -> Result<TokenIter, ChatError> {
        let request = self.template.render(values)?;
        self.model.stream(request)
    }

    pub async fn ainvoke(&self, values: &PromptValues) -> Result<AIMessage, ChatError> {
        let request = self.template.render(values)?;
        self.model.ainvoke(request).await
    }

    pub async fn astream(&self, values: &PromptValues) -> Result<TokenStream, ChatError> {
        let request = self.template.render(values)?;
        self.model.astream(request).await
    }
}
