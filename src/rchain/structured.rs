//! Schema-constrained output through forced function calling.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rchain::ai::AIMessage;
use crate::rchain::chat_models::{ChatError, ChatOpenAI, ToolBinding};
use crate::rchain::messages::ChatRequest;
use crate::rchain::tools::{ToolDefinition, ToolFunction, ToolParam, ToolParamType};

/// A type the model can be asked to produce.
pub trait StructuredOutput: DeserializeOwned {
    /// Function declaration describing the expected fields.
    fn schema() -> ToolFunction;
}

/// An answer to the user's question along with justification for the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerWithJustification {
    pub answer: String,
    pub justification: String,
}

impl StructuredOutput for AnswerWithJustification {
    fn schema() -> ToolFunction {
        ToolFunction::new(
            "AnswerWithJustification",
            "An answer to the user's question along with justification for the answer.",
        )
        .with_param(ToolParam::required(
            "answer",
            ToolParamType::String,
            "The answer to the user's question",
        ))
        .with_param(ToolParam::required(
            "justification",
            ToolParamType::String,
            "Justification for the answer",
        ))
    }
}

/// Chat handle whose responses are parsed into `T`.
#[derive(Debug, Clone)]
pub struct StructuredChat<T> {
    model: ChatOpenAI,
    tool: ToolDefinition,
    binding: ToolBinding,
    _output: PhantomData<fn() -> T>,
}

impl ChatOpenAI {
    /// Binds `T`'s schema as the single forced tool.
    pub fn with_structured_output<T: StructuredOutput>(&self) -> StructuredChat<T> {
        let tool = ToolDefinition::from_function(T::schema());
        let binding = ToolBinding::forced(&tool);
        StructuredChat {
            model: self.clone(),
            tool,
            binding,
            _output: PhantomData,
        }
    }
}

impl<T: StructuredOutput> StructuredChat<T> {
    pub fn schema_name(&self) -> &str {
        &self.tool.function.name
    }

    pub fn invoke(&self, request: impl Into<ChatRequest>) -> Result<T, ChatError> {
        let message = self
            .model
            .complete_blocking(&request.into(), Some(&self.binding))?;
        coerce(&self.tool.function, &message)
    }

    pub async fn ainvoke(&self, request: impl Into<ChatRequest>) -> Result<T, ChatError> {
        let message = self
            .model
            .complete(&request.into(), Some(&self.binding))
            .await?;
        coerce(&self.tool.function, &message)
    }
}

/// Reads the matching tool call, falling back to JSON in the message text.
pub(crate) fn coerce<T: DeserializeOwned>(
    schema: &ToolFunction,
    message: &AIMessage,
) -> Result<T, ChatError> {
    let fail = |reason: String| ChatError::Schema {
        schema: schema.name.clone(),
        reason,
    };

    let candidate = match message
        .tool_calls
        .iter()
        .find(|call| call.name == schema.name)
    {
        Some(call) => match &call.args {
            Value::String(raw) => extract_json(raw)
                .ok_or_else(|| fail("tool arguments are not a JSON object".to_string()))?,
            other => other.clone(),
        },
        None => extract_json(&message.content)
            .ok_or_else(|| fail("response contains neither a tool call nor JSON".to_string()))?,
    };

    if let Some(missing) = schema
        .required_params()
        .find(|name| candidate.get(*name).is_none_or(Value::is_null))
    {
        return Err(fail(format!("missing required field '{missing}'")));
    }

    serde_json::from_value(candidate).map_err(|err| fail(err.to_string()))
}

/// Finds the first JSON object in free text, ignoring code fences and prose around it.
pub(crate) fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    trimmed.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&trimmed[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value @ Value::Object(_))) => Some(value),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{AnswerWithJustification, StructuredOutput, coerce, extract_json};
    use crate::rchain::ai::AIMessage;
    use crate::rchain::chat_models::ChatError;
    use crate::rchain::tools::ToolCall;
    use serde_json::json;

    fn message_with_args(args: serde_json::Value) -> AIMessage {
        AIMessage {
            tool_calls: vec![ToolCall {
                id: "call_0".to_string(),
                name: "AnswerWithJustification".to_string(),
                args,
            }],
            ..AIMessage::default()
        }
    }

    #[test]
    fn tool_call_arguments_are_coerced() {
        let message = message_with_args(json!({
            "answer": "They weigh the same.",
            "justification": "A pound is a pound."
        }));
        let parsed: AnswerWithJustification =
            coerce(&AnswerWithJustification::schema(), &message).expect("coerces");
        assert_eq!(parsed.answer, "They weigh the same.");
    }

    #[test]
    fn fenced_json_content_is_accepted() {
        let message = AIMessage {
            content: "Sure:\n```json\n{\"answer\": \"same\", \"justification\": \"mass\"}\n```"
                .to_string(),
            ..AIMessage::default()
        };
        let parsed: AnswerWithJustification =
            coerce(&AnswerWithJustification::schema(), &message).expect("coerces");
        assert_eq!(parsed.justification, "mass");
    }

    #[test]
    fn missing_required_field_is_a_schema_error() {
        let message = message_with_args(json!({ "answer": "same", "justification": null }));
        let err = coerce::<AnswerWithJustification>(&AnswerWithJustification::schema(), &message)
            .expect_err("justification is required");
        match err {
            ChatError::Schema { schema, reason } => {
                assert_eq!(schema, "AnswerWithJustification");
                assert!(reason.contains("justification"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn plain_prose_cannot_be_coerced() {
        let message = AIMessage {
            content: "A pound of bricks and a pound of feathers weigh the same.".to_string(),
            ..AIMessage::default()
        };
        assert!(matches!(
            coerce::<AnswerWithJustification>(&AnswerWithJustification::schema(), &message),
            Err(ChatError::Schema { .. })
        ));
    }

    #[test]
    fn extract_json_ignores_non_objects() {
        assert_eq!(extract_json("[1, 2]"), None);
        assert_eq!(extract_json("score: {\"score\": 7}"), Some(json!({"score": 7})));
    }

    #[test]
    fn extract_json_stops_at_the_end_of_the_first_object() {
        assert_eq!(
            extract_json("{\"score\": 8, \"reason\": \"ok\"} (see {note})"),
            Some(json!({"score": 8, "reason": "ok"}))
        );
        assert_eq!(
            extract_json("Using {braces} loosely, verdict: {\"score\": 3} and {more}"),
            Some(json!({"score": 3}))
        );
    }
}
