use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

/// JSON schema primitive types supported for tool parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolParamType {
    Integer,
    Number,
    String,
    Boolean,
    Object,
    Array,
}

impl ToolParamType {
    fn as_str(self) -> &'static str {
        match self {
            ToolParamType::Integer => "integer",
            ToolParamType::Number => "number",
            ToolParamType::String => "string",
            ToolParamType::Boolean => "boolean",
            ToolParamType::Object => "object",
            ToolParamType::Array => "array",
        }
    }
}

/// One function parameter definition.
#[derive(Debug, Clone)]
pub struct ToolParam {
    /// Parameter name.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// JSON schema type.
    pub kind: ToolParamType,
    /// Whether the parameter is required.
    pub required: bool,
}

impl ToolParam {
    /// Builds a required parameter.
    pub fn required(name: impl Into<String>, kind: ToolParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            description: Some(description.to_string()).filter(|text| !text.is_empty()),
            kind,
            required: true,
        }
    }

    /// Builds an optional parameter.
    pub fn optional(name: impl Into<String>, kind: ToolParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Callable function definition, also used to declare structured output shapes.
#[derive(Debug, Clone)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
}

impl ToolFunction {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Appends one parameter definition.
    pub fn with_param(mut self, param: ToolParam) -> Self {
        self.params.push(param);
        self
    }

    /// Names of the parameters marked as required, in declaration order.
    pub fn required_params(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name.as_str())
    }

    /// JSON schema of the parameter object.
    pub fn to_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            let mut param_def = Map::new();
            param_def.insert(
                "type".to_string(),
                Value::String(param.kind.as_str().to_string()),
            );
            if let Some(description) = &param.description {
                param_def.insert(
                    "description".to_string(),
                    Value::String(description.clone()),
                );
            }
            properties.insert(param.name.clone(), Value::Object(param_def));
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String("object".to_string()));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        Value::Object(schema)
    }
}

/// Tool wrapper matching chat-completions function-calling schema.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub function: ToolFunction,
}

impl ToolDefinition {
    pub fn from_function(function: ToolFunction) -> Self {
        Self { function }
    }

    /// Serializes the tool declaration to JSON.
    pub fn to_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.function.name,
                "description": self.function.description,
                "parameters": self.function.to_schema(),
            }
        })
    }

    /// `tool_choice` payload forcing the model to call this tool.
    pub fn forced_choice(&self) -> Value {
        json!({
            "type": "function",
            "function": { "name": self.function.name }
        })
    }
}

/// Tool call emitted by a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Provider-generated call id.
    pub id: String,
    /// Tool/function name.
    pub name: String,
    /// Arguments payload, decoded from the provider's JSON string when possible.
    pub args: Value,
}

impl ToolCall {
    fn args_as_string(&self) -> String {
        match &self.args {
            Value::String(value) => value.clone(),
            other => other.to_string(),
        }
    }

    /// Serializes a tool call payload to provider JSON format.
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.name,
                "arguments": self.args_as_string(),
            }
        })
    }
}

impl Serialize for ToolCall {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Extracts tool calls from a `choices[].message` object.
pub fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let id = call["id"].as_str().unwrap_or("").to_string();
            let name = call["function"]["name"].as_str().unwrap_or("").to_string();
            let args = match &call["function"]["arguments"] {
                Value::String(raw) => {
                    serde_json::from_str(raw).unwrap_or(Value::String(raw.clone()))
                }
                other => other.clone(),
            };
            if !name.is_empty() {
                tool_calls.push(ToolCall { id, name, args });
            }
        }
    }
    tool_calls
}

#[cfg(test)]
mod tests {
    use super::{ToolDefinition, ToolFunction, ToolParam, ToolParamType, parse_tool_calls};
    use serde_json::json;

    #[test]
    fn schema_lists_required_params_only() {
        let function = ToolFunction::new("lookup", "Look something up")
            .with_param(ToolParam::required("query", ToolParamType::String, "What to find"))
            .with_param(ToolParam::optional("limit", ToolParamType::Integer, ""));

        let schema = function.to_schema();
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["limit"], json!({"type": "integer"}));
        assert_eq!(
            schema["properties"]["query"]["description"],
            json!("What to find")
        );
    }

    #[test]
    fn forced_choice_names_the_function() {
        let tool = ToolDefinition::from_function(ToolFunction::new("answer", "Answer"));
        assert_eq!(tool.forced_choice()["function"]["name"], json!("answer"));
        assert_eq!(tool.to_json()["type"], json!("function"));
    }

    #[test]
    fn tool_call_arguments_are_decoded_from_strings() {
        let message = json!({
            "tool_calls": [
                {"id": "c1", "function": {"name": "answer", "arguments": "{\"answer\":\"42\"}"}},
                {"id": "c2", "function": {"name": "", "arguments": "{}"}},
                {"id": "c3", "function": {"name": "raw", "arguments": "not json"}}
            ]
        });

        let calls = parse_tool_calls(&message);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, json!({"answer": "42"}));
        assert_eq!(calls[1].args, json!("not json"));
        assert_eq!(calls[0].to_json()["function"]["arguments"], json!("{\"answer\":\"42\"}"));
    }
}
