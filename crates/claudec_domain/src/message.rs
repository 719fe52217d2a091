use serde::{Deserialize, Serialize};

/// Role of a [`Message`] in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the model.
///
/// Created when parsing an assistant response, consumed when the matching
/// tool result is recorded, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Stable id, server-assigned when the provider supplies one.
    pub id: String,
    pub name: String,
    /// Raw textual JSON, matching the OpenAI wire shape where arguments are
    /// string-encoded rather than nested objects.
    pub arguments: String,
}

impl ToolCall {
    /// A stable client-generated id, used when a provider omits one on a
    /// tool_use/tool_calls entry instead of dropping the call outright.
    pub fn generate_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }
}

/// The completion record for a [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub output: serde_json::Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, name: impl Into<String>, output: serde_json::Value) -> Self {
        Self { tool_call_id: tool_call_id.into(), name: name.into(), output, is_error: false }
    }

    pub fn error(tool_call_id: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            output: serde_json::Value::String(message.into()),
            is_error: true,
        }
    }

    /// Serializes `output` as a plain string, the shape every downstream
    /// translator needs (Anthropic's `tool_result` content is always a
    /// string even when the underlying output is structured JSON).
    pub fn output_as_string(&self) -> String {
        match &self.output {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A message in the conversation history.
///
/// `content` is never `null` on the wire for role=user or role=assistant —
/// a null-content assistant message carrying tool_calls is represented here
/// as `content = Some(String::new())`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: Some(text.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(text.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            // never null on the wire
            content: Some(content.unwrap_or_default()),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(result: &ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: Some(result.output_as_string()),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.tool_call_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::{assert_eq, assert_ne};

    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = ToolCall::generate_id();
        let b = ToolCall::generate_id();
        assert_ne!(a, b);
        assert!(a.starts_with("call_"));
    }

    #[test]
    fn output_as_string_passes_through_plain_strings_unquoted() {
        let result = ToolResult::ok("c1", "shell", serde_json::json!("hello"));
        assert_eq!(result.output_as_string(), "hello");
    }
}
