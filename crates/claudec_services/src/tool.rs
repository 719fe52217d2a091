use std::sync::atomic::AtomicBool;

/// The structured result of a single tool invocation, after truncation has
/// already been applied.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
    /// Set when `content` was shortened to fit the output byte limit.
    pub truncation_warning: Option<String>,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false, truncation_warning: None }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: true, truncation_warning: None }
    }
}

/// Maximum combined stdout+stderr size, in bytes, before a tool result is
/// truncated and annotated with `truncation_warning`.
pub const MAX_OUTPUT_BYTES: usize = 12_228;

/// Truncates `content` to the last `limit` bytes on a char boundary,
/// matching the shell tool's "show the tail of a long run" behavior.
/// Returns the (possibly unchanged) content plus a warning when truncation
/// happened.
pub fn truncate_output(content: &str, limit: usize) -> (String, Option<String>) {
    if content.len() <= limit {
        return (content.to_string(), None);
    }

    let original_len = content.len();
    let mut start = original_len - limit;
    while start < original_len && !content.is_char_boundary(start) {
        start += 1;
    }

    let truncated = content[start..].to_string();
    let warning = format!(
        "output truncated: {original_len} bytes total, {start} bytes omitted from the start, showing the last {limit} bytes"
    );
    (truncated, Some(warning))
}

/// A single executable tool. Implementations run on a dedicated OS thread
/// spawned by [`crate::dispatcher::ToolDispatcher`] and must observe
/// `cancelled` promptly — it is set both on ESC-interrupt and on a per-call
/// timeout expiring.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for this tool's arguments, advertised to the provider as
    /// an OpenAI function-tool `parameters` object (translated to
    /// Anthropic's `input_schema` for Bedrock).
    fn parameters(&self) -> serde_json::Value;
    fn execute(&self, arguments: &str, cancelled: &AtomicBool) -> anyhow::Result<ToolOutput>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn short_output_is_untouched() {
        let (content, warning) = truncate_output("hello", 100);
        assert_eq!(content, "hello");
        assert!(warning.is_none());
    }

    #[test]
    fn long_output_keeps_the_tail() {
        let content = "a".repeat(20) + "TAIL";
        let (truncated, warning) = truncate_output(&content, 4);
        assert_eq!(truncated, "TAIL");
        assert!(warning.unwrap().contains("24 bytes total"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let content = "日本語".repeat(10);
        let (truncated, _) = truncate_output(&content, 5);
        assert!(truncated.is_char_boundary(0));
    }
}
