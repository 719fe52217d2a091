use std::collections::HashSet;

use crate::error::Error;
use crate::message::{Message, Role, ToolCall, ToolResult};

/// Ordered message history enforcing the tool-call/tool-result pairing
/// invariant plus the single-leading-system-message rule.
///
/// The mutation surface is intentionally narrow: callers cannot push
/// arbitrary [`Message`] values, only go through the four `append_*`
/// operations, which is what lets this type guarantee pairing holds after
/// every successful call.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    /// Tool calls from the most recent assistant message that have not yet
    /// been paired with a tool result. Empty whenever a new user or
    /// assistant message is permitted.
    pending: Vec<ToolCall>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Tool calls still awaiting a paired result. Non-empty only between an
    /// `append_assistant` call with `tool_calls` and the matching
    /// `append_tool_results`.
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// A system message, if present, appears at most once and at position
    /// 0. Idempotent — a second call is a no-op rather than an error.
    pub fn append_system(&mut self, text: impl Into<String>) -> Result<(), Error> {
        if self.messages.first().map(|m| m.role) == Some(Role::System) {
            return Ok(());
        }
        if !self.messages.is_empty() {
            return Err(Error::Config(
                "system message must be inserted before any other message".into(),
            ));
        }
        self.messages.push(Message::system(text));
        Ok(())
    }

    fn guard_pairing_complete(&self) -> Result<(), Error> {
        if self.has_pending() {
            return Err(Error::Config(format!(
                "pairing invariant violated: {} tool_call(s) still awaiting a result",
                self.pending.len()
            )));
        }
        Ok(())
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> Result<(), Error> {
        self.guard_pairing_complete()?;
        self.messages.push(Message::user(text));
        Ok(())
    }

    pub fn append_assistant(
        &mut self,
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Result<(), Error> {
        self.guard_pairing_complete()?;
        self.pending = tool_calls.clone();
        self.messages.push(Message::assistant(content, tool_calls));
        Ok(())
    }

    /// Consumes the pending tool calls. `results` must carry exactly the
    /// same multiset of `tool_call_id`s as the pending set — order is not
    /// required to match the original `tool_calls` order.
    pub fn append_tool_results(&mut self, results: Vec<ToolResult>) -> Result<(), Error> {
        if self.pending.is_empty() && results.is_empty() {
            return Ok(());
        }

        let expected: HashSet<&str> = self.pending.iter().map(|tc| tc.id.as_str()).collect();
        let actual: HashSet<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();

        if expected != actual || expected.len() != self.pending.len() || actual.len() != results.len() {
            return Err(Error::Config(format!(
                "pairing invariant violated: expected tool_result ids {:?}, got {:?}",
                self.pending.iter().map(|tc| &tc.id).collect::<Vec<_>>(),
                results.iter().map(|r| &r.tool_call_id).collect::<Vec<_>>(),
            )));
        }

        for result in &results {
            self.messages.push(Message::tool(result));
        }
        self.pending.clear();
        Ok(())
    }

    /// Synthesizes `is_error` tool results for every tool call that never
    /// produced a real result (the ESC-interrupt path). Returns the
    /// synthesized results so the caller can merge them with real ones
    /// before calling [`Self::append_tool_results`] once.
    pub fn synthesize_interrupt_results(&self, completed_ids: &HashSet<String>) -> Vec<ToolResult> {
        self.pending
            .iter()
            .filter(|tc| !completed_ids.contains(&tc.id))
            .map(|tc| ToolResult::error(tc.id.clone(), tc.name.clone(), "interrupted"))
            .collect()
    }

    /// Checks the pairing invariant over the entire history: every
    /// assistant message with k tool_calls is immediately followed by k
    /// tool-role messages whose ids are the same multiset as the
    /// tool_calls' ids, before any new user or assistant message.
    pub fn validate_pairing(&self) -> bool {
        let mut i = 0;
        while i < self.messages.len() {
            let msg = &self.messages[i];
            if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
                let expected: HashSet<&str> = msg.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
                let k = msg.tool_calls.len();
                let mut actual = HashSet::new();
                for j in 0..k {
                    let Some(next) = self.messages.get(i + 1 + j) else {
                        return false;
                    };
                    if next.role != Role::Tool {
                        return false;
                    }
                    let Some(id) = &next.tool_call_id else { return false };
                    actual.insert(id.as_str());
                }
                if actual != expected {
                    return false;
                }
                i += 1 + k;
            } else {
                i += 1;
            }
        }
        // Outstanding pending calls (e.g. mid-turn) are allowed — this only
        // constrains messages already committed to history.
        true
    }
}
