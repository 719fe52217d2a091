use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use claudec_domain::{ApiCallRecord, CallStatus, ConversationState, InterruptBus, TaskList, ToolCall};
use claudec_infra::{CallLogStore, RotationPolicy};
use serde_json::Value;
use tracing::{error, warn};

use crate::builtin_tools::TODO_WRITE_TOOL_NAME;
use crate::provider_client::ProviderClient;
use claudec_services::dispatcher::ToolDispatcher;

/// What one call to [`Orchestrator::run_turn`] produced: every piece of
/// assistant-visible text emitted across the provider/tool-dispatch rounds
/// that made up this turn, whether it ended because of an ESC interrupt,
/// and whether any tool result in the final round came from the task-list
/// tool (so the caller knows to re-render it).
#[derive(Debug, Default)]
pub struct TurnOutcome {
    pub assistant_texts: Vec<String>,
    pub interrupted: bool,
    pub task_list_touched: bool,
}

/// Wires the provider, the tool dispatcher, the call log, and the
/// conversation state behind one entry point. Owns everything the agent
/// loop needs except the terminal — reading user input and rendering output
/// stay in the CLI crate so this type is exercised directly in tests.
pub struct Orchestrator {
    provider: ProviderClient,
    conversation: ConversationState,
    dispatcher: ToolDispatcher,
    call_log: CallLogStore,
    rotation_policy: RotationPolicy,
    db_path: PathBuf,
    task_list: Arc<Mutex<TaskList>>,
    interrupt: InterruptBus,
    session_id: Option<String>,
}

impl Orchestrator {
    pub fn new(
        provider: ProviderClient,
        dispatcher: ToolDispatcher,
        call_log: CallLogStore,
        rotation_policy: RotationPolicy,
        db_path: PathBuf,
        task_list: Arc<Mutex<TaskList>>,
        interrupt: InterruptBus,
        session_id: Option<String>,
    ) -> Self {
        Self {
            provider,
            conversation: ConversationState::new(),
            dispatcher,
            call_log,
            rotation_policy,
            db_path,
            task_list,
            interrupt,
            session_id,
        }
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn task_list(&self) -> Arc<Mutex<TaskList>> {
        self.task_list.clone()
    }

    pub fn set_system_prompt(&mut self, text: impl Into<String>) -> anyhow::Result<()> {
        self.conversation.append_system(text).map_err(anyhow::Error::from)
    }

    /// Runs the read-dispatch-repeat loop for one user turn: append the
    /// user message, call the provider, dispatch any requested tool calls,
    /// append their results, and repeat until a response carries no
    /// tool_calls or the interrupt bus fires mid-dispatch.
    pub async fn run_turn(&mut self, user_text: impl Into<String>) -> anyhow::Result<TurnOutcome> {
        self.interrupt.clear();
        self.conversation.append_user(user_text.into())?;

        let mut outcome = TurnOutcome::default();

        loop {
            let result = self.provider.call_api(&self.conversation).await;
            self.log_call(&result);

            if !result.is_success() {
                return Err(anyhow::anyhow!(
                    "provider call failed: {}",
                    result.error_message.as_deref().unwrap_or("unknown error")
                ));
            }
            let response = result.response.clone().expect("is_success() guarantees a response body");

            let message = &response["choices"][0]["message"];
            let content = message.get("content").and_then(Value::as_str).map(str::to_string);
            let tool_calls = parse_tool_calls(message);

            if let Some(text) = &content
                && !text.is_empty()
            {
                outcome.assistant_texts.push(text.clone());
            }

            if tool_calls.is_empty() {
                self.conversation.append_assistant(content, Vec::new())?;
                break;
            }

            self.conversation.append_assistant(content, tool_calls.clone())?;

            let report = self.dispatcher.dispatch(&tool_calls);
            // Extracted before the results are moved into append_tool_results
            // so nothing downstream needs to reach back into consumed data
            // to answer "did this batch touch the task list".
            let touched_todo = report.results.iter().any(|r| r.name == TODO_WRITE_TOOL_NAME);
            outcome.task_list_touched = outcome.task_list_touched || touched_todo;

            let mut results = report.results;
            if report.interrupted {
                let completed: HashSet<String> = results.iter().map(|r| r.tool_call_id.clone()).collect();
                let synthetic = self.conversation.synthesize_interrupt_results(&completed);
                results.extend(synthetic);
                self.conversation.append_tool_results(results)?;
                outcome.interrupted = true;
                break;
            }

            self.conversation.append_tool_results(results)?;
        }

        if let Err(e) = self.call_log.rotate(&self.rotation_policy, &self.db_path) {
            warn!(error = %e, "call log rotation failed, continuing without rotation");
        }

        Ok(outcome)
    }

    fn log_call(&self, result: &claudec_domain::ApiCallResult) {
        let status = if result.is_success() { CallStatus::Success } else { CallStatus::Error };
        let record = ApiCallRecord {
            id: None,
            iso_timestamp: Utc::now().to_rfc3339(),
            session_id: self.session_id.clone(),
            api_base_url: self.provider.endpoint(),
            request_json: result.request_json.to_string(),
            response_json: result.response.as_ref().map(|v| v.to_string()),
            model: result.model.clone(),
            status,
            http_status: result.http_status.map(i64::from).unwrap_or(0),
            error_message: result.error_message.clone(),
            duration_ms: result.duration_ms as i64,
            tool_count: result.tool_count as i64,
            created_at: Utc::now().timestamp(),
        };
        if let Err(e) = self.call_log.insert(&record, result.raw_response_text.as_deref()) {
            error!(error = %e, "failed to write call log row");
        }
    }
}

/// Parses the provider's `tool_calls` array into [`ToolCall`]s. A call
/// missing an `id` (some OpenAI-compatible providers omit it on streaming
/// fallback paths) gets a client-generated one rather than being dropped —
/// losing the call entirely would desync the pairing invariant once the
/// tool actually runs.
fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(calls) = message.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|c| {
            let id = c.get("id").and_then(Value::as_str).map(str::to_string).unwrap_or_else(ToolCall::generate_id);
            let function = c.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let arguments = function.get("arguments")?.as_str().unwrap_or("{}").to_string();
            Some(ToolCall { id, name, arguments })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use claudec_provider::OpenAiCompatibleProvider;
    use claudec_services::tool::{Tool, ToolOutput};
    use pretty_assertions::assert_eq;

    use super::*;

    struct StubEcho;
    impl Tool for StubEcho {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, args: &str, _cancelled: &AtomicBool) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::ok(args.to_string()))
        }
    }

    fn fresh_store() -> (CallLogStore, tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.db");
        let store = CallLogStore::open(&path).unwrap();
        (store, dir, path)
    }

    fn make_orchestrator(base_url: String) -> Orchestrator {
        let interrupt = InterruptBus::new();
        let provider = ProviderClient::OpenAiCompatible(OpenAiCompatibleProvider::new(
            base_url,
            "test-key",
            "test-model",
            vec![],
            interrupt.clone(),
        ));
        let dispatcher = ToolDispatcher::new(vec![Arc::new(StubEcho)], None, interrupt.clone(), None);
        let (store, _dir, path) = fresh_store();
        Orchestrator::new(
            provider,
            dispatcher,
            store,
            RotationPolicy::default(),
            path,
            Arc::new(Mutex::new(TaskList::new())),
            interrupt,
            Some("sess-1".to_string()),
        )
    }

    #[test]
    fn parses_tool_calls_from_response_message() {
        let message = serde_json::json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "echo", "arguments": "{\"x\":1}"}}]
        });
        let calls = parse_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "echo");
    }

    #[test]
    fn missing_id_gets_a_generated_fallback_instead_of_being_dropped() {
        let message = serde_json::json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{"type": "function", "function": {"name": "echo", "arguments": "{}"}}]
        });
        let calls = parse_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].id.is_empty());
    }

    #[tokio::test]
    async fn run_turn_without_tool_calls_returns_text_and_stays_paired() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "id": "r1", "object": "chat.completion", "model": "test-model",
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello there"}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let mut orch = make_orchestrator(server.url());
        let outcome = orch.run_turn("hi").await.unwrap();
        assert_eq!(outcome.assistant_texts, vec!["hello there".to_string()]);
        assert!(!outcome.interrupted);
        assert!(orch.conversation().validate_pairing());
    }

    #[tokio::test]
    async fn run_turn_with_tool_call_dispatches_and_pairs() {
        let mut server = mockito::Server::new_async().await;
        let _first = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "id": "r1", "object": "chat.completion", "model": "test-model",
                    "choices": [{"index": 0, "message": {
                        "role": "assistant", "content": null,
                        "tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "echo", "arguments": "{}"}}]
                    }, "finish_reason": "tool_calls"}],
                    "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let _second = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "id": "r2", "object": "chat.completion", "model": "test-model",
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "done"}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let mut orch = make_orchestrator(server.url());
        let outcome = orch.run_turn("do the thing").await.unwrap();
        assert_eq!(outcome.assistant_texts, vec!["done".to_string()]);
        assert!(orch.conversation().validate_pairing());
    }
}
