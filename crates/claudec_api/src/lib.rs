use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use claudec_app::{Orchestrator, TurnOutcome};
use claudec_domain::TaskList;

/// Facade the binary crate depends on instead of reaching into
/// `claudec_app`'s wiring types directly, so the CLI only ever sees this
/// trait.
#[async_trait]
pub trait Api: Send + Sync {
    /// Runs one full user turn: append the message, call the provider,
    /// dispatch any tool calls, and loop until the model stops requesting
    /// tools or the turn is interrupted.
    async fn send(&mut self, user_text: String) -> anyhow::Result<TurnOutcome>;

    /// The task list mutated by the `todo_write` tool, shared so the caller
    /// can render it after a turn that touched it.
    fn task_list(&self) -> Arc<Mutex<TaskList>>;
}

/// The only implementation of [`Api`] in this workspace: a thin wrapper
/// around one [`Orchestrator`].
pub struct ClaudeCApi {
    orchestrator: Orchestrator,
}

impl ClaudeCApi {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Api for ClaudeCApi {
    async fn send(&mut self, user_text: String) -> anyhow::Result<TurnOutcome> {
        self.orchestrator.run_turn(user_text).await
    }

    fn task_list(&self) -> Arc<Mutex<TaskList>> {
        self.orchestrator.task_list()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use claudec_app::ProviderClient;
    use claudec_domain::InterruptBus;
    use claudec_infra::{CallLogStore, RotationPolicy};
    use claudec_provider::OpenAiCompatibleProvider;
    use claudec_services::dispatcher::ToolDispatcher;
    use pretty_assertions::assert_eq;

    use super::*;

    fn store() -> (CallLogStore, tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.db");
        let store = CallLogStore::open(&path).unwrap();
        (store, dir, path)
    }

    #[tokio::test]
    async fn api_facade_delegates_to_orchestrator() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "id": "r1", "object": "chat.completion", "model": "test-model",
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let interrupt = InterruptBus::new();
        let provider = ProviderClient::OpenAiCompatible(OpenAiCompatibleProvider::new(
            server.url(),
            "key",
            "model",
            vec![],
            interrupt.clone(),
        ));
        let dispatcher = ToolDispatcher::new(vec![], None, interrupt.clone(), None);
        let (call_log, _dir, db_path) = store();
        let orchestrator = Orchestrator::new(
            provider,
            dispatcher,
            call_log,
            RotationPolicy::default(),
            db_path,
            Arc::new(Mutex::new(TaskList::new())),
            interrupt,
            None,
        );

        let mut api: Box<dyn Api> = Box::new(ClaudeCApi::new(orchestrator));
        let outcome = api.send("hello".to_string()).await.unwrap();
        assert_eq!(outcome.assistant_texts, vec!["hi".to_string()]);
        assert!(api.task_list().lock().unwrap().items().is_empty());
    }
}
