use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use claudec_domain::{TaskList, TodoItem, TodoStatus};
use claudec_services::tool::{Tool, ToolOutput};
use serde::Deserialize;
use serde_json::json;

/// Name the orchestrator checks for in a completed dispatch batch to decide
/// whether to re-render the task list inline after a turn touches it.
pub const TODO_WRITE_TOOL_NAME: &str = "todo_write";

#[derive(Debug, Deserialize)]
struct TodoWriteArgs {
    todos: Vec<TodoWriteItem>,
}

#[derive(Debug, Deserialize)]
struct TodoWriteItem {
    content: String,
    active_form: String,
    #[serde(default)]
    status: Option<TodoStatusWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TodoStatusWire {
    Pending,
    InProgress,
    Completed,
}

impl From<TodoStatusWire> for TodoStatus {
    fn from(value: TodoStatusWire) -> Self {
        match value {
            TodoStatusWire::Pending => TodoStatus::Pending,
            TodoStatusWire::InProgress => TodoStatus::InProgress,
            TodoStatusWire::Completed => TodoStatus::Completed,
        }
    }
}

/// Replaces the whole task list in one shot, the shape every agentic coding
/// assistant in this lineage exposes the task list as (a single tool call
/// carrying the full desired list rather than incremental add/remove ops).
pub struct TodoWriteTool {
    list: Arc<Mutex<TaskList>>,
}

impl TodoWriteTool {
    pub fn new(list: Arc<Mutex<TaskList>>) -> Self {
        Self { list }
    }
}

impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        TODO_WRITE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Replaces the current task list with the given ordered set of todos."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {"type": "string"},
                            "active_form": {"type": "string"},
                            "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]},
                        },
                        "required": ["content", "active_form"],
                    },
                },
            },
            "required": ["todos"],
        })
    }

    fn execute(&self, arguments: &str, _cancelled: &AtomicBool) -> anyhow::Result<ToolOutput> {
        let parsed: TodoWriteArgs = serde_json::from_str(arguments)?;
        let items: Vec<TodoItem> = parsed
            .todos
            .into_iter()
            .map(|t| {
                let mut item = TodoItem::new(t.content, t.active_form);
                if let Some(status) = t.status {
                    item.status = status.into();
                }
                item
            })
            .collect();

        let count = items.len();
        self.list.lock().expect("task list mutex poisoned").replace_all(items);
        Ok(ToolOutput::ok(format!("updated task list with {count} item(s)")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn replaces_list_and_parses_status() {
        let list = Arc::new(Mutex::new(TaskList::new()));
        let tool = TodoWriteTool::new(list.clone());
        let args = json!({
            "todos": [
                {"content": "a", "active_form": "A-ing", "status": "in_progress"},
                {"content": "b", "active_form": "B-ing"},
            ]
        })
        .to_string();

        let cancelled = AtomicBool::new(false);
        let output = tool.execute(&args, &cancelled).unwrap();
        assert!(!output.is_error);

        let guard = list.lock().unwrap();
        assert_eq!(guard.items().len(), 2);
        assert_eq!(guard.items()[0].status, TodoStatus::InProgress);
        assert_eq!(guard.items()[1].status, TodoStatus::Pending);
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        let list = Arc::new(Mutex::new(TaskList::new()));
        let tool = TodoWriteTool::new(list);
        let cancelled = AtomicBool::new(false);
        assert!(tool.execute("not json", &cancelled).is_err());
    }
}
