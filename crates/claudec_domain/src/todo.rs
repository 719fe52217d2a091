use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub active_form: String,
    pub status: TodoStatus,
}

impl TodoItem {
    pub fn new(content: impl Into<String>, active_form: impl Into<String>) -> Self {
        Self { content: content.into(), active_form: active_form.into(), status: TodoStatus::Pending }
    }
}

/// Ordered task list mutated by the dedicated `todo_write` tool and rendered
/// inline by the agent loop after each batch of tool results that touched
/// it. Indices are 0-based but not stable across removals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskList {
    items: Vec<TodoItem>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn add(&mut self, item: TodoItem) {
        self.items.push(item);
    }

    pub fn update_by_index(&mut self, index: usize, status: TodoStatus) -> bool {
        match self.items.get_mut(index) {
            Some(item) => {
                item.status = status;
                true
            }
            None => false,
        }
    }

    /// Updates the first item whose content matches exactly. Returns
    /// whether a match was found.
    pub fn update_by_content(&mut self, content: &str, status: TodoStatus) -> bool {
        match self.items.iter_mut().find(|item| item.content == content) {
            Some(item) => {
                item.status = status;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<TodoItem> {
        if index < self.items.len() { Some(self.items.remove(index)) } else { None }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn count_by_status(&self, status: TodoStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    pub fn replace_all(&mut self, items: Vec<TodoItem>) {
        self.items = items;
    }
}
