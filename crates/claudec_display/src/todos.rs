use claudec_domain::{TaskList, TodoStatus};
use colored::Colorize;

use crate::color::ColorConfig;

/// Renders a [`TaskList`] grouped by status — pending, then in-progress,
/// then completed — preserving each group's insertion order. Colors come
/// from the theme below; with colors disabled the ANSI fallback is a plain
/// bullet-prefixed line, matching how the rest of this crate degrades.
pub fn render_task_list(list: &TaskList, colors: &ColorConfig) -> String {
    if list.items().is_empty() {
        return String::new();
    }

    let mut lines = Vec::new();
    for status in [TodoStatus::InProgress, TodoStatus::Pending, TodoStatus::Completed] {
        for item in list.items().iter().filter(|i| i.status == status) {
            let label = match status {
                TodoStatus::InProgress => &item.active_form,
                TodoStatus::Pending | TodoStatus::Completed => &item.content,
            };
            let bullet = status_bullet(status);
            let line = format!("{bullet} {label}");
            lines.push(colors.colorize(&line, |s| status_style(status, s)));
        }
    }
    lines.join("\n")
}

fn status_bullet(status: TodoStatus) -> &'static str {
    match status {
        TodoStatus::Pending => "[ ]",
        TodoStatus::InProgress => "[~]",
        TodoStatus::Completed => "[x]",
    }
}

fn status_style(status: TodoStatus, s: &str) -> colored::ColoredString {
    match status {
        TodoStatus::Pending => s.dimmed(),
        TodoStatus::InProgress => s.yellow(),
        TodoStatus::Completed => s.green(),
    }
}

#[cfg(test)]
mod tests {
    use claudec_domain::TodoItem;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::color::ColorMode;

    #[test]
    fn empty_list_renders_empty_string() {
        let list = TaskList::new();
        assert_eq!(render_task_list(&list, &ColorConfig::with_mode(ColorMode::Never)), "");
    }

    #[test]
    fn groups_by_status_in_progress_first() {
        let mut list = TaskList::new();
        list.add(TodoItem::new("write spec", "Writing spec"));
        list.add(TodoItem::new("write code", "Writing code"));
        list.update_by_index(1, TodoStatus::InProgress);

        let rendered = render_task_list(&list, &ColorConfig::with_mode(ColorMode::Never));
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "[~] Writing code");
        assert_eq!(lines[1], "[ ] write spec");
    }

    #[test]
    fn colors_disabled_produces_plain_ansi_free_text() {
        let mut list = TaskList::new();
        list.add(TodoItem::new("a", "A-ing"));
        let rendered = render_task_list(&list, &ColorConfig::with_mode(ColorMode::Never));
        assert!(!rendered.contains('\x1b'));
    }
}
