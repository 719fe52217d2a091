pub mod color;
pub mod todos;

pub use color::{ColorConfig, ColorMode};
pub use todos::render_task_list;
