pub mod builtin_tools;
pub mod orchestrator;
pub mod provider_client;

pub use builtin_tools::{TODO_WRITE_TOOL_NAME, TodoWriteTool};
pub use orchestrator::{Orchestrator, TurnOutcome};
pub use provider_client::ProviderClient;
