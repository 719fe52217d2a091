pub mod dispatcher;
pub mod mcp;
pub mod tool;

pub use dispatcher::{DispatchReport, ToolDispatcher};
pub use mcp::{McpToolLookup, ServerId};
pub use tool::{MAX_OUTPUT_BYTES, Tool, ToolOutput, truncate_output};
