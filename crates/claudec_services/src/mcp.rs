use crate::tool::ToolOutput;

/// Opaque handle to a configured MCP server, as assigned by whatever loads
/// MCP server configuration. The dispatcher never inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerId(pub String);

/// Seam for tools backed by an MCP server rather than a built-in
/// implementation. No stdio transport or JSON-RPC framing lives in this
/// crate — a real client implements this trait and is handed to
/// [`crate::dispatcher::ToolDispatcher::new`].
pub trait McpToolLookup: Send + Sync {
    fn find_server(&self, tool_name: &str) -> Option<ServerId>;
    fn invoke(&self, server_id: &ServerId, tool_name: &str, arguments: &str) -> anyhow::Result<ToolOutput>;
}
