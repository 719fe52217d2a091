pub mod api_call;
pub mod conversation;
pub mod credentials;
pub mod env;
pub mod error;
pub mod interrupt;
pub mod message;
pub mod todo;

pub use api_call::{ApiCallRecord, ApiCallResult, CallStatus, TokenUsage};
pub use conversation::ConversationState;
pub use credentials::{AWSCredentials, BedrockConfig};
pub use env::ClaudeCEnv;
pub use error::{Error, ToolErrorKind};
pub use interrupt::InterruptBus;
pub use message::{Message, Role, ToolCall, ToolResult};
pub use todo::{TaskList, TodoItem, TodoStatus};
