use thiserror::Error;

/// Error taxonomy shared across the agent's control plane.
///
/// Variants map directly onto the propagation policy: transport/HTTP errors
/// bubble up to the agent loop which decides retry-with-backoff;
/// [`Error::Auth`] is handled one level below inside the Bedrock provider;
/// tool errors never abort the loop and are instead folded into a
/// `ToolResult` with `is_error = true`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("http error: status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("tool error ({kind:?}): {message}")]
    Tool { kind: ToolErrorKind, message: String },

    #[error("interrupted by user")]
    InterruptedByUser,

    #[error("store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    Timeout,
    Failed,
    Interrupted,
}

impl Error {
    /// Whether the taxonomy considers this error retryable at the transport
    /// layer, independent of the provider-specific retry decision made after
    /// a credential refresh (see [`crate::credentials`]).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Http { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }
}
