use serde_json::Value;

/// Provider-tolerant token accounting extracted from a response body's
/// `usage` object. Any field the particular provider omits defaults to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cached_tokens: i64,
    pub prompt_cache_hit_tokens: i64,
    pub prompt_cache_miss_tokens: i64,
}

/// The uniform result every provider implementation produces from exactly
/// one network attempt. Both `raw_response_text` and `request_json` are
/// always populated — even on error — so the call log retains full
/// fidelity of what was sent and what came back.
#[derive(Debug, Clone)]
pub struct ApiCallResult {
    pub response: Option<Value>,
    pub raw_response_text: Option<String>,
    pub request_json: Value,
    pub http_status: Option<u16>,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub is_retryable: bool,
    pub model: String,
    pub tool_count: usize,
}

impl ApiCallResult {
    pub fn is_success(&self) -> bool {
        self.error_message.is_none() && self.response.is_some()
    }
}

/// A row as persisted by the call log store. `id` and `created_at` are
/// populated on insert.
#[derive(Debug, Clone)]
pub struct ApiCallRecord {
    pub id: Option<i64>,
    pub iso_timestamp: String,
    pub session_id: Option<String>,
    pub api_base_url: String,
    pub request_json: String,
    pub response_json: Option<String>,
    pub model: String,
    pub status: CallStatus,
    pub http_status: i64,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub tool_count: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for CallStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(CallStatus::Success),
            "error" => Ok(CallStatus::Error),
            other => Err(anyhow::anyhow!("unknown call status: {other}")),
        }
    }
}
