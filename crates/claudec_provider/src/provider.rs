use claudec_domain::{ApiCallResult, BedrockConfig, ConversationState, InterruptBus};
use reqwest::Client;
use tracing::{info, warn};

use crate::credentials;
use crate::sigv4;
use crate::transport::call_once;
use crate::translate::{ToolDefinition, anthropic_response_to_openai, to_anthropic_request, to_openai_request};

/// Talks to any OpenAI chat-completions-compatible endpoint. `base_url` is
/// used as-is if it already contains `/v1/`, else `/v1/chat/completions` is
/// appended.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    tools: Vec<ToolDefinition>,
    interrupt: InterruptBus,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        tools: Vec<ToolDefinition>,
        interrupt: InterruptBus,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            tools,
            interrupt,
        }
    }

    pub fn endpoint(&self) -> String {
        if self.base_url.contains("/v1/") {
            self.base_url.clone()
        } else {
            format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
        }
    }

    pub async fn call_api(&self, state: &ConversationState) -> ApiCallResult {
        let body = to_openai_request(state.messages(), &self.tools, &self.model);
        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("Bearer {}", self.api_key)),
        ];
        let mut result = call_once(&self.client, &self.endpoint(), headers, body, &self.interrupt).await;
        result.model = self.model.clone();
        result.tool_count = self.tools.len();
        result
    }
}

/// Talks to AWS Bedrock. Composes the credential resolver, SigV4 signer,
/// and message translator behind the same `call_api` contract as the
/// OpenAI-compatible provider.
pub struct BedrockProvider {
    client: Client,
    config: BedrockConfig,
    tools: Vec<ToolDefinition>,
    interrupt: InterruptBus,
    /// Inverse of `DISABLE_PROMPT_CACHING` (spec.md §6): whether outgoing
    /// requests carry Anthropic `cache_control` breakpoints.
    cache_enabled: bool,
}

impl BedrockProvider {
    pub fn new(config: BedrockConfig, tools: Vec<ToolDefinition>, interrupt: InterruptBus) -> Self {
        Self::with_cache_enabled(config, tools, interrupt, true)
    }

    pub fn with_cache_enabled(
        config: BedrockConfig,
        tools: Vec<ToolDefinition>,
        interrupt: InterruptBus,
        cache_enabled: bool,
    ) -> Self {
        Self { client: Client::new(), config, tools, interrupt, cache_enabled }
    }

    pub fn endpoint(&self) -> String {
        self.config.endpoint_url()
    }

    pub async fn call_api(&mut self, state: &ConversationState) -> ApiCallResult {
        let body = to_anthropic_request(state.messages(), &self.tools, None, self.cache_enabled);
        let mut result = self.dispatch(&body).await;

        if !result.is_success()
            && let Some(status) = result.http_status
            && (400..500).contains(&status)
            && let Some(msg) = &result.error_message
            && credentials::looks_like_credential_error(msg)
        {
            info!("provider reported a credential-shaped error, running the refresh protocol");
            if self.refresh_credentials().await {
                result = self.dispatch(&body).await;
            }
        }

        if let Some(response) = &result.response {
            result.response = Some(anthropic_response_to_openai(response, &self.config.model_id));
        }
        result.model = self.config.model_id.clone();
        result.tool_count = self.tools.len();
        result
    }

    async fn dispatch(&self, body: &serde_json::Value) -> ApiCallResult {
        let url = self.config.endpoint_url();
        let body_bytes = match serde_json::to_vec(body) {
            Ok(b) => b,
            Err(e) => {
                return ApiCallResult {
                    response: None,
                    raw_response_text: None,
                    request_json: body.clone(),
                    http_status: None,
                    duration_ms: 0,
                    error_message: Some(format!("failed to serialize request body: {e}")),
                    is_retryable: false,
                    model: self.config.model_id.clone(),
                    tool_count: self.tools.len(),
                };
            }
        };

        let parsed_url = match url::Url::parse(&url) {
            Ok(u) => u,
            Err(e) => {
                return ApiCallResult {
                    response: None,
                    raw_response_text: None,
                    request_json: body.clone(),
                    http_status: None,
                    duration_ms: 0,
                    error_message: Some(format!("invalid endpoint url: {e}")),
                    is_retryable: false,
                    model: self.config.model_id.clone(),
                    tool_count: self.tools.len(),
                };
            }
        };

        let signed = sigv4::sign(&self.config.credentials, "POST", &parsed_url, &body_bytes, chrono::Utc::now());

        let mut headers = vec![
            ("Content-Type".to_string(), signed.content_type.to_string()),
            ("x-amz-date".to_string(), signed.amz_date),
            ("Authorization".to_string(), signed.authorization),
        ];
        if let Some(token) = signed.security_token {
            headers.push(("x-amz-security-token".to_string(), token));
        }

        call_once(&self.client, &url, headers, body.clone(), &self.interrupt).await
    }

    /// The re-authentication protocol driven by a provider HTTP 4xx that
    /// looks credential-related. Returns whether the caller should retry.
    async fn refresh_credentials(&mut self) -> bool {
        let profile = self.config.credentials.profile.clone().unwrap_or_else(|| "default".to_string());

        if let Some(fresh) = credentials::load(&profile, Some(&self.config.region)).await
            && fresh.access_key_id != self.config.credentials.access_key_id
        {
            self.config.credentials = fresh;
            return true;
        }

        if credentials::validate(&self.config.credentials).await {
            warn!("credentials validated as current; not retrying");
            return false;
        }

        if credentials::authenticate(&profile).await.is_ok()
            && let Some(fresh) = credentials::load(&profile, Some(&self.config.region)).await
        {
            self.config.credentials = fresh;
            return true;
        }

        false
    }
}
