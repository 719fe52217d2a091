use claudec_domain::{ApiCallResult, ConversationState};
use claudec_provider::{BedrockProvider, OpenAiCompatibleProvider};

/// Uniform wrapper around the two provider implementations, so the
/// orchestrator drives one `call_api` contract regardless of which backend
/// is configured.
pub enum ProviderClient {
    OpenAiCompatible(OpenAiCompatibleProvider),
    Bedrock(BedrockProvider),
}

impl ProviderClient {
    pub async fn call_api(&mut self, state: &ConversationState) -> ApiCallResult {
        match self {
            ProviderClient::OpenAiCompatible(p) => p.call_api(state).await,
            ProviderClient::Bedrock(p) => p.call_api(state).await,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            ProviderClient::OpenAiCompatible(p) => p.endpoint(),
            ProviderClient::Bedrock(p) => p.endpoint(),
        }
    }
}
