/// AWS credentials usable to sign a Bedrock request. Immutable once
/// constructed — a refresh replaces the value wholesale rather than mutating
/// fields in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AWSCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: String,
    pub profile: Option<String>,
}

impl AWSCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            region: region.into(),
            profile: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// Resolved configuration for a single Bedrock invocation.
#[derive(Debug, Clone)]
pub struct BedrockConfig {
    pub region: String,
    pub model_id: String,
    pub credentials: AWSCredentials,
}

impl BedrockConfig {
    pub fn new(region: impl Into<String>, model_id: impl Into<String>, credentials: AWSCredentials) -> Self {
        Self { region: region.into(), model_id: model_id.into(), credentials }
    }

    /// `https://bedrock-runtime.{region}.amazonaws.com/model/{model_id}/invoke`.
    ///
    /// Model ids may contain `:` (e.g. `...-v2:0`), which is percent-encoded
    /// in the URL path distinct from (and in addition to) the SigV4
    /// canonical-path encoding applied to the already-built URL.
    pub fn endpoint_url(&self) -> String {
        format!(
            "https://bedrock-runtime.{}.amazonaws.com/model/{}/invoke",
            self.region,
            encode_model_id(&transform_model_id(&self.model_id, &self.region))
        )
    }
}

pub fn encode_model_id(model_id: &str) -> String {
    model_id.replace(':', "%3A")
}

/// Prefixes an Anthropic model id with its Bedrock cross-region inference
/// prefix (`us.`/`eu.`/`apac.`/`au.`) derived from the configured region,
/// unless the id already carries a regional or `global.` prefix.
pub fn transform_model_id(model_id: &str, region: &str) -> String {
    if model_id.starts_with("global.") {
        return model_id.to_string();
    }

    let prefix = match region {
        r if r.starts_with("us-") && !r.contains("gov") => "us.",
        r if r.starts_with("eu-") => "eu.",
        "ap-southeast-2" => "au.",
        r if r.starts_with("ap-") => "apac.",
        _ => "",
    };

    let already_prefixed =
        model_id.starts_with("us.") || model_id.starts_with("eu.") || model_id.starts_with("apac.") || model_id.starts_with("au.");

    if model_id.contains("anthropic.") && !already_prefixed {
        format!("{prefix}{model_id}")
    } else {
        model_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn endpoint_url_percent_encodes_colon_and_adds_regional_prefix() {
        let creds = AWSCredentials::new("AKID", "SECRET", "us-east-1");
        let cfg = BedrockConfig::new("us-east-1", "anthropic.claude-3-5-sonnet-20241022-v2:0", creds);
        assert_eq!(
            cfg.endpoint_url(),
            "https://bedrock-runtime.us-east-1.amazonaws.com/model/us.anthropic.claude-3-5-sonnet-20241022-v2%3A0/invoke"
        );
    }

    #[test]
    fn transform_model_id_skips_already_prefixed() {
        assert_eq!(transform_model_id("eu.anthropic.claude-3-haiku", "us-east-1"), "eu.anthropic.claude-3-haiku");
    }

    #[test]
    fn transform_model_id_skips_global_prefix() {
        assert_eq!(transform_model_id("global.anthropic.claude-3-haiku", "ap-southeast-2"), "global.anthropic.claude-3-haiku");
    }

    #[test]
    fn transform_model_id_picks_au_for_sydney() {
        assert_eq!(transform_model_id("anthropic.claude-3-haiku", "ap-southeast-2"), "au.anthropic.claude-3-haiku");
    }

    #[test]
    fn transform_model_id_leaves_non_anthropic_untouched() {
        assert_eq!(transform_model_id("meta.llama3-70b", "us-east-1"), "meta.llama3-70b");
    }
}
