use std::process::Stdio;

use claudec_domain::AWSCredentials;
use tokio::process::Command;

/// Runs `aws configure export-credentials --profile P --format env` and
/// parses its `export KEY=VALUE` lines.
async fn export_credentials(profile: &str) -> Option<AWSCredentials> {
    let output = Command::new("aws")
        .args(["configure", "export-credentials", "--profile", profile, "--format", "env"])
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;
    for line in text.lines() {
        let line = line.trim().trim_start_matches("export ");
        let Some((key, value)) = line.split_once('=') else { continue };
        let value = value.trim_matches('"').to_string();
        match key {
            "AWS_ACCESS_KEY_ID" => access_key_id = Some(value),
            "AWS_SECRET_ACCESS_KEY" => secret_access_key = Some(value),
            "AWS_SESSION_TOKEN" => session_token = Some(value),
            _ => {}
        }
    }
    build(access_key_id, secret_access_key, session_token, profile)
}

/// Runs `aws configure get aws_access_key_id` / `aws_secret_access_key`
/// individually, as a fallback when export-credentials is unavailable.
async fn configure_get(profile: &str) -> Option<AWSCredentials> {
    async fn get(profile: &str, key: &str) -> Option<String> {
        let output = Command::new("aws")
            .args(["configure", "get", key, "--profile", profile])
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!value.is_empty()).then_some(value)
    }

    let access_key_id = get(profile, "aws_access_key_id").await;
    let secret_access_key = get(profile, "aws_secret_access_key").await;
    build(access_key_id, secret_access_key, None, profile)
}

async fn profile_has_sso(profile: &str) -> bool {
    Command::new("aws")
        .args(["configure", "get", "sso_start_url", "--profile", profile])
        .stdin(Stdio::null())
        .output()
        .await
        .map(|o| o.status.success() && !o.stdout.is_empty())
        .unwrap_or(false)
}

fn build(
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
    profile: &str,
) -> Option<AWSCredentials> {
    let access_key_id = access_key_id.filter(|s| !s.is_empty())?;
    let secret_access_key = secret_access_key.filter(|s| !s.is_empty())?;
    let mut creds = AWSCredentials::new(access_key_id, secret_access_key, "us-west-2").with_profile(profile);
    if let Some(token) = session_token {
        creds = creds.with_session_token(token);
    }
    Some(creds)
}

/// Loads credentials from any of four sources, in order, without ever
/// triggering interactive authentication. Returns `None` only when no
/// source yields a usable pair.
pub async fn load(profile: &str, region: Option<&str>) -> Option<AWSCredentials> {
    let from_env = build(
        std::env::var("AWS_ACCESS_KEY_ID").ok(),
        std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
        std::env::var("AWS_SESSION_TOKEN").ok(),
        profile,
    );
    let mut resolved = if from_env.is_some() { from_env } else { export_credentials(profile).await };
    if resolved.is_none() {
        resolved = configure_get(profile).await;
    }
    if resolved.is_none() && profile_has_sso(profile).await {
        resolved = export_credentials(profile).await;
    }

    resolved.map(|mut c| {
        if let Some(region) = region {
            c.region = region.to_string();
        }
        c
    })
}

/// Runs `$AWS_AUTH_COMMAND` verbatim if set, else `aws sso login --profile
/// P`. Success iff the child exits 0. The only credential-resolver path
/// that may block on user interaction.
pub async fn authenticate(profile: &str) -> anyhow::Result<()> {
    let status = if let Ok(custom) = std::env::var("AWS_AUTH_COMMAND") {
        let mut parts = custom.split_whitespace();
        let program = parts.next().ok_or_else(|| anyhow::anyhow!("AWS_AUTH_COMMAND is empty"))?;
        Command::new(program).args(parts).status().await?
    } else {
        Command::new("aws").args(["sso", "login", "--profile", profile]).status().await?
    };
    if status.success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("authentication command exited with {status}"))
    }
}

/// Calls `aws sts get-caller-identity` with `creds` bound as environment and
/// inspects stdout/stderr for known substrings. Used only by the HTTP-error
/// recovery protocol, never from `load`.
pub async fn validate(creds: &AWSCredentials) -> bool {
    let mut cmd = Command::new("aws");
    cmd.args(["sts", "get-caller-identity"]);
    cmd.env("AWS_ACCESS_KEY_ID", &creds.access_key_id);
    cmd.env("AWS_SECRET_ACCESS_KEY", &creds.secret_access_key);
    cmd.env("AWS_REGION", &creds.region);
    if let Some(token) = &creds.session_token {
        cmd.env("AWS_SESSION_TOKEN", token);
    }
    cmd.stdin(Stdio::null());

    let Ok(output) = cmd.output().await else { return false };
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    const INVALID: [&str; 3] = ["ExpiredToken", "InvalidToken", "InvalidClientTokenId"];
    const ALSO_INVALID: [&str; 1] = ["AccessDenied"];
    if INVALID.iter().chain(ALSO_INVALID.iter()).any(|needle| combined.contains(needle)) {
        return false;
    }
    combined.contains("UserId") || combined.contains("Account")
}

/// Substrings on an HTTP 4xx body/message that indicate a credential
/// problem rather than a genuine authorization failure, triggering the
/// refresh-and-retry protocol.
pub const CREDENTIAL_ERROR_MARKERS: [&str; 7] = [
    "ExpiredToken",
    "InvalidToken",
    "InvalidClientTokenId",
    "AccessDenied",
    "TokenExpired",
    "SignatureDoesNotMatch",
    "UnrecognizedClientException",
];

pub fn looks_like_credential_error(message: &str) -> bool {
    CREDENTIAL_ERROR_MARKERS.iter().any(|m| message.contains(m))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn build_rejects_empty_access_key() {
        assert!(build(Some(String::new()), Some("secret".into()), None, "default").is_none());
    }

    #[test]
    fn build_accepts_full_pair() {
        let creds = build(Some("AKID".into()), Some("secret".into()), None, "default").unwrap();
        assert_eq!(creds.access_key_id, "AKID");
        assert_eq!(creds.profile.as_deref(), Some("default"));
    }

    #[test]
    fn credential_error_markers_detected() {
        assert!(looks_like_credential_error("ExpiredToken: the security token has expired"));
        assert!(looks_like_credential_error("403 AccessDenied"));
        assert!(!looks_like_credential_error("ValidationException: bad request"));
    }
}
