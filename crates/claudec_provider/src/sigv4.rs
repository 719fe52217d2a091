use chrono::{DateTime, Utc};
use claudec_domain::AWSCredentials;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

const SERVICE: &str = "bedrock";

type HmacSha256 = Hmac<Sha256>;

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Percent-encodes a URL path component, keeping `/` literal. The unreserved
/// set is `A-Za-z0-9-_.~`.
fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for b in path.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// The headers a signed request must carry: `Content-Type`, `x-amz-date`,
/// `Authorization`, and optionally `x-amz-security-token`.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub content_type: &'static str,
    pub amz_date: String,
    pub authorization: String,
    pub security_token: Option<String>,
}

/// Signs a single-path POST request per AWS SigV4, scoped to the `bedrock`
/// service. `url` must already be the fully-built request URL (including any
/// model-id percent-encoding in the path).
pub fn sign(
    creds: &AWSCredentials,
    method: &str,
    url: &url::Url,
    body: &[u8],
    timestamp: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = timestamp.format("%Y%m%d").to_string();

    let host = url.host_str().unwrap_or_default();
    let path = url.path();
    let canonical_uri = if path.is_empty() { "/".to_string() } else { encode_path(path) };
    let canonical_querystring = url.query().unwrap_or("");

    let canonical_headers = format!("host:{host}\nx-amz-date:{amz_date}\n");
    let signed_headers = "host;x-amz-date";

    let payload_hash = sha256_hex(body);

    let canonical_request = format!(
        "{method}\n{canonical_uri}\n{canonical_querystring}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );

    let credential_scope = format!("{date_stamp}/{}/{SERVICE}/aws4_request", creds.region);

    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&creds.secret_access_key, &date_stamp, &creds.region, SERVICE);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        creds.access_key_id
    );

    SignedHeaders {
        content_type: "application/json",
        amz_date,
        authorization,
        security_token: creds.session_token.clone(),
    }
}
