use std::time::{Duration, Instant};

use claudec_domain::{ApiCallResult, InterruptBus};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{info, warn};

const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Redacts sensitive header values before they reach a log line.
pub fn sanitize_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    const SENSITIVE: [&str; 3] = ["authorization", "x-amz-security-token", "x-api-key"];
    headers
        .iter()
        .map(|(k, v)| {
            if SENSITIVE.contains(&k.to_ascii_lowercase().as_str()) {
                (k.clone(), "***redacted***".to_string())
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}

/// A single network attempt, cancellable via the interrupt bus. Exactly one
/// attempt is made; retrying is a caller concern.
pub async fn call_once(
    client: &Client,
    url: &str,
    headers: Vec<(String, String)>,
    body: Value,
    interrupt: &InterruptBus,
) -> ApiCallResult {
    let request_json = body.clone();
    let started = Instant::now();

    let body_bytes = match serde_json::to_vec(&body) {
        Ok(b) => b,
        Err(e) => {
            return ApiCallResult {
                response: None,
                raw_response_text: None,
                request_json,
                http_status: None,
                duration_ms: 0,
                error_message: Some(format!("failed to serialize request body: {e}")),
                is_retryable: false,
                model: String::new(),
                tool_count: 0,
            };
        }
    };

    let mut req = client.request(Method::POST, url).body(body_bytes);
    for (key, value) in &headers {
        req = req.header(key, value);
    }

    info!(url = %url, headers = ?sanitize_headers(&headers), "dispatching provider request");

    let send_fut = req.send();
    tokio::pin!(send_fut);

    let response = loop {
        tokio::select! {
            biased;
            result = &mut send_fut => break Some(result),
            _ = tokio::time::sleep(INTERRUPT_POLL_INTERVAL) => {
                if interrupt.is_requested() {
                    break None;
                }
            }
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;

    let Some(result) = response else {
        warn!("provider request aborted by interrupt");
        return ApiCallResult {
            response: None,
            raw_response_text: None,
            request_json,
            http_status: None,
            duration_ms,
            error_message: Some("interrupted by user".to_string()),
            is_retryable: false,
            model: String::new(),
            tool_count: 0,
        };
    };

    match result {
        Ok(resp) => {
            let status = resp.status();
            let http_status = Some(status.as_u16());
            match resp.text().await {
                Ok(text) => {
                    let parsed: Option<Value> = serde_json::from_str(&text).ok();
                    let error_message =
                        if status.is_success() { None } else { Some(extract_error_message(&text)) };
                    ApiCallResult {
                        response: if status.is_success() { parsed.clone() } else { None },
                        raw_response_text: Some(text),
                        request_json,
                        http_status,
                        duration_ms,
                        error_message,
                        is_retryable: is_retryable_status(status.as_u16()),
                        model: String::new(),
                        tool_count: 0,
                    }
                }
                Err(e) => ApiCallResult {
                    response: None,
                    raw_response_text: None,
                    request_json,
                    http_status,
                    duration_ms,
                    error_message: Some(format!("failed to read response body: {e}")),
                    is_retryable: true,
                    model: String::new(),
                    tool_count: 0,
                },
            }
        }
        Err(e) => ApiCallResult {
            response: None,
            raw_response_text: None,
            request_json,
            http_status: None,
            duration_ms,
            error_message: Some(e.to_string()),
            is_retryable: is_retryable_transport_error(&e),
            model: String::new(),
            tool_count: 0,
        },
    }
}

fn extract_error_message(text: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(msg) = value.get("error").and_then(|e| e.get("message")).and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("message").and_then(Value::as_str) {
            return msg.to_string();
        }
    }
    text.to_string()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 408) || (500..600).contains(&status)
}

fn is_retryable_transport_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sanitize_headers_redacts_authorization() {
        let headers = vec![
            ("Authorization".to_string(), "Bearer secret".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        let sanitized = sanitize_headers(&headers);
        assert_eq!(sanitized[0].1, "***redacted***");
        assert_eq!(sanitized[1].1, "application/json");
    }

    #[test]
    fn retryable_status_taxonomy() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn extract_error_message_prefers_nested_error_object() {
        let text = r#"{"error": {"message": "bad request"}}"#;
        assert_eq!(extract_error_message(text), "bad request");
    }

    #[test]
    fn extract_error_message_falls_back_to_raw_text() {
        assert_eq!(extract_error_message("not json"), "not json");
    }
}
