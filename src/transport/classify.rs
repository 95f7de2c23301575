//! Maps provider responses onto [`FailureKind`].
//!
//! All string inspection of provider output happens here; callers above the
//! transport only ever see a classified [`ProviderFailure`].

use crate::error::ProviderFailure;
use crate::models::{ChatCompletionResponse, ProviderErrorBody, ProviderErrorEnvelope};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static IMAGE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s)]+").expect("url pattern is valid"));

/// Exact provider values that mean the instruction or image was blocked.
const CONTENT_BLOCK_SIGNALS: [&str; 6] = [
    "content_policy_violation",
    "content_filter",
    "PROHIBITED_CONTENT",
    "SAFETY",
    "BLOCKLIST",
    "moderation_blocked",
];

const MAX_DETAIL_CHARS: usize = 300;

/// First http(s) URL embedded in free text.
pub fn extract_image_url(content: &str) -> Option<&str> {
    IMAGE_URL.find(content).map(|m| m.as_str())
}

/// Classifies a non-2xx response.
pub fn classify_status(status: u16, body: &str) -> ProviderFailure {
    let parsed = serde_json::from_str::<ProviderErrorEnvelope>(body)
        .map(ProviderErrorEnvelope::into_body)
        .unwrap_or_default();
    let detail = if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        truncate(body.trim(), MAX_DETAIL_CHARS)
    };
    classify_error(Some(status), &parsed, detail)
}

/// Classifies a provider error object, with or without an HTTP status.
pub fn classify_error(status: Option<u16>, error: &ProviderErrorBody, detail: String) -> ProviderFailure {
    let failure = if is_content_block(error) {
        ProviderFailure::rejected(detail)
    } else if is_internal(status, error) {
        ProviderFailure::transient(detail)
    } else {
        ProviderFailure::unrecoverable(detail)
    };

    match status {
        Some(status) => failure.with_status(status),
        None => failure,
    }
}

/// Pulls the image reference out of a 2xx chat completion.
pub fn classify_success(response: &ChatCompletionResponse) -> Result<String, ProviderFailure> {
    if let Some(error) = &response.error {
        let detail = error
            .message
            .clone()
            .unwrap_or_else(|| "provider returned an error object".to_string());
        return Err(classify_error(None, error, detail));
    }

    if let Some(reason) = response.first_finish_reason() {
        if is_block_signal(reason) {
            return Err(ProviderFailure::rejected(format!(
                "generation stopped by provider: finish_reason={}",
                reason
            )));
        }
    }

    let content = response.first_content().unwrap_or_default();
    match extract_image_url(content) {
        Some(url) => Ok(url.to_string()),
        None => Err(ProviderFailure::malformed(format!(
            "The model did not return a valid image URL. Response: {}",
            truncate(content, MAX_DETAIL_CHARS)
        ))),
    }
}

fn is_internal(status: Option<u16>, error: &ProviderErrorBody) -> bool {
    if matches!(status, Some(500 | 502 | 503 | 504)) {
        return true;
    }
    if error.code.as_ref().and_then(code_as_u16) == Some(500) {
        return true;
    }
    error
        .status
        .as_deref()
        .map_or(false, |s| s.eq_ignore_ascii_case("INTERNAL"))
}

fn is_content_block(error: &ProviderErrorBody) -> bool {
    let code = error.code.as_ref().and_then(|c| c.as_str());
    [code, error.status.as_deref(), error.error_type.as_deref()]
        .into_iter()
        .flatten()
        .any(is_block_signal)
}

fn is_block_signal(signal: &str) -> bool {
    let signal = signal.trim();
    CONTENT_BLOCK_SIGNALS
        .iter()
        .any(|known| signal.eq_ignore_ascii_case(known))
}

fn code_as_u16(code: &Value) -> Option<u16> {
    match code {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
