use openai_api_rs::v1::api::OpenAIClient;
use serde::de::DeserializeOwned;
use std::env;

pub const COMPLETION_MODEL: &str = "openai/gpt-4o-mini";

pub fn create_openai_client() -> Result<OpenAIClient, Box<dyn std::error::Error>> {
    let api_key = env::var("OPENROUTER_API_KEY")?;

    OpenAIClient::builder()
        .with_endpoint("https://openrouter.ai/api/v1")
        .with_api_key(api_key)
        .build()
        .map_err(|e| e.into())
}

/// Which rung of the recovery ladder produced a parseable value. Models wrap
/// JSON in code fences, double-encode it, or pad it with prose; each variant
/// names the repair that was needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRecovery {
    Direct,
    FenceStripped,
    BraceSliced,
    Unescaped,
}

/// Ordered recovery ladder for model output: direct parse, fence strip, brace
/// slice, unescape. First success wins; total failure is `None`, never an error.
pub fn safe_parse_json<T: DeserializeOwned>(raw: &str) -> Option<(T, JsonRecovery)> {
    if let Ok(value) = serde_json::from_str::<T>(raw.trim()) {
        return Some((value, JsonRecovery::Direct));
    }

    if let Some(inner) = strip_code_fence(raw) {
        if let Ok(value) = serde_json::from_str::<T>(inner.trim()) {
            return Some((value, JsonRecovery::FenceStripped));
        }
    }

    if let Some(sliced) = brace_slice(raw) {
        if let Ok(value) = serde_json::from_str::<T>(sliced) {
            return Some((value, JsonRecovery::BraceSliced));
        }
    }

    // Doubly-encoded: the whole payload is a JSON string containing JSON
    if let Ok(inner) = serde_json::from_str::<String>(raw.trim()) {
        if let Ok(value) = serde_json::from_str::<T>(inner.trim()) {
            return Some((value, JsonRecovery::Unescaped));
        }
        if let Some(sliced) = brace_slice(&inner) {
            if let Ok(value) = serde_json::from_str::<T>(sliced) {
                return Some((value, JsonRecovery::Unescaped));
            }
        }
    }

    None
}

/// Returns the content between ``` fences, dropping an optional language tag.
pub fn strip_code_fence(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let after_open = trimmed.strip_prefix("```")?;
    let body = match after_open.find('\n') {
        Some(idx) => &after_open[idx + 1..],
        None => after_open,
    };
    let close = body.rfind("```")?;
    Some(&body[..close])
}

fn brace_slice(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        summary: String,
        priority_score: i32,
    }

    #[test]
    fn direct_json_parses_first() {
        let (value, recovery) =
            safe_parse_json::<Sample>(r#"{"summary": "hi", "priority_score": 40}"#).unwrap();
        assert_eq!(recovery, JsonRecovery::Direct);
        assert_eq!(value.priority_score, 40);
    }

    #[test]
    fn fenced_json_is_recovered() {
        let raw = "```json\n{\"summary\": \"hi\", \"priority_score\": 40}\n```";
        let (value, recovery) = safe_parse_json::<Sample>(raw).unwrap();
        assert_eq!(recovery, JsonRecovery::FenceStripped);
        assert_eq!(value.summary, "hi");
    }

    #[test]
    fn prose_wrapped_json_is_brace_sliced() {
        let raw = "Sure! Here is the result: {\"summary\": \"hi\", \"priority_score\": 12} Hope that helps.";
        let (_, recovery) = safe_parse_json::<Sample>(raw).unwrap();
        assert_eq!(recovery, JsonRecovery::BraceSliced);
    }

    #[test]
    fn doubly_encoded_json_is_unescaped() {
        let raw = r#""{\"summary\": \"hi\", \"priority_score\": 5}""#;
        let (value, recovery) = safe_parse_json::<Sample>(raw).unwrap();
        assert_eq!(recovery, JsonRecovery::Unescaped);
        assert_eq!(value.priority_score, 5);
    }

    #[test]
    fn garbage_yields_none() {
        assert!(safe_parse_json::<Sample>("no json here at all").is_none());
    }
}
