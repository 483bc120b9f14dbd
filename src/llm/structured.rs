//! Structured (JSON) inference with an explicit parse-failure branch.
//!
//! Models wrap JSON in prose or markdown often enough that we never trust
//! the raw text. `infer_json` extracts the first balanced object and hands
//! the caller an `InferenceOutcome` to match on.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::llm::provider::{CompletionRequest, LlmProvider};

/// Result of a structured inference call.
#[derive(Debug, Clone)]
pub enum InferenceOutcome<T> {
    /// The model answered and the JSON matched the expected shape.
    Parsed(T),
    /// The model answered but no usable JSON could be extracted.
    ParseFailed { raw: String },
    /// The request itself failed or timed out.
    Unavailable { reason: String },
}

impl<T> InferenceOutcome<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    /// Take the parsed value, or run `fallback` on either failure branch.
    pub fn or_fallback(self, what: &str, fallback: impl FnOnce() -> T) -> T {
        match self {
            Self::Parsed(value) => value,
            Self::ParseFailed { raw } => {
                let preview: String = raw.chars().take(200).collect();
                warn!(analysis = what, raw = %preview, "Unparseable model output, using heuristic");
                fallback()
            }
            Self::Unavailable { reason } => {
                warn!(analysis = what, reason = %reason, "Inference unavailable, using heuristic");
                fallback()
            }
        }
    }
}

/// Run a completion with a deadline and parse the answer as `T`.
pub async fn infer_json<T: DeserializeOwned>(
    llm: &dyn LlmProvider,
    request: CompletionRequest,
    deadline: Duration,
) -> InferenceOutcome<T> {
    let response = match tokio::time::timeout(deadline, llm.complete(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            return InferenceOutcome::Unavailable {
                reason: e.to_string(),
            };
        }
        Err(_) => {
            return InferenceOutcome::Unavailable {
                reason: format!("timed out after {deadline:?}"),
            };
        }
    };

    parse_json_reply(&response.content)
}

/// Parse model text into `T` via the first balanced JSON object.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> InferenceOutcome<T> {
    let Some(json) = extract_json_object(raw) else {
        return InferenceOutcome::ParseFailed {
            raw: raw.to_string(),
        };
    };
    match serde_json::from_str::<T>(json) {
        Ok(value) => InferenceOutcome::Parsed(value),
        Err(e) => {
            debug!(error = %e, "JSON did not match expected shape");
            InferenceOutcome::ParseFailed {
                raw: raw.to_string(),
            }
        }
    }
}

/// Find the first balanced `{...}` in `text`.
///
/// Braces inside JSON strings (including escaped quotes) are ignored, so a
/// trailing sentence containing `}` does not truncate the object.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde::Deserialize;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::{ChatMessage, CompletionResponse, FinishReason};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        label: String,
        #[serde(default)]
        score: f64,
    }

    #[test]
    fn extracts_plain_object() {
        assert_eq!(extract_json_object(r#"{"a":1}"#), Some(r#"{"a":1}"#));
    }

    #[test]
    fn extracts_from_markdown_fence() {
        let text = "Here you go:\n```json\n{\"label\": \"x\"}\n```\nAnything else?";
        assert_eq!(extract_json_object(text), Some("{\"label\": \"x\"}"));
    }

    #[test]
    fn first_balanced_object_not_last_brace() {
        let text = r#"{"label": "a", "nested": {"k": 1}} and then {"other": true}"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"label": "a", "nested": {"k": 1}}"#)
        );
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let text = r#"{"label": "curly } brace \" quote {"} trailing }"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"label": "curly } brace \" quote {"}"#)
        );
    }

    #[test]
    fn unbalanced_returns_none() {
        assert_eq!(extract_json_object(r#"{"label": "x""#), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn parse_reply_shapes() {
        let ok: InferenceOutcome<Sample> = parse_json_reply(r#"Sure! {"label": "hotels", "score": 0.5}"#);
        match ok {
            InferenceOutcome::Parsed(s) => assert_eq!(s.label, "hotels"),
            other => panic!("expected Parsed, got {other:?}"),
        }

        let bad: InferenceOutcome<Sample> = parse_json_reply(r#"{"score": 0.5}"#);
        assert!(matches!(bad, InferenceOutcome::ParseFailed { .. }));
    }

    #[test]
    fn or_fallback_uses_heuristic_on_failure() {
        let failed: InferenceOutcome<u8> = InferenceOutcome::ParseFailed { raw: "??".into() };
        assert_eq!(failed.or_fallback("test", || 7), 7);
        let parsed = InferenceOutcome::Parsed(1u8);
        assert_eq!(parsed.or_fallback("test", || 7), 1);
    }

    struct SlowLlm;

    #[async_trait]
    impl LlmProvider for SlowLlm {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }
        async fn complete(&self, _r: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CompletionResponse {
                content: r#"{"label":"late"}"#.into(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    #[tokio::test]
    async fn timeout_maps_to_unavailable() {
        let request = CompletionRequest::new(vec![ChatMessage::user("x")]);
        let outcome: InferenceOutcome<Sample> =
            infer_json(&SlowLlm, request, Duration::from_millis(20)).await;
        assert!(matches!(outcome, InferenceOutcome::Unavailable { .. }));
    }
}
