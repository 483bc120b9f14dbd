//! Model-backed email classifier.

use std::time::Duration;

use crate::llm::{ChatMessage, CompletionRequest, InferenceOutcome, LlmProvider, infer_json};

use super::{Classification, normalize_language};

/// Max tokens for the classification call.
const CLASSIFY_MAX_TOKENS: u32 = 300;

/// Temperature for classification (near-deterministic).
const CLASSIFY_TEMPERATURE: f32 = 0.1;

/// Classify one email body. Language is normalized to a supported code or `other`.
pub async fn classify(
    llm: &dyn LlmProvider,
    text: &str,
    deadline: Duration,
) -> InferenceOutcome<Classification> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(build_classify_system_prompt()),
        ChatMessage::user(build_classify_user_prompt(text)),
    ])
    .with_temperature(CLASSIFY_TEMPERATURE)
    .with_max_tokens(CLASSIFY_MAX_TOKENS);

    match infer_json::<Classification>(llm, request, deadline).await {
        InferenceOutcome::Parsed(mut c) => {
            c.language = normalize_language(&c.language);
            InferenceOutcome::Parsed(c)
        }
        other => other,
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_classify_system_prompt() -> String {
    "You classify customer emails sent to a Dubai travel agency.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"category\": \"hotels|attractions|restaurants|transport|general|booking\", \
     \"language\": \"ISO 639-1 code\", \
     \"urgency\": \"low|medium|high\", \
     \"sentiment\": \"positive|neutral|negative|frustrated|angry\", \
     \"hasSpecificDates\": true, \
     \"priceRange\": \"budget|mid-range|luxury|not_specified\", \
     \"topics\": [\"...\"]}\n\n\
     Rules:\n\
     - language is the language the customer wrote in, not the language of this prompt\n\
     - hasSpecificDates is true only for concrete dates, months or holidays\n\
     - topics are short lowercase nouns, at most five"
        .to_string()
}

fn build_classify_user_prompt(text: &str) -> String {
    let preview: String = text.chars().take(2000).collect();
    format!("Email:\n{preview}")
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::*;
    use crate::analysis::{Category, PriceRange, Urgency};
    use crate::error::LlmError;
    use crate::llm::{CompletionResponse, FinishReason};

    struct CannedLlm(&'static str);

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn model_name(&self) -> &str {
            "canned"
        }
        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }
        async fn complete(&self, _r: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.0.to_string(),
                input_tokens: 10,
                output_tokens: 10,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    #[test]
    fn system_prompt_lists_all_categories() {
        let prompt = build_classify_system_prompt();
        for c in ["hotels", "attractions", "restaurants", "transport", "general", "booking"] {
            assert!(prompt.contains(c));
        }
    }

    #[test]
    fn user_prompt_truncates_body() {
        let prompt = build_classify_user_prompt(&"x".repeat(5000));
        assert!(prompt.len() < 2100);
    }

    #[tokio::test]
    async fn parses_wrapped_json_and_normalizes_language() {
        let llm = CannedLlm(
            "Here is the classification:\n```json\n{\"category\":\"hotels\",\"language\":\"DE\",\"urgency\":\"high\",\"sentiment\":\"positive\",\"hasSpecificDates\":true,\"priceRange\":\"luxury\",\"topics\":[\"spa\"]}\n```",
        );
        let outcome = classify(&llm, "Hallo", Duration::from_secs(1)).await;
        let InferenceOutcome::Parsed(c) = outcome else {
            panic!("expected Parsed");
        };
        assert_eq!(c.category, Category::Hotels);
        assert_eq!(c.language, "de");
        assert_eq!(c.urgency, Urgency::High);
        assert_eq!(c.price_range, PriceRange::Luxury);
    }

    #[tokio::test]
    async fn prose_only_reply_is_parse_failure() {
        let llm = CannedLlm("I think this is about hotels.");
        let outcome = classify(&llm, "hotel?", Duration::from_secs(1)).await;
        assert!(matches!(outcome, InferenceOutcome::ParseFailed { .. }));
    }
}
