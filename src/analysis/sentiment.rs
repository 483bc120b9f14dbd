//! Model-backed sentiment and emotion analysis.

use std::time::Duration;

use crate::llm::{ChatMessage, CompletionRequest, InferenceOutcome, LlmProvider, infer_json};

use super::{SentimentAnalysis, unit_interval};

const SENTIMENT_MAX_TOKENS: u32 = 300;
const SENTIMENT_TEMPERATURE: f32 = 0.1;

pub async fn analyze(
    llm: &dyn LlmProvider,
    text: &str,
    deadline: Duration,
) -> InferenceOutcome<SentimentAnalysis> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(build_sentiment_system_prompt()),
        ChatMessage::user(text.chars().take(2000).collect::<String>()),
    ])
    .with_temperature(SENTIMENT_TEMPERATURE)
    .with_max_tokens(SENTIMENT_MAX_TOKENS);

    match infer_json::<SentimentAnalysis>(llm, request, deadline).await {
        InferenceOutcome::Parsed(mut s) => {
            s.confidence = unit_interval(s.confidence);
            InferenceOutcome::Parsed(s)
        }
        other => other,
    }
}

fn build_sentiment_system_prompt() -> String {
    "Analyze the sentiment and emotion of the customer email.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"sentiment\": \"positive|neutral|negative|frustrated|angry\", \
     \"emotion\": \"excited|happy|neutral|concerned|frustrated|angry|disappointed\", \
     \"confidence\": 0.85, \
     \"urgency\": \"low|medium|high|urgent\", \
     \"keywords\": [\"emotion\", \"indicators\"]}"
        .to_string()
}
