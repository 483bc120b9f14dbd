//! Purchase probability prediction and purchase-readiness detection.
//!
//! Two prompt contracts against the same chain. Prediction sees the email
//! and the client profile; readiness additionally sees the sentiment and
//! prediction results. Scores are clamped to [0, 1] after parsing.

use std::time::Duration;

use crate::llm::{ChatMessage, CompletionRequest, InferenceOutcome, LlmProvider, infer_json};
use crate::store::models::ClientProfile;

use super::{PurchasePrediction, PurchaseReadiness, SentimentAnalysis, unit_interval};

const PREDICT_MAX_TOKENS: u32 = 500;
const PREDICT_TEMPERATURE: f32 = 0.2;

const READINESS_MAX_TOKENS: u32 = 600;
const READINESS_TEMPERATURE: f32 = 0.1;

/// Marker the readiness prompt starts with. Test doubles dispatch on it.
pub const READINESS_PROMPT_MARKER: &str = "Decide whether the client is READY TO PURCHASE";

/// Marker the prediction prompt starts with.
pub const PREDICTION_PROMPT_MARKER: &str = "Predict the purchase probability";

pub async fn predict(
    llm: &dyn LlmProvider,
    text: &str,
    profile: &ClientProfile,
    deadline: Duration,
) -> InferenceOutcome<PurchasePrediction> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(build_prediction_system_prompt()),
        ChatMessage::user(build_prediction_user_prompt(text, profile)),
    ])
    .with_temperature(PREDICT_TEMPERATURE)
    .with_max_tokens(PREDICT_MAX_TOKENS);

    match infer_json::<PurchasePrediction>(llm, request, deadline).await {
        InferenceOutcome::Parsed(mut p) => {
            p.purchase_probability = unit_interval(p.purchase_probability);
            InferenceOutcome::Parsed(p)
        }
        other => other,
    }
}

pub async fn detect_readiness(
    llm: &dyn LlmProvider,
    text: &str,
    profile: &ClientProfile,
    sentiment: &SentimentAnalysis,
    prediction: &PurchasePrediction,
    deadline: Duration,
) -> InferenceOutcome<PurchaseReadiness> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(build_readiness_system_prompt()),
        ChatMessage::user(build_readiness_user_prompt(
            text, profile, sentiment, prediction,
        )),
    ])
    .with_temperature(READINESS_TEMPERATURE)
    .with_max_tokens(READINESS_MAX_TOKENS);

    match infer_json::<PurchaseReadiness>(llm, request, deadline).await {
        InferenceOutcome::Parsed(mut r) => {
            r.readiness_score = unit_interval(r.readiness_score);
            if !r.potential_value.is_finite() || r.potential_value < 0.0 {
                r.potential_value = 0.0;
            }
            InferenceOutcome::Parsed(r)
        }
        other => other,
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_prediction_system_prompt() -> String {
    format!(
        "{PREDICTION_PROMPT_MARKER} from the email and the client profile.\n\n\
         Respond with ONLY a JSON object:\n\
         {{\"purchaseProbability\": 0.75, \
         \"timeToDecision\": \"1-3 days|1-2 weeks|1 month|3+ months\", \
         \"buyingSignals\": [\"specific dates\", \"budget mentioned\"], \
         \"barriers\": [\"price concerns\"], \
         \"upsellOpportunities\": [\"premium hotels\", \"extended stay\"], \
         \"estimatedBudget\": \"budget|mid-range|luxury\"}}"
    )
}

fn profile_lines(profile: &ClientProfile) -> String {
    format!(
        "- Email: {}\n\
         - Previous interactions: {}\n\
         - Lifetime booking value: {:.0}\n\
         - Loyalty score: {:.2}\n\
         - Value score: {:.2}\n\
         - Budget range: {}\n\
         - Travel style: {}\n",
        profile.email,
        profile.interaction_count,
        profile.total_booking_value,
        profile.loyalty_score,
        profile.value_score,
        profile.budget_range.as_deref().unwrap_or("unknown"),
        profile.travel_style.as_deref().unwrap_or("unknown"),
    )
}

fn build_prediction_user_prompt(text: &str, profile: &ClientProfile) -> String {
    let preview: String = text.chars().take(2000).collect();
    format!(
        "EMAIL CONTENT:\n{preview}\n\nCLIENT PROFILE:\n{}",
        profile_lines(profile)
    )
}

fn build_readiness_system_prompt() -> String {
    format!(
        "{READINESS_PROMPT_MARKER} based on the email, profile and prior analysis.\n\n\
         Respond with ONLY a JSON object:\n\
         {{\"isPurchaseReady\": true, \
         \"readinessScore\": 0.95, \
         \"readySignals\": [\"mentioned specific dates\", \"asked about payment methods\"], \
         \"immediateActions\": [\"Send detailed quote within 2 hours\", \"Call client directly\"], \
         \"estimatedCloseTime\": \"24 hours|2-3 days|1 week\", \
         \"potentialValue\": 15000, \
         \"riskFactors\": [\"price sensitivity\"], \
         \"nextSteps\": [\"...\"], \
         \"reasoning\": \"...\"}}\n\n\
         Reserve scores above 0.8 for clients who are clearly about to book."
    )
}

fn build_readiness_user_prompt(
    text: &str,
    profile: &ClientProfile,
    sentiment: &SentimentAnalysis,
    prediction: &PurchasePrediction,
) -> String {
    let preview: String = text.chars().take(2000).collect();
    format!(
        "EMAIL CONTENT:\n{preview}\n\n\
         CLIENT PROFILE:\n{}\n\
         SENTIMENT ANALYSIS:\n\
         - Sentiment: {}\n\
         - Emotion: {}\n\
         - Urgency: {}\n\n\
         PURCHASE PREDICTION:\n\
         - Purchase probability: {:.2}\n\
         - Time to decision: {}\n\
         - Buying signals: {}\n\
         - Estimated budget: {}\n",
        profile_lines(profile),
        sentiment.sentiment.as_str(),
        sentiment.emotion,
        sentiment.urgency.as_str(),
        prediction.purchase_probability,
        prediction.time_to_decision,
        prediction.buying_signals.join(", "),
        prediction.estimated_budget.as_str(),
    )
}
