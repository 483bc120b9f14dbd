//! Email analysis — classification, sentiment, purchase prediction and
//! purchase readiness.
//!
//! Every analysis goes through the LLM chain first and falls back to the
//! keyword heuristics in [`heuristics`] when inference is unavailable or
//! the model's JSON does not parse. Callers always get a value.

pub mod classifier;
pub mod heuristics;
pub mod purchase;
pub mod sentiment;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::LlmProvider;
use crate::store::models::ClientProfile;

/// Languages with localized templates. Anything else is `other`.
pub const SUPPORTED_LANGUAGES: &[&str] = &["pl", "en", "de", "fr", "es", "it", "ru"];

/// Readiness score strictly above this raises a purchase alert.
pub const READINESS_ALERT_THRESHOLD: f64 = 0.8;

/// Clamp a model-provided score into [0, 1]. Non-finite values become 0.
pub fn unit_interval(x: f64) -> f64 {
    if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 }
}

/// Normalize a language label to a supported ISO 639-1 code or `other`.
///
/// Accepts codes with a region suffix (`en-US`) as well as English or
/// native language names (`Polish`, `Deutsch`).
pub fn normalize_language(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let head = lower.split(['-', '_']).next().unwrap_or_default();
    let code = match head {
        "polish" | "polski" => "pl",
        "english" => "en",
        "german" | "deutsch" => "de",
        "french" | "français" | "francais" => "fr",
        "spanish" | "español" | "espanol" => "es",
        "italian" | "italiano" => "it",
        "russian" | "русский" => "ru",
        other => other,
    };
    if SUPPORTED_LANGUAGES.contains(&code) {
        code.to_string()
    } else {
        "other".to_string()
    }
}

// ── Label enums ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Category {
    Hotels,
    Attractions,
    Restaurants,
    Transport,
    Booking,
    #[default]
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hotels => "hotels",
            Self::Attractions => "attractions",
            Self::Restaurants => "restaurants",
            Self::Transport => "transport",
            Self::Booking => "booking",
            Self::General => "general",
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "hotels" | "hotel" => Self::Hotels,
            "attractions" | "attraction" => Self::Attractions,
            "restaurants" | "restaurant" => Self::Restaurants,
            "transport" => Self::Transport,
            "booking" => Self::Booking,
            _ => Self::General,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl From<String> for Urgency {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
    Frustrated,
    Angry,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Frustrated => "frustrated",
            Self::Angry => "angry",
        }
    }

    /// Angry or frustrated: forces URGENT and escalation.
    pub fn is_hostile(&self) -> bool {
        matches!(self, Self::Angry | Self::Frustrated)
    }
}

impl From<String> for Sentiment {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            "frustrated" => Self::Frustrated,
            "angry" => Self::Angry,
            _ => Self::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum PriceRange {
    #[serde(rename = "budget")]
    Budget,
    #[serde(rename = "mid-range")]
    MidRange,
    #[serde(rename = "luxury")]
    Luxury,
    #[default]
    #[serde(rename = "not_specified")]
    NotSpecified,
}

impl PriceRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::MidRange => "mid-range",
            Self::Luxury => "luxury",
            Self::NotSpecified => "not_specified",
        }
    }
}

impl From<String> for PriceRange {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "budget" => Self::Budget,
            "mid-range" | "midrange" | "mid" => Self::MidRange,
            "luxury" => Self::Luxury,
            _ => Self::NotSpecified,
        }
    }
}

// ── Analysis results ────────────────────────────────────────────────

fn default_language() -> String {
    "other".to_string()
}

/// Topic, language and tone labels for one email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default)]
    pub category: Category,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub has_specific_dates: bool,
    #[serde(default)]
    pub price_range: PriceRange,
    #[serde(default)]
    pub topics: Vec<String>,
}

fn default_emotion() -> String {
    "neutral".to_string()
}

fn default_confidence() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentAnalysis {
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default = "default_emotion")]
    pub emotion: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Default for SentimentAnalysis {
    fn default() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            emotion: default_emotion(),
            confidence: default_confidence(),
            urgency: Urgency::Medium,
            keywords: Vec::new(),
        }
    }
}

fn default_probability() -> f64 {
    0.5
}

fn default_time_to_decision() -> String {
    "1-2 weeks".to_string()
}

fn default_budget() -> PriceRange {
    PriceRange::MidRange
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePrediction {
    #[serde(default = "default_probability")]
    pub purchase_probability: f64,
    #[serde(default = "default_time_to_decision")]
    pub time_to_decision: String,
    #[serde(default)]
    pub buying_signals: Vec<String>,
    #[serde(default)]
    pub barriers: Vec<String>,
    #[serde(default)]
    pub upsell_opportunities: Vec<String>,
    #[serde(default = "default_budget", alias = "priceRange")]
    pub estimated_budget: PriceRange,
}

impl Default for PurchasePrediction {
    fn default() -> Self {
        Self {
            purchase_probability: default_probability(),
            time_to_decision: default_time_to_decision(),
            buying_signals: Vec::new(),
            barriers: Vec::new(),
            upsell_opportunities: Vec::new(),
            estimated_budget: default_budget(),
        }
    }
}

fn default_close_time() -> String {
    "1 week".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReadiness {
    /// The model's own verdict. Informational only; see [`Self::is_alert_worthy`].
    #[serde(default)]
    pub is_purchase_ready: bool,
    #[serde(default)]
    pub readiness_score: f64,
    #[serde(default)]
    pub ready_signals: Vec<String>,
    #[serde(default)]
    pub immediate_actions: Vec<String>,
    #[serde(default = "default_close_time")]
    pub estimated_close_time: String,
    #[serde(default)]
    pub potential_value: f64,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl Default for PurchaseReadiness {
    fn default() -> Self {
        Self {
            is_purchase_ready: false,
            readiness_score: 0.0,
            ready_signals: Vec::new(),
            immediate_actions: Vec::new(),
            estimated_close_time: default_close_time(),
            potential_value: 0.0,
            risk_factors: Vec::new(),
            next_steps: Vec::new(),
            reasoning: String::new(),
        }
    }
}

impl PurchaseReadiness {
    /// Whether this result raises a purchase alert. Strictly greater than 0.8.
    pub fn is_alert_worthy(&self) -> bool {
        self.readiness_score > READINESS_ALERT_THRESHOLD
    }
}

// ── Analyzer ────────────────────────────────────────────────────────

/// Runs each analysis against the LLM chain with a per-call deadline.
pub struct Analyzer {
    llm: Arc<dyn LlmProvider>,
    deadline: Duration,
}

impl Analyzer {
    pub fn new(llm: Arc<dyn LlmProvider>, deadline: Duration) -> Self {
        Self { llm, deadline }
    }

    pub async fn classify(&self, text: &str) -> Classification {
        classifier::classify(self.llm.as_ref(), text, self.deadline)
            .await
            .or_fallback("classification", || heuristics::classify(text))
    }

    pub async fn sentiment(&self, text: &str) -> SentimentAnalysis {
        sentiment::analyze(self.llm.as_ref(), text, self.deadline)
            .await
            .or_fallback("sentiment", || heuristics::sentiment(text))
    }

    pub async fn predict_purchase(
        &self,
        text: &str,
        profile: &ClientProfile,
    ) -> PurchasePrediction {
        purchase::predict(self.llm.as_ref(), text, profile, self.deadline)
            .await
            .or_fallback("purchase_prediction", || {
                heuristics::predict_purchase(text, &heuristics::classify(text))
            })
    }

    pub async fn readiness(
        &self,
        text: &str,
        profile: &ClientProfile,
        sentiment: &SentimentAnalysis,
        prediction: &PurchasePrediction,
    ) -> PurchaseReadiness {
        purchase::detect_readiness(
            self.llm.as_ref(),
            text,
            profile,
            sentiment,
            prediction,
            self.deadline,
        )
        .await
        .or_fallback("purchase_readiness", PurchaseReadiness::default)
    }
}
