//! Request and result types for the email pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{Classification, PurchasePrediction, PurchaseReadiness, SentimentAnalysis};
use crate::channels::RawEmail;
use crate::error::PipelineError;
use crate::notify::NotificationOutcome;
use crate::responder::ReplySource;
use crate::store::models::{ClientProfile, EmailStatus, Priority};

// ── Input ───────────────────────────────────────────────────────────

/// One raw inbound email, as posted to the process endpoint or built
/// from a fetched message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    /// Dedup key. Generated when absent.
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
    /// Mailbox timestamp; defaults to the time of processing.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl ProcessRequest {
    /// Reject requests without a sender or a body.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut missing = Vec::new();
        if self.from.trim().is_empty() {
            missing.push("from");
        }
        if self.content.trim().is_empty() {
            missing.push("content");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::InvalidInput(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// The message id, or a fresh one for manual submissions.
    pub fn resolved_message_id(&self) -> String {
        self.message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("manual-{}", Uuid::new_v4()))
    }
}

impl From<&RawEmail> for ProcessRequest {
    fn from(raw: &RawEmail) -> Self {
        // An empty body still gets processed on its subject.
        let content = if raw.body.trim().is_empty() {
            raw.subject.clone()
        } else {
            raw.body.clone()
        };
        Self {
            message_id: Some(raw.message_id.clone()),
            from: raw.from.clone(),
            to: raw.to.clone(),
            subject: raw.subject.clone(),
            content,
            received_at: Some(raw.received_at),
        }
    }
}

// ── Output ──────────────────────────────────────────────────────────

/// Analysis results returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiInsights {
    pub sentiment: SentimentAnalysis,
    pub purchase_prediction: PurchasePrediction,
    pub purchase_readiness: PurchaseReadiness,
    pub priority: Priority,
    pub escalated: bool,
}

/// Profile snapshot after this interaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub email: String,
    pub is_returning: bool,
    pub loyalty_score: f64,
    pub value_score: f64,
    pub engagement_score: f64,
    pub interaction_count: i64,
}

impl ClientSummary {
    pub fn from_profile(profile: &ClientProfile, is_returning: bool) -> Self {
        Self {
            email: profile.email.clone(),
            is_returning,
            loyalty_score: profile.loyalty_score,
            value_score: profile.value_score,
            engagement_score: profile.engagement_score,
            interaction_count: profile.interaction_count,
        }
    }
}

/// Full result of processing one new email.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub success: bool,
    pub email_id: String,
    pub conversation_id: String,
    /// Reply body as stored on the AGENT message.
    pub response: String,
    pub reply_source: ReplySource,
    pub status: EmailStatus,
    pub category: Classification,
    pub detected_language: String,
    pub escalation_reasons: Vec<String>,
    /// Id of the purchase alert raised, if any.
    pub purchase_alert: Option<String>,
    /// Id of the learning-queue entry logged, if any.
    pub learning_entry: Option<String>,
    pub client_profile: ClientSummary,
    pub notifications: NotificationOutcome,
    pub reply_sent: bool,
    pub send_error: Option<String>,
    pub ai_insights: AiInsights,
}

/// What happened to one submitted email.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Already stored under this message id; nothing was done.
    Duplicate { email_id: String },
    Processed(Box<ProcessReport>),
}

impl ProcessOutcome {
    pub fn email_id(&self) -> &str {
        match self {
            Self::Duplicate { email_id } => email_id,
            Self::Processed(report) => &report.email_id,
        }
    }
}

/// Per-email line of a fetch run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedEmailStatus {
    /// Stored email id; absent when processing failed before persistence.
    pub id: Option<String>,
    pub subject: String,
    pub from: String,
    /// `duplicate`, `failed`, or the stored email status.
    pub status: String,
}

/// Result of one fetch cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSummary {
    pub success: bool,
    /// Newly processed emails.
    pub processed: usize,
    /// Emails fetched from the mailbox.
    pub total: usize,
    pub emails: Vec<FetchedEmailStatus>,
}
