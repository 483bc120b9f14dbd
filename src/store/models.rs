//! Persisted entities and their status enums.
//!
//! Every status has exactly one enum with one wire spelling; the
//! `as_str`/`parse` pairs are what the database stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ── Status enums ────────────────────────────────────────────────────

/// Lifecycle of an inbound email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Pending,
    Processing,
    Responded,
    Escalated,
    SendError,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Responded => "responded",
            Self::Escalated => "escalated",
            Self::SendError => "send_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "responded" => Some(Self::Responded),
            "escalated" => Some(Self::Escalated),
            "send_error" => Some(Self::SendError),
            _ => None,
        }
    }
}

/// Conversation / alert priority. Ordered from least to most pressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "URGENT" => Self::Urgent,
            "HIGH" => Self::High,
            "MEDIUM" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageSender {
    Client,
    Agent,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Agent => "AGENT",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("agent") {
            Self::Agent
        } else {
            Self::Client
        }
    }
}

/// Review status of a learning-queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningStatus {
    Pending,
    Resolved,
    Ignored,
}

impl LearningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            "ignored" => Some(Self::Ignored),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningPriority {
    Low,
    Medium,
    High,
}

impl LearningPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

// ── Emails ──────────────────────────────────────────────────────────

/// Fields needed to record a newly received email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInboundEmail {
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// A stored inbound email. `message_id` is unique across the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEmail {
    pub id: String,
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub status: EmailStatus,
    /// Full reply text as staged or sent.
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for the email listing.
#[derive(Debug, Clone)]
pub struct EmailQuery {
    pub search: Option<String>,
    pub status: Option<EmailStatus>,
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl Default for EmailQuery {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            page: 1,
            limit: 20,
        }
    }
}

/// Email counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub responded: u64,
    pub escalated: u64,
    pub send_error: u64,
}

// ── Conversations ───────────────────────────────────────────────────

/// Analysis results attached 1:1 to an inbound email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub email_id: String,
    pub client_email: String,
    pub client_id: String,
    pub language: String,
    pub sentiment: String,
    pub priority: Priority,
    pub purchase_probability: f64,
    pub escalated: bool,
    pub escalation_reasons: Vec<String>,
    pub topic: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(email_id: &str, client: &ClientProfile) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            email_id: email_id.to_string(),
            client_email: client.email.clone(),
            client_id: client.id.clone(),
            language: "other".into(),
            sentiment: "neutral".into(),
            priority: Priority::Low,
            purchase_probability: 0.0,
            escalated: false,
            escalation_reasons: Vec::new(),
            topic: "general".into(),
            summary: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One entry in a conversation's append-only message list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender: MessageSender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Lead counts over a time window.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadStats {
    /// purchase probability >= 0.7
    pub high_value: u64,
    /// 0.4 <= purchase probability < 0.7
    pub medium_value: u64,
    pub average_probability: f64,
}

// ── Clients ─────────────────────────────────────────────────────────

/// Behavioural profile keyed by the client's email address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub id: String,
    pub email: String,
    pub loyalty_score: f64,
    pub value_score: f64,
    pub engagement_score: f64,
    /// Lifetime booking value.
    pub total_booking_value: f64,
    pub preferred_language: Option<String>,
    pub budget_range: Option<String>,
    pub travel_style: Option<String>,
    pub interaction_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClientProfile {
    /// A fresh profile with zeroed scores.
    pub fn new(email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            email: email.to_lowercase(),
            loyalty_score: 0.0,
            value_score: 0.0,
            engagement_score: 0.0,
            total_booking_value: 0.0,
            preferred_language: None,
            budget_range: None,
            travel_style: None,
            interaction_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a closed sale to the lifetime booking value.
    pub fn record_booking(&mut self, value: f64) {
        if value.is_finite() && value > 0.0 {
            self.total_booking_value += value;
            self.updated_at = Utc::now();
        }
    }
}

// ── Purchase alerts ─────────────────────────────────────────────────

/// Derived state of a purchase alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Active,
    Snoozed,
    Resolved,
}

/// Operator actions on an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    Resolve,
    Snooze,
    Reactivate,
}

impl AlertAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "resolve" => Some(Self::Resolve),
            "snooze" => Some(Self::Snooze),
            "reactivate" => Some(Self::Reactivate),
            _ => None,
        }
    }
}

/// Rejected alert transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action:?} an alert that is {from:?}")]
pub struct TransitionError {
    pub from: AlertState,
    pub action: AlertAction,
}

/// Raised when purchase readiness crosses the alert threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseAlert {
    pub id: String,
    pub conversation_id: String,
    pub client_email: String,
    pub priority: Priority,
    pub readiness_score: f64,
    pub estimated_value: f64,
    pub estimated_close_time: String,
    pub signals: Vec<String>,
    pub actions: Vec<String>,
    pub next_steps: Vec<String>,
    pub is_active: bool,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseAlert {
    pub fn state(&self) -> AlertState {
        if self.is_resolved {
            AlertState::Resolved
        } else if self.is_active {
            AlertState::Active
        } else {
            AlertState::Snoozed
        }
    }

    /// Apply an operator action.
    ///
    /// active → resolved | snoozed, snoozed → active | resolved.
    /// Resolved is terminal.
    pub fn apply(&mut self, action: AlertAction, notes: Option<String>) -> Result<(), TransitionError> {
        let from = self.state();
        let now = Utc::now();
        match (from, action) {
            (AlertState::Active | AlertState::Snoozed, AlertAction::Resolve) => {
                self.is_resolved = true;
                self.is_active = false;
                self.resolved_at = Some(now);
                self.resolved_by = Some("manual".into());
                self.notes = notes.or_else(|| self.notes.take());
            }
            (AlertState::Active, AlertAction::Snooze) => {
                self.is_active = false;
                self.notes = Some(notes.unwrap_or_else(|| "Snoozed by user".into()));
            }
            (AlertState::Snoozed, AlertAction::Reactivate) => {
                self.is_active = true;
                self.is_resolved = false;
                if notes.is_some() {
                    self.notes = notes;
                }
            }
            _ => return Err(TransitionError { from, action }),
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Listing filter for alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertFilter {
    Active,
    Urgent,
    Resolved,
    All,
}

impl AlertFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "urgent" => Some(Self::Urgent),
            "resolved" => Some(Self::Resolved),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

// ── Knowledge base ──────────────────────────────────────────────────

/// A curated fact the reply generator may quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn new(title: &str, content: &str, category: &str, tags: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: title.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            tags,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

// ── Learning queue ──────────────────────────────────────────────────

/// A customer question the knowledge base could not answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningEntry {
    pub id: String,
    pub customer_email: String,
    pub question: String,
    pub category: String,
    pub language: String,
    pub keywords: Vec<String>,
    pub context: Option<String>,
    pub priority: LearningPriority,
    pub status: LearningStatus,
    pub answer: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LearningEntry {
    pub fn new(customer_email: &str, question: &str, category: &str, language: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            customer_email: customer_email.to_string(),
            question: question.to_string(),
            category: category.to_string(),
            language: language.to_string(),
            keywords: Vec::new(),
            context: None,
            priority: learning_priority(question),
            status: LearningStatus::Pending,
            answer: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Entries per learning status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LearningCounts {
    pub pending: u64,
    pub resolved: u64,
    pub ignored: u64,
}

const HIGH_PRIORITY_TERMS: &[&str] = &[
    "cena", "koszt", "ile", "price", "cost", "hotel", "rezerwacja", "booking",
];
const MEDIUM_PRIORITY_TERMS: &[&str] = &["informacja", "info", "details", "szczegóły"];

/// Priority of an unanswered question: pricing and booking questions first.
pub fn learning_priority(question: &str) -> LearningPriority {
    let lower = question.to_lowercase();
    if HIGH_PRIORITY_TERMS.iter().any(|t| lower.contains(t)) {
        LearningPriority::High
    } else if MEDIUM_PRIORITY_TERMS.iter().any(|t| lower.contains(t)) {
        LearningPriority::Medium
    } else {
        LearningPriority::Low
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Persisted settings blob plus the two columns kept in sync with it.
#[derive(Debug, Clone)]
pub struct StoredSettings {
    pub data: serde_json::Value,
    pub signature: Option<String>,
    pub auto_reply: bool,
    pub updated_at: DateTime<Utc>,
}
