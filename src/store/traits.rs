//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::store::models::{
    AlertFilter, ClientProfile, Conversation, ConversationMessage, EmailQuery, EmailStats,
    EmailStatus, InboundEmail, KnowledgeEntry, LeadStats, LearningCounts, LearningEntry,
    LearningStatus, MessageSender, NewInboundEmail, PurchaseAlert, StoredSettings,
};

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Emails ──────────────────────────────────────────────────────

    /// Insert a new inbound email with status `processing`.
    ///
    /// Fails with `DatabaseError::Constraint` when the message id is
    /// already stored. This is the dedup guard for concurrent runs.
    async fn insert_email(&self, email: &NewInboundEmail) -> Result<InboundEmail, DatabaseError>;

    async fn get_email(&self, id: &str) -> Result<Option<InboundEmail>, DatabaseError>;

    /// Look up an email by its transport message id.
    async fn get_email_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<InboundEmail>, DatabaseError>;

    async fn update_email_status(&self, id: &str, status: EmailStatus)
    -> Result<(), DatabaseError>;

    /// Move a `pending` email back to `processing`. Returns false when the
    /// row is in any other state, so only one retry can claim it.
    async fn claim_pending_email(&self, id: &str) -> Result<bool, DatabaseError>;

    /// Remove the conversation of an email together with its messages and
    /// alerts. A no-op when the email has none.
    async fn discard_conversation(&self, email_id: &str) -> Result<(), DatabaseError>;

    /// Store the reply text and final status together.
    async fn set_email_response(
        &self,
        id: &str,
        response: &str,
        status: EmailStatus,
    ) -> Result<(), DatabaseError>;

    /// Page through emails, newest first. Returns the page and the total match count.
    async fn list_emails(
        &self,
        query: &EmailQuery,
    ) -> Result<(Vec<InboundEmail>, u64), DatabaseError>;

    async fn email_stats(&self) -> Result<EmailStats, DatabaseError>;

    // ── Conversations ───────────────────────────────────────────────

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), DatabaseError>;

    async fn update_conversation(&self, conversation: &Conversation) -> Result<(), DatabaseError>;

    async fn get_conversation_by_email(
        &self,
        email_id: &str,
    ) -> Result<Option<Conversation>, DatabaseError>;

    /// Append a message to a conversation.
    async fn append_message(
        &self,
        conversation_id: &str,
        sender: MessageSender,
        content: &str,
    ) -> Result<ConversationMessage, DatabaseError>;

    /// Messages in insertion order.
    async fn list_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConversationMessage>, DatabaseError>;

    /// Lead counts for conversations created since `since`.
    async fn lead_stats(&self, since: DateTime<Utc>) -> Result<LeadStats, DatabaseError>;

    // ── Clients ─────────────────────────────────────────────────────

    async fn get_client_profile(&self, email: &str)
    -> Result<Option<ClientProfile>, DatabaseError>;

    /// Fetch the profile for `email`, creating a zeroed one if absent.
    async fn get_or_create_client_profile(
        &self,
        email: &str,
    ) -> Result<ClientProfile, DatabaseError>;

    async fn update_client_profile(&self, profile: &ClientProfile) -> Result<(), DatabaseError>;

    // ── Purchase alerts ─────────────────────────────────────────────

    async fn insert_alert(&self, alert: &PurchaseAlert) -> Result<(), DatabaseError>;

    async fn get_alert(&self, id: &str) -> Result<Option<PurchaseAlert>, DatabaseError>;

    async fn update_alert(&self, alert: &PurchaseAlert) -> Result<(), DatabaseError>;

    /// Alerts matching `filter`, newest first.
    async fn list_alerts(&self, filter: AlertFilter) -> Result<Vec<PurchaseAlert>, DatabaseError>;

    // ── Knowledge base ──────────────────────────────────────────────

    async fn insert_knowledge(&self, entry: &KnowledgeEntry) -> Result<(), DatabaseError>;

    /// Replace an entry. `NotFound` if the id does not exist.
    async fn update_knowledge(&self, entry: &KnowledgeEntry) -> Result<(), DatabaseError>;

    /// Returns whether a row was deleted.
    async fn delete_knowledge(&self, id: &str) -> Result<bool, DatabaseError>;

    async fn get_knowledge(&self, id: &str) -> Result<Option<KnowledgeEntry>, DatabaseError>;

    /// Active entries, optionally filtered by category and a search term
    /// matched against title, content and tags.
    async fn list_knowledge(
        &self,
        category: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<KnowledgeEntry>, DatabaseError>;

    // ── Learning queue ──────────────────────────────────────────────

    async fn insert_learning(&self, entry: &LearningEntry) -> Result<(), DatabaseError>;

    async fn get_learning(&self, id: &str) -> Result<Option<LearningEntry>, DatabaseError>;

    async fn update_learning(&self, entry: &LearningEntry) -> Result<(), DatabaseError>;

    /// Entries with `status`, highest priority first, then oldest first.
    async fn list_learning(
        &self,
        status: LearningStatus,
        limit: u32,
    ) -> Result<Vec<LearningEntry>, DatabaseError>;

    async fn learning_counts(&self) -> Result<LearningCounts, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    async fn get_settings(&self) -> Result<Option<StoredSettings>, DatabaseError>;

    async fn save_settings(&self, settings: &StoredSettings) -> Result<(), DatabaseError>;
}
