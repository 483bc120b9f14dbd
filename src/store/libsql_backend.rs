//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::models::{
    AlertFilter, ClientProfile, Conversation, ConversationMessage, EmailQuery, EmailStats,
    EmailStatus, InboundEmail, KnowledgeEntry, LeadStats, LearningCounts, LearningEntry,
    LearningPriority, LearningStatus, MessageSender, NewInboundEmail, Priority, PurchaseAlert,
    StoredSettings,
};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run a raw statement; lets tests take a table offline.
    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(sql, ())
            .await
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(format!("execute_raw: {e}")))
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_datetime(dt: Option<DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(dt.to_rfc3339()),
        None => libsql::Value::Null,
    }
}

fn to_json_list(items: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(items).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Map an insert error, surfacing unique-key violations as `Constraint`.
fn insert_error(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

/// Read a single `COUNT(*)`-style integer from the first row.
async fn scalar_count(mut rows: libsql::Rows, op: &str) -> Result<u64, DatabaseError> {
    match rows.next().await {
        Ok(Some(row)) => {
            let n: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
            Ok(n.max(0) as u64)
        }
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
    }
}

const EMAIL_COLUMNS: &str = "id, message_id, sender, recipient, subject, body, received_at, status, response, created_at, updated_at";

fn row_to_email(row: &libsql::Row) -> Result<InboundEmail, libsql::Error> {
    let received_str: String = row.get(6)?;
    let status_str: String = row.get(7)?;
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;

    Ok(InboundEmail {
        id: row.get(0)?,
        message_id: row.get(1)?,
        from: row.get(2)?,
        to: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        received_at: parse_datetime(&received_str),
        status: EmailStatus::parse(&status_str).unwrap_or(EmailStatus::Pending),
        response: row.get(8).ok(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const CONVERSATION_COLUMNS: &str = "id, email_id, client_email, client_id, language, sentiment, priority, purchase_probability, escalated, escalation_reasons, topic, summary, created_at, updated_at";

fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, libsql::Error> {
    let priority_str: String = row.get(6)?;
    let escalated: i64 = row.get(8)?;
    let reasons_str: String = row.get(9)?;
    let created_str: String = row.get(12)?;
    let updated_str: String = row.get(13)?;

    Ok(Conversation {
        id: row.get(0)?,
        email_id: row.get(1)?,
        client_email: row.get(2)?,
        client_id: row.get(3)?,
        language: row.get(4)?,
        sentiment: row.get(5)?,
        priority: Priority::parse(&priority_str),
        purchase_probability: row.get(7)?,
        escalated: escalated != 0,
        escalation_reasons: from_json_list(&reasons_str),
        topic: row.get(10)?,
        summary: row.get(11)?,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_message(row: &libsql::Row) -> Result<ConversationMessage, libsql::Error> {
    let sender_str: String = row.get(2)?;
    let created_str: String = row.get(4)?;
    Ok(ConversationMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender: MessageSender::parse(&sender_str),
        content: row.get(3)?,
        timestamp: parse_datetime(&created_str),
    })
}

const PROFILE_COLUMNS: &str = "id, email, loyalty_score, value_score, engagement_score, total_booking_value, preferred_language, budget_range, travel_style, interaction_count, created_at, updated_at";

fn row_to_profile(row: &libsql::Row) -> Result<ClientProfile, libsql::Error> {
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;
    Ok(ClientProfile {
        id: row.get(0)?,
        email: row.get(1)?,
        loyalty_score: row.get(2)?,
        value_score: row.get(3)?,
        engagement_score: row.get(4)?,
        total_booking_value: row.get(5)?,
        preferred_language: row.get(6).ok(),
        budget_range: row.get(7).ok(),
        travel_style: row.get(8).ok(),
        interaction_count: row.get(9)?,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const ALERT_COLUMNS: &str = "id, conversation_id, client_email, priority, readiness_score, estimated_value, estimated_close_time, signals, actions, next_steps, is_active, is_resolved, resolved_at, resolved_by, notes, created_at, updated_at";

fn row_to_alert(row: &libsql::Row) -> Result<PurchaseAlert, libsql::Error> {
    let priority_str: String = row.get(3)?;
    let signals: String = row.get(7)?;
    let actions: String = row.get(8)?;
    let next_steps: String = row.get(9)?;
    let is_active: i64 = row.get(10)?;
    let is_resolved: i64 = row.get(11)?;
    let resolved_at: Option<String> = row.get(12).ok();
    let created_str: String = row.get(15)?;
    let updated_str: String = row.get(16)?;

    Ok(PurchaseAlert {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        client_email: row.get(2)?,
        priority: Priority::parse(&priority_str),
        readiness_score: row.get(4)?,
        estimated_value: row.get(5)?,
        estimated_close_time: row.get(6)?,
        signals: from_json_list(&signals),
        actions: from_json_list(&actions),
        next_steps: from_json_list(&next_steps),
        is_active: is_active != 0,
        is_resolved: is_resolved != 0,
        resolved_at: parse_optional_datetime(&resolved_at),
        resolved_by: row.get(13).ok(),
        notes: row.get(14).ok(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const KNOWLEDGE_COLUMNS: &str = "id, title, content, category, tags, is_active, created_at, updated_at";

fn row_to_knowledge(row: &libsql::Row) -> Result<KnowledgeEntry, libsql::Error> {
    let tags: String = row.get(4)?;
    let is_active: i64 = row.get(5)?;
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;
    Ok(KnowledgeEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        tags: from_json_list(&tags),
        is_active: is_active != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const LEARNING_COLUMNS: &str = "id, customer_email, question, category, language, keywords, context, priority, status, answer, resolved_at, created_at, updated_at";

fn row_to_learning(row: &libsql::Row) -> Result<LearningEntry, libsql::Error> {
    let keywords: String = row.get(5)?;
    let priority_str: String = row.get(7)?;
    let status_str: String = row.get(8)?;
    let resolved_at: Option<String> = row.get(10).ok();
    let created_str: String = row.get(11)?;
    let updated_str: String = row.get(12)?;
    Ok(LearningEntry {
        id: row.get(0)?,
        customer_email: row.get(1)?,
        question: row.get(2)?,
        category: row.get(3)?,
        language: row.get(4)?,
        keywords: from_json_list(&keywords),
        context: row.get(6).ok(),
        priority: LearningPriority::parse(&priority_str),
        status: LearningStatus::parse(&status_str).unwrap_or(LearningStatus::Pending),
        answer: row.get(9).ok(),
        resolved_at: parse_optional_datetime(&resolved_at),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Emails ──────────────────────────────────────────────────────

    async fn insert_email(&self, email: &NewInboundEmail) -> Result<InboundEmail, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO emails (id, message_id, sender, recipient, subject, body,
                received_at, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'processing', ?8, ?8)",
            params![
                id.clone(),
                email.message_id.clone(),
                email.from.clone(),
                email.to.clone(),
                email.subject.clone(),
                email.body.clone(),
                email.received_at.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| insert_error("insert_email", e))?;

        debug!(id = %id, message_id = %email.message_id, "Email inserted into DB");
        Ok(InboundEmail {
            id,
            message_id: email.message_id.clone(),
            from: email.from.clone(),
            to: email.to.clone(),
            subject: email.subject.clone(),
            body: email.body.clone(),
            received_at: email.received_at,
            status: EmailStatus::Processing,
            response: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_email(&self, id: &str) -> Result<Option<InboundEmail>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_email(&row).map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_email: {e}"))),
        }
    }

    async fn get_email_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<InboundEmail>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_email_by_message_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_email(&row).map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "get_email_by_message_id: {e}"
            ))),
        }
    }

    async fn claim_pending_email(&self, id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE emails SET status = 'processing', updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("claim_pending_email: {e}")))?;
        Ok(count == 1)
    }

    async fn discard_conversation(&self, email_id: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        for sql in [
            "DELETE FROM purchase_alerts WHERE conversation_id IN
                (SELECT id FROM conversations WHERE email_id = ?1)",
            "DELETE FROM conversation_messages WHERE conversation_id IN
                (SELECT id FROM conversations WHERE email_id = ?1)",
            "DELETE FROM conversations WHERE email_id = ?1",
        ] {
            conn.execute(sql, params![email_id])
                .await
                .map_err(|e| DatabaseError::Query(format!("discard_conversation: {e}")))?;
        }
        debug!(email_id, "Discarded partial conversation");
        Ok(())
    }

    async fn update_email_status(
        &self,
        id: &str,
        status: EmailStatus,
    ) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE emails SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_email_status: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "email".into(),
                id: id.into(),
            });
        }
        Ok(())
    }

    async fn set_email_response(
        &self,
        id: &str,
        response: &str,
        status: EmailStatus,
    ) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE emails SET response = ?2, status = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, response, status.as_str(), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_email_response: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "email".into(),
                id: id.into(),
            });
        }
        Ok(())
    }

    async fn list_emails(
        &self,
        query: &EmailQuery,
    ) -> Result<(Vec<InboundEmail>, u64), DatabaseError> {
        let conn = self.conn();
        let status = opt_text(query.status.as_ref().map(|s| s.as_str()));
        let pattern = opt_text(query.search.as_deref().map(|s| format!("%{s}%")).as_deref());
        let filter = "(?1 IS NULL OR status = ?1) \
                      AND (?2 IS NULL OR subject LIKE ?2 COLLATE NOCASE \
                           OR sender LIKE ?2 COLLATE NOCASE OR body LIKE ?2 COLLATE NOCASE)";

        let rows = conn
            .query(
                &format!("SELECT COUNT(*) FROM emails WHERE {filter}"),
                params![status.clone(), pattern.clone()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_emails count: {e}")))?;
        let total = scalar_count(rows, "list_emails count").await?;

        let limit = query.limit.clamp(1, 100);
        let offset = (query.page.max(1) - 1).saturating_mul(limit);
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EMAIL_COLUMNS} FROM emails WHERE {filter} \
                     ORDER BY received_at DESC LIMIT ?3 OFFSET ?4"
                ),
                params![status, pattern, limit, offset],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_emails: {e}")))?;

        let mut emails = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_email(&row) {
                Ok(email) => emails.push(email),
                Err(e) => warn!("Skipping email row: {e}"),
            }
        }
        Ok((emails, total))
    }

    async fn email_stats(&self) -> Result<EmailStats, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT status, COUNT(*) FROM emails GROUP BY status", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("email_stats: {e}")))?;

        let mut stats = EmailStats::default();
        while let Ok(Some(row)) = rows.next().await {
            let status: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("email_stats: {e}")))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("email_stats: {e}")))?;
            let count = count.max(0) as u64;
            stats.total += count;
            match EmailStatus::parse(&status) {
                Some(EmailStatus::Pending) => stats.pending += count,
                Some(EmailStatus::Processing) => stats.processing += count,
                Some(EmailStatus::Responded) => stats.responded += count,
                Some(EmailStatus::Escalated) => stats.escalated += count,
                Some(EmailStatus::SendError) => stats.send_error += count,
                None => {}
            }
        }
        Ok(stats)
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn insert_conversation(&self, c: &Conversation) -> Result<(), DatabaseError> {
        let reasons = to_json_list(&c.escalation_reasons)?;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO conversations ({CONVERSATION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    c.id.clone(),
                    c.email_id.clone(),
                    c.client_email.clone(),
                    c.client_id.clone(),
                    c.language.clone(),
                    c.sentiment.clone(),
                    c.priority.as_str(),
                    c.purchase_probability,
                    i64::from(c.escalated),
                    reasons,
                    c.topic.clone(),
                    c.summary.clone(),
                    c.created_at.to_rfc3339(),
                    c.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| insert_error("insert_conversation", e))?;
        Ok(())
    }

    async fn update_conversation(&self, c: &Conversation) -> Result<(), DatabaseError> {
        let reasons = to_json_list(&c.escalation_reasons)?;
        let count = self
            .conn()
            .execute(
                "UPDATE conversations SET language = ?2, sentiment = ?3, priority = ?4,
                    purchase_probability = ?5, escalated = ?6, escalation_reasons = ?7,
                    topic = ?8, summary = ?9, updated_at = ?10
                 WHERE id = ?1",
                params![
                    c.id.clone(),
                    c.language.clone(),
                    c.sentiment.clone(),
                    c.priority.as_str(),
                    c.purchase_probability,
                    i64::from(c.escalated),
                    reasons,
                    c.topic.clone(),
                    c.summary.clone(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_conversation: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "conversation".into(),
                id: c.id.clone(),
            });
        }
        Ok(())
    }

    async fn get_conversation_by_email(
        &self,
        email_id: &str,
    ) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE email_id = ?1"),
                params![email_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_conversation(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "get_conversation_by_email: {e}"
            ))),
        }
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        sender: MessageSender,
        content: &str,
    ) -> Result<ConversationMessage, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.conn()
            .execute(
                "INSERT INTO conversation_messages (id, conversation_id, seq, sender, content, created_at)
                 SELECT ?1, ?2, COALESCE(MAX(seq), 0) + 1, ?3, ?4, ?5
                 FROM conversation_messages WHERE conversation_id = ?2",
                params![id.clone(), conversation_id, sender.as_str(), content, now.to_rfc3339()],
            )
            .await
            .map_err(|e| insert_error("append_message", e))?;

        Ok(ConversationMessage {
            id,
            conversation_id: conversation_id.to_string(),
            sender,
            content: content.to_string(),
            timestamp: now,
        })
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConversationMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, conversation_id, sender, content, created_at
                 FROM conversation_messages WHERE conversation_id = ?1 ORDER BY seq ASC",
                params![conversation_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_message(&row) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!("Skipping message row: {e}"),
            }
        }
        Ok(messages)
    }

    async fn lead_stats(&self, since: DateTime<Utc>) -> Result<LeadStats, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT
                    COALESCE(SUM(CASE WHEN purchase_probability >= 0.7 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN purchase_probability >= 0.4 AND purchase_probability < 0.7 THEN 1 ELSE 0 END), 0),
                    COALESCE(AVG(purchase_probability), 0.0)
                 FROM conversations WHERE created_at >= ?1",
                params![since.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("lead_stats: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let high: i64 = row.get(0).unwrap_or(0);
                let medium: i64 = row.get(1).unwrap_or(0);
                let avg: f64 = row.get(2).unwrap_or(0.0);
                Ok(LeadStats {
                    high_value: high.max(0) as u64,
                    medium_value: medium.max(0) as u64,
                    average_probability: avg,
                })
            }
            Ok(None) => Ok(LeadStats::default()),
            Err(e) => Err(DatabaseError::Query(format!("lead_stats: {e}"))),
        }
    }

    // ── Clients ─────────────────────────────────────────────────────

    async fn get_client_profile(
        &self,
        email: &str,
    ) -> Result<Option<ClientProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM client_profiles WHERE email = ?1"),
                params![email.to_lowercase()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_client_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_profile(&row).map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_client_profile: {e}"))),
        }
    }

    async fn get_or_create_client_profile(
        &self,
        email: &str,
    ) -> Result<ClientProfile, DatabaseError> {
        let fresh = ClientProfile::new(email);
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO client_profiles (id, email, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![fresh.id.clone(), fresh.email.clone(), fresh.created_at.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_or_create_client_profile: {e}")))?;

        if inserted > 0 {
            info!(email = %fresh.email, "Created client profile");
        }

        self.get_client_profile(&fresh.email)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "client_profile".into(),
                id: fresh.email.clone(),
            })
    }

    async fn update_client_profile(&self, p: &ClientProfile) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE client_profiles SET loyalty_score = ?2, value_score = ?3,
                    engagement_score = ?4, total_booking_value = ?5, preferred_language = ?6,
                    budget_range = ?7, travel_style = ?8, interaction_count = ?9, updated_at = ?10
                 WHERE id = ?1",
                params![
                    p.id.clone(),
                    p.loyalty_score,
                    p.value_score,
                    p.engagement_score,
                    p.total_booking_value,
                    opt_text(p.preferred_language.as_deref()),
                    opt_text(p.budget_range.as_deref()),
                    opt_text(p.travel_style.as_deref()),
                    p.interaction_count,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_client_profile: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "client_profile".into(),
                id: p.id.clone(),
            });
        }
        Ok(())
    }

    // ── Purchase alerts ─────────────────────────────────────────────

    async fn insert_alert(&self, a: &PurchaseAlert) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO purchase_alerts ({ALERT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    a.id.clone(),
                    a.conversation_id.clone(),
                    a.client_email.clone(),
                    a.priority.as_str(),
                    a.readiness_score,
                    a.estimated_value,
                    a.estimated_close_time.clone(),
                    to_json_list(&a.signals)?,
                    to_json_list(&a.actions)?,
                    to_json_list(&a.next_steps)?,
                    i64::from(a.is_active),
                    i64::from(a.is_resolved),
                    opt_datetime(a.resolved_at),
                    opt_text(a.resolved_by.as_deref()),
                    opt_text(a.notes.as_deref()),
                    a.created_at.to_rfc3339(),
                    a.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| insert_error("insert_alert", e))?;
        Ok(())
    }

    async fn get_alert(&self, id: &str) -> Result<Option<PurchaseAlert>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ALERT_COLUMNS} FROM purchase_alerts WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_alert: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_alert(&row).map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_alert: {e}"))),
        }
    }

    async fn update_alert(&self, a: &PurchaseAlert) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE purchase_alerts SET is_active = ?2, is_resolved = ?3, resolved_at = ?4,
                    resolved_by = ?5, notes = ?6, priority = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    a.id.clone(),
                    i64::from(a.is_active),
                    i64::from(a.is_resolved),
                    opt_datetime(a.resolved_at),
                    opt_text(a.resolved_by.as_deref()),
                    opt_text(a.notes.as_deref()),
                    a.priority.as_str(),
                    a.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_alert: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "purchase_alert".into(),
                id: a.id.clone(),
            });
        }
        Ok(())
    }

    async fn list_alerts(&self, filter: AlertFilter) -> Result<Vec<PurchaseAlert>, DatabaseError> {
        let clause = match filter {
            AlertFilter::Active => "is_active = 1 AND is_resolved = 0",
            AlertFilter::Urgent => "is_active = 1 AND is_resolved = 0 AND priority = 'URGENT'",
            AlertFilter::Resolved => "is_resolved = 1",
            AlertFilter::All => "1 = 1",
        };
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ALERT_COLUMNS} FROM purchase_alerts WHERE {clause} ORDER BY created_at DESC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_alerts: {e}")))?;

        let mut alerts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_alert(&row) {
                Ok(alert) => alerts.push(alert),
                Err(e) => warn!("Skipping alert row: {e}"),
            }
        }
        Ok(alerts)
    }

    // ── Knowledge base ──────────────────────────────────────────────

    async fn insert_knowledge(&self, k: &KnowledgeEntry) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO knowledge_entries ({KNOWLEDGE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    k.id.clone(),
                    k.title.clone(),
                    k.content.clone(),
                    k.category.clone(),
                    to_json_list(&k.tags)?,
                    i64::from(k.is_active),
                    k.created_at.to_rfc3339(),
                    k.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| insert_error("insert_knowledge", e))?;
        Ok(())
    }

    async fn update_knowledge(&self, k: &KnowledgeEntry) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE knowledge_entries SET title = ?2, content = ?3, category = ?4, tags = ?5,
                    is_active = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    k.id.clone(),
                    k.title.clone(),
                    k.content.clone(),
                    k.category.clone(),
                    to_json_list(&k.tags)?,
                    i64::from(k.is_active),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_knowledge: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "knowledge_entry".into(),
                id: k.id.clone(),
            });
        }
        Ok(())
    }

    async fn delete_knowledge(&self, id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM knowledge_entries WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_knowledge: {e}")))?;
        Ok(count > 0)
    }

    async fn get_knowledge(&self, id: &str) -> Result<Option<KnowledgeEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_entries WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_knowledge: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_knowledge(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_knowledge: {e}"))),
        }
    }

    async fn list_knowledge(
        &self,
        category: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<KnowledgeEntry>, DatabaseError> {
        let pattern = search.map(|s| format!("%{s}%"));
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_entries
                     WHERE is_active = 1
                       AND (?1 IS NULL OR category = ?1)
                       AND (?2 IS NULL OR title LIKE ?2 COLLATE NOCASE
                            OR content LIKE ?2 COLLATE NOCASE OR tags LIKE ?2 COLLATE NOCASE)
                     ORDER BY updated_at DESC"
                ),
                params![opt_text(category), opt_text(pattern.as_deref())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_knowledge: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_knowledge(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping knowledge row: {e}"),
            }
        }
        Ok(entries)
    }

    // ── Learning queue ──────────────────────────────────────────────

    async fn insert_learning(&self, l: &LearningEntry) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO learning_queue ({LEARNING_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    l.id.clone(),
                    l.customer_email.clone(),
                    l.question.clone(),
                    l.category.clone(),
                    l.language.clone(),
                    to_json_list(&l.keywords)?,
                    opt_text(l.context.as_deref()),
                    l.priority.as_str(),
                    l.status.as_str(),
                    opt_text(l.answer.as_deref()),
                    opt_datetime(l.resolved_at),
                    l.created_at.to_rfc3339(),
                    l.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| insert_error("insert_learning", e))?;
        Ok(())
    }

    async fn get_learning(&self, id: &str) -> Result<Option<LearningEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEARNING_COLUMNS} FROM learning_queue WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_learning: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_learning(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_learning: {e}"))),
        }
    }

    async fn update_learning(&self, l: &LearningEntry) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE learning_queue SET status = ?2, answer = ?3, resolved_at = ?4,
                    priority = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    l.id.clone(),
                    l.status.as_str(),
                    opt_text(l.answer.as_deref()),
                    opt_datetime(l.resolved_at),
                    l.priority.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_learning: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "learning_entry".into(),
                id: l.id.clone(),
            });
        }
        Ok(())
    }

    async fn list_learning(
        &self,
        status: LearningStatus,
        limit: u32,
    ) -> Result<Vec<LearningEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LEARNING_COLUMNS} FROM learning_queue WHERE status = ?1
                     ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
                              created_at ASC
                     LIMIT ?2"
                ),
                params![status.as_str(), limit],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_learning: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_learning(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping learning row: {e}"),
            }
        }
        Ok(entries)
    }

    async fn learning_counts(&self) -> Result<LearningCounts, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT status, COUNT(*) FROM learning_queue GROUP BY status", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("learning_counts: {e}")))?;

        let mut counts = LearningCounts::default();
        while let Ok(Some(row)) = rows.next().await {
            let status: String = row.get(0).unwrap_or_default();
            let count: i64 = row.get(1).unwrap_or(0);
            let count = count.max(0) as u64;
            match LearningStatus::parse(&status) {
                Some(LearningStatus::Pending) => counts.pending += count,
                Some(LearningStatus::Resolved) => counts.resolved += count,
                Some(LearningStatus::Ignored) => counts.ignored += count,
                None => {}
            }
        }
        Ok(counts)
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_settings(&self) -> Result<Option<StoredSettings>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT data, signature, auto_reply, updated_at FROM settings WHERE id = 1",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_settings: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let data: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_settings: {e}")))?;
                let auto_reply: i64 = row.get(2).unwrap_or(1);
                let updated_str: String = row.get(3).unwrap_or_default();
                let data = serde_json::from_str(&data)
                    .map_err(|e| DatabaseError::Serialization(format!("settings blob: {e}")))?;
                Ok(Some(StoredSettings {
                    data,
                    signature: row.get(1).ok(),
                    auto_reply: auto_reply != 0,
                    updated_at: parse_datetime(&updated_str),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_settings: {e}"))),
        }
    }

    async fn save_settings(&self, s: &StoredSettings) -> Result<(), DatabaseError> {
        let data = serde_json::to_string(&s.data)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO settings (id, data, signature, auto_reply, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data,
                    signature = excluded.signature, auto_reply = excluded.auto_reply,
                    updated_at = excluded.updated_at",
                params![
                    data,
                    opt_text(s.signature.as_deref()),
                    i64::from(s.auto_reply),
                    s.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_settings: {e}")))?;
        Ok(())
    }
}
