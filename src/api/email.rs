//! Email intake and inbox endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ApiError, ApiJson, ApiResult, AppState};
use crate::pipeline::{FetchSummary, ProcessOutcome, ProcessRequest};
use crate::store::models::{EmailQuery, EmailStats, EmailStatus, InboundEmail, MessageSender};

const DUPLICATE_MESSAGE: &str = "Email już przetworzony";
const MAX_PAGE_SIZE: u32 = 100;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/email/fetch", post(fetch))
        .route("/api/email/process", post(process))
        .route("/api/email/webhook", post(webhook))
        .route("/api/emails", get(list_emails))
        .route("/api/emails/{id}/conversation", get(conversation))
        .route("/api/email/test-imap", get(test_imap))
        .route("/api/email/test-smtp", get(test_smtp))
}

/// GET /api/email/test-imap
async fn test_imap(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let inbox = state.pipeline.check_mailbox().await?;
    Ok(Json(json!({
        "success": true,
        "message": "IMAP connection works",
        "inbox": inbox,
        "timestamp": Utc::now(),
    })))
}

/// GET /api/email/test-smtp
async fn test_smtp(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.pipeline.check_relay().await?;
    Ok(Json(json!({
        "success": true,
        "message": "SMTP connection works",
        "timestamp": Utc::now(),
    })))
}

/// POST /api/email/fetch
async fn fetch(State(state): State<AppState>) -> ApiResult<Json<FetchSummary>> {
    Ok(Json(state.pipeline.fetch_and_process().await?))
}

/// POST /api/email/process
async fn process(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ProcessRequest>,
) -> ApiResult<Json<Value>> {
    let body = match state.pipeline.process(request).await? {
        ProcessOutcome::Duplicate { email_id } => {
            json!({ "message": DUPLICATE_MESSAGE, "emailId": email_id })
        }
        ProcessOutcome::Processed(report) => json!(report),
    };
    Ok(Json(body))
}

/// POST /api/email/webhook
///
/// Push trigger from the mail provider. The payload is ignored; the
/// mailbox is fetched the same way as a manual fetch.
async fn webhook(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let summary = state.pipeline.fetch_and_process().await?;
    Ok(Json(json!({ "success": true, "processed": summary.processed })))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    search: Option<String>,
    status: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: u32,
    limit: u32,
    total: u64,
    pages: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailList {
    emails: Vec<InboundEmail>,
    pagination: Pagination,
    stats: EmailStats,
}

impl ListParams {
    fn into_query(self) -> ApiResult<EmailQuery> {
        let status = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None | Some("all") => None,
            Some(raw) => Some(
                EmailStatus::parse(raw)
                    .ok_or_else(|| ApiError::bad_request(format!("unknown status: {raw}")))?,
            ),
        };
        let defaults = EmailQuery::default();
        Ok(EmailQuery {
            search: self.search.filter(|s| !s.trim().is_empty()),
            status,
            page: self.page.unwrap_or(defaults.page).max(1),
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
        })
    }
}

/// GET /api/emails
async fn list_emails(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<EmailList>> {
    let query = params.into_query()?;
    let (emails, total) = state.store.list_emails(&query).await?;
    let stats = state.store.email_stats().await?;
    let limit = u64::from(query.limit);
    Ok(Json(EmailList {
        emails,
        pagination: Pagination {
            page: query.page,
            limit: query.limit,
            total,
            pages: total.div_ceil(limit),
        },
        stats,
    }))
}

/// GET /api/emails/{id}/conversation
async fn conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let email = state
        .store
        .get_email(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("email", &id))?;
    let conversation = state.store.get_conversation_by_email(&id).await?;
    let messages = match &conversation {
        Some(c) => state.store.list_messages(&c.id).await?,
        None => Vec::new(),
    };
    let from_client = messages
        .iter()
        .filter(|m| m.sender == MessageSender::Client)
        .count();

    Ok(Json(json!({
        "success": true,
        "email": email,
        "conversation": conversation,
        "analytics": {
            "messageCount": messages.len(),
            "clientMessages": from_client,
            "agentMessages": messages.len() - from_client,
        },
        "messages": messages,
    })))
}
