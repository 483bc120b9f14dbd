//! Learning queue: questions the knowledge base could not answer.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{ApiError, ApiJson, ApiResult, AppState};
use crate::store::models::{KnowledgeEntry, LearningEntry, LearningStatus, learning_priority};

const DEFAULT_LIMIT: u32 = 10;
const FAQ_TITLE_CHARS: usize = 50;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/learning", get(list).post(submit).put(resolve))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    #[serde(default)]
    customer_email: String,
    #[serde(default)]
    question: String,
    category: Option<String>,
    language: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    context: Option<String>,
}

/// POST /api/learning
async fn submit(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SubmitRequest>,
) -> ApiResult<Json<Value>> {
    if req.question.trim().is_empty() {
        return Err(ApiError::bad_request("missing required fields")
            .with_details(json!({ "missing": ["question"] })));
    }
    let mut entry = LearningEntry::new(
        req.customer_email.trim(),
        req.question.trim(),
        req.category.as_deref().unwrap_or("unknown"),
        req.language.as_deref().unwrap_or("pl"),
    );
    // Keyword hits also count toward priority.
    let with_keywords = format!("{} {}", entry.question, req.keywords.join(" "));
    entry.priority = learning_priority(&with_keywords);
    entry.keywords = req.keywords;
    entry.context = req.context;

    state.store.insert_learning(&entry).await?;
    info!(id = %entry.id, priority = entry.priority.as_str(), "Question added to learning queue");
    Ok(Json(json!({ "success": true, "learningId": entry.id })))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    status: Option<String>,
    limit: Option<u32>,
}

/// GET /api/learning?status=pending&limit=10
async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    let status = match params.status.as_deref() {
        None | Some("") => LearningStatus::Pending,
        Some(raw) => LearningStatus::parse(raw)
            .ok_or_else(|| ApiError::bad_request(format!("unknown status: {raw}")))?,
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 100);
    let entries = state.store.list_learning(status, limit).await?;
    let stats = state.store.learning_counts().await?;
    Ok(Json(json!({
        "success": true,
        "total": entries.len(),
        "entries": entries,
        "stats": stats,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest {
    learning_id: String,
    answer: Option<String>,
    #[serde(default)]
    add_to_knowledge_base: bool,
    status: Option<String>,
}

/// PUT /api/learning {learningId, answer, addToKnowledgeBase, status?}
async fn resolve(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResolveRequest>,
) -> ApiResult<Json<Value>> {
    let status = match req.status.as_deref() {
        None => LearningStatus::Resolved,
        Some(raw) => LearningStatus::parse(raw)
            .ok_or_else(|| ApiError::bad_request(format!("unknown status: {raw}")))?,
    };
    let mut entry = state
        .store
        .get_learning(&req.learning_id)
        .await?
        .ok_or_else(|| ApiError::not_found("learning entry", &req.learning_id))?;

    let answer = req.answer.filter(|a| !a.trim().is_empty());
    let now = Utc::now();
    entry.status = status;
    entry.answer = answer.clone();
    entry.resolved_at = (status != LearningStatus::Pending).then_some(now);
    entry.updated_at = now;
    state.store.update_learning(&entry).await?;

    let knowledge_id = match answer.filter(|_| req.add_to_knowledge_base) {
        Some(answer) => {
            let faq = faq_entry(&entry, &answer);
            state.store.insert_knowledge(&faq).await?;
            info!(id = %faq.id, title = %faq.title, "Learning answer promoted to knowledge base");
            Some(faq.id)
        }
        None => None,
    };

    Ok(Json(json!({
        "success": true,
        "entry": entry,
        "addedToKnowledge": knowledge_id.is_some(),
        "knowledgeId": knowledge_id,
    })))
}

/// Knowledge entry built from an answered question.
pub fn faq_entry(entry: &LearningEntry, answer: &str) -> KnowledgeEntry {
    let head: String = entry.question.chars().take(FAQ_TITLE_CHARS).collect();
    KnowledgeEntry::new(
        &format!("FAQ: {head}..."),
        answer.trim(),
        &entry.category,
        entry.keywords.clone(),
    )
}
