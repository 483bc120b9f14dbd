//! Knowledge base CRUD.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{ApiError, ApiJson, ApiResult, AppState};
use crate::store::models::KnowledgeEntry;

const DEFAULT_CATEGORY: &str = "general";

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/api/knowledge",
        get(list)
            .post(create)
            .put(update)
            .delete(remove),
    )
}

#[derive(Debug, Deserialize)]
struct ListParams {
    category: Option<String>,
    search: Option<String>,
}

/// GET /api/knowledge?category=&search=
async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<KnowledgeEntry>>> {
    let category = params.category.as_deref().filter(|c| !c.is_empty());
    let search = params.search.as_deref().filter(|s| !s.trim().is_empty());
    Ok(Json(state.store.list_knowledge(category, search).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    is_active: Option<bool>,
}

fn require_text(title: &str, content: &str) -> ApiResult<()> {
    let missing: Vec<&str> = [("title", title), ("content", content)]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::bad_request("missing required fields").with_details(json!({ "missing": missing })))
    }
}

/// POST /api/knowledge
async fn create(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateRequest>,
) -> ApiResult<(StatusCode, Json<KnowledgeEntry>)> {
    require_text(&req.title, &req.content)?;
    let category = req.category.filter(|c| !c.trim().is_empty());
    let mut entry = KnowledgeEntry::new(
        req.title.trim(),
        req.content.trim(),
        category.as_deref().unwrap_or(DEFAULT_CATEGORY),
        clean_tags(req.tags),
    );
    entry.is_active = req.is_active.unwrap_or(true);
    state.store.insert_knowledge(&entry).await?;
    info!(id = %entry.id, title = %entry.title, "Knowledge entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    id: String,
    title: Option<String>,
    content: Option<String>,
    category: Option<String>,
    tags: Option<Vec<String>>,
    is_active: Option<bool>,
}

/// PUT /api/knowledge {id, ...fields}
async fn update(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UpdateRequest>,
) -> ApiResult<Json<KnowledgeEntry>> {
    let mut entry = state
        .store
        .get_knowledge(&req.id)
        .await?
        .ok_or_else(|| ApiError::not_found("knowledge entry", &req.id))?;

    if let Some(title) = req.title {
        entry.title = title.trim().to_string();
    }
    if let Some(content) = req.content {
        entry.content = content.trim().to_string();
    }
    if let Some(category) = req.category.filter(|c| !c.trim().is_empty()) {
        entry.category = category;
    }
    if let Some(tags) = req.tags {
        entry.tags = clean_tags(tags);
    }
    if let Some(active) = req.is_active {
        entry.is_active = active;
    }
    require_text(&entry.title, &entry.content)?;
    entry.updated_at = Utc::now();

    state.store.update_knowledge(&entry).await?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    id: Option<String>,
}

/// DELETE /api/knowledge?id=
async fn remove(
    State(state): State<AppState>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Json<Value>> {
    let id = params
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing id"))?;
    if !state.store.delete_knowledge(&id).await? {
        return Err(ApiError::not_found("knowledge entry", &id));
    }
    info!(id = %id, "Knowledge entry deleted");
    Ok(Json(json!({ "success": true })))
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
