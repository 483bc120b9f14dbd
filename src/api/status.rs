//! Health, provider status and dashboard counters.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use super::{ApiResult, AppState, ProviderInfo};
use crate::store::models::{AlertFilter, AlertState, Priority};

/// Window for the dashboard lead counts.
const LEAD_WINDOW_DAYS: i64 = 7;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/ai-status", get(ai_status))
        .route("/api/dashboard/stats", get(dashboard_stats))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "travel-assist" }))
}

/// Operator hints for the current provider setup.
pub fn recommendations(providers: &ProviderInfo, mail_enabled: bool) -> Vec<String> {
    let mut out = Vec::new();
    match providers.chain.len() {
        0 => out.push(
            "No AI provider configured; replies use knowledge quotes and rule-based analysis. \
             Set ANTHROPIC_API_KEY or OPENAI_API_KEY."
                .to_string(),
        ),
        1 => out.push("Only one AI provider configured; add a second key for failover.".to_string()),
        _ => {}
    }
    if !mail_enabled {
        out.push("Mailbox not configured; set EMAIL_IMAP_HOST to enable fetching and auto-replies.".to_string());
    }
    out
}

/// GET /api/ai-status
async fn ai_status(State(state): State<AppState>) -> Json<Value> {
    let providers = &state.providers;
    Json(json!({
        "success": true,
        "timestamp": Utc::now(),
        "status": {
            "selection": providers.selection,
            "chain": providers.chain,
            "active": providers.chain.first(),
            "fallbackOnly": providers.chain.is_empty(),
            "mailTransport": state.pipeline.has_transport(),
            "notificationSinks": state.pipeline.notification_sinks(),
        },
        "recommendations": recommendations(providers, state.pipeline.has_transport()),
    }))
}

/// GET /api/dashboard/stats
async fn dashboard_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let emails = state.store.email_stats().await?;
    let leads = state
        .store
        .lead_stats(Utc::now() - Duration::days(LEAD_WINDOW_DAYS))
        .await?;
    let alerts = state.store.list_alerts(AlertFilter::All).await?;
    let open: Vec<_> = alerts
        .iter()
        .filter(|a| a.state() == AlertState::Active)
        .collect();
    let urgent = open.iter().filter(|a| a.priority == Priority::Urgent).count();
    let learning = state.store.learning_counts().await?;

    Ok(Json(json!({
        "success": true,
        "emails": emails,
        "leads": {
            "highValue": leads.high_value,
            "mediumValue": leads.medium_value,
            "windowDays": LEAD_WINDOW_DAYS,
        },
        "averagePurchaseProbability": leads.average_probability,
        "alerts": { "active": open.len(), "urgent": urgent },
        "learning": { "pending": learning.pending },
    })))
}
