//! Agent settings blob.
//!
//! Stored as one JSON document; `email.signature` and `email.autoReply`
//! are mirrored into their own columns on every write.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use super::{ApiError, ApiJson, ApiResult, AppState};
use crate::store::models::StoredSettings;

/// Top-level sections a full settings document must carry.
pub const REQUIRED_SECTIONS: &[&str] = &[
    "ai",
    "email",
    "purchaseAlerts",
    "notifications",
    "languages",
    "knowledgeBase",
    "performance",
];

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/settings", get(get_settings).post(save).put(update_key))
}

/// Settings served before anything is saved.
pub fn default_settings() -> Value {
    json!({
        "ai": {
            "temperature": 0.7,
            "maxTokens": 2000,
            "timeout": 30000,
            "fallbackEnabled": true,
            "languageDetection": true,
            "sentimentAnalysis": true,
            "purchasePrediction": true
        },
        "email": {
            "autoReply": false,
            "processingDelay": 0,
            "maxEmailsPerHour": 100,
            "escalationThreshold": 0.8,
            "responseTemplate": "professional",
            "signatureEnabled": true,
            "signature": "Dubai Travel Agent\nYour Dream Dubai Experience Awaits!"
        },
        "purchaseAlerts": {
            "enabled": true,
            "readinessThreshold": 0.8,
            "highValueThreshold": 10000,
            "urgentResponseTime": 2,
            "emailNotifications": true,
            "slackNotifications": false,
            "smsNotifications": false
        },
        "notifications": {
            "emailEnabled": true,
            "slackEnabled": false,
            "smsEnabled": false
        },
        "languages": {
            "supported": ["pl", "en", "fr", "de", "es", "it", "ru"],
            "defaultLanguage": "pl",
            "autoDetection": true,
            "fallbackLanguage": "en"
        },
        "knowledgeBase": {
            "autoUpdate": true,
            "searchEnabled": true,
            "maxResults": 10,
            "relevanceThreshold": 0.7,
            "categoriesEnabled": true
        },
        "performance": {
            "cacheEnabled": true,
            "cacheTTL": 3600,
            "rateLimiting": true,
            "maxRequestsPerMinute": 60,
            "timeoutSeconds": 30
        }
    })
}

/// Defaults overlaid with the stored document, section by section, with
/// the mirrored columns taking precedence for signature and auto-reply.
pub fn effective_settings(stored: Option<&StoredSettings>) -> Value {
    let mut merged = default_settings();
    let Some(stored) = stored else {
        return merged;
    };
    if let (Some(target), Some(source)) = (merged.as_object_mut(), stored.data.as_object()) {
        for (section, value) in source {
            match (target.get_mut(section), value) {
                (Some(Value::Object(base)), Value::Object(overrides)) => {
                    for (k, v) in overrides {
                        base.insert(k.clone(), v.clone());
                    }
                }
                _ => {
                    target.insert(section.clone(), value.clone());
                }
            }
        }
    }
    if let Some(email) = merged.get_mut("email").and_then(Value::as_object_mut) {
        if let Some(signature) = &stored.signature {
            email.insert("signature".into(), json!(signature));
        }
        email.insert("autoReply".into(), json!(stored.auto_reply));
    }
    merged
}

/// Sections that are absent or not objects.
pub fn missing_sections(doc: &Value) -> Vec<&'static str> {
    REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|s| !doc.get(*s).is_some_and(Value::is_object))
        .collect()
}

/// Build the row for `doc`, mirroring the two flattened columns.
fn to_stored(doc: Value) -> StoredSettings {
    let email = doc.get("email");
    let signature = email
        .and_then(|e| e.get("signature"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty());
    let auto_reply = email
        .and_then(|e| e.get("autoReply"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    StoredSettings {
        data: doc,
        signature,
        auto_reply,
        updated_at: Utc::now(),
    }
}

/// GET /api/settings
async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stored = state.store.get_settings().await?;
    Ok(Json(effective_settings(stored.as_ref())))
}

/// POST /api/settings (full document)
async fn save(State(state): State<AppState>, ApiJson(doc): ApiJson<Value>) -> ApiResult<Json<Value>> {
    let missing = missing_sections(&doc);
    if !missing.is_empty() {
        return Err(ApiError::bad_request(format!(
            "Missing required section: {}",
            missing.join(", ")
        ))
        .with_details(json!({ "missing": missing })));
    }
    let stored = to_stored(doc);
    state.store.save_settings(&stored).await?;
    info!(auto_reply = stored.auto_reply, "Settings saved");
    Ok(Json(json!({ "success": true, "message": "Settings saved" })))
}

#[derive(Debug, Deserialize)]
struct KeyUpdate {
    section: String,
    key: String,
    value: Value,
}

/// PUT /api/settings {section, key, value}
async fn update_key(
    State(state): State<AppState>,
    ApiJson(update): ApiJson<KeyUpdate>,
) -> ApiResult<Json<Value>> {
    if !REQUIRED_SECTIONS.contains(&update.section.as_str()) {
        return Err(ApiError::bad_request(format!("unknown section: {}", update.section)));
    }
    if update.key.trim().is_empty() {
        return Err(ApiError::bad_request("missing key"));
    }

    let stored = state.store.get_settings().await?;
    let mut doc = effective_settings(stored.as_ref());
    if let Some(root) = doc.as_object_mut() {
        let section = root
            .entry(update.section.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !section.is_object() {
            *section = Value::Object(Map::new());
        }
        if let Some(section) = section.as_object_mut() {
            section.insert(update.key.clone(), update.value);
        }
    }

    state.store.save_settings(&to_stored(doc)).await?;
    info!(section = %update.section, key = %update.key, "Setting updated");
    Ok(Json(json!({
        "success": true,
        "message": format!("Setting {}.{} updated successfully", update.section, update.key),
    })))
}
