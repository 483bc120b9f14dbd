//! Purchase alert listing and operator actions.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::{ApiError, ApiJson, ApiResult, AppState};
use crate::store::models::{AlertAction, AlertFilter, AlertState, Priority, PurchaseAlert};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/purchase-alerts", get(list_alerts).post(manage_alert))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    status: Option<String>,
}

/// Counts over the open (active) alerts, plus resolved.
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub urgent: usize,
    pub high: usize,
    pub medium: usize,
    pub resolved: usize,
    pub total_value: f64,
    pub average_score: f64,
}

impl AlertStats {
    pub fn from_alerts(alerts: &[PurchaseAlert]) -> Self {
        let mut stats = Self {
            total: alerts.len(),
            ..Self::default()
        };
        let mut score_sum = 0.0;
        for alert in alerts {
            match alert.state() {
                AlertState::Resolved => stats.resolved += 1,
                AlertState::Snoozed => {}
                AlertState::Active => {
                    stats.active += 1;
                    stats.total_value += alert.estimated_value;
                    score_sum += alert.readiness_score;
                    match alert.priority {
                        Priority::Urgent => stats.urgent += 1,
                        Priority::High => stats.high += 1,
                        Priority::Medium => stats.medium += 1,
                        Priority::Low => {}
                    }
                }
            }
        }
        if stats.active > 0 {
            stats.average_score = score_sum / stats.active as f64;
        }
        stats
    }
}

/// GET /api/purchase-alerts?status=active|urgent|resolved|all
async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    let filter = match params.status.as_deref() {
        None | Some("") => AlertFilter::Active,
        Some(raw) => AlertFilter::parse(raw)
            .ok_or_else(|| ApiError::bad_request(format!("unknown status: {raw}")))?,
    };
    let alerts = state.store.list_alerts(filter).await?;
    let stats = AlertStats::from_alerts(&state.store.list_alerts(AlertFilter::All).await?);
    Ok(Json(json!({ "success": true, "alerts": alerts, "stats": stats })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManageRequest {
    action: String,
    alert_id: String,
    #[serde(default)]
    notes: Option<String>,
    /// Value of the sale closed with a `resolve`; credited to the client.
    #[serde(default)]
    booking_value: Option<f64>,
}

/// POST /api/purchase-alerts {action, alertId, notes, bookingValue}
async fn manage_alert(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ManageRequest>,
) -> ApiResult<Json<Value>> {
    let action = AlertAction::parse(&req.action)
        .ok_or_else(|| ApiError::bad_request(format!("unknown action: {}", req.action)))?;
    let mut alert = state
        .store
        .get_alert(&req.alert_id)
        .await?
        .ok_or_else(|| ApiError::not_found("alert", &req.alert_id))?;

    if let Some(value) = req.booking_value {
        if action != AlertAction::Resolve {
            return Err(ApiError::bad_request("bookingValue is only accepted with resolve"));
        }
        if !value.is_finite() || value < 0.0 {
            return Err(ApiError::bad_request(format!("invalid bookingValue: {value}")));
        }
    }

    let notes = req.notes.filter(|n| !n.trim().is_empty());
    alert.apply(action, notes)?;
    state.store.update_alert(&alert).await?;
    info!(alert_id = %alert.id, ?action, state = ?alert.state(), "Alert updated");

    if let Some(value) = req.booking_value {
        let mut profile = state
            .store
            .get_or_create_client_profile(&alert.client_email)
            .await?;
        profile.record_booking(value);
        state.store.update_client_profile(&profile).await?;
        info!(
            client = %profile.email,
            value,
            total = profile.total_booking_value,
            "Booking recorded"
        );
    }

    Ok(Json(json!({ "success": true, "alert": alert })))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn alert(priority: Priority, value: f64, score: f64) -> PurchaseAlert {
        let now = Utc::now();
        PurchaseAlert {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: "c1".into(),
            client_email: "a@b.com".into(),
            priority,
            readiness_score: score,
            estimated_value: value,
            estimated_close_time: "24 hours".into(),
            signals: Vec::new(),
            actions: Vec::new(),
            next_steps: Vec::new(),
            is_active: true,
            is_resolved: false,
            resolved_at: None,
            resolved_by: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stats_count_open_alerts_only() {
        let mut resolved = alert(Priority::Urgent, 99_000.0, 0.99);
        resolved.is_resolved = true;
        resolved.is_active = false;
        let mut snoozed = alert(Priority::High, 5_000.0, 0.85);
        snoozed.is_active = false;

        let stats = AlertStats::from_alerts(&[
            alert(Priority::Urgent, 10_000.0, 0.9),
            alert(Priority::High, 20_000.0, 0.82),
            snoozed,
            resolved,
        ]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.active, 2);
        assert_eq!((stats.urgent, stats.high, stats.medium), (1, 1, 0));
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.total_value, 30_000.0);
        assert!((stats.average_score - 0.86).abs() < 1e-9);
    }

    #[test]
    fn empty_stats_have_zero_average() {
        assert_eq!(AlertStats::from_alerts(&[]), AlertStats::default());
    }
}
