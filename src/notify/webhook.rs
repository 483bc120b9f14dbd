//! Slack incoming-webhook sink.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::NotifyError;
use crate::notify::{Notification, NotificationKind, NotificationSink, percent};

const SINK_NAME: &str = "slack";

/// Posts a block-formatted summary to a Slack incoming webhook.
pub struct SlackWebhookSink {
    url: String,
    client: reqwest::Client,
}

impl SlackWebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

/// Slack message payload: a fallback `text` plus section blocks.
fn slack_payload(n: &Notification) -> Value {
    let header = match n.kind {
        NotificationKind::Escalation => ":rotating_light: Email escalation",
        NotificationKind::PurchaseReady => ":moneybag: Client ready to purchase",
    };

    let mut fields = vec![
        json!({"type": "mrkdwn", "text": format!("*Client:*\n{}", n.client)}),
        json!({"type": "mrkdwn", "text": format!("*Priority:*\n{}", n.priority.as_str())}),
        json!({"type": "mrkdwn", "text": format!("*Purchase probability:*\n{}%", percent(n.purchase_probability))}),
        json!({"type": "mrkdwn", "text": format!("*Sentiment:*\n{}", n.sentiment)}),
    ];
    if let Some(r) = &n.readiness {
        fields.push(json!({"type": "mrkdwn", "text": format!("*Readiness:*\n{}%", percent(r.score))}));
        fields.push(json!({"type": "mrkdwn", "text": format!("*Value:*\n{:.0} AED", r.potential_value)}));
    }

    let mut blocks = vec![
        json!({"type": "header", "text": {"type": "plain_text", "text": header}}),
        json!({"type": "section", "fields": fields}),
    ];

    let mut details = Vec::new();
    if !n.reasons.is_empty() {
        details.push(format!("*Reasons:*\n• {}", n.reasons.join("\n• ")));
    }
    if let Some(r) = &n.readiness
        && !r.actions.is_empty()
    {
        details.push(format!("*Actions:*\n• {}", r.actions.join("\n• ")));
    }
    if !details.is_empty() {
        blocks.push(json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": details.join("\n\n")}
        }));
    }

    json!({ "text": n.subject(), "blocks": blocks })
}

#[async_trait]
impl NotificationSink for SlackWebhookSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let failed = |reason: String| NotifyError::DeliveryFailed {
            sink: SINK_NAME.into(),
            reason,
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&slack_payload(notification))
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(failed(format!("webhook returned {status}: {body}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

    use super::*;
    use crate::notify::tests::{escalation, purchase_ready};

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn capture(State(seen): State<Captured>, Json(body): Json<Value>) -> StatusCode {
        seen.lock().unwrap().push(body);
        StatusCode::OK
    }

    async fn spawn_hook(status_ok: bool) -> (String, Captured) {
        let seen: Captured = Arc::default();
        let app = if status_ok {
            Router::new().route("/hook", post(capture)).with_state(seen.clone())
        } else {
            Router::new().route("/hook", post(|| async { StatusCode::BAD_REQUEST }))
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), seen)
    }

    #[test]
    fn payload_includes_reasons_and_readiness() {
        let payload = slack_payload(&purchase_ready());
        assert_eq!(payload["text"], "Client ready to purchase - anna@example.com (93%)");
        let rendered = payload["blocks"].to_string();
        assert!(rendered.contains("15000 AED"));
        assert!(rendered.contains("Call client directly"));
        assert!(rendered.contains("Negative sentiment detected: angry"));
    }

    #[tokio::test]
    async fn posts_to_webhook() {
        let (url, seen) = spawn_hook(true).await;
        SlackWebhookSink::new(url).deliver(&escalation()).await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["text"], "URGENT: Email escalation required - anna@example.com");
    }

    #[tokio::test]
    async fn non_success_status_is_failure() {
        let (url, _) = spawn_hook(false).await;
        let err = SlackWebhookSink::new(url).deliver(&escalation()).await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
