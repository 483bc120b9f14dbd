//! Operator notification fan-out.
//!
//! Each sink is independently fallible. [`Notifier::notify`] delivers to
//! every sink that accepts the notification kind, concurrently and with a
//! per-sink timeout, and aggregates the results into a
//! [`NotificationOutcome`]. Nothing here returns an error to the caller.

pub mod email;
pub mod sms;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::NotifyError;
use crate::store::models::Priority;

pub use email::EmailSink;
pub use sms::SmsSink;
pub use webhook::SlackWebhookSink;

/// What the operators are being told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Escalation,
    PurchaseReady,
}

/// Readiness details carried by purchase-ready notifications.
#[derive(Debug, Clone, Default)]
pub struct ReadinessSummary {
    pub score: f64,
    pub potential_value: f64,
    pub estimated_close_time: String,
    pub signals: Vec<String>,
    pub actions: Vec<String>,
}

/// Structured summary handed to every sink.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub client: String,
    pub email_id: String,
    pub email_subject: String,
    pub priority: Priority,
    pub purchase_probability: f64,
    pub sentiment: String,
    pub reasons: Vec<String>,
    pub readiness: Option<ReadinessSummary>,
}

impl Notification {
    pub fn subject(&self) -> String {
        match self.kind {
            NotificationKind::Escalation => {
                format!("URGENT: Email escalation required - {}", self.client)
            }
            NotificationKind::PurchaseReady => format!(
                "Client ready to purchase - {} ({}%)",
                self.client,
                percent(self.readiness.as_ref().map_or(0.0, |r| r.score))
            ),
        }
    }

    /// Plain-text body shared by the email and SMS sinks.
    pub fn text_body(&self) -> String {
        let mut body = match self.kind {
            NotificationKind::Escalation => "ESCALATION ALERT\n\n".to_string(),
            NotificationKind::PurchaseReady => "PURCHASE READY ALERT\n\n".to_string(),
        };
        body.push_str(&format!(
            "Client: {}\nSubject: {}\nPriority: {}\nPurchase Probability: {}%\nSentiment: {}\n",
            self.client,
            self.email_subject,
            self.priority.as_str(),
            percent(self.purchase_probability),
            self.sentiment,
        ));

        if !self.reasons.is_empty() {
            body.push_str("\nEscalation reasons:\n");
            for reason in &self.reasons {
                body.push_str(&format!("- {reason}\n"));
            }
        }

        if let Some(r) = &self.readiness {
            body.push_str(&format!(
                "\nReadiness: {}%\nEstimated value: {:.0} AED\nExpected close: {}\n",
                percent(r.score),
                r.potential_value,
                r.estimated_close_time,
            ));
            if !r.signals.is_empty() {
                body.push_str("\nSignals:\n");
                for s in &r.signals {
                    body.push_str(&format!("- {s}\n"));
                }
            }
            if !r.actions.is_empty() {
                body.push_str("\nRecommended actions:\n");
                for a in &r.actions {
                    body.push_str(&format!("- {a}\n"));
                }
            }
        }

        body.push_str(&format!("\nEmail id: {}\n", self.email_id));
        body
    }
}

/// Score in [0, 1] as a whole percentage.
pub(crate) fn percent(score: f64) -> i64 {
    (score * 100.0).round() as i64
}

/// A single delivery target.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this sink wants notifications of `kind`.
    fn accepts(&self, kind: NotificationKind) -> bool {
        let _ = kind;
        true
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// A failed delivery.
#[derive(Debug, Clone, Serialize)]
pub struct SinkFailure {
    pub sink: String,
    pub error: String,
}

/// Aggregated result of one fan-out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationOutcome {
    pub delivered: Vec<String>,
    pub failed: Vec<SinkFailure>,
}

impl NotificationOutcome {
    pub fn merge(&mut self, other: NotificationOutcome) {
        self.delivered.extend(other.delivered);
        self.failed.extend(other.failed);
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty()
    }
}

/// Fans notifications out to every configured sink.
#[derive(Clone)]
pub struct Notifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>, timeout: Duration) -> Self {
        Self { sinks, timeout }
    }

    /// A notifier with no sinks. Every fan-out is a no-op.
    pub fn disabled() -> Self {
        Self::new(Vec::new(), Duration::from_secs(1))
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    pub async fn notify(&self, notification: &Notification) -> NotificationOutcome {
        let targets: Vec<_> = self
            .sinks
            .iter()
            .filter(|s| s.accepts(notification.kind))
            .collect();

        let deliveries = targets.iter().map(|sink| async move {
            let name = sink.name().to_string();
            let result = match tokio::time::timeout(self.timeout, sink.deliver(notification)).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout {
                    sink: name.clone(),
                    timeout: self.timeout,
                }),
            };
            (name, result)
        });

        let mut outcome = NotificationOutcome::default();
        for (name, result) in futures::future::join_all(deliveries).await {
            match result {
                Ok(()) => {
                    tracing::info!(sink = %name, kind = ?notification.kind, "Notification delivered");
                    outcome.delivered.push(name);
                }
                Err(e) => {
                    tracing::warn!(sink = %name, kind = ?notification.kind, "Notification failed: {e}");
                    outcome.failed.push(SinkFailure {
                        sink: name,
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }
}
