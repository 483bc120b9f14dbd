//! Email sink: delivers notifications through the mail transport.

use std::sync::Arc;

use async_trait::async_trait;

use crate::channels::{MailTransport, OutgoingEmail};
use crate::error::NotifyError;
use crate::notify::{Notification, NotificationKind, NotificationSink};

/// Sends one kind of notification to a fixed operator address.
pub struct EmailSink {
    name: String,
    recipient: String,
    kind: NotificationKind,
    transport: Arc<dyn MailTransport>,
}

impl EmailSink {
    pub fn new(
        name: impl Into<String>,
        recipient: impl Into<String>,
        kind: NotificationKind,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            recipient: recipient.into(),
            kind,
            transport,
        }
    }

    /// Escalations for the human agent inbox.
    pub fn human_agent(recipient: impl Into<String>, transport: Arc<dyn MailTransport>) -> Self {
        Self::new("human-agent-email", recipient, NotificationKind::Escalation, transport)
    }

    /// Purchase-ready alerts for the sales team inbox.
    pub fn sales_team(recipient: impl Into<String>, transport: Arc<dyn MailTransport>) -> Self {
        Self::new("sales-team-email", recipient, NotificationKind::PurchaseReady, transport)
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, kind: NotificationKind) -> bool {
        kind == self.kind
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let text = notification.text_body();
        let html = format!(
            "<div style=\"font-family: sans-serif\">{}</div>",
            crate::responder::text_to_html(&text)
        );
        self.transport
            .send(OutgoingEmail {
                to: self.recipient.clone(),
                subject: notification.subject(),
                text,
                html: Some(html),
            })
            .await
            .map(|_| ())
            .map_err(|e| NotifyError::DeliveryFailed {
                sink: self.name.clone(),
                reason: e.to_string(),
            })
    }
}
