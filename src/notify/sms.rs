//! SMS sink for a generic HTTP gateway.
//!
//! Posts `{"to": ..., "message": ...}` as JSON, with a bearer token when
//! one is configured. Messages are truncated to a single SMS-sized text.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::SmsConfig;
use crate::error::NotifyError;
use crate::notify::{Notification, NotificationSink};

const SINK_NAME: &str = "sms";
const MAX_SMS_CHARS: usize = 160;

#[derive(Debug, Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    message: String,
}

pub struct SmsSink {
    gateway_url: String,
    recipient: String,
    api_token: Option<SecretString>,
    client: reqwest::Client,
}

impl SmsSink {
    pub fn new(config: &SmsConfig) -> Self {
        Self {
            gateway_url: config.gateway_url.clone(),
            recipient: config.recipient.clone(),
            api_token: config.api_token.clone(),
            client: reqwest::Client::new(),
        }
    }
}

/// Subject plus priority, cut to one SMS.
fn sms_text(n: &Notification) -> String {
    let full = format!("{} [{}]", n.subject(), n.priority.as_str());
    if full.chars().count() <= MAX_SMS_CHARS {
        return full;
    }
    let mut cut: String = full.chars().take(MAX_SMS_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

#[async_trait]
impl NotificationSink for SmsSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let failed = |reason: String| NotifyError::DeliveryFailed {
            sink: SINK_NAME.into(),
            reason,
        };
        let payload = SmsPayload {
            to: &self.recipient,
            message: sms_text(notification),
        };

        let mut request = self.client.post(&self.gateway_url).json(&payload);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }
        let resp = request.send().await.map_err(|e| failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(failed(format!("gateway returned {}", resp.status())));
        }
        Ok(())
    }
}
