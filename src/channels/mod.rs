//! Mail transport abstraction.
//!
//! The pipeline only sees [`MailTransport`]: fetch a bounded window of
//! unseen messages, mark them read, and send a reply. The IMAP/SMTP
//! implementation lives in [`email`].

pub mod email;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ChannelError;

pub use email::{EmailConfig, ImapSmtpTransport};

/// A message fetched from the mailbox, already decoded to plain text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEmail {
    /// Mailbox-local identifier used for `mark_read`.
    pub uid: String,
    /// `Message-ID` header, or a stable id derived from the uid.
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// An outbound message.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

/// Returned by a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: String,
}

/// Inbox counters read by a connectivity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxStatus {
    pub messages: u64,
    pub unseen: usize,
}

/// Inbound mailbox plus outbound relay.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Transport name for logs and errors.
    fn name(&self) -> &str;

    /// The newest `limit` unseen messages, oldest first. Does not change
    /// their seen flag.
    async fn fetch_unseen(&self, limit: usize) -> Result<Vec<RawEmail>, ChannelError>;

    /// Flag the given uids as seen.
    async fn mark_read(&self, uids: &[String]) -> Result<(), ChannelError>;

    /// Send a message. Transport failures are returned, never swallowed.
    async fn send(&self, email: OutgoingEmail) -> Result<SendReceipt, ChannelError>;

    /// Log in and read the inbox counters. Fetches and flags nothing.
    async fn check_inbox(&self) -> Result<InboxStatus, ChannelError>;

    /// Open an authenticated relay session without sending anything.
    async fn check_relay(&self) -> Result<(), ChannelError>;
}
