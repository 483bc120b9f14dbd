//! Email processing pipeline.
//!
//! Every inbound email, whether fetched from the mailbox, posted to the
//! process endpoint or pushed through the webhook, flows through
//! [`EmailPipeline::process`]:
//! 1. dedup on the message id
//! 2. analysis (`crate::analysis`) with heuristic fallback
//! 3. priority and escalation rules ([`rules`]), no LLM
//! 4. knowledge-grounded reply (`crate::responder`)
//! 5. persistence, alerts, notifications and the optional auto-reply
//!
//! Escalated and purchase-ready emails are never auto-replied; their reply
//! is staged for a human.

pub mod orchestrator;
pub mod rules;
pub mod types;

pub use orchestrator::EmailPipeline;
pub use types::{FetchSummary, ProcessOutcome, ProcessReport, ProcessRequest};
