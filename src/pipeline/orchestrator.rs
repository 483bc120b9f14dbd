//! Email pipeline orchestrator.
//!
//! One call to [`EmailPipeline::process`] takes a raw email from dedup to
//! side effects:
//!
//! 1. dedup on the message id (store unique key)
//! 2. classification
//! 3. client profile resolution
//! 4. sentiment + purchase prediction, concurrently
//! 5. purchase readiness
//! 6. priority
//! 7. escalation
//! 8. reply generation (knowledge-grounded)
//! 9. persistence
//! 10. notifications and optional auto-reply
//!
//! Inference failures never abort a run; every analysis step has a
//! heuristic or default substitute. Only store failures surface as errors.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analysis::{
    Analyzer, Classification, PurchasePrediction, PurchaseReadiness, Sentiment, SentimentAnalysis,
    unit_interval,
};
use crate::channels::{InboxStatus, MailTransport, OutgoingEmail};
use crate::error::{DatabaseError, PipelineError};
use crate::llm::LlmProvider;
use crate::notify::{
    Notification, NotificationKind, NotificationOutcome, Notifier, ReadinessSummary, percent,
};
use crate::pipeline::rules::{DecisionInputs, Escalation, check_escalation, determine_priority};
use crate::pipeline::types::{
    AiInsights, ClientSummary, FetchSummary, FetchedEmailStatus, ProcessOutcome, ProcessReport,
    ProcessRequest,
};
use crate::responder::knowledge::render_context;
use crate::responder::{
    ReplyDraft, ReplyGenerator, ReplyRequest, append_upsell, assemble_reply, keywords, locale,
    match_entries, text_to_html,
};
use crate::store::Database;
use crate::store::models::{
    ClientProfile, Conversation, EmailStatus, InboundEmail, LearningEntry, MessageSender,
    NewInboundEmail, Priority, PurchaseAlert,
};

/// Knowledge entries handed to the generator at most.
const MAX_KNOWLEDGE_MATCHES: usize = 5;
/// Upsell lines are only offered above this purchase probability.
const UPSELL_PROBABILITY: f64 = 0.7;
const ENGAGEMENT_STEP: f64 = 0.05;
const LOYALTY_STEP: f64 = 0.05;
/// Characters of the email kept as the learning-queue question.
const LEARNING_QUESTION_CHARS: usize = 500;
const LEARNING_KEYWORDS: usize = 10;

/// Sequences analysis, reply generation, persistence and side effects.
pub struct EmailPipeline {
    store: Arc<dyn Database>,
    analyzer: Analyzer,
    generator: ReplyGenerator,
    notifier: Notifier,
    transport: Option<Arc<dyn MailTransport>>,
    fetch_window: usize,
}

impl EmailPipeline {
    /// A pipeline with no mail transport and no notification sinks.
    pub fn new(store: Arc<dyn Database>, llm: Arc<dyn LlmProvider>, inference_timeout: Duration) -> Self {
        Self {
            store,
            analyzer: Analyzer::new(Arc::clone(&llm), inference_timeout),
            generator: ReplyGenerator::new(llm, inference_timeout),
            notifier: Notifier::disabled(),
            transport: None,
            fetch_window: 10,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Recent-message window per fetch.
    pub fn with_fetch_window(mut self, window: usize) -> Self {
        self.fetch_window = window.max(1);
        self
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn notification_sinks(&self) -> Vec<String> {
        self.notifier.sink_names()
    }

    /// Log in to the mailbox and read its counters.
    pub async fn check_mailbox(&self) -> Result<InboxStatus, PipelineError> {
        let transport = self.transport.as_ref().ok_or(PipelineError::TransportDisabled)?;
        let status = transport
            .check_inbox()
            .await
            .map_err(|e| PipelineError::ConnectivityCheck(e.to_string()))?;
        info!(messages = status.messages, unseen = status.unseen, "Mailbox check passed");
        Ok(status)
    }

    /// Open a session with the outbound relay without sending.
    pub async fn check_relay(&self) -> Result<(), PipelineError> {
        let transport = self.transport.as_ref().ok_or(PipelineError::TransportDisabled)?;
        transport
            .check_relay()
            .await
            .map_err(|e| PipelineError::ConnectivityCheck(e.to_string()))?;
        info!("Relay check passed");
        Ok(())
    }

    // ── Fetch cycle ─────────────────────────────────────────────────

    /// Fetch the recent unseen window, process each message, and mark
    /// every handled message (including duplicates) as read.
    pub async fn fetch_and_process(&self) -> Result<FetchSummary, PipelineError> {
        let transport = self.transport.as_ref().ok_or(PipelineError::TransportDisabled)?;
        let fetched = transport
            .fetch_unseen(self.fetch_window)
            .await
            .map_err(|e| PipelineError::ChannelFetch(e.to_string()))?;

        let total = fetched.len();
        let mut processed = 0;
        let mut handled_uids = Vec::new();
        let mut emails = Vec::with_capacity(total);

        for raw in &fetched {
            let (id, status) = match self.process(ProcessRequest::from(raw)).await {
                Ok(ProcessOutcome::Processed(report)) => {
                    processed += 1;
                    handled_uids.push(raw.uid.clone());
                    (Some(report.email_id), report.status.as_str().to_string())
                }
                Ok(ProcessOutcome::Duplicate { email_id }) => {
                    handled_uids.push(raw.uid.clone());
                    (Some(email_id), "duplicate".to_string())
                }
                Err(e) => {
                    error!(message_id = %raw.message_id, error = %e, "Failed to process fetched email");
                    (None, "failed".to_string())
                }
            };
            emails.push(FetchedEmailStatus {
                id,
                subject: raw.subject.clone(),
                from: raw.from.clone(),
                status,
            });
        }

        if let Err(e) = transport.mark_read(&handled_uids).await {
            warn!(count = handled_uids.len(), error = %e, "Failed to mark fetched emails as read");
        }

        info!(total, processed, "Fetch cycle complete");
        Ok(FetchSummary {
            success: true,
            processed,
            total,
            emails,
        })
    }

    // ── Single email ────────────────────────────────────────────────

    pub async fn process(&self, request: ProcessRequest) -> Result<ProcessOutcome, PipelineError> {
        request.validate()?;
        let message_id = request.resolved_message_id();

        if let Some(existing) = self.store.get_email_by_message_id(&message_id).await? {
            // `pending` only follows a failed run; claim it and start over.
            if existing.status == EmailStatus::Pending
                && self.store.claim_pending_email(&existing.id).await?
            {
                info!(message_id = %message_id, email_id = %existing.id, "Retrying email left pending");
                return self.run_or_release(&existing, true).await;
            }
            info!(message_id = %message_id, email_id = %existing.id, "Email already processed");
            return Ok(ProcessOutcome::Duplicate {
                email_id: existing.id,
            });
        }

        let new_email = NewInboundEmail {
            message_id: message_id.clone(),
            from: request.from.trim().to_lowercase(),
            to: request.to.trim().to_string(),
            subject: request.subject.trim().to_string(),
            body: request.content.clone(),
            received_at: request.received_at.unwrap_or_else(Utc::now),
        };
        let email = match self.store.insert_email(&new_email).await {
            Ok(email) => email,
            Err(DatabaseError::Constraint(_)) => {
                // A concurrent run stored this message id first.
                let existing = self
                    .store
                    .get_email_by_message_id(&message_id)
                    .await?
                    .ok_or_else(|| DatabaseError::NotFound {
                        entity: "email".into(),
                        id: message_id.clone(),
                    })?;
                info!(message_id = %message_id, "Lost dedup race, treating as duplicate");
                return Ok(ProcessOutcome::Duplicate {
                    email_id: existing.id,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(email_id = %email.id, from = %email.from, "Processing email");
        self.run_or_release(&email, false).await
    }

    /// Run the pipeline; on failure put the row back to `pending` so a
    /// later fetch or process call can retry it.
    async fn run_or_release(
        &self,
        email: &InboundEmail,
        retry: bool,
    ) -> Result<ProcessOutcome, PipelineError> {
        let result: Result<ProcessReport, PipelineError> = async {
            if retry {
                self.store.discard_conversation(&email.id).await?;
            }
            self.run(email).await
        }
        .await;

        match result {
            Ok(report) => Ok(ProcessOutcome::Processed(Box::new(report))),
            Err(e) => {
                if let Err(reset) = self
                    .store
                    .update_email_status(&email.id, EmailStatus::Pending)
                    .await
                {
                    error!(email_id = %email.id, error = %reset, "Failed to reset email status");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, email: &InboundEmail) -> Result<ProcessReport, PipelineError> {
        let text = email.body.as_str();

        let classification = self.analyzer.classify(text).await;
        let language = classification.language.clone();

        let mut profile = self.store.get_or_create_client_profile(&email.from).await?;
        let is_returning = profile.interaction_count > 0;

        let (sentiment, prediction) = tokio::join!(
            self.analyzer.sentiment(text),
            self.analyzer.predict_purchase(text, &profile)
        );
        let readiness = self
            .analyzer
            .readiness(text, &profile, &sentiment, &prediction)
            .await;

        let inputs = DecisionInputs {
            sentiment: sentiment.sentiment,
            urgency: sentiment.urgency.max(classification.urgency),
            purchase_probability: prediction.purchase_probability,
            readiness: &readiness,
            profile: &profile,
            body: text,
        };
        let escalation = check_escalation(&inputs);
        let priority = escalation.apply_to(determine_priority(&inputs));
        let purchase_ready = readiness.is_alert_worthy();
        let escalated = escalation.is_escalated();

        let mut conversation = Conversation::new(&email.id, &profile);
        conversation.language = language.clone();
        conversation.sentiment = sentiment.sentiment.as_str().to_string();
        conversation.priority = priority;
        conversation.purchase_probability = prediction.purchase_probability;
        conversation.escalated = escalated;
        conversation.escalation_reasons = escalation.reasons.clone();
        conversation.topic = classification.category.as_str().to_string();
        conversation.summary = summarize(&classification, &sentiment, &prediction, purchase_ready);
        self.store.insert_conversation(&conversation).await?;
        self.store
            .append_message(&conversation.id, MessageSender::Client, text)
            .await?;

        // Reply
        let knowledge = self.store.list_knowledge(None, None).await?;
        let matches = match_entries(text, &knowledge, MAX_KNOWLEDGE_MATCHES);
        let draft = self
            .generator
            .generate(&ReplyRequest {
                email_text: text,
                language: &language,
                knowledge: &matches,
                sentiment: &sentiment,
                prediction: &prediction,
            })
            .await;

        let learning_entry = if draft.is_grounded() {
            None
        } else {
            Some(self.log_unanswered(email, &classification).await?)
        };

        let body = reply_body(&draft, &language, &prediction, &render_context(&matches));
        let settings = self.store.get_settings().await?;
        let signature = settings.as_ref().and_then(|s| s.signature.as_deref());
        let auto_reply = settings.as_ref().is_some_and(|s| s.auto_reply);
        let full_reply = assemble_reply(&language, &body, signature);

        self.store
            .append_message(&conversation.id, MessageSender::Agent, &body)
            .await?;

        let purchase_alert = if purchase_ready {
            let alert = build_alert(&conversation, &readiness);
            self.store.insert_alert(&alert).await?;
            info!(
                alert_id = %alert.id,
                client = %profile.email,
                readiness = percent(readiness.readiness_score),
                "Purchase alert raised"
            );
            Some(alert.id)
        } else {
            None
        };

        let mut status = if escalated || purchase_ready {
            EmailStatus::Escalated
        } else {
            EmailStatus::Responded
        };
        self.store
            .set_email_response(&email.id, &full_reply, status)
            .await?;

        record_interaction(&mut profile, &sentiment, &prediction, &language);
        self.store.update_client_profile(&profile).await?;

        // Side effects
        let notifications = self
            .send_notifications(email, &conversation, &escalation, &sentiment, &readiness)
            .await;

        let mut reply_sent = false;
        let mut send_error = None;
        if auto_reply && !escalated && !purchase_ready {
            match self.send_reply(email, &language, &full_reply).await {
                Some(Ok(())) => reply_sent = true,
                Some(Err(reason)) => {
                    status = EmailStatus::SendError;
                    self.store.update_email_status(&email.id, status).await?;
                    send_error = Some(reason);
                }
                None => debug!(email_id = %email.id, "No mail transport, reply staged"),
            }
        } else {
            debug!(email_id = %email.id, auto_reply, escalated, "Reply staged for manual send");
        }

        info!(
            email_id = %email.id,
            priority = priority.as_str(),
            status = status.as_str(),
            escalated,
            reply_sent,
            "Email processed"
        );

        Ok(ProcessReport {
            success: true,
            email_id: email.id.clone(),
            conversation_id: conversation.id.clone(),
            response: body,
            reply_source: draft.source,
            status,
            category: classification.clone(),
            detected_language: language,
            escalation_reasons: escalation.reasons.clone(),
            purchase_alert,
            learning_entry,
            client_profile: ClientSummary::from_profile(&profile, is_returning),
            notifications,
            reply_sent,
            send_error,
            ai_insights: AiInsights {
                sentiment,
                purchase_prediction: prediction,
                purchase_readiness: readiness,
                priority,
                escalated,
            },
        })
    }

    /// Queue the email as a question the knowledge base could not answer.
    async fn log_unanswered(
        &self,
        email: &InboundEmail,
        classification: &Classification,
    ) -> Result<String, PipelineError> {
        let question: String = email.body.trim().chars().take(LEARNING_QUESTION_CHARS).collect();
        let mut entry = LearningEntry::new(
            &email.from,
            &question,
            classification.category.as_str(),
            &classification.language,
        );
        entry.keywords = keywords(&email.body).into_iter().take(LEARNING_KEYWORDS).collect();
        entry.context = Some(email.subject.clone()).filter(|s| !s.is_empty());
        self.store.insert_learning(&entry).await?;
        info!(
            learning_id = %entry.id,
            priority = entry.priority.as_str(),
            "Unanswered question added to learning queue"
        );
        Ok(entry.id)
    }

    async fn send_notifications(
        &self,
        email: &InboundEmail,
        conversation: &Conversation,
        escalation: &Escalation,
        sentiment: &SentimentAnalysis,
        readiness: &PurchaseReadiness,
    ) -> NotificationOutcome {
        let mut outcome = NotificationOutcome::default();
        let base = Notification {
            kind: NotificationKind::Escalation,
            client: conversation.client_email.clone(),
            email_id: email.id.clone(),
            email_subject: email.subject.clone(),
            priority: conversation.priority,
            purchase_probability: conversation.purchase_probability,
            sentiment: sentiment.sentiment.as_str().to_string(),
            reasons: escalation.reasons.clone(),
            readiness: readiness.is_alert_worthy().then(|| ReadinessSummary {
                score: readiness.readiness_score,
                potential_value: readiness.potential_value,
                estimated_close_time: readiness.estimated_close_time.clone(),
                signals: readiness.ready_signals.clone(),
                actions: readiness.immediate_actions.clone(),
            }),
        };

        if escalation.is_escalated() {
            outcome.merge(self.notifier.notify(&base).await);
        }
        if readiness.is_alert_worthy() {
            let ready = Notification {
                kind: NotificationKind::PurchaseReady,
                ..base
            };
            outcome.merge(self.notifier.notify(&ready).await);
        }
        outcome
    }

    /// `None` when no transport is configured.
    async fn send_reply(
        &self,
        email: &InboundEmail,
        language: &str,
        full_reply: &str,
    ) -> Option<Result<(), String>> {
        let transport = self.transport.as_ref()?;
        let outgoing = OutgoingEmail {
            to: email.from.clone(),
            subject: locale::reply_subject(language, &email.subject),
            text: full_reply.to_string(),
            html: Some(text_to_html(full_reply)),
        };
        Some(match transport.send(outgoing).await {
            Ok(receipt) => {
                info!(email_id = %email.id, message_id = %receipt.message_id, "Auto-reply sent");
                Ok(())
            }
            Err(e) => {
                warn!(email_id = %email.id, error = %e, "Auto-reply failed");
                Err(e.to_string())
            }
        })
    }
}

/// Reply body: the draft, plus knowledge-backed upsell lines for grounded
/// replies to likely buyers.
fn reply_body(
    draft: &ReplyDraft,
    language: &str,
    prediction: &PurchasePrediction,
    context: &str,
) -> String {
    if draft.is_grounded() && prediction.purchase_probability > UPSELL_PROBABILITY {
        append_upsell(&draft.body, language, &prediction.upsell_opportunities, context)
    } else {
        draft.body.clone()
    }
}

/// One-line conversation summary for the dashboard.
fn summarize(
    classification: &Classification,
    sentiment: &SentimentAnalysis,
    prediction: &PurchasePrediction,
    purchase_ready: bool,
) -> String {
    format!(
        "[{}] {} - {} | Sentiment: {} | Purchase: {}% | Ready: {}",
        classification.language.to_uppercase(),
        classification.category.as_str(),
        classification.topics.join(", "),
        sentiment.sentiment.as_str(),
        percent(prediction.purchase_probability),
        if purchase_ready { "YES" } else { "NO" },
    )
}

fn build_alert(conversation: &Conversation, readiness: &PurchaseReadiness) -> PurchaseAlert {
    let now = Utc::now();
    PurchaseAlert {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation.id.clone(),
        client_email: conversation.client_email.clone(),
        priority: Priority::Urgent,
        readiness_score: readiness.readiness_score,
        estimated_value: readiness.potential_value,
        estimated_close_time: readiness.estimated_close_time.clone(),
        signals: readiness.ready_signals.clone(),
        actions: readiness.immediate_actions.clone(),
        next_steps: readiness.next_steps.clone(),
        is_active: true,
        is_resolved: false,
        resolved_at: None,
        resolved_by: None,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

/// Fold one interaction into the profile. Scores stay in [0, 1].
pub fn record_interaction(
    profile: &mut ClientProfile,
    sentiment: &SentimentAnalysis,
    prediction: &PurchasePrediction,
    language: &str,
) {
    profile.engagement_score = unit_interval(profile.engagement_score + ENGAGEMENT_STEP);
    let loyalty_delta = match sentiment.sentiment {
        Sentiment::Positive => LOYALTY_STEP,
        Sentiment::Negative | Sentiment::Frustrated | Sentiment::Angry => -LOYALTY_STEP,
        Sentiment::Neutral => 0.0,
    };
    profile.loyalty_score = unit_interval(profile.loyalty_score + loyalty_delta);
    profile.value_score = unit_interval(profile.value_score.max(prediction.purchase_probability));
    profile.interaction_count += 1;
    if language != "other" {
        profile.preferred_language = Some(language.to_string());
    }
    profile.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::analysis::purchase::{PREDICTION_PROMPT_MARKER, READINESS_PROMPT_MARKER};
    use crate::channels::{RawEmail, SendReceipt};
    use crate::error::{ChannelError, LlmError, NotifyError};
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason};
    use crate::notify::NotificationSink;
    use crate::responder::ReplySource;
    use crate::store::LibSqlBackend;
    use crate::store::models::{AlertFilter, EmailQuery, KnowledgeEntry, LearningStatus, StoredSettings};

    /// Answers the readiness prompt with a fixed score; every other
    /// prompt fails so the heuristics run.
    struct ReadinessOnlyLlm {
        score: f64,
    }

    #[async_trait]
    impl LlmProvider for ReadinessOnlyLlm {
        fn model_name(&self) -> &str {
            "readiness-only"
        }
        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let system = request.system_prompt().unwrap_or_default();
            if !system.starts_with(READINESS_PROMPT_MARKER) {
                return Err(LlmError::RequestFailed {
                    provider: "readiness-only".into(),
                    reason: "offline".into(),
                });
            }
            let body = json!({
                "isPurchaseReady": true,
                "readinessScore": self.score,
                "readySignals": ["specific dates", "unlimited budget"],
                "immediateActions": ["Call client directly"],
                "estimatedCloseTime": "24 hours",
                "potentialValue": 25000,
                "nextSteps": ["Send quote"]
            });
            Ok(CompletionResponse {
                content: body.to_string(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    /// Answers only the purchase prediction prompt, suggesting an offer
    /// that is not in the knowledge base.
    struct PredictionOnlyLlm;

    #[async_trait]
    impl LlmProvider for PredictionOnlyLlm {
        fn model_name(&self) -> &str {
            "prediction-only"
        }
        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let system = request.system_prompt().unwrap_or_default();
            if !system.starts_with(PREDICTION_PROMPT_MARKER) {
                return Err(LlmError::RequestFailed {
                    provider: "prediction-only".into(),
                    reason: "offline".into(),
                });
            }
            let body = json!({
                "purchaseProbability": 0.9,
                "upsellOpportunities": [
                    "Upgrade to a suite at Atlantis The Palm with free breakfast offer",
                    "desert safari dinner"
                ]
            });
            Ok(CompletionResponse {
                content: body.to_string(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    #[derive(Default)]
    struct FakeMailbox {
        inbox: Vec<RawEmail>,
        sent: Mutex<Vec<OutgoingEmail>>,
        marked: Mutex<Vec<String>>,
        fail_send: bool,
    }

    #[async_trait]
    impl MailTransport for FakeMailbox {
        fn name(&self) -> &str {
            "fake"
        }
        async fn fetch_unseen(&self, limit: usize) -> Result<Vec<RawEmail>, ChannelError> {
            Ok(self.inbox.iter().take(limit).cloned().collect())
        }
        async fn mark_read(&self, uids: &[String]) -> Result<(), ChannelError> {
            self.marked.lock().unwrap().extend_from_slice(uids);
            Ok(())
        }
        async fn send(&self, email: OutgoingEmail) -> Result<SendReceipt, ChannelError> {
            if self.fail_send {
                return Err(ChannelError::SendFailed {
                    name: "fake".into(),
                    reason: "relay refused".into(),
                });
            }
            self.sent.lock().unwrap().push(email);
            Ok(SendReceipt {
                message_id: "<r1@test>".into(),
            })
        }
        async fn check_inbox(&self) -> Result<InboxStatus, ChannelError> {
            Ok(InboxStatus {
                messages: self.inbox.len() as u64,
                unseen: self.inbox.len(),
            })
        }
        async fn check_relay(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        kinds: Mutex<Vec<NotificationKind>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }
        async fn deliver(&self, n: &Notification) -> Result<(), NotifyError> {
            self.kinds.lock().unwrap().push(n.kind);
            Ok(())
        }
    }

    async fn store() -> Arc<LibSqlBackend> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    fn offline_llm() -> Arc<dyn LlmProvider> {
        Arc::new(crate::llm::FailoverProvider::new(Vec::new()))
    }

    fn request(id: &str, from: &str, content: &str) -> ProcessRequest {
        ProcessRequest {
            message_id: Some(id.into()),
            from: from.into(),
            to: "biuro@dubaidreams.pl".into(),
            subject: "Zapytanie".into(),
            content: content.into(),
            received_at: None,
        }
    }

    async fn enable_auto_reply(store: &LibSqlBackend) {
        store
            .save_settings(&StoredSettings {
                data: json!({}),
                signature: None,
                auto_reply: true,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    fn processed(outcome: ProcessOutcome) -> ProcessReport {
        match outcome {
            ProcessOutcome::Processed(report) => *report,
            ProcessOutcome::Duplicate { .. } => panic!("expected a processed email"),
        }
    }

    #[tokio::test]
    async fn same_message_id_is_processed_once() {
        let db = store().await;
        let pipeline = EmailPipeline::new(db.clone(), offline_llm(), Duration::from_secs(1));

        let first = processed(
            pipeline
                .process(request("msg_001", "a@b.com", "Ile kosztuje safari?"))
                .await
                .unwrap(),
        );
        let second = pipeline
            .process(request("msg_001", "a@b.com", "Ile kosztuje safari?"))
            .await
            .unwrap();

        assert!(matches!(second, ProcessOutcome::Duplicate { ref email_id } if *email_id == first.email_id));
        let (_, total) = db.list_emails(&EmailQuery::default()).await.unwrap();
        assert_eq!(total, 1);
        let conversation = db.get_conversation_by_email(&first.email_id).await.unwrap().unwrap();
        assert_eq!(conversation.id, first.conversation_id);
    }

    #[tokio::test]
    async fn empty_knowledge_never_fabricates_and_queues_question() {
        let db = store().await;
        let pipeline = EmailPipeline::new(db.clone(), offline_llm(), Duration::from_secs(1));

        let report = processed(
            pipeline
                .process(request("m1", "anna@example.com", "Ile kosztuje hotel Atlantis na 5 nocy?"))
                .await
                .unwrap(),
        );

        assert_eq!(report.reply_source, ReplySource::FollowUpPromise);
        assert!(crate::responder::generator::price_tokens(&report.response).is_empty());
        assert!(!report.response.contains("Atlantis"));
        assert!(report.learning_entry.is_some());

        let pending = db.list_learning(LearningStatus::Pending, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].question.contains("hotel Atlantis"));
        assert_eq!(pending[0].customer_email, "anna@example.com");
    }

    #[tokio::test]
    async fn grounded_reply_skips_learning_queue() {
        let db = store().await;
        db.insert_knowledge(&KnowledgeEntry::new(
            "Desert safari",
            "Evening desert safari with dinner and hotel pickup.",
            "attractions",
            vec!["safari".into()],
        ))
        .await
        .unwrap();
        let pipeline = EmailPipeline::new(db.clone(), offline_llm(), Duration::from_secs(1));

        let report = processed(
            pipeline
                .process(request("m1", "a@b.com", "Interesuje mnie safari na pustyni"))
                .await
                .unwrap(),
        );
        assert_eq!(report.reply_source, ReplySource::KnowledgeQuote);
        assert!(report.response.contains("Evening desert safari"));
        assert!(report.learning_entry.is_none());
        assert_eq!(db.learning_counts().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn upsell_offers_outside_knowledge_stay_out_of_reply() {
        let db = store().await;
        db.insert_knowledge(&KnowledgeEntry::new(
            "Desert safari",
            "Evening desert safari with dinner and hotel pickup.",
            "attractions",
            vec!["safari".into()],
        ))
        .await
        .unwrap();
        let pipeline = EmailPipeline::new(db.clone(), Arc::new(PredictionOnlyLlm), Duration::from_secs(1));

        let report = processed(
            pipeline
                .process(request("m1", "a@b.com", "Interesuje mnie safari na pustyni"))
                .await
                .unwrap(),
        );

        assert_eq!(report.reply_source, ReplySource::KnowledgeQuote);
        assert!(report.ai_insights.purchase_prediction.purchase_probability > 0.7);
        assert!(!report.response.contains("Atlantis"));
        assert!(!report.response.contains("breakfast"));
        assert!(report.response.contains("• desert safari dinner"));
    }

    #[tokio::test]
    async fn email_left_pending_by_failed_run_is_retried() {
        let db = store().await;
        let pipeline = EmailPipeline::new(db.clone(), offline_llm(), Duration::from_secs(1));

        db.execute_raw("ALTER TABLE knowledge_entries RENAME TO knowledge_offline")
            .await
            .unwrap();
        let err = pipeline
            .process(request("m1", "a@b.com", "Ile kosztuje safari?"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)), "{err:?}");

        let email = db.get_email_by_message_id("m1").await.unwrap().unwrap();
        assert_eq!(email.status, EmailStatus::Pending);
        assert!(db.get_conversation_by_email(&email.id).await.unwrap().is_some());

        db.execute_raw("ALTER TABLE knowledge_offline RENAME TO knowledge_entries")
            .await
            .unwrap();
        let report = processed(
            pipeline
                .process(request("m1", "a@b.com", "Ile kosztuje safari?"))
                .await
                .unwrap(),
        );
        assert_eq!(report.email_id, email.id);
        assert_eq!(report.status, EmailStatus::Responded);
        let conversation = db.get_conversation_by_email(&email.id).await.unwrap().unwrap();
        assert_eq!(conversation.id, report.conversation_id);
        assert_eq!(db.list_messages(&conversation.id).await.unwrap().len(), 2);

        let again = pipeline
            .process(request("m1", "a@b.com", "Ile kosztuje safari?"))
            .await
            .unwrap();
        assert!(matches!(again, ProcessOutcome::Duplicate { .. }));
    }

    #[tokio::test]
    async fn purchase_ready_client_raises_alert_and_notifies() {
        let db = store().await;
        enable_auto_reply(&db).await;
        let mailbox = Arc::new(FakeMailbox::default());
        let sink = Arc::new(RecordingSink::default());
        let pipeline = EmailPipeline::new(
            db.clone(),
            Arc::new(ReadinessOnlyLlm { score: 0.95 }),
            Duration::from_secs(1),
        )
        .with_transport(mailbox.clone())
        .with_notifier(Notifier::new(vec![sink.clone()], Duration::from_secs(1)));

        let report = processed(
            pipeline
                .process(request(
                    "m1",
                    "vip@example.com",
                    "PILNE: rezerwacja Sylwester, budżet bez ograniczeń",
                ))
                .await
                .unwrap(),
        );

        assert_eq!(report.ai_insights.priority, Priority::Urgent);
        assert!(report.ai_insights.escalated);
        assert!(report.ai_insights.purchase_prediction.purchase_probability > 0.7);
        assert_eq!(report.status, EmailStatus::Escalated);
        assert!(report.escalation_reasons.contains(&"Client is ready to purchase".to_string()));
        assert!(!report.reply_sent);
        assert!(mailbox.sent.lock().unwrap().is_empty());

        let alert_id = report.purchase_alert.expect("alert raised");
        let alert = db.get_alert(&alert_id).await.unwrap().unwrap();
        assert_eq!(alert.client_email, "vip@example.com");
        assert_eq!(alert.estimated_value, 25000.0);
        assert!(alert.is_active);

        assert_eq!(
            *sink.kinds.lock().unwrap(),
            vec![NotificationKind::Escalation, NotificationKind::PurchaseReady]
        );
        assert_eq!(report.notifications.delivered.len(), 2);
    }

    #[tokio::test]
    async fn readiness_at_threshold_raises_no_alert() {
        let db = store().await;
        let pipeline = EmailPipeline::new(
            db.clone(),
            Arc::new(ReadinessOnlyLlm { score: 0.80 }),
            Duration::from_secs(1),
        );
        let report = processed(
            pipeline
                .process(request("m1", "a@b.com", "Ile kosztuje safari?"))
                .await
                .unwrap(),
        );
        assert!(report.purchase_alert.is_none());
        assert!(db.list_alerts(AlertFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn calm_email_is_auto_replied() {
        let db = store().await;
        enable_auto_reply(&db).await;
        let mailbox = Arc::new(FakeMailbox::default());
        let pipeline = EmailPipeline::new(db.clone(), offline_llm(), Duration::from_secs(1))
            .with_transport(mailbox.clone());

        let report = processed(
            pipeline
                .process(request("m1", "a@b.com", "Ile kosztuje safari?"))
                .await
                .unwrap(),
        );

        assert!(report.reply_sent);
        assert_eq!(report.status, EmailStatus::Responded);
        let sent = mailbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@b.com");
        assert_eq!(sent[0].subject, "Re: Zapytanie");

        let email = db.get_email(&report.email_id).await.unwrap().unwrap();
        let stored = email.response.unwrap();
        assert!(stored.contains(&report.response));
        assert_eq!(sent[0].text, stored);
    }

    #[tokio::test]
    async fn failed_send_marks_send_error() {
        let db = store().await;
        enable_auto_reply(&db).await;
        let mailbox = Arc::new(FakeMailbox {
            fail_send: true,
            ..FakeMailbox::default()
        });
        let pipeline = EmailPipeline::new(db.clone(), offline_llm(), Duration::from_secs(1))
            .with_transport(mailbox);

        let report = processed(
            pipeline
                .process(request("m1", "a@b.com", "Ile kosztuje safari?"))
                .await
                .unwrap(),
        );
        assert!(!report.reply_sent);
        assert!(report.send_error.unwrap().contains("relay refused"));
        let email = db.get_email(&report.email_id).await.unwrap().unwrap();
        assert_eq!(email.status, EmailStatus::SendError);
    }

    #[tokio::test]
    async fn complaint_is_escalated_and_not_auto_replied() {
        let db = store().await;
        enable_auto_reply(&db).await;
        let mailbox = Arc::new(FakeMailbox::default());
        let pipeline = EmailPipeline::new(db.clone(), offline_llm(), Duration::from_secs(1))
            .with_transport(mailbox.clone());

        let report = processed(
            pipeline
                .process(request("m1", "a@b.com", "I want a refund for the cancelled tour"))
                .await
                .unwrap(),
        );
        assert_eq!(report.status, EmailStatus::Escalated);
        assert_eq!(report.ai_insights.priority, Priority::Urgent);
        assert!(report.escalation_reasons.iter().any(|r| r.contains("complaint/refund/legal")));
        assert!(mailbox.sent.lock().unwrap().is_empty());

        let conversation = db.get_conversation_by_email(&report.email_id).await.unwrap().unwrap();
        assert!(conversation.escalated);
        let messages = db.list_messages(&conversation.id).await.unwrap();
        let senders: Vec<_> = messages.iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![MessageSender::Client, MessageSender::Agent]);
    }

    #[tokio::test]
    async fn profile_accumulates_interactions() {
        let db = store().await;
        let pipeline = EmailPipeline::new(db.clone(), offline_llm(), Duration::from_secs(1));

        let first = processed(
            pipeline
                .process(request("m1", "Anna@Example.com", "Ile kosztuje safari?"))
                .await
                .unwrap(),
        );
        assert!(!first.client_profile.is_returning);
        let second = processed(
            pipeline
                .process(request("m2", "anna@example.com", "A transfer z lotniska?"))
                .await
                .unwrap(),
        );
        assert!(second.client_profile.is_returning);

        let profile = db.get_client_profile("anna@example.com").await.unwrap().unwrap();
        assert_eq!(profile.interaction_count, 2);
        assert!((profile.engagement_score - 0.10).abs() < 1e-9);
        assert_eq!(profile.preferred_language.as_deref(), Some("pl"));
    }

    #[tokio::test]
    async fn fetch_marks_processed_and_duplicate_messages_read() {
        let db = store().await;
        let raw = |uid: &str, id: &str| RawEmail {
            uid: uid.into(),
            message_id: id.into(),
            from: "a@b.com".into(),
            to: "biuro@dubaidreams.pl".into(),
            subject: "Safari".into(),
            body: "Ile kosztuje safari?".into(),
            received_at: Utc::now(),
        };
        let mailbox = Arc::new(FakeMailbox {
            inbox: vec![raw("1", "<old@x>"), raw("2", "<new@x>")],
            ..FakeMailbox::default()
        });
        let pipeline = EmailPipeline::new(db.clone(), offline_llm(), Duration::from_secs(1))
            .with_transport(mailbox.clone());

        pipeline
            .process(request("<old@x>", "a@b.com", "Ile kosztuje safari?"))
            .await
            .unwrap();
        let summary = pipeline.fetch_and_process().await.unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.emails[0].status, "duplicate");
        assert_eq!(*mailbox.marked.lock().unwrap(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn fetch_without_transport_is_rejected() {
        let pipeline = EmailPipeline::new(store().await, offline_llm(), Duration::from_secs(1));
        assert!(matches!(
            pipeline.fetch_and_process().await,
            Err(PipelineError::TransportDisabled)
        ));
    }

    #[tokio::test]
    async fn mailbox_check_reports_counters() {
        let mailbox = Arc::new(FakeMailbox {
            inbox: vec![RawEmail {
                uid: "1".into(),
                message_id: "<a@x>".into(),
                from: "a@b.com".into(),
                to: "biuro@dubaidreams.pl".into(),
                subject: "Safari".into(),
                body: "Ile kosztuje safari?".into(),
                received_at: Utc::now(),
            }],
            ..FakeMailbox::default()
        });
        let pipeline = EmailPipeline::new(store().await, offline_llm(), Duration::from_secs(1))
            .with_transport(mailbox);
        let status = pipeline.check_mailbox().await.unwrap();
        assert_eq!(status, InboxStatus { messages: 1, unseen: 1 });
        pipeline.check_relay().await.unwrap();

        let offline = EmailPipeline::new(store().await, offline_llm(), Duration::from_secs(1));
        assert!(matches!(offline.check_mailbox().await, Err(PipelineError::TransportDisabled)));
        assert!(matches!(offline.check_relay().await, Err(PipelineError::TransportDisabled)));
    }

    #[tokio::test]
    async fn missing_sender_is_invalid_input() {
        let pipeline = EmailPipeline::new(store().await, offline_llm(), Duration::from_secs(1));
        let err = pipeline.process(request("m1", " ", "hello")).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn interaction_scores_stay_in_range() {
        let mut profile = ClientProfile::new("a@b.com");
        profile.loyalty_score = 0.02;
        profile.engagement_score = 0.99;
        let sentiment = SentimentAnalysis {
            sentiment: Sentiment::Angry,
            ..SentimentAnalysis::default()
        };
        let prediction = PurchasePrediction {
            purchase_probability: 0.6,
            ..PurchasePrediction::default()
        };
        record_interaction(&mut profile, &sentiment, &prediction, "de");
        assert_eq!(profile.loyalty_score, 0.0);
        assert_eq!(profile.engagement_score, 1.0);
        assert_eq!(profile.value_score, 0.6);
        assert_eq!(profile.preferred_language.as_deref(), Some("de"));
    }
}
