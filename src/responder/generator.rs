//! Reply generation restricted to knowledge-base facts.
//!
//! Three paths, chosen in order:
//! 1. No matching knowledge → fixed follow-up promise, no model call.
//! 2. Model reply that passes the price guard → used as-is.
//! 3. Model unavailable → matched entries quoted verbatim.
//!
//! A model reply quoting a price that does not appear in the supplied
//! context is discarded for the follow-up promise.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::{PurchasePrediction, SentimentAnalysis};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::responder::knowledge::{ScoredEntry, keywords, render_context};
use crate::responder::locale;

const REPLY_MAX_TOKENS: u32 = 2000;
const REPLY_TEMPERATURE: f32 = 0.7;

/// Amounts attached to a currency or a per-night rate.
static PRICE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        (?: [$€£] \s? \d[\d\s.,]* )
        | (?: \d[\d.,]* (?:\s?k)? \s? (?: aed | pln | usd | eur | gbp | zł | zl | dirhams? | dollars? | euros? | złotych | [$€£] ) )
        | (?: \d[\d.,]* \s? (?: /\s?(?:noc|night|nacht|person|os) | per\s(?:night|person) | za\s(?:noc|osobę) ) )
        ",
    )
    .ok()
});

static NUMBER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*\d|\d").ok());

/// Digits of a numeric token with separators removed: "2,500.00" → "250000".
fn digits_of(token: &str) -> String {
    token.chars().filter(char::is_ascii_digit).collect()
}

/// All price-like tokens in `text`.
pub fn price_tokens(text: &str) -> Vec<String> {
    PRICE_PATTERN
        .as_ref()
        .map(|re| re.find_iter(text).map(|m| m.as_str().trim().to_string()).collect())
        .unwrap_or_default()
}

/// Price tokens in `reply` whose amount does not occur in `context`.
pub fn unsupported_prices(reply: &str, context: &str) -> Vec<String> {
    let known: HashSet<String> = NUMBER_PATTERN
        .as_ref()
        .map(|re| re.find_iter(context).map(|m| digits_of(m.as_str())).collect())
        .unwrap_or_default();

    price_tokens(reply)
        .into_iter()
        .filter(|token| {
            let amount = NUMBER_PATTERN
                .as_ref()
                .and_then(|re| re.find(token))
                .map(|m| digits_of(m.as_str()))
                .unwrap_or_default();
            !known.contains(&amount)
        })
        .collect()
}

/// How a reply body was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Model,
    KnowledgeQuote,
    FollowUpPromise,
}

/// Generated body, before template and signature are added.
#[derive(Debug, Clone)]
pub struct ReplyDraft {
    pub body: String,
    pub source: ReplySource,
}

impl ReplyDraft {
    /// Whether the body answers from knowledge. A follow-up promise is not grounded.
    pub fn is_grounded(&self) -> bool {
        self.source != ReplySource::FollowUpPromise
    }

    fn follow_up(language: &str) -> Self {
        Self {
            body: locale::follow_up_promise(language).to_string(),
            source: ReplySource::FollowUpPromise,
        }
    }
}

/// Inputs for one reply.
pub struct ReplyRequest<'a> {
    pub email_text: &'a str,
    pub language: &'a str,
    pub knowledge: &'a [ScoredEntry],
    pub sentiment: &'a SentimentAnalysis,
    pub prediction: &'a PurchasePrediction,
}

pub struct ReplyGenerator {
    llm: Arc<dyn LlmProvider>,
    deadline: Duration,
}

impl ReplyGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, deadline: Duration) -> Self {
        Self { llm, deadline }
    }

    pub async fn generate(&self, request: &ReplyRequest<'_>) -> ReplyDraft {
        if request.knowledge.is_empty() {
            info!(language = request.language, "No matching knowledge, promising follow-up");
            return ReplyDraft::follow_up(request.language);
        }

        let context = render_context(request.knowledge);
        let completion = CompletionRequest::new(vec![
            ChatMessage::system(build_reply_system_prompt(request, &context)),
            ChatMessage::user(request.email_text.chars().take(4000).collect::<String>()),
        ])
        .with_temperature(REPLY_TEMPERATURE)
        .with_max_tokens(REPLY_MAX_TOKENS);

        let body = match tokio::time::timeout(self.deadline, self.llm.complete(completion)).await {
            Ok(Ok(response)) if !response.content.trim().is_empty() => response.content,
            Ok(Ok(_)) => {
                warn!("Empty reply from model, quoting knowledge");
                return quote_knowledge(request.language, request.knowledge);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Reply generation failed, quoting knowledge");
                return quote_knowledge(request.language, request.knowledge);
            }
            Err(_) => {
                warn!(timeout = ?self.deadline, "Reply generation timed out, quoting knowledge");
                return quote_knowledge(request.language, request.knowledge);
            }
        };

        let unsupported = unsupported_prices(&body, &context);
        if !unsupported.is_empty() {
            warn!(
                tokens = ?unsupported,
                "Model reply quoted prices absent from knowledge, discarding"
            );
            return ReplyDraft::follow_up(request.language);
        }

        debug!(chars = body.len(), "Model reply accepted");
        ReplyDraft {
            body: body.trim().to_string(),
            source: ReplySource::Model,
        }
    }
}

/// Deterministic grounded reply: the matched entries, verbatim.
fn quote_knowledge(language: &str, knowledge: &[ScoredEntry]) -> ReplyDraft {
    let mut body = String::from(locale::quoted_facts_intro(language));
    body.push('\n');
    for scored in knowledge {
        body.push_str(&format!("\n• {}: {}", scored.entry.title, scored.entry.content));
    }
    body.push_str("\n\n");
    body.push_str(locale::quoted_facts_outro(language));
    ReplyDraft {
        body,
        source: ReplySource::KnowledgeQuote,
    }
}

/// Append upsell suggestions backed by the knowledge `context`.
///
/// A line survives only when every significant word in it occurs in the
/// context and it carries no digits, so neither names nor amounts can
/// enter the reply through this path.
pub fn append_upsell(body: &str, language: &str, suggestions: &[String], context: &str) -> String {
    let lines: Vec<&str> = suggestions
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.chars().any(|c| c.is_ascii_digit()))
        .filter(|s| is_backed_by(s, context))
        .collect();
    if lines.is_empty() {
        return body.to_string();
    }
    format!(
        "{body}\n\n{}\n{}",
        locale::upsell_heading(language),
        lines
            .iter()
            .map(|l| format!("• {l}"))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

fn is_backed_by(line: &str, context: &str) -> bool {
    let words = keywords(line);
    if words.is_empty() {
        return false;
    }
    let known = context.to_lowercase();
    let dropped: Vec<&String> = words.iter().filter(|w| !known.contains(w.as_str())).collect();
    if !dropped.is_empty() {
        debug!(line, unknown = ?dropped, "Upsell line not in knowledge, dropped");
    }
    dropped.is_empty()
}

/// Full outgoing text: greeting template, body, signature.
pub fn assemble_reply(language: &str, body: &str, configured_signature: Option<&str>) -> String {
    format!(
        "{}\n\n{}\n\n{}",
        locale::greeting_template(language),
        body,
        locale::signature(language, configured_signature)
    )
}

/// Plain text to minimal HTML for the alternative part.
pub fn text_to_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br>")
}

// ── Prompt construction ─────────────────────────────────────────────

fn language_instruction(language: &str) -> String {
    match language {
        "pl" => "Polish".to_string(),
        "en" => "English".to_string(),
        "de" => "German".to_string(),
        "fr" => "French".to_string(),
        "es" => "Spanish".to_string(),
        "it" => "Italian".to_string(),
        "ru" => "Russian".to_string(),
        _ => "the language the customer wrote in".to_string(),
    }
}

fn build_reply_system_prompt(request: &ReplyRequest<'_>, context: &str) -> String {
    let tone = if request.sentiment.sentiment.is_hostile() {
        "The customer is upset: acknowledge the problem first and stay calm."
    } else if request.prediction.purchase_probability > 0.7 {
        "The customer is close to booking: be concrete about next steps."
    } else {
        "Be warm, helpful and concise."
    };

    format!(
        "You are a customer assistant for a Dubai travel agency.\n\
         Write the body of a reply in {}.\n\n\
         Strict rules:\n\
         - State only facts contained in VERIFIED KNOWLEDGE below.\n\
         - Never mention a price, hotel name, discount or offer that is not in VERIFIED KNOWLEDGE.\n\
         - If the knowledge does not answer part of the question, say a consultant will follow up on it.\n\
         - Do not add a greeting line or a signature; they are added automatically.\n\
         - {tone}\n\n\
         VERIFIED KNOWLEDGE:\n{context}",
        language_instruction(request.language)
    )
}
