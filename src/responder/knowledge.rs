//! Knowledge matching — selects the entries a reply may quote.
//!
//! Keyword overlap between the email and each entry's title, content and
//! tags. Short words and greeting/filler words never count as overlap.

use std::collections::BTreeSet;

use crate::store::models::KnowledgeEntry;

/// Tokens shorter than this never count.
const MIN_TOKEN_CHARS: usize = 4;

/// Filler words that would otherwise match every entry.
const STOPWORDS: &[&str] = &[
    // en
    "about", "also", "could", "dear", "from", "hello", "have", "just", "like", "please",
    "thank", "thanks", "that", "there", "this", "what", "when", "where", "which", "will",
    "with", "would", "your", "regards", "best", "know", "want", "need", "some", "info",
    // pl
    "dzień", "dobry", "proszę", "dziękuję", "dziękujemy", "jest", "które", "który", "jaki",
    "jaka", "jakie", "mamy", "chciałbym", "chciałabym", "bardzo", "pozdrawiam", "oraz",
    "może", "możliwość", "informacje", "informację", "będzie", "gdzie", "kiedy", "tylko",
    // de
    "hallo", "bitte", "danke", "eine", "einen", "haben", "gibt", "wann", "welche", "grüße",
    // destination words present in every entry
    "dubai", "dubaju", "dubaj", "dubaï", "дубай",
];

/// A knowledge entry with its overlap score.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: KnowledgeEntry,
    pub score: usize,
}

/// Distinct significant lowercase tokens of `text`, in sorted order.
pub fn keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .filter(|t| !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn entry_haystack(entry: &KnowledgeEntry) -> String {
    format!(
        "{} {} {}",
        entry.title,
        entry.content,
        entry.tags.join(" ")
    )
    .to_lowercase()
}

/// Active entries with at least one keyword in common with `query`,
/// best match first, at most `max_results`.
pub fn match_entries(
    query: &str,
    entries: &[KnowledgeEntry],
    max_results: usize,
) -> Vec<ScoredEntry> {
    let tokens = keywords(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<ScoredEntry> = entries
        .iter()
        .filter(|e| e.is_active)
        .filter_map(|entry| {
            let haystack = entry_haystack(entry);
            let score = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
            (score > 0).then(|| ScoredEntry {
                entry: entry.clone(),
                score,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.entry.title.cmp(&b.entry.title)));
    scored.truncate(max_results);
    scored
}

/// Render matched entries as the context block handed to the generator.
pub fn render_context(entries: &[ScoredEntry]) -> String {
    entries
        .iter()
        .map(|s| format!("{}: {}", s.entry.title, s.entry.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
