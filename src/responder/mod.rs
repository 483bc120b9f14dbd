//! Reply composition: knowledge matching, generation and localization.

pub mod generator;
pub mod knowledge;
pub mod locale;

pub use generator::{
    ReplyDraft, ReplyGenerator, ReplyRequest, ReplySource, append_upsell, assemble_reply,
    text_to_html,
};
pub use knowledge::{ScoredEntry, keywords, match_entries};
