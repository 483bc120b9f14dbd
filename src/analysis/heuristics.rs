//! Keyword heuristics — the rule-based path used when inference fails.
//!
//! Same output shapes as the model-backed analyses, lower accuracy.
//! Matching is case-insensitive substring search over Polish, English and
//! German keyword tables.

use std::sync::LazyLock;

use regex::Regex;

use super::{
    Category, Classification, PriceRange, PurchasePrediction, Sentiment, SentimentAnalysis,
    Urgency, unit_interval,
};

static DATE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}|\d{4}[/\-.]\d{1,2}[/\-.]\d{1,2}").ok()
});

/// Month names and fixed holidays that pin a trip to concrete dates.
const DATE_WORDS: &[&str] = &[
    "january", "february", "march", "april", "may ", "june", "july", "august", "september",
    "october", "november", "december", "styczeń", "stycznia", "luty", "lutego", "marzec",
    "marca", "kwiecień", "kwietnia", "maj ", "maja", "czerwiec", "czerwca", "lipiec", "lipca",
    "sierpień", "sierpnia", "wrzesień", "września", "październik", "października", "listopad",
    "listopada", "grudzień", "grudnia", "sylwester", "new year", "christmas", "boże narodzenie",
];

const CATEGORY_KEYWORDS: &[(Category, &[&str], &[&str])] = &[
    (
        Category::Hotels,
        &["hotel", "zakwaterowanie", "accommodation", "unterkunft"],
        &["hotels", "accommodation"],
    ),
    (
        Category::Attractions,
        &["atrakcj", "zwiedzanie", "attraction", "burj", "tour", "safari"],
        &["attractions", "sightseeing"],
    ),
    (
        Category::Restaurants,
        &["restauracj", "restaurant", "jedzenie", "dining"],
        &["restaurants", "dining"],
    ),
    (
        Category::Transport,
        &["transport", "lot ", "loty", "flight", "transfer"],
        &["transport", "flights"],
    ),
    (
        Category::Booking,
        &["rezerwacj", "booking", "book ", "reserve", "buchung"],
        &["booking", "reservation"],
    ),
];

const HIGH_URGENCY: &[&str] = &["pilne", "urgent", "asap", "szybko", "natychmiast", "dringend"];
const LOW_URGENCY: &[&str] = &["kiedy", "when"];

const POSITIVE: &[&str] = &["dziękuję", "świetnie", "excellent", "great", "danke", "wunderbar"];
const NEGATIVE: &[&str] = &["problem", "źle", "bad", "terrible", "schlecht"];
const FRUSTRATED: &[&str] = &["frustr", "disappointed", "rozczarow", "enttäuscht"];
const ANGRY: &[&str] = &["angry", "furious", "unacceptable", "wściek", "skandal", "nieakceptowal"];

const BUDGET: &[&str] = &["budget", "tani", "cheap", "günstig"];
const LUXURY: &[&str] = &["luxury", "luksus", "premium", "bez ograniczeń", "vip", "5*"];
const MID_RANGE: &[&str] = &["średni", "mid"];

const BOOKING_INTENT: &[&str] = &["rezerw", "book", "reserve", "buchen", "buchung", "zarezerwować"];

const POLISH_WORDS: &[&str] = &[
    "dzień", "dobry", "proszę", "dziękuję", "hotel", "cena", "dostępność", "rezerwacja",
];
const ENGLISH_WORDS: &[&str] = &["hello", "please", "thank", "hotel", "price", "availability"];
const GERMAN_WORDS: &[&str] = &["hallo", "bitte", "danke", "hotel", "preis", "verfügbarkeit"];
const POLISH_DIACRITICS: &[char] = &['ą', 'ć', 'ę', 'ł', 'ń', 'ó', 'ś', 'ź', 'ż'];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(*n))
}

fn count_matches(haystack: &str, needles: &[&str]) -> usize {
    needles.iter().filter(|n| haystack.contains(**n)).count()
}

/// Detect pl / en / de by keyword counts. Ties and no-signal default to pl.
pub fn detect_language(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let polish = count_matches(&lower, POLISH_WORDS)
        + usize::from(lower.chars().any(|c| POLISH_DIACRITICS.contains(&c)));
    let english = count_matches(&lower, ENGLISH_WORDS);
    let german = count_matches(&lower, GERMAN_WORDS);

    if polish >= english && polish >= german {
        "pl"
    } else if english >= german {
        "en"
    } else {
        "de"
    }
}

/// Whether the text names concrete dates (numeric or by month/holiday).
pub fn has_specific_dates(lower: &str) -> bool {
    let numeric = DATE_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(lower));
    numeric || contains_any(&format!("{lower} "), DATE_WORDS)
}

fn price_range(lower: &str) -> PriceRange {
    if contains_any(lower, BUDGET) {
        PriceRange::Budget
    } else if contains_any(lower, LUXURY) {
        PriceRange::Luxury
    } else if contains_any(lower, MID_RANGE) {
        PriceRange::MidRange
    } else {
        PriceRange::NotSpecified
    }
}

fn urgency(lower: &str) -> Urgency {
    if contains_any(lower, HIGH_URGENCY) {
        Urgency::High
    } else if contains_any(lower, LOW_URGENCY) {
        Urgency::Low
    } else {
        Urgency::Medium
    }
}

fn base_sentiment(lower: &str) -> Sentiment {
    if contains_any(lower, POSITIVE) {
        Sentiment::Positive
    } else if contains_any(lower, NEGATIVE) {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

/// Keyword classifier. First category table that matches wins.
pub fn classify(text: &str) -> Classification {
    let lower = text.to_lowercase();
    let padded = format!("{lower} ");

    let (category, topics) = CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords, _)| contains_any(&padded, keywords))
        .map(|(category, _, topics)| (*category, topics.iter().map(|t| t.to_string()).collect()))
        .unwrap_or((Category::General, vec!["general".to_string()]));

    Classification {
        category,
        language: detect_language(text).to_string(),
        urgency: urgency(&lower),
        sentiment: base_sentiment(&lower),
        has_specific_dates: has_specific_dates(&lower),
        price_range: price_range(&lower),
        topics,
    }
}

/// Sentiment from the keyword classifier, sharpened by strong complaint words.
pub fn sentiment(text: &str) -> SentimentAnalysis {
    let lower = text.to_lowercase();
    let (sentiment, emotion) = if contains_any(&lower, ANGRY) {
        (Sentiment::Angry, "angry")
    } else if contains_any(&lower, FRUSTRATED) {
        (Sentiment::Frustrated, "frustrated")
    } else {
        match base_sentiment(&lower) {
            Sentiment::Positive => (Sentiment::Positive, "happy"),
            Sentiment::Negative => (Sentiment::Negative, "concerned"),
            other => (other, "neutral"),
        }
    };

    let keywords = [ANGRY, FRUSTRATED, POSITIVE, NEGATIVE, HIGH_URGENCY]
        .iter()
        .flat_map(|table| table.iter())
        .filter(|k| lower.contains(**k))
        .map(|k| k.to_string())
        .collect();

    SentimentAnalysis {
        sentiment,
        emotion: emotion.to_string(),
        confidence: 0.5,
        urgency: urgency(&lower),
        keywords,
    }
}

/// Additive purchase-probability estimate: base 0.3, plus booking intent,
/// concrete dates, luxury budget and high urgency.
pub fn predict_purchase(text: &str, classification: &Classification) -> PurchasePrediction {
    let lower = text.to_lowercase();
    let mut probability: f64 = 0.3;
    let mut signals = Vec::new();

    if classification.category == Category::Booking || contains_any(&lower, BOOKING_INTENT) {
        probability += 0.2;
        signals.push("booking intent".to_string());
    }
    if classification.has_specific_dates {
        probability += 0.15;
        signals.push("specific dates".to_string());
    }
    if classification.price_range == PriceRange::Luxury {
        probability += 0.15;
        signals.push("luxury budget".to_string());
    }
    if classification.urgency >= Urgency::High {
        probability += 0.1;
        signals.push("urgency in language".to_string());
    }

    let probability = unit_interval(probability);
    let time_to_decision = if probability > 0.7 {
        "1-3 days"
    } else if probability > 0.5 {
        "1-2 weeks"
    } else {
        "1 month"
    };

    let mut upsell = Vec::new();
    if classification.price_range == PriceRange::Luxury {
        upsell.push("premium hotels".to_string());
    }
    if classification.category == Category::Hotels {
        upsell.push("extended stay".to_string());
    }

    PurchasePrediction {
        purchase_probability: probability,
        time_to_decision: time_to_decision.to_string(),
        buying_signals: signals,
        barriers: Vec::new(),
        upsell_opportunities: upsell,
        estimated_budget: match classification.price_range {
            PriceRange::NotSpecified => PriceRange::MidRange,
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_languages() {
        assert_eq!(detect_language("Dzień dobry, proszę o cenę hotelu"), "pl");
        assert_eq!(detect_language("Hello, please send the price"), "en");
        assert_eq!(detect_language("Hallo, bitte den Preis"), "de");
        assert_eq!(detect_language("???"), "pl");
    }

    #[test]
    fn classifies_hotel_query() {
        let c = classify("Looking for a hotel near the Marina in August, cheap please");
        assert_eq!(c.category, Category::Hotels);
        assert!(c.has_specific_dates);
        assert_eq!(c.price_range, PriceRange::Budget);
        assert_eq!(c.topics, vec!["hotels", "accommodation"]);
    }

    #[test]
    fn numeric_dates_detected() {
        assert!(has_specific_dates("arrive 12/03/2025"));
        assert!(has_specific_dates("from 2025-03-12"));
        assert!(!has_specific_dates("sometime next year"));
    }

    #[test]
    fn urgency_and_sentiment_keywords() {
        let c = classify("PILNE! Dziękuję za szybką odpowiedź");
        assert_eq!(c.urgency, Urgency::High);
        assert_eq!(c.sentiment, Sentiment::Positive);
        assert_eq!(classify("When is the best season?").urgency, Urgency::Low);
    }

    #[test]
    fn complaint_words_mark_hostility() {
        assert_eq!(sentiment("This is unacceptable!").sentiment, Sentiment::Angry);
        assert_eq!(
            sentiment("I am really disappointed with the transfer").sentiment,
            Sentiment::Frustrated
        );
        assert_eq!(sentiment("Terrible room").sentiment, Sentiment::Negative);
    }

    #[test]
    fn luxury_new_year_booking_is_likely_purchase() {
        let text = "PILNE: rezerwacja Sylwester, budżet bez ograniczeń";
        let c = classify(text);
        assert_eq!(c.category, Category::Booking);
        assert_eq!(c.price_range, PriceRange::Luxury);
        let p = predict_purchase(text, &c);
        assert!(p.purchase_probability > 0.7, "got {}", p.purchase_probability);
        assert_eq!(p.time_to_decision, "1-3 days");
        assert_eq!(p.estimated_budget, PriceRange::Luxury);
    }

    #[test]
    fn plain_question_stays_at_base() {
        let text = "Is it hot in Dubai?";
        let p = predict_purchase(text, &classify(text));
        assert!((p.purchase_probability - 0.3).abs() < 1e-9);
        assert!(p.buying_signals.is_empty());
    }
}
