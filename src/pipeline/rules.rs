//! Priority and escalation decision rules.
//!
//! Pure functions over the analysis results; no I/O and no model calls.

use serde::Serialize;
use tracing::debug;

use crate::analysis::{PurchaseReadiness, Sentiment, Urgency};
use crate::store::models::{ClientProfile, Priority};

/// Lifetime booking value above which a client is treated as VIP.
pub const HIGH_VALUE_BOOKING_THRESHOLD: f64 = 50_000.0;
/// Loyalty score above which a client is treated as VIP.
pub const HIGH_LOYALTY_THRESHOLD: f64 = 0.8;

/// Substrings (lowercase) that mark a complaint, refund or legal query.
pub const COMPLEX_QUERY_KEYWORDS: &[&str] = &[
    "complaint",
    "refund",
    "cancel",
    "problem",
    "issue",
    "disappointed",
    "legal",
];

pub const REASON_URGENT: &str = "Urgent request";
pub const REASON_HIGH_VALUE: &str = "High-value client (VIP treatment required)";
pub const REASON_COMPLEX_QUERY: &str = "Complex query detected (complaint/refund/legal)";
pub const REASON_PURCHASE_READY: &str = "Client is ready to purchase";

/// Everything the rules look at for one email.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs<'a> {
    pub sentiment: Sentiment,
    pub urgency: Urgency,
    pub purchase_probability: f64,
    pub readiness: &'a PurchaseReadiness,
    pub profile: &'a ClientProfile,
    pub body: &'a str,
}

/// Priority before escalation is applied. First matching rule wins.
pub fn determine_priority(inputs: &DecisionInputs<'_>) -> Priority {
    let p = inputs.purchase_probability;
    let priority = if inputs.sentiment.is_hostile() || inputs.readiness.is_alert_worthy() {
        Priority::Urgent
    } else if inputs.urgency >= Urgency::High || p > 0.6 {
        // urgent/high urgency, or probability above 0.6 (which covers > 0.8)
        Priority::High
    } else if p > 0.4 || inputs.urgency == Urgency::Medium {
        Priority::Medium
    } else {
        Priority::Low
    };
    debug!(priority = priority.as_str(), probability = p, "Priority determined");
    priority
}

/// Accumulated escalation reasons. Empty means no escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Escalation {
    pub reasons: Vec<String>,
}

impl Escalation {
    pub fn is_escalated(&self) -> bool {
        !self.reasons.is_empty()
    }

    /// Escalation forces URGENT; otherwise the computed priority stands.
    pub fn apply_to(&self, priority: Priority) -> Priority {
        if self.is_escalated() {
            Priority::Urgent
        } else {
            priority
        }
    }
}

pub fn is_high_value_client(profile: &ClientProfile) -> bool {
    profile.total_booking_value > HIGH_VALUE_BOOKING_THRESHOLD
        || profile.loyalty_score > HIGH_LOYALTY_THRESHOLD
}

pub fn is_complex_query(body: &str) -> bool {
    let lower = body.to_lowercase();
    COMPLEX_QUERY_KEYWORDS.iter().any(|k| lower.contains(*k))
}

/// Every escalation criterion that holds, in a fixed order.
pub fn check_escalation(inputs: &DecisionInputs<'_>) -> Escalation {
    let mut reasons = Vec::new();
    if inputs.sentiment.is_hostile() {
        reasons.push(format!(
            "Negative sentiment detected: {}",
            inputs.sentiment.as_str()
        ));
    }
    if inputs.urgency == Urgency::Urgent {
        reasons.push(REASON_URGENT.to_string());
    }
    if is_high_value_client(inputs.profile) {
        reasons.push(REASON_HIGH_VALUE.to_string());
    }
    if is_complex_query(inputs.body) {
        reasons.push(REASON_COMPLEX_QUERY.to_string());
    }
    if inputs.readiness.is_alert_worthy() {
        reasons.push(REASON_PURCHASE_READY.to_string());
    }
    Escalation { reasons }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readiness(score: f64) -> PurchaseReadiness {
        PurchaseReadiness {
            readiness_score: score,
            ..PurchaseReadiness::default()
        }
    }

    fn inputs<'a>(
        readiness: &'a PurchaseReadiness,
        profile: &'a ClientProfile,
        body: &'a str,
    ) -> DecisionInputs<'a> {
        DecisionInputs {
            sentiment: Sentiment::Neutral,
            urgency: Urgency::Low,
            purchase_probability: 0.0,
            readiness,
            profile,
            body,
        }
    }

    #[test]
    fn frustrated_is_always_urgent() {
        let r = readiness(0.0);
        let profile = ClientProfile::new("a@b.com");
        for step in 0..=10 {
            let i = DecisionInputs {
                sentiment: Sentiment::Frustrated,
                purchase_probability: f64::from(step) / 10.0,
                ..inputs(&r, &profile, "hello")
            };
            assert_eq!(determine_priority(&i), Priority::Urgent);
        }
    }

    #[test]
    fn readiness_boundary_is_strict() {
        let profile = ClientProfile::new("a@b.com");
        let at = readiness(0.80);
        let above = readiness(0.801);
        assert_eq!(determine_priority(&inputs(&at, &profile, "x")), Priority::Low);
        assert!(!check_escalation(&inputs(&at, &profile, "x")).is_escalated());
        assert_eq!(determine_priority(&inputs(&above, &profile, "x")), Priority::Urgent);
        assert_eq!(
            check_escalation(&inputs(&above, &profile, "x")).reasons,
            vec![REASON_PURCHASE_READY]
        );
    }

    #[test]
    fn precedence_ladder() {
        let r = readiness(0.0);
        let profile = ClientProfile::new("a@b.com");
        let base = inputs(&r, &profile, "x");
        let cases = [
            (Urgency::Urgent, 0.0, Priority::High),
            (Urgency::Low, 0.85, Priority::High),
            (Urgency::High, 0.0, Priority::High),
            (Urgency::Low, 0.65, Priority::High),
            (Urgency::Low, 0.45, Priority::Medium),
            (Urgency::Medium, 0.0, Priority::Medium),
            (Urgency::Low, 0.4, Priority::Low),
        ];
        for (urgency, p, expected) in cases {
            let i = DecisionInputs {
                urgency,
                purchase_probability: p,
                ..base
            };
            assert_eq!(determine_priority(&i), expected, "{urgency:?} {p}");
        }
    }

    #[test]
    fn high_value_refund_has_exactly_two_reasons() {
        let r = readiness(0.2);
        let mut profile = ClientProfile::new("vip@b.com");
        profile.total_booking_value = 80_000.0;
        let escalation = check_escalation(&inputs(&r, &profile, "I want a REFUND for my trip"));
        assert_eq!(
            escalation.reasons,
            vec![REASON_HIGH_VALUE, REASON_COMPLEX_QUERY]
        );
        assert_eq!(escalation.apply_to(Priority::Low), Priority::Urgent);
    }

    #[test]
    fn loyalty_alone_makes_vip() {
        let mut profile = ClientProfile::new("a@b.com");
        profile.loyalty_score = 0.81;
        assert!(is_high_value_client(&profile));
        profile.loyalty_score = 0.8;
        assert!(!is_high_value_client(&profile));
    }

    #[test]
    fn reasons_keep_fixed_order() {
        let r = readiness(0.95);
        let profile = ClientProfile::new("a@b.com");
        let i = DecisionInputs {
            sentiment: Sentiment::Angry,
            urgency: Urgency::Urgent,
            ..inputs(&r, &profile, "legal action")
        };
        assert_eq!(
            check_escalation(&i).reasons,
            vec![
                "Negative sentiment detected: angry",
                REASON_URGENT,
                REASON_COMPLEX_QUERY,
                REASON_PURCHASE_READY,
            ]
        );
    }

    #[test]
    fn calm_email_is_not_escalated() {
        let r = readiness(0.3);
        let profile = ClientProfile::new("a@b.com");
        let escalation = check_escalation(&inputs(&r, &profile, "Ile kosztuje safari?"));
        assert!(!escalation.is_escalated());
        assert_eq!(escalation.apply_to(Priority::Medium), Priority::Medium);
    }
}
