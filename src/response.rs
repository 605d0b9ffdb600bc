//! Response analysis: re-scoring a person's reply to an intervention.
//!
//! A reply either closes the loop (reassurance language) or feeds back
//! into the lifecycle manager for re-escalation (renewed risk language).
//! Either way the person gets a follow-up plan with a next check-in time
//! and the fixed crisis resources.

use chrono::{DateTime, Duration, Utc};

use crate::model::{FollowUpPlan, ResponseRisk, SupportResource};

/// Renewed high-risk language. Any match forces the high tier.
const HIGH_RISK_REPLIES: &[&str] = &[
    "still want to die",
    "don't want help",
    "dont want help",
    "leave me alone to die",
    "too late",
    "goodbye",
    "no reason to stay",
];

/// Ambivalent or still-struggling language.
const MEDIUM_RISK_REPLIES: &[&str] = &[
    "not sure",
    "maybe",
    "don't know",
    "dont know",
    "still hurting",
    "can't sleep",
    "cant sleep",
];

/// Reassurance language; reduces the delta.
const POSITIVE_REPLIES: &[&str] = &[
    "feeling better",
    "thank you",
    "that helps",
    "i'm safe",
    "im safe",
    "talked to",
];

const HIGH_RISK_DELTA: f64 = 30.0;
const MEDIUM_RISK_DELTA: f64 = 10.0;
const POSITIVE_DELTA: f64 = -15.0;

const DELTA_MIN: f64 = -50.0;
const DELTA_MAX: f64 = 100.0;

/// Hours until the next check-in, by risk tier.
const HIGH_CHECK_IN_HOURS: i64 = 2;
const MEDIUM_CHECK_IN_HOURS: i64 = 6;
const LOW_CHECK_IN_HOURS: i64 = 24;

/// What a reply told us.
#[derive(Debug, Clone)]
pub struct ResponseAnalysis {
    pub risk: ResponseRisk,

    /// Bounded score delta in [-50, 100].
    pub delta: f64,

    /// Phrases that matched, for the audit trail.
    pub matched: Vec<String>,
}

/// Score a reply against the three keyword tiers.
///
/// Any high-risk match forces the high tier regardless of how much
/// reassurance language surrounds it.
pub fn analyze(text: &str) -> ResponseAnalysis {
    let lower = text.to_lowercase();
    let mut delta = 0.0;
    let mut matched = Vec::new();
    let mut high_hit = false;

    for phrase in HIGH_RISK_REPLIES {
        if lower.contains(phrase) {
            delta += HIGH_RISK_DELTA;
            matched.push(phrase.to_string());
            high_hit = true;
        }
    }
    for phrase in MEDIUM_RISK_REPLIES {
        if lower.contains(phrase) {
            delta += MEDIUM_RISK_DELTA;
            matched.push(phrase.to_string());
        }
    }
    for phrase in POSITIVE_REPLIES {
        if lower.contains(phrase) {
            delta += POSITIVE_DELTA;
            matched.push(phrase.to_string());
        }
    }

    let delta = delta.clamp(DELTA_MIN, DELTA_MAX);

    let risk = if high_hit || delta >= HIGH_RISK_DELTA {
        ResponseRisk::High
    } else if delta >= MEDIUM_RISK_DELTA {
        ResponseRisk::Medium
    } else {
        ResponseRisk::Low
    };

    ResponseAnalysis { risk, delta, matched }
}

/// Build the follow-up plan for a reply: next check-in by tier plus the
/// fixed resource list.
pub fn follow_up_plan(risk: ResponseRisk, now: DateTime<Utc>) -> FollowUpPlan {
    let hours = match risk {
        ResponseRisk::High => HIGH_CHECK_IN_HOURS,
        ResponseRisk::Medium => MEDIUM_CHECK_IN_HOURS,
        ResponseRisk::Low => LOW_CHECK_IN_HOURS,
    };

    FollowUpPlan {
        risk,
        next_check_in: now + Duration::hours(hours),
        resources: default_resources(),
    }
}

/// The resources handed out with every follow-up plan, whatever the tier.
pub fn default_resources() -> Vec<SupportResource> {
    vec![
        SupportResource {
            name: "988 Suicide & Crisis Lifeline".to_string(),
            contact: "call or text 988".to_string(),
            availability: "24/7".to_string(),
        },
        SupportResource {
            name: "Crisis Text Line".to_string(),
            contact: "text HOME to 741741".to_string(),
            availability: "24/7".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_risk_reply() {
        let analysis = analyze("I still want to die, nothing changed");
        assert_eq!(analysis.risk, ResponseRisk::High);
        assert!(analysis.delta >= HIGH_RISK_DELTA);
    }

    #[test]
    fn test_high_risk_not_diluted_by_reassurance() {
        let analysis = analyze("thank you but it's too late, i'm safe nowhere");
        // "too late" forces high even with positive matches in the text
        assert_eq!(analysis.risk, ResponseRisk::High);
    }

    #[test]
    fn test_medium_risk_reply() {
        let analysis = analyze("I'm not sure... still hurting a lot");
        assert_eq!(analysis.risk, ResponseRisk::Medium);
        assert_eq!(analysis.delta, 2.0 * MEDIUM_RISK_DELTA);
    }

    #[test]
    fn test_positive_reply() {
        let analysis = analyze("Feeling better today, thank you, that helps");
        assert_eq!(analysis.risk, ResponseRisk::Low);
        assert!(analysis.delta < 0.0);
    }

    #[test]
    fn test_neutral_reply_is_low() {
        let analysis = analyze("ok");
        assert_eq!(analysis.risk, ResponseRisk::Low);
        assert_eq!(analysis.delta, 0.0);
        assert!(analysis.matched.is_empty());
    }

    #[test]
    fn test_delta_is_bounded() {
        let pile_on = HIGH_RISK_REPLIES.join(" and ");
        let analysis = analyze(&pile_on);
        assert!(analysis.delta <= DELTA_MAX);

        let all_positive = POSITIVE_REPLIES.join(" ");
        let analysis = analyze(&all_positive);
        assert!(analysis.delta >= DELTA_MIN);
    }

    #[test]
    fn test_check_in_times_by_tier() {
        let now = Utc::now();
        assert_eq!(
            follow_up_plan(ResponseRisk::High, now).next_check_in,
            now + Duration::hours(2)
        );
        assert_eq!(
            follow_up_plan(ResponseRisk::Medium, now).next_check_in,
            now + Duration::hours(6)
        );
        assert_eq!(
            follow_up_plan(ResponseRisk::Low, now).next_check_in,
            now + Duration::hours(24)
        );
    }

    #[test]
    fn test_resources_always_include_hotlines() {
        for risk in [ResponseRisk::Low, ResponseRisk::Medium, ResponseRisk::High] {
            let plan = follow_up_plan(risk, Utc::now());
            assert!(plan.resources.iter().any(|r| r.contact.contains("988")));
            assert!(plan.resources.iter().any(|r| r.contact.contains("741741")));
        }
    }
}
