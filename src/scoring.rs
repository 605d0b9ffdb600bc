//! Risk scoring: weighted combination of channel scores into a crisis level.
//!
//! The scoring function is a deliberately simple, auditable weighted sum,
//! not a learned classifier. The 40/30/20/10 split is a preserved
//! calibration constant.

use crate::model::{
    AssessmentRequest, CrisisLevel, RiskFactor,
};
use crate::signals::{
    self, LABEL_DIRECT_CRISIS, LABEL_IMMINENT_DANGER,
};

/// Channel weights. Must sum to 1.0 (asserted in tests).
pub const TEXT_WEIGHT: f64 = 0.4;
pub const BIOMETRIC_WEIGHT: f64 = 0.3;
pub const EMOTION_WEIGHT: f64 = 0.2;
pub const CONTEXT_WEIGHT: f64 = 0.1;

/// Points removed from the weighted score per protective factor.
const PROTECTIVE_FACTOR_POINTS: f64 = 5.0;

/// A scored assessment before any alert is opened.
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    /// Weighted score in [0, 100], after protective adjustment.
    pub score: f64,

    /// Level after the override floor is applied.
    pub level: CrisisLevel,

    /// All contributing factors across channels, in channel order.
    pub risk_factors: Vec<RiskFactor>,

    /// True when the text carried explicit plan / active-attempt language.
    pub imminent_danger: bool,
}

/// Normalize and score a full assessment request.
///
/// Channels are scored independently, clamped to [0,100], weighted, and
/// summed. Protective factors subtract a fixed amount each (never below 0).
/// The level comes from the score bands, then the override floor is
/// applied: direct crisis language forces at least `High`, explicit
/// plan/attempt language forces `Critical`. Severity language is never
/// diluted by averaging with calmer channels.
pub fn assess(request: &AssessmentRequest) -> RiskAssessment {
    let text = signals::score_text(request.text.as_deref());
    let biometric = signals::score_biometrics(request.biometrics.as_ref());
    let emotion = signals::score_emotions(&request.emotions);
    let context = signals::score_context(request.context.as_ref());

    let weighted = TEXT_WEIGHT * text.score
        + BIOMETRIC_WEIGHT * biometric.score
        + EMOTION_WEIGHT * emotion.score
        + CONTEXT_WEIGHT * context.score;

    let protective = PROTECTIVE_FACTOR_POINTS * request.protective_factors.len() as f64;
    let score = (weighted - protective).clamp(0.0, 100.0);

    let mut risk_factors = text.factors;
    risk_factors.extend(biometric.factors);
    risk_factors.extend(emotion.factors);
    risk_factors.extend(context.factors);

    let (level, imminent_danger) = apply_override_floor(CrisisLevel::from_score(score), &risk_factors);

    RiskAssessment {
        score,
        level,
        risk_factors,
        imminent_danger,
    }
}

/// Raise the band-derived level to the forced floor when severity language
/// is present. The floor never lowers a level.
fn apply_override_floor(banded: CrisisLevel, factors: &[RiskFactor]) -> (CrisisLevel, bool) {
    let imminent = factors.iter().any(|f| f.label == LABEL_IMMINENT_DANGER);
    let direct = factors.iter().any(|f| f.label == LABEL_DIRECT_CRISIS);

    let level = if imminent {
        banded.max(CrisisLevel::Critical)
    } else if direct {
        banded.max(CrisisLevel::High)
    } else {
        banded
    };

    (level, imminent)
}
