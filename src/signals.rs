//! Signal normalization: raw multi-source input to scored risk factors.
//!
//! Each channel (text, biometric, emotion, context) is scored independently
//! on a 0–100 scale before the scorer applies channel weights. Everything in
//! this module is a pure function of its inputs; missing channels simply
//! contribute nothing rather than failing the assessment.
//!
//! Keyword lists and point values are preserved calibration constants, not a
//! validated clinical model. Treat them as a starting default.

use crate::model::{
    BiometricReading, EmotionScore, RiskFactor, SessionContext, SignalSource,
};

/// Per-channel ceiling; scores are additive and clamped here.
const CHANNEL_MAX: f64 = 100.0;

// ── Text channel constants ──────────────────────────────────

/// Direct crisis language. Any match also floors the final level at High.
const DIRECT_CRISIS_PHRASES: &[&str] = &[
    "kill myself",
    "end my life",
    "end it all",
    "suicide",
    "want to die",
    "better off dead",
    "take my own life",
];

/// Self-harm language.
const SELF_HARM_PHRASES: &[&str] = &[
    "hurt myself",
    "cut myself",
    "cutting",
    "self harm",
    "self-harm",
    "overdose",
    "harming myself",
];

/// General concerning language.
const CONCERNING_PHRASES: &[&str] = &[
    "hopeless",
    "worthless",
    "no point",
    "give up",
    "can't go on",
    "unbearable",
    "trapped",
    "burden to everyone",
];

/// Despair, isolation, and overwhelm phrasings.
const DISTRESS_PATTERNS: &[&str] = &[
    "no one cares",
    "nobody cares",
    "no one would miss me",
    "nobody would miss me",
    "completely alone",
    "can't take it anymore",
    "can't do this anymore",
    "everyone would be better off",
    "nothing matters anymore",
    "too much to handle",
];

/// Explicit plan / active-attempt language. A match floors the final level
/// at Critical and selects the imminent-override protocol row.
const IMMINENT_DANGER_PHRASES: &[&str] = &[
    "i have a plan",
    "i'm going to kill myself",
    "im going to kill myself",
    "tonight is the night",
    "pills in my hand",
    "wrote my note",
    "goodbye forever",
    "about to end it",
];

const DIRECT_CRISIS_POINTS: f64 = 40.0;
const SELF_HARM_POINTS: f64 = 25.0;
const CONCERNING_POINTS: f64 = 10.0;
const DISTRESS_PATTERN_POINTS: f64 = 15.0;

/// Messages over this length with any nonzero score get a fixed bonus,
/// modeling sustained distressed communication.
const SUSTAINED_LENGTH_THRESHOLD: usize = 280;
const SUSTAINED_LENGTH_POINTS: f64 = 10.0;

/// Risk-factor label for direct crisis language. The scorer keys its High
/// floor off this label.
pub const LABEL_DIRECT_CRISIS: &str = "direct crisis language";

/// Risk-factor label for explicit plan / active-attempt language. The scorer
/// keys its Critical floor off this label.
pub const LABEL_IMMINENT_DANGER: &str = "explicit plan or imminent danger";

// ── Biometric channel constants ─────────────────────────────

const STRESS_CRITICAL_POINTS: f64 = 30.0;
const STRESS_HIGH_POINTS: f64 = 20.0;
const STRESS_ELEVATED_POINTS: f64 = 10.0;

const HEART_RATE_HIGH_BPM: f64 = 130.0;
const HEART_RATE_LOW_BPM: f64 = 50.0;
const HEART_RATE_POINTS: f64 = 25.0;

const HRV_LOW_MS: f64 = 20.0;
const HRV_LOW_POINTS: f64 = 15.0;

const OXYGEN_LOW_PCT: f64 = 92.0;
const OXYGEN_LOW_POINTS: f64 = 20.0;

// ── Emotion channel constants ───────────────────────────────

const SADNESS_CONFIDENCE_CUTOFF: f64 = 0.8;
const SADNESS_POINTS: f64 = 25.0;
const ANGER_CONFIDENCE_CUTOFF: f64 = 0.8;
const ANGER_POINTS: f64 = 20.0;
const FEAR_CONFIDENCE_CUTOFF: f64 = 0.75;
const FEAR_POINTS: f64 = 20.0;
const DESPAIR_CONFIDENCE_CUTOFF: f64 = 0.7;
const DESPAIR_POINTS: f64 = 30.0;

/// Three or more emotions above this confidence at once indicate emotional
/// instability.
const INSTABILITY_CONFIDENCE_CUTOFF: f64 = 0.6;
const INSTABILITY_MIN_EMOTIONS: usize = 3;
const INSTABILITY_POINTS: f64 = 15.0;

// ── Context channel constants ───────────────────────────────

const PRIOR_CRISIS_POINTS_EACH: f64 = 10.0;
const PRIOR_CRISIS_POINTS_CAP: f64 = 30.0;
const LONG_SESSION_MINUTES: u32 = 90;
const LONG_SESSION_POINTS: f64 = 10.0;
const CRISIS_SESSION_POINTS: f64 = 25.0;

/// One channel's normalized output: its clamped score and the factors
/// behind it.
#[derive(Debug, Clone, Default)]
pub struct ChannelScore {
    pub score: f64,
    pub factors: Vec<RiskFactor>,
}

impl ChannelScore {
    fn push(&mut self, source: SignalSource, label: &str, points: f64) {
        self.score += points;
        self.factors.push(RiskFactor::new(source, label, points));
    }

    fn clamp(mut self) -> Self {
        self.score = self.score.clamp(0.0, CHANNEL_MAX);
        self
    }
}

/// Score the free-text channel.
///
/// Phrase matching is case-insensitive substring matching against three
/// severity tiers plus distress phrasings; scores are additive and clamped
/// to 100. Matches of direct-crisis or imminent-danger phrases are tagged
/// with well-known labels the scorer uses for its override floor.
pub fn score_text(text: Option<&str>) -> ChannelScore {
    let mut channel = ChannelScore::default();

    let Some(text) = text else {
        return channel;
    };
    let lower = text.to_lowercase();

    for phrase in IMMINENT_DANGER_PHRASES {
        if lower.contains(phrase) {
            channel.push(SignalSource::Text, LABEL_IMMINENT_DANGER, DIRECT_CRISIS_POINTS);
            break; // one floor factor is enough
        }
    }

    for phrase in DIRECT_CRISIS_PHRASES {
        if lower.contains(phrase) {
            channel.push(SignalSource::Text, LABEL_DIRECT_CRISIS, DIRECT_CRISIS_POINTS);
        }
    }

    for phrase in SELF_HARM_PHRASES {
        if lower.contains(phrase) {
            channel.push(SignalSource::Text, "self-harm language", SELF_HARM_POINTS);
        }
    }

    for phrase in CONCERNING_PHRASES {
        if lower.contains(phrase) {
            channel.push(SignalSource::Text, "concerning language", CONCERNING_POINTS);
        }
    }

    for pattern in DISTRESS_PATTERNS {
        if lower.contains(pattern) {
            channel.push(
                SignalSource::Text,
                "despair or isolation phrasing",
                DISTRESS_PATTERN_POINTS,
            );
        }
    }

    if text.len() > SUSTAINED_LENGTH_THRESHOLD && channel.score > 0.0 {
        channel.push(
            SignalSource::Text,
            "sustained distressed communication",
            SUSTAINED_LENGTH_POINTS,
        );
    }

    channel.clamp()
}

/// Score the biometric channel from stress category and vital thresholds.
pub fn score_biometrics(biometrics: Option<&BiometricReading>) -> ChannelScore {
    let mut channel = ChannelScore::default();

    let Some(reading) = biometrics else {
        return channel;
    };

    if let Some(stress) = reading.stress_level.as_deref() {
        match stress.to_lowercase().as_str() {
            "critical" => {
                channel.push(SignalSource::Biometric, "critical stress level", STRESS_CRITICAL_POINTS)
            }
            "high" => channel.push(SignalSource::Biometric, "high stress level", STRESS_HIGH_POINTS),
            "elevated" => {
                channel.push(SignalSource::Biometric, "elevated stress level", STRESS_ELEVATED_POINTS)
            }
            _ => {}
        }
    }

    if let Some(hr) = reading.heart_rate {
        if hr > HEART_RATE_HIGH_BPM {
            channel.push(SignalSource::Biometric, "heart rate above 130 bpm", HEART_RATE_POINTS);
        } else if hr < HEART_RATE_LOW_BPM && hr > 0.0 {
            channel.push(SignalSource::Biometric, "heart rate below 50 bpm", HEART_RATE_POINTS);
        }
    }

    if let Some(hrv) = reading.hrv
        && hrv < HRV_LOW_MS
        && hrv > 0.0
    {
        channel.push(SignalSource::Biometric, "low heart-rate variability", HRV_LOW_POINTS);
    }

    if let Some(oxygen) = reading.oxygen_saturation
        && oxygen < OXYGEN_LOW_PCT
        && oxygen > 0.0
    {
        channel.push(SignalSource::Biometric, "low oxygen saturation", OXYGEN_LOW_POINTS);
    }

    channel.clamp()
}

/// Score the emotion channel from per-emotion confidence thresholds.
pub fn score_emotions(emotions: &[EmotionScore]) -> ChannelScore {
    let mut channel = ChannelScore::default();

    for entry in emotions {
        let points = match entry.emotion.to_lowercase().as_str() {
            "sadness" if entry.confidence > SADNESS_CONFIDENCE_CUTOFF => Some(SADNESS_POINTS),
            "anger" if entry.confidence > ANGER_CONFIDENCE_CUTOFF => Some(ANGER_POINTS),
            "fear" if entry.confidence > FEAR_CONFIDENCE_CUTOFF => Some(FEAR_POINTS),
            "despair" | "hopelessness" if entry.confidence > DESPAIR_CONFIDENCE_CUTOFF => {
                Some(DESPAIR_POINTS)
            }
            _ => None,
        };

        if let Some(points) = points {
            let label = format!("strong {} signal", entry.emotion.to_lowercase());
            channel.push(SignalSource::Emotion, &label, points);
        }
    }

    let elevated = emotions
        .iter()
        .filter(|e| e.confidence > INSTABILITY_CONFIDENCE_CUTOFF)
        .count();
    if elevated >= INSTABILITY_MIN_EMOTIONS {
        channel.push(SignalSource::Emotion, "emotional instability", INSTABILITY_POINTS);
    }

    channel.clamp()
}

/// Score the context channel from session history and shape.
pub fn score_context(context: Option<&SessionContext>) -> ChannelScore {
    let mut channel = ChannelScore::default();

    let Some(ctx) = context else {
        return channel;
    };

    if ctx.prior_crisis_count > 0 {
        let points =
            (f64::from(ctx.prior_crisis_count) * PRIOR_CRISIS_POINTS_EACH).min(PRIOR_CRISIS_POINTS_CAP);
        channel.push(SignalSource::Context, "prior crisis history", points);
    }

    if let Some(duration) = ctx.duration_minutes
        && duration > LONG_SESSION_MINUTES
    {
        channel.push(SignalSource::Context, "unusually long session", LONG_SESSION_POINTS);
    }

    if ctx.session_kind.as_deref() == Some("crisis") {
        channel.push(SignalSource::Context, "session flagged as crisis", CRISIS_SESSION_POINTS);
    }

    channel.clamp()
}
