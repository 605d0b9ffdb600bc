//! Data models for Lifeline.
//!
//! # Auditability Guarantees
//!
//! All types in this module are designed to be **auditable by construction**.
//! A crisis alert carries the complete evidence that produced it:
//!
//! - Every scored signal is retained as a [`RiskFactor`]
//! - Level changes are appended as [`LevelTransition`] records, never mutated
//! - Every dispatched action leaves a [`CrisisIntervention`] record,
//!   including skips and failures
//!
//! If an alert is ever reviewed after the fact, the full chain from raw
//! signal to intervention outcome can be reconstructed from these records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered crisis severity classification.
///
/// Drives the escalation protocol (response-time SLA, interventions,
/// monitoring cadence). The ordering is total and escalation only ever
/// moves forward; the only way out of an open alert is explicit resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrisisLevel {
    /// Score below the alerting threshold. No alert is opened.
    None,
    /// Mild concern. Automated check-in within the hour.
    Low,
    /// Moderate concern. Check-in plus peer support within 30 minutes.
    Medium,
    /// Serious risk. Counselor assignment within 10 minutes.
    High,
    /// Immediate danger. Full response within 3 minutes.
    Critical,
}

impl CrisisLevel {
    /// Map a clamped [0,100] risk score to a level.
    ///
    /// # Bands
    ///
    /// - `[0, 30)` → `None`
    /// - `[30, 50)` → `Low`
    /// - `[50, 75)` → `Medium`
    /// - `[75, 90)` → `High`
    /// - `[90, 100]` → `Critical`
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            CrisisLevel::Critical
        } else if score >= 75.0 {
            CrisisLevel::High
        } else if score >= 50.0 {
            CrisisLevel::Medium
        } else if score >= 30.0 {
            CrisisLevel::Low
        } else {
            CrisisLevel::None
        }
    }

    /// The next level up, saturating at `Critical`.
    pub fn next(&self) -> Self {
        match self {
            CrisisLevel::None => CrisisLevel::Low,
            CrisisLevel::Low => CrisisLevel::Medium,
            CrisisLevel::Medium => CrisisLevel::High,
            CrisisLevel::High | CrisisLevel::Critical => CrisisLevel::Critical,
        }
    }

    /// Whether a score at this level opens an alert.
    pub fn is_actionable(&self) -> bool {
        *self >= CrisisLevel::Low
    }

    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            CrisisLevel::None => "none",
            CrisisLevel::Low => "low",
            CrisisLevel::Medium => "medium",
            CrisisLevel::High => "high",
            CrisisLevel::Critical => "critical",
        }
    }

    /// Parse a stored label back into a level.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(CrisisLevel::None),
            "low" => Some(CrisisLevel::Low),
            "medium" => Some(CrisisLevel::Medium),
            "high" => Some(CrisisLevel::High),
            "critical" => Some(CrisisLevel::Critical),
            _ => None,
        }
    }
}

/// Which signal channel a risk factor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Free-text content from the session.
    Text,
    /// Wearable or device biometric readings.
    Biometric,
    /// Derived emotion scores.
    Emotion,
    /// Session context (history, duration, session type).
    Context,
}

impl SignalSource {
    pub fn label(&self) -> &'static str {
        match self {
            SignalSource::Text => "text",
            SignalSource::Biometric => "biometric",
            SignalSource::Emotion => "emotion",
            SignalSource::Context => "context",
        }
    }
}

/// What raised the alert in the first place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Automated behavioral signal detection during a session.
    BehavioralSignal,
    /// The person asked for help themselves.
    SelfReport,
    /// A third party (family member, therapist) reported concern.
    ThirdPartyReport,
}

impl TriggerSource {
    pub fn label(&self) -> &'static str {
        match self {
            TriggerSource::BehavioralSignal => "behavioral_signal",
            TriggerSource::SelfReport => "self_report",
            TriggerSource::ThirdPartyReport => "third_party_report",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "behavioral_signal" => Some(TriggerSource::BehavioralSignal),
            "self_report" => Some(TriggerSource::SelfReport),
            "third_party_report" => Some(TriggerSource::ThirdPartyReport),
            _ => None,
        }
    }
}

/// A single scored signal contributing to the overall crisis score.
///
/// Immutable once produced. The full list is attached to the alert so the
/// classification can be audited later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    /// The channel that produced this factor.
    pub source: SignalSource,

    /// Human-readable description, e.g. "direct crisis language".
    pub label: String,

    /// Points contributed to the channel score (0–100 pre-weighting).
    pub contribution: f64,
}

impl RiskFactor {
    pub fn new(source: SignalSource, label: &str, contribution: f64) -> Self {
        Self {
            source,
            label: label.to_string(),
            contribution,
        }
    }
}

/// One recorded level change on an alert. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelTransition {
    pub from: CrisisLevel,
    pub to: CrisisLevel,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// The central entity: one open (or resolved) crisis for one person.
///
/// An alert has exactly one current level at any time. Level changes are
/// recorded as transitions, never rewritten. A resolved alert is terminal;
/// renewed risk for the same person opens a *new* alert that references
/// this one via `previous_alert_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisAlert {
    pub id: Uuid,
    pub user_id: String,

    /// Current severity level.
    pub level: CrisisLevel,

    /// Weighted risk score in [0, 100] at assessment time.
    pub score: f64,

    /// Which channel raised the alert.
    pub trigger_source: TriggerSource,

    /// Scored signals retained for audit.
    pub risk_factors: Vec<RiskFactor>,

    /// Factors that reduced the effective score (never below 0).
    pub protective_factors: Vec<String>,

    /// Level history, oldest first. The first entry records the opening.
    pub transitions: Vec<LevelTransition>,

    /// Set when the text contained explicit plan / active-attempt language.
    /// Selects the override row of the escalation protocol at `Critical`.
    pub imminent_danger: bool,

    /// The resolved alert this one reopened from, if any.
    pub previous_alert_id: Option<Uuid>,

    /// Intervention types already triggered for this alert. Append-only;
    /// used to keep protocol execution idempotent.
    pub interventions_triggered: Vec<InterventionType>,

    pub created_at: DateTime<Utc>,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,

    /// Who resolved the alert ("counselor:<id>", "system:expiry", ...).
    pub resolved_by: Option<String>,
}

impl CrisisAlert {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// A standing, per-user document of coping resources consulted during
/// a crisis. Independent of any single alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyPlan {
    pub user_id: String,
    pub warning_signs: Vec<String>,
    pub coping_strategies: Vec<String>,
    pub support_contacts: Vec<String>,
    pub professional_contacts: Vec<String>,
    pub emergency_numbers: Vec<String>,

    /// How many times the plan has been activated by a crisis.
    pub activation_count: i64,

    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Preferred channel for reaching a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactChannel {
    Sms,
    Email,
    Phone,
}

impl ContactChannel {
    pub fn label(&self) -> &'static str {
        match self {
            ContactChannel::Sms => "sms",
            ContactChannel::Email => "email",
            ContactChannel::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sms" => Some(ContactChannel::Sms),
            "email" => Some(ContactChannel::Email),
            "phone" => Some(ContactChannel::Phone),
            _ => None,
        }
    }
}

/// One person in a user's emergency contact list.
///
/// Contacts are dispatched strictly in `priority` order (1 = first) and
/// **only** when `consent_to_contact` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub relationship: String,
    pub phone: String,

    /// 1 = first to try. Ordering is stable and deterministic.
    pub priority: i64,

    pub preferred_channel: ContactChannel,

    /// Reachable at any hour; otherwise the 08:00–22:00 window applies.
    pub available_24_7: bool,

    /// Contacts without consent are never dispatched.
    pub consent_to_contact: bool,
}

/// Availability of a counselor in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounselorStatus {
    Available,
    Busy,
    Offline,
}

impl CounselorStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CounselorStatus::Available => "available",
            CounselorStatus::Busy => "busy",
            CounselorStatus::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(CounselorStatus::Available),
            "busy" => Some(CounselorStatus::Busy),
            "offline" => Some(CounselorStatus::Offline),
            _ => None,
        }
    }
}

/// A crisis counselor in the shared assignment pool.
///
/// Invariant: `current_load <= max_load` at all times. Assignment is a
/// conditional claim in storage, so concurrent assignments can never push
/// the load past the maximum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisCounselor {
    pub id: String,
    pub name: String,
    pub status: CounselorStatus,
    pub current_load: i64,
    pub max_load: i64,

    /// Historical average time to first response, in minutes. Used as the
    /// tie-breaker when two counselors carry the same load.
    pub avg_response_minutes: f64,
}

/// The kinds of intervention the dispatcher can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    AutomatedCheckIn,
    PeerSupport,
    CounselorAssignment,
    TherapistAlert,
    EmergencyContactCascade,
    SafetyPlanActivation,
    EmergencyServicesHandoff,
}

impl InterventionType {
    pub fn label(&self) -> &'static str {
        match self {
            InterventionType::AutomatedCheckIn => "automated_check_in",
            InterventionType::PeerSupport => "peer_support",
            InterventionType::CounselorAssignment => "counselor_assignment",
            InterventionType::TherapistAlert => "therapist_alert",
            InterventionType::EmergencyContactCascade => "emergency_contact_cascade",
            InterventionType::SafetyPlanActivation => "safety_plan_activation",
            InterventionType::EmergencyServicesHandoff => "emergency_services_handoff",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "automated_check_in" => Some(InterventionType::AutomatedCheckIn),
            "peer_support" => Some(InterventionType::PeerSupport),
            "counselor_assignment" => Some(InterventionType::CounselorAssignment),
            "therapist_alert" => Some(InterventionType::TherapistAlert),
            "emergency_contact_cascade" => Some(InterventionType::EmergencyContactCascade),
            "safety_plan_activation" => Some(InterventionType::SafetyPlanActivation),
            "emergency_services_handoff" => Some(InterventionType::EmergencyServicesHandoff),
            _ => None,
        }
    }
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionOutcome {
    /// Message handed to the delivery channel successfully.
    Delivered,
    /// A counselor was claimed for this alert.
    Assigned,
    /// Prepared but held for human verification (emergency services).
    Staged,
    /// Intentionally not attempted (no consent, outside hours).
    Skipped,
    /// Attempted and failed; recorded, never thrown.
    Failed,
}

impl InterventionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InterventionOutcome::Delivered => "delivered",
            InterventionOutcome::Assigned => "assigned",
            InterventionOutcome::Staged => "staged",
            InterventionOutcome::Skipped => "skipped",
            InterventionOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivered" => Some(InterventionOutcome::Delivered),
            "assigned" => Some(InterventionOutcome::Assigned),
            "staged" => Some(InterventionOutcome::Staged),
            "skipped" => Some(InterventionOutcome::Skipped),
            "failed" => Some(InterventionOutcome::Failed),
            _ => None,
        }
    }
}

/// One record per dispatched action. Owned by its parent alert; never
/// exists independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisIntervention {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub kind: InterventionType,
    pub channel: Option<ContactChannel>,

    /// Who or what was targeted (contact name, counselor id, ...).
    pub target: Option<String>,

    /// Human-readable description of what was attempted.
    pub detail: String,

    pub outcome: InterventionOutcome,

    /// True when a human must confirm before the action completes
    /// (always set for emergency-services handoffs).
    pub follow_up_required: bool,

    pub initiated_at: DateTime<Utc>,

    /// Stamped when the person replies to this intervention.
    pub responded_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Boundary records (assessment input and engine results)
// ============================================================================

/// Biometric readings from a wearable or device. All fields optional;
/// missing readings contribute zero risk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BiometricReading {
    /// Beats per minute.
    pub heart_rate: Option<f64>,

    /// Device-reported stress category: "elevated", "high", or "critical".
    pub stress_level: Option<String>,

    /// Heart-rate variability in milliseconds.
    pub hrv: Option<f64>,

    /// Blood oxygen saturation percentage.
    pub oxygen_saturation: Option<f64>,
}

/// One derived emotion with its model confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionScore {
    pub emotion: String,
    pub confidence: f64,
}

/// Session context around the assessment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    /// e.g. "therapy", "check_in", "crisis".
    pub session_kind: Option<String>,

    pub duration_minutes: Option<u32>,

    /// How many prior crisis alerts this person has had.
    #[serde(default)]
    pub prior_crisis_count: u32,
}

/// Request body for POST /assess.
#[derive(Debug, Clone, Deserialize)]
pub struct AssessmentRequest {
    pub user_id: String,
    pub text: Option<String>,
    pub biometrics: Option<BiometricReading>,
    #[serde(default)]
    pub emotions: Vec<EmotionScore>,
    pub context: Option<SessionContext>,
    #[serde(default = "default_trigger")]
    pub trigger: TriggerSource,
    #[serde(default)]
    pub protective_factors: Vec<String>,
}

fn default_trigger() -> TriggerSource {
    TriggerSource::BehavioralSignal
}

/// Result of one risk assessment.
#[derive(Debug, Clone, Serialize)]
pub struct CrisisAnalysisResult {
    /// Weighted score in [0, 100].
    pub score: f64,

    /// Classified level after the override floor is applied.
    pub level: CrisisLevel,

    pub risk_factors: Vec<RiskFactor>,

    /// True at `High` or above.
    pub immediate_action_required: bool,

    /// The alert opened by this assessment, when level >= `Low`.
    pub alert_id: Option<Uuid>,

    /// Protocol entry that will drive the response, when one applies.
    pub escalation_protocol: Option<crate::protocol::ProtocolEntry>,

    /// Set only when the engine is degraded and fell back to the
    /// hard-coded emergency response.
    pub fallback_message: Option<String>,
}

/// Result of executing (or re-executing) an alert's protocol.
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolExecutionResult {
    pub alert_id: Uuid,
    pub interventions_triggered: Vec<InterventionType>,
    pub emergency_contacts_used: Vec<String>,
}

/// Risk tier read out of a person's reply to an intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseRisk {
    Low,
    Medium,
    High,
}

/// A support resource handed out with every follow-up plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportResource {
    pub name: String,
    pub contact: String,
    pub availability: String,
}

/// What happens next after a person replies to an intervention.
#[derive(Debug, Clone, Serialize)]
pub struct FollowUpPlan {
    pub risk: ResponseRisk,
    pub next_check_in: DateTime<Utc>,
    pub resources: Vec<SupportResource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_bands() {
        assert_eq!(CrisisLevel::from_score(0.0), CrisisLevel::None);
        assert_eq!(CrisisLevel::from_score(29.9), CrisisLevel::None);
        assert_eq!(CrisisLevel::from_score(30.0), CrisisLevel::Low);
        assert_eq!(CrisisLevel::from_score(49.9), CrisisLevel::Low);
        assert_eq!(CrisisLevel::from_score(50.0), CrisisLevel::Medium);
        assert_eq!(CrisisLevel::from_score(74.9), CrisisLevel::Medium);
        assert_eq!(CrisisLevel::from_score(75.0), CrisisLevel::High);
        assert_eq!(CrisisLevel::from_score(89.9), CrisisLevel::High);
        assert_eq!(CrisisLevel::from_score(90.0), CrisisLevel::Critical);
        assert_eq!(CrisisLevel::from_score(100.0), CrisisLevel::Critical);
    }

    #[test]
    fn test_level_ordering() {
        assert!(CrisisLevel::None < CrisisLevel::Low);
        assert!(CrisisLevel::Low < CrisisLevel::Medium);
        assert!(CrisisLevel::Medium < CrisisLevel::High);
        assert!(CrisisLevel::High < CrisisLevel::Critical);
    }

    #[test]
    fn test_level_next_saturates() {
        assert_eq!(CrisisLevel::High.next(), CrisisLevel::Critical);
        assert_eq!(CrisisLevel::Critical.next(), CrisisLevel::Critical);
    }

    #[test]
    fn test_level_label_round_trip() {
        for level in [
            CrisisLevel::None,
            CrisisLevel::Low,
            CrisisLevel::Medium,
            CrisisLevel::High,
            CrisisLevel::Critical,
        ] {
            assert_eq!(CrisisLevel::parse(level.label()), Some(level));
        }
    }

    #[test]
    fn test_intervention_type_round_trip() {
        for kind in [
            InterventionType::AutomatedCheckIn,
            InterventionType::PeerSupport,
            InterventionType::CounselorAssignment,
            InterventionType::TherapistAlert,
            InterventionType::EmergencyContactCascade,
            InterventionType::SafetyPlanActivation,
            InterventionType::EmergencyServicesHandoff,
        ] {
            assert_eq!(InterventionType::parse(kind.label()), Some(kind));
        }
    }

    #[test]
    fn test_actionable_threshold() {
        assert!(!CrisisLevel::None.is_actionable());
        assert!(CrisisLevel::Low.is_actionable());
        assert!(CrisisLevel::Critical.is_actionable());
    }
}
