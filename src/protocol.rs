//! The escalation protocol table.
//!
//! A static mapping from crisis level to the maximum response time, the
//! ordered intervention steps to trigger, and the monitoring cadence while
//! the alert remains open. The response-time figure is the SLA for the
//! first zero-delay step, not the full cascade.

use chrono::Duration;
use serde::Serialize;

use crate::model::{CrisisLevel, InterventionType};

/// Version stamp recorded with protocol-driven audit entries, bumped when
/// the table changes.
pub const PROTOCOL_VERSION: &str = "2026.1";

/// How often an open alert is re-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringCadence {
    Daily,
    EveryFourHours,
    Hourly,
    Continuous,
}

impl MonitoringCadence {
    /// Tick interval for the scheduler. Continuous monitoring is modeled
    /// as a five-minute cycle.
    pub fn interval(&self) -> Duration {
        match self {
            MonitoringCadence::Daily => Duration::hours(24),
            MonitoringCadence::EveryFourHours => Duration::hours(4),
            MonitoringCadence::Hourly => Duration::hours(1),
            MonitoringCadence::Continuous => Duration::minutes(5),
        }
    }
}

/// One intervention step in a protocol entry. A non-zero delay is handed
/// to the scheduler instead of running inline.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProtocolStep {
    pub intervention: InterventionType,
    pub delay_minutes: i64,
}

impl ProtocolStep {
    const fn immediate(intervention: InterventionType) -> Self {
        Self { intervention, delay_minutes: 0 }
    }

    const fn delayed(intervention: InterventionType, delay_minutes: i64) -> Self {
        Self { intervention, delay_minutes }
    }
}

/// One row of the protocol table.
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolEntry {
    pub level: CrisisLevel,

    /// SLA for the first dispatch attempt of the top-priority step.
    pub max_response_minutes: i64,

    pub steps: Vec<ProtocolStep>,
    pub cadence: MonitoringCadence,
}

/// Look up the protocol entry for a level.
///
/// `imminent_danger` selects the override row at `Critical`: explicit
/// plan/attempt language swaps the standard critical response for a staged
/// emergency-services handoff plus the contact cascade, with a one-minute
/// SLA. Returns `None` below the alerting threshold.
pub fn entry_for(level: CrisisLevel, imminent_danger: bool) -> Option<ProtocolEntry> {
    let entry = match level {
        CrisisLevel::None => return None,
        CrisisLevel::Low => ProtocolEntry {
            level,
            max_response_minutes: 60,
            steps: vec![ProtocolStep::immediate(InterventionType::AutomatedCheckIn)],
            cadence: MonitoringCadence::Daily,
        },
        CrisisLevel::Medium => ProtocolEntry {
            level,
            max_response_minutes: 30,
            steps: vec![
                ProtocolStep::immediate(InterventionType::AutomatedCheckIn),
                ProtocolStep::delayed(InterventionType::PeerSupport, 15),
            ],
            cadence: MonitoringCadence::EveryFourHours,
        },
        CrisisLevel::High => ProtocolEntry {
            level,
            max_response_minutes: 10,
            steps: vec![
                ProtocolStep::immediate(InterventionType::CounselorAssignment),
                ProtocolStep::immediate(InterventionType::TherapistAlert),
            ],
            cadence: MonitoringCadence::Hourly,
        },
        CrisisLevel::Critical if imminent_danger => ProtocolEntry {
            level,
            max_response_minutes: 1,
            steps: vec![
                ProtocolStep::immediate(InterventionType::EmergencyServicesHandoff),
                ProtocolStep::immediate(InterventionType::EmergencyContactCascade),
            ],
            cadence: MonitoringCadence::Continuous,
        },
        CrisisLevel::Critical => ProtocolEntry {
            level,
            max_response_minutes: 3,
            steps: vec![
                ProtocolStep::immediate(InterventionType::CounselorAssignment),
                ProtocolStep::immediate(InterventionType::EmergencyContactCascade),
                ProtocolStep::immediate(InterventionType::SafetyPlanActivation),
            ],
            cadence: MonitoringCadence::Continuous,
        },
    };

    Some(entry)
}
