//! Dashboard views: per-user crisis status and platform-wide statistics.
//!
//! Everything here is read-only and eventually consistent. There is no
//! transaction spanning multiple alerts; each view is assembled from
//! independent keyed lookups.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{CrisisAlert, CrisisIntervention, CrisisLevel};
use crate::storage::Storage;

/// How many recent alerts a user dashboard shows.
const RECENT_ALERTS_LIMIT: u32 = 10;

/// How many recent interventions a user dashboard shows.
const RECENT_INTERVENTIONS_LIMIT: u32 = 20;

/// Standing of a user's safety plan.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyPlanStatus {
    pub exists: bool,
    pub activation_count: i64,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

/// Response for GET /dashboard/{user_id}.
#[derive(Debug, Clone, Serialize)]
pub struct UserDashboard {
    pub user_id: String,

    /// Level of the latest open alert, or `none` when nothing is open.
    pub current_risk_level: CrisisLevel,

    pub safety_plan: SafetyPlanStatus,
    pub recent_alerts: Vec<CrisisAlert>,
    pub recent_interventions: Vec<CrisisIntervention>,
}

/// One entry of the interventions-by-type breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct InterventionCount {
    pub kind: String,
    pub count: i64,
}

/// Response for GET /statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStatistics {
    pub total_alerts: i64,
    pub active_alerts: i64,

    /// Open alerts currently at High or Critical.
    pub active_high_risk: i64,

    /// Resolved share of all alerts, 0.0 when none exist yet.
    pub resolution_rate: f64,

    /// Mean minutes from dispatch to user response, where responses exist.
    pub avg_response_minutes: Option<f64>,

    pub interventions_by_type: Vec<InterventionCount>,
}

/// Assemble the per-user dashboard.
pub async fn user_dashboard(storage: &Storage, user_id: &str) -> anyhow::Result<UserDashboard> {
    let current_risk_level = storage
        .latest_open_alert(user_id)
        .await?
        .map(|alert| alert.level)
        .unwrap_or(CrisisLevel::None);

    let safety_plan = match storage.get_safety_plan(user_id).await? {
        Some(plan) => SafetyPlanStatus {
            exists: true,
            activation_count: plan.activation_count,
            last_reviewed_at: plan.last_reviewed_at,
        },
        None => SafetyPlanStatus {
            exists: false,
            activation_count: 0,
            last_reviewed_at: None,
        },
    };

    Ok(UserDashboard {
        user_id: user_id.to_string(),
        current_risk_level,
        safety_plan,
        recent_alerts: storage.recent_alerts(user_id, RECENT_ALERTS_LIMIT).await?,
        recent_interventions: storage
            .recent_interventions(user_id, RECENT_INTERVENTIONS_LIMIT)
            .await?,
    })
}

/// Assemble the platform-wide counters.
pub async fn platform_statistics(storage: &Storage) -> anyhow::Result<PlatformStatistics> {
    let total_alerts = storage.total_alerts().await?;
    let resolved = storage.resolved_alerts().await?;

    let resolution_rate = if total_alerts > 0 {
        resolved as f64 / total_alerts as f64
    } else {
        0.0
    };

    Ok(PlatformStatistics {
        total_alerts,
        active_alerts: storage.active_alerts().await?,
        active_high_risk: storage.active_high_risk().await?,
        resolution_rate,
        avg_response_minutes: storage.avg_user_response_minutes().await?,
        interventions_by_type: storage
            .intervention_counts()
            .await?
            .into_iter()
            .map(|(kind, count)| InterventionCount { kind, count })
            .collect(),
    })
}
