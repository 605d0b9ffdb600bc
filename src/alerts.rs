//! Alert lifecycle management.
//!
//! Owns the `CrisisAlert` state machine: `Open(level)` may move to
//! `Open(higher level)` or to `Resolved`, and nothing else. De-escalation
//! and mutation of a resolved alert are rejected as caller bugs. A
//! resolved alert that flares up again gets a *new* alert linked to the
//! old one, so the history of each episode stays intact.
//!
//! Within one alert all transitions are serialized through a per-alert
//! lock; different alerts proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{
    CrisisAlert, CrisisLevel, InterventionType, LevelTransition, TriggerSource,
};
use crate::scoring::RiskAssessment;
use crate::storage::Storage;

/// Serializes writes per alert id. No global lock: concurrent alerts for
/// different people (or even the same person) proceed in parallel.
#[derive(Clone, Default)]
pub struct AlertLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl AlertLocks {
    /// The lock guarding one alert's transitions.
    pub async fn for_alert(&self, alert_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(alert_id).or_default().clone()
    }
}

/// The lifecycle manager: the only code allowed to change an alert's level
/// or resolve it.
#[derive(Clone)]
pub struct AlertManager {
    storage: Storage,
    locks: AlertLocks,
}

impl AlertManager {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            locks: AlertLocks::default(),
        }
    }

    pub fn locks(&self) -> &AlertLocks {
        &self.locks
    }

    /// Open a new alert from a scored assessment.
    ///
    /// If the user has a previously resolved alert, the new one references
    /// the latest of them so reviewers can follow the episode chain.
    pub async fn open_alert(
        &self,
        user_id: &str,
        assessment: &RiskAssessment,
        trigger_source: TriggerSource,
        protective_factors: Vec<String>,
    ) -> Result<CrisisAlert, EngineError> {
        let now = Utc::now();
        let previous_alert_id = self
            .storage
            .latest_resolved_alert(user_id)
            .await?
            .map(|prior| prior.id);

        let alert = CrisisAlert {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            level: assessment.level,
            score: assessment.score,
            trigger_source,
            risk_factors: assessment.risk_factors.clone(),
            protective_factors,
            transitions: vec![LevelTransition {
                from: CrisisLevel::None,
                to: assessment.level,
                reason: "alert opened".to_string(),
                at: now,
            }],
            imminent_danger: assessment.imminent_danger,
            previous_alert_id,
            interventions_triggered: vec![],
            created_at: now,
            last_escalated_at: None,
            resolved_at: None,
            resolved_by: None,
        };

        self.storage.create_alert(&alert).await?;

        info!(
            alert_id = %alert.id,
            user_id,
            level = alert.level.label(),
            score = alert.score,
            reopened_from = ?alert.previous_alert_id,
            "Crisis alert opened"
        );

        Ok(alert)
    }

    /// Escalate an alert to a higher level.
    ///
    /// Monotonic: a lower target level is rejected, the same level is a
    /// no-op. Callers must hold the alert's lock (see [`AlertLocks`]).
    pub async fn escalate(
        &self,
        alert_id: Uuid,
        to: CrisisLevel,
        reason: &str,
    ) -> Result<CrisisAlert, EngineError> {
        let mut alert = self
            .storage
            .get_alert(alert_id)
            .await?
            .ok_or(EngineError::AlertNotFound(alert_id))?;

        if alert.is_resolved() {
            error!(%alert_id, "Rejected escalation of resolved alert");
            return Err(EngineError::AlertResolved(alert_id));
        }

        if to < alert.level {
            error!(
                %alert_id,
                from = alert.level.label(),
                to = to.label(),
                "Rejected de-escalation"
            );
            return Err(EngineError::DeEscalation {
                id: alert_id,
                from: alert.level,
                to,
            });
        }

        if to == alert.level {
            return Ok(alert);
        }

        let now = Utc::now();
        let transition = LevelTransition {
            from: alert.level,
            to,
            reason: reason.to_string(),
            at: now,
        };

        if !self.storage.update_alert_level(alert_id, to, now).await? {
            // The alert was resolved between the read and the write.
            return Err(EngineError::AlertResolved(alert_id));
        }
        self.storage.append_transition(alert_id, &transition).await?;

        info!(
            %alert_id,
            from = transition.from.label(),
            to = to.label(),
            reason,
            "Alert escalated"
        );

        alert.level = to;
        alert.last_escalated_at = Some(now);
        alert.transitions.push(transition);
        Ok(alert)
    }

    /// Resolve an alert. Terminal: no further transitions are accepted.
    pub async fn resolve(
        &self,
        alert_id: Uuid,
        resolved_by: &str,
    ) -> Result<CrisisAlert, EngineError> {
        let alert = self
            .storage
            .get_alert(alert_id)
            .await?
            .ok_or(EngineError::AlertNotFound(alert_id))?;

        if alert.is_resolved() {
            return Err(EngineError::AlertResolved(alert_id));
        }

        let now = Utc::now();
        if !self.storage.mark_resolved(alert_id, now, resolved_by).await? {
            return Err(EngineError::AlertResolved(alert_id));
        }

        info!(%alert_id, resolved_by, "Alert resolved");

        let mut alert = alert;
        alert.resolved_at = Some(now);
        alert.resolved_by = Some(resolved_by.to_string());
        Ok(alert)
    }

    /// Append newly triggered intervention types to the alert's audit
    /// trail. Types already present are kept once; the list is append-only.
    pub async fn record_triggered(
        &self,
        alert: &mut CrisisAlert,
        types: &[InterventionType],
    ) -> Result<(), EngineError> {
        let mut changed = false;
        for kind in types {
            if !alert.interventions_triggered.contains(kind) {
                alert.interventions_triggered.push(*kind);
                changed = true;
            }
        }

        if changed {
            self.storage
                .set_interventions_triggered(alert.id, &alert.interventions_triggered)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssessmentRequest;
    use crate::scoring;

    async fn manager() -> AlertManager {
        AlertManager::new(Storage::new("sqlite::memory:").await.unwrap())
    }

    fn assessment(text: &str) -> RiskAssessment {
        scoring::assess(&AssessmentRequest {
            user_id: "user-1".to_string(),
            text: Some(text.to_string()),
            biometrics: None,
            emotions: vec![],
            context: None,
            trigger: TriggerSource::BehavioralSignal,
            protective_factors: vec![],
        })
    }

    #[tokio::test]
    async fn test_open_records_initial_transition() {
        let manager = manager().await;
        let alert = manager
            .open_alert(
                "user-1",
                &assessment("I keep thinking about suicide"),
                TriggerSource::SelfReport,
                vec![],
            )
            .await
            .unwrap();

        assert_eq!(alert.transitions.len(), 1);
        assert_eq!(alert.transitions[0].from, CrisisLevel::None);
        assert_eq!(alert.transitions[0].to, alert.level);
    }

    #[tokio::test]
    async fn test_escalation_is_monotonic() {
        let manager = manager().await;
        let alert = manager
            .open_alert(
                "user-1",
                &assessment("I want to end it all"),
                TriggerSource::BehavioralSignal,
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(alert.level, CrisisLevel::High);

        let escalated = manager
            .escalate(alert.id, CrisisLevel::Critical, "user response escalation")
            .await
            .unwrap();
        assert_eq!(escalated.level, CrisisLevel::Critical);
        assert_eq!(escalated.transitions.len(), 2);

        let err = manager
            .escalate(alert.id, CrisisLevel::Low, "should fail")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DeEscalation { .. }));
        assert!(err.is_invariant_violation());
    }

    #[tokio::test]
    async fn test_same_level_escalation_is_noop() {
        let manager = manager().await;
        let alert = manager
            .open_alert(
                "user-1",
                &assessment("I want to end it all"),
                TriggerSource::BehavioralSignal,
                vec![],
            )
            .await
            .unwrap();

        let unchanged = manager
            .escalate(alert.id, alert.level, "duplicate signal")
            .await
            .unwrap();
        assert_eq!(unchanged.transitions.len(), 1);
    }

    #[tokio::test]
    async fn test_resolved_alert_rejects_everything() {
        let manager = manager().await;
        let alert = manager
            .open_alert(
                "user-1",
                &assessment("I keep thinking about suicide"),
                TriggerSource::BehavioralSignal,
                vec![],
            )
            .await
            .unwrap();

        manager.resolve(alert.id, "counselor:c1").await.unwrap();

        let err = manager
            .escalate(alert.id, CrisisLevel::Critical, "too late")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlertResolved(_)));

        let err = manager.resolve(alert.id, "counselor:c2").await.unwrap_err();
        assert!(matches!(err, EngineError::AlertResolved(_)));
    }

    #[tokio::test]
    async fn test_reopen_links_previous_alert() {
        let manager = manager().await;
        let first = manager
            .open_alert(
                "user-1",
                &assessment("I keep thinking about suicide"),
                TriggerSource::BehavioralSignal,
                vec![],
            )
            .await
            .unwrap();
        manager.resolve(first.id, "counselor:c1").await.unwrap();

        let second = manager
            .open_alert(
                "user-1",
                &assessment("thinking about suicide again"),
                TriggerSource::BehavioralSignal,
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(second.previous_alert_id, Some(first.id));
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn test_recorded_levels_never_decrease() {
        let manager = manager().await;
        let alert = manager
            .open_alert(
                "user-1",
                &assessment("I keep thinking about suicide"),
                TriggerSource::BehavioralSignal,
                vec![],
            )
            .await
            .unwrap();

        let mut level = alert.level;
        for target in [CrisisLevel::Medium, CrisisLevel::High, CrisisLevel::Critical] {
            if target >= level {
                level = manager
                    .escalate(alert.id, target, "monitoring tick")
                    .await
                    .unwrap()
                    .level;
            }
        }

        let stored = manager.storage.get_alert(alert.id).await.unwrap().unwrap();
        let recorded: Vec<CrisisLevel> = stored.transitions.iter().map(|t| t.to).collect();
        assert!(recorded.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
