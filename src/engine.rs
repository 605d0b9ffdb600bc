//! The crisis engine: one explicitly constructed service instance.
//!
//! Wires the scorer, lifecycle manager, dispatcher, and scheduler around
//! injected persistence and delivery dependencies. There is no global
//! singleton; tests construct engines against in-memory storage and a
//! simulated delivery backend.

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alerts::AlertManager;
use crate::delivery::Delivery;
use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::model::{
    AssessmentRequest, CrisisAlert, CrisisAnalysisResult, CrisisLevel, FollowUpPlan,
    ProtocolExecutionResult, ResponseRisk,
};
use crate::protocol::{self, ProtocolEntry};
use crate::response;
use crate::scheduler::Scheduler;
use crate::scoring::{self, RiskAssessment};
use crate::storage::Storage;

/// Open alerts that see no activity are auto-resolved after this long.
const ALERT_EXPIRY_HOURS: i64 = 24;

/// Hard-coded response used when persistence is unavailable. The safest
/// default is to assume the highest plausible risk, never to fail silently.
const EMERGENCY_FALLBACK_MESSAGE: &str =
    "We are having trouble reaching our support system right now. \
     If you are in danger, call 911 or call/text 988 immediately. \
     You are not alone.";

#[derive(Clone)]
pub struct CrisisEngine {
    storage: Storage,
    alerts: AlertManager,
    dispatcher: Dispatcher,
    scheduler: Scheduler,
}

impl CrisisEngine {
    pub fn new(storage: Storage, delivery: Delivery) -> Self {
        Self {
            alerts: AlertManager::new(storage.clone()),
            dispatcher: Dispatcher::new(storage.clone(), delivery),
            scheduler: Scheduler::new(),
            storage,
        }
    }

    /// Keyed access to the persistence collaborator, for admin surfaces
    /// and test setup.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Assess one batch of signals and, when warranted, open an alert and
    /// start its protocol.
    ///
    /// This never fails: a persistence outage degrades to the hard-coded
    /// emergency response at the highest plausible risk level.
    pub async fn assess(&self, request: AssessmentRequest) -> CrisisAnalysisResult {
        let assessment = scoring::assess(&request);

        if !assessment.level.is_actionable() {
            return analysis_result(&assessment, None, None);
        }

        match self.open_and_respond(&request, &assessment).await {
            Ok(alert) => {
                let entry = protocol::entry_for(alert.level, alert.imminent_danger);
                analysis_result(&assessment, Some(alert.id), entry)
            }
            Err(e) => {
                error!(
                    user_id = %request.user_id,
                    error = %e,
                    "Engine degraded during assessment, using emergency fallback"
                );
                emergency_fallback(assessment)
            }
        }
    }

    async fn open_and_respond(
        &self,
        request: &AssessmentRequest,
        assessment: &RiskAssessment,
    ) -> Result<CrisisAlert, EngineError> {
        let alert = self
            .alerts
            .open_alert(
                &request.user_id,
                assessment,
                request.trigger,
                request.protective_factors.clone(),
            )
            .await?;

        let lock = self.alerts.locks().for_alert(alert.id).await;
        let _guard = lock.lock().await;
        self.execute_protocol_locked(alert.id).await?;

        if let Some(entry) = protocol::entry_for(alert.level, alert.imminent_danger) {
            self.schedule_monitoring(&alert, &entry);
        }
        self.schedule_expiry(alert.id);

        Ok(alert)
    }

    /// Run (or re-run) the protocol for an alert's current level.
    ///
    /// Idempotent: intervention types already on the alert's audit trail
    /// are skipped, so re-execution never duplicates records.
    pub async fn execute_protocol(
        &self,
        alert_id: Uuid,
    ) -> Result<ProtocolExecutionResult, EngineError> {
        let lock = self.alerts.locks().for_alert(alert_id).await;
        let _guard = lock.lock().await;
        self.execute_protocol_locked(alert_id).await
    }

    /// Protocol execution body. Callers must hold the alert's lock.
    async fn execute_protocol_locked(
        &self,
        alert_id: Uuid,
    ) -> Result<ProtocolExecutionResult, EngineError> {
        let mut alert = self
            .storage
            .get_alert(alert_id)
            .await?
            .ok_or(EngineError::AlertNotFound(alert_id))?;

        if alert.is_resolved() {
            return Err(EngineError::AlertResolved(alert_id));
        }

        let mut result = ProtocolExecutionResult {
            alert_id,
            interventions_triggered: vec![],
            emergency_contacts_used: vec![],
        };

        let Some(entry) = protocol::entry_for(alert.level, alert.imminent_danger) else {
            return Ok(result);
        };

        for step in &entry.steps {
            if alert.interventions_triggered.contains(&step.intervention) {
                continue;
            }

            if step.delay_minutes > 0 {
                // Claim the step now so re-execution doesn't reschedule it,
                // then hand the actual dispatch to the scheduler.
                self.alerts
                    .record_triggered(&mut alert, &[step.intervention])
                    .await?;
                result.interventions_triggered.push(step.intervention);
                self.schedule_delayed_step(alert_id, step.intervention, step.delay_minutes);
                continue;
            }

            let outcome = self
                .dispatcher
                .dispatch(&alert, step.intervention, Utc::now())
                .await?;
            self.alerts
                .record_triggered(&mut alert, &outcome.executed)
                .await?;
            result.interventions_triggered.extend(outcome.executed);
            result.emergency_contacts_used.extend(outcome.contacts_reached);
        }

        info!(
            %alert_id,
            level = alert.level.label(),
            triggered = result.interventions_triggered.len(),
            contacts = result.emergency_contacts_used.len(),
            "Protocol executed"
        );

        Ok(result)
    }

    /// Ingest a person's reply to a dispatched intervention.
    ///
    /// Renewed high-risk language re-escalates the alert one level (or to
    /// Critical from High) and dispatches the new level's additional
    /// interventions. Every reply gets a follow-up plan.
    pub async fn handle_response(
        &self,
        intervention_id: Uuid,
        text: &str,
    ) -> Result<FollowUpPlan, EngineError> {
        let intervention = self
            .storage
            .get_intervention(intervention_id)
            .await?
            .ok_or(EngineError::InterventionNotFound(intervention_id))?;

        let now = Utc::now();
        self.storage
            .mark_intervention_responded(intervention_id, now)
            .await?;

        let analysis = response::analyze(text);
        info!(
            %intervention_id,
            alert_id = %intervention.alert_id,
            risk = ?analysis.risk,
            delta = analysis.delta,
            "Intervention response analyzed"
        );

        if analysis.risk == ResponseRisk::High {
            let lock = self.alerts.locks().for_alert(intervention.alert_id).await;
            let _guard = lock.lock().await;

            let alert = self
                .storage
                .get_alert(intervention.alert_id)
                .await?
                .ok_or(EngineError::AlertNotFound(intervention.alert_id))?;

            if alert.is_resolved() {
                warn!(
                    alert_id = %alert.id,
                    "High-risk reply on resolved alert; follow-up plan only"
                );
            } else {
                self.alerts
                    .escalate(alert.id, alert.level.next(), "user response escalation")
                    .await?;
                self.execute_protocol_locked(alert.id).await?;
            }
        }

        Ok(response::follow_up_plan(analysis.risk, now))
    }

    /// Consume an asynchronous delivery confirmation for a dispatched
    /// intervention. Delivery is fire-and-confirm: the dispatch path never
    /// blocks on the channel, and the eventual outcome lands here by id.
    pub async fn confirm_delivery(
        &self,
        intervention_id: Uuid,
        outcome: crate::model::InterventionOutcome,
    ) -> Result<(), EngineError> {
        self.storage
            .get_intervention(intervention_id)
            .await?
            .ok_or(EngineError::InterventionNotFound(intervention_id))?;

        self.storage
            .update_intervention_outcome(intervention_id, outcome)
            .await?;

        info!(%intervention_id, outcome = outcome.label(), "Delivery confirmation recorded");
        Ok(())
    }

    /// Resolve an alert, release its counselor, and cancel every pending
    /// timer so a resolved alert can never escalate later.
    pub async fn resolve_alert(
        &self,
        alert_id: Uuid,
        resolved_by: &str,
    ) -> Result<(), EngineError> {
        {
            let lock = self.alerts.locks().for_alert(alert_id).await;
            let _guard = lock.lock().await;
            self.alerts.resolve(alert_id, resolved_by).await?;
        }

        let interventions = self.storage.interventions_for_alert(alert_id).await?;
        for record in interventions {
            if record.kind == crate::model::InterventionType::CounselorAssignment
                && record.outcome == crate::model::InterventionOutcome::Assigned
                && let Some(counselor_id) = &record.target
            {
                self.storage.release_counselor(counselor_id).await?;
            }
        }

        // Last: aborting pending tasks may abort the very task running this
        // resolution (expiry), so nothing may follow this call.
        self.scheduler.cancel_all(alert_id);
        Ok(())
    }

    /// Periodic monitoring check-ins at the level's cadence, until the
    /// alert resolves.
    fn schedule_monitoring(&self, alert: &CrisisAlert, entry: &ProtocolEntry) {
        let engine = self.clone();
        let alert_id = alert.id;
        let every = entry
            .cadence
            .interval()
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(300));

        self.scheduler.schedule_repeating(alert_id, every, move || {
            let engine = engine.clone();
            async move { engine.monitoring_tick(alert_id).await }
        });
    }

    /// One monitoring tick. Returns false to stop the cycle.
    async fn monitoring_tick(&self, alert_id: Uuid) -> bool {
        let alert = match self.storage.get_alert(alert_id).await {
            Ok(Some(alert)) => alert,
            Ok(None) => return false,
            Err(e) => {
                warn!(%alert_id, error = %e, "Monitoring tick failed to load alert");
                return true;
            }
        };

        if alert.is_resolved() {
            return false;
        }

        if let Err(e) = self.dispatcher.automated_check_in(&alert).await {
            warn!(%alert_id, error = %e, "Monitoring check-in failed");
        }
        true
    }

    fn schedule_delayed_step(
        &self,
        alert_id: Uuid,
        kind: crate::model::InterventionType,
        delay_minutes: i64,
    ) {
        let engine = self.clone();
        let delay = std::time::Duration::from_secs(delay_minutes.max(0) as u64 * 60);

        self.scheduler.schedule(alert_id, delay, async move {
            let alert = match engine.storage.get_alert(alert_id).await {
                Ok(Some(alert)) if !alert.is_resolved() => alert,
                Ok(_) => return,
                Err(e) => {
                    warn!(%alert_id, error = %e, "Delayed step failed to load alert");
                    return;
                }
            };

            if let Err(e) = engine.dispatcher.dispatch(&alert, kind, Utc::now()).await {
                warn!(%alert_id, kind = kind.label(), error = %e, "Delayed step failed");
            }
        });
    }

    fn schedule_expiry(&self, alert_id: Uuid) {
        let engine = self.clone();
        let delay = std::time::Duration::from_secs(ALERT_EXPIRY_HOURS as u64 * 3600);

        self.scheduler.schedule(alert_id, delay, async move {
            match engine.resolve_alert(alert_id, "system:expiry").await {
                Ok(()) => info!(%alert_id, "Alert auto-resolved after timeout"),
                Err(EngineError::AlertResolved(_)) => {}
                Err(e) => warn!(%alert_id, error = %e, "Alert expiry failed"),
            }
        });
    }

    /// Number of pending scheduled tasks for an alert. Exposed for tests
    /// and the admin surface.
    pub fn pending_tasks(&self, alert_id: Uuid) -> usize {
        self.scheduler.pending(alert_id)
    }
}

fn analysis_result(
    assessment: &RiskAssessment,
    alert_id: Option<Uuid>,
    entry: Option<ProtocolEntry>,
) -> CrisisAnalysisResult {
    CrisisAnalysisResult {
        score: assessment.score,
        level: assessment.level,
        risk_factors: assessment.risk_factors.clone(),
        immediate_action_required: assessment.level >= CrisisLevel::High,
        alert_id,
        escalation_protocol: entry,
        fallback_message: None,
    }
}

/// The degraded-mode response: highest plausible risk, hard-coded
/// emergency template, nothing silent.
fn emergency_fallback(assessment: RiskAssessment) -> CrisisAnalysisResult {
    CrisisAnalysisResult {
        score: assessment.score,
        level: CrisisLevel::Critical,
        risk_factors: assessment.risk_factors,
        immediate_action_required: true,
        alert_id: None,
        escalation_protocol: protocol::entry_for(CrisisLevel::Critical, false),
        fallback_message: Some(EMERGENCY_FALLBACK_MESSAGE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::SimulatedDelivery;
    use crate::model::{
        CounselorStatus, CrisisCounselor, InterventionType, TriggerSource,
    };

    async fn engine() -> (CrisisEngine, SimulatedDelivery) {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let simulated = SimulatedDelivery::new();
        (
            CrisisEngine::new(storage, Delivery::Simulated(simulated.clone())),
            simulated,
        )
    }

    fn request(text: &str) -> AssessmentRequest {
        AssessmentRequest {
            user_id: "user-1".to_string(),
            text: Some(text.to_string()),
            biometrics: None,
            emotions: vec![],
            context: None,
            trigger: TriggerSource::BehavioralSignal,
            protective_factors: vec![],
        }
    }

    async fn seed_counselor(engine: &CrisisEngine) {
        engine
            .storage()
            .upsert_counselor(&CrisisCounselor {
                id: "c1".to_string(),
                name: "Dana".to_string(),
                status: CounselorStatus::Available,
                current_load: 0,
                max_load: 5,
                avg_response_minutes: 4.0,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_calm_input_opens_nothing() {
        let (engine, simulated) = engine().await;
        let result = engine.assess(request("had a nice walk today")).await;

        assert_eq!(result.level, CrisisLevel::None);
        assert!(result.alert_id.is_none());
        assert!(!result.immediate_action_required);
        assert!(simulated.sent().is_empty());
    }

    #[tokio::test]
    async fn test_crisis_text_opens_alert_and_assigns_counselor() {
        let (engine, _) = engine().await;
        seed_counselor(&engine).await;

        let result = engine.assess(request("I want to end it all")).await;

        assert!(result.level >= CrisisLevel::High);
        assert!(result.immediate_action_required);
        let alert_id = result.alert_id.unwrap();

        let alert = engine.storage().get_alert(alert_id).await.unwrap().unwrap();
        assert!(alert
            .interventions_triggered
            .contains(&InterventionType::CounselorAssignment));
        assert!(alert
            .interventions_triggered
            .contains(&InterventionType::TherapistAlert));

        let counselor = engine.storage().get_counselor("c1").await.unwrap().unwrap();
        assert_eq!(counselor.current_load, 1);
    }

    #[tokio::test]
    async fn test_execute_protocol_is_idempotent() {
        let (engine, _) = engine().await;
        seed_counselor(&engine).await;

        let result = engine.assess(request("I want to end it all")).await;
        let alert_id = result.alert_id.unwrap();

        let before = engine
            .storage()
            .interventions_for_alert(alert_id)
            .await
            .unwrap()
            .len();

        let rerun = engine.execute_protocol(alert_id).await.unwrap();
        assert!(rerun.interventions_triggered.is_empty());

        let after = engine
            .storage()
            .interventions_for_alert(alert_id)
            .await
            .unwrap()
            .len();
        assert_eq!(before, after);

        // The counselor was not claimed a second time either
        let counselor = engine.storage().get_counselor("c1").await.unwrap().unwrap();
        assert_eq!(counselor.current_load, 1);
    }

    #[tokio::test]
    async fn test_imminent_danger_stages_emergency_services() {
        let (engine, _) = engine().await;
        let result = engine
            .assess(request("i have a plan, tonight is the night"))
            .await;

        assert_eq!(result.level, CrisisLevel::Critical);
        let alert_id = result.alert_id.unwrap();
        let alert = engine.storage().get_alert(alert_id).await.unwrap().unwrap();
        assert!(alert.imminent_danger);
        assert!(alert
            .interventions_triggered
            .contains(&InterventionType::EmergencyServicesHandoff));

        let records = engine
            .storage()
            .interventions_for_alert(alert_id)
            .await
            .unwrap();
        let handoff = records
            .iter()
            .find(|r| r.kind == InterventionType::EmergencyServicesHandoff)
            .unwrap();
        assert!(handoff.follow_up_required);
    }

    #[tokio::test]
    async fn test_high_risk_reply_escalates() {
        let (engine, _) = engine().await;
        seed_counselor(&engine).await;

        let result = engine.assess(request("I want to end it all")).await;
        let alert_id = result.alert_id.unwrap();
        assert_eq!(result.level, CrisisLevel::High);

        let records = engine
            .storage()
            .interventions_for_alert(alert_id)
            .await
            .unwrap();
        let intervention_id = records[0].id;

        let plan = engine
            .handle_response(intervention_id, "it's too late, i still want to die")
            .await
            .unwrap();
        assert_eq!(plan.risk, ResponseRisk::High);

        let alert = engine.storage().get_alert(alert_id).await.unwrap().unwrap();
        assert_eq!(alert.level, CrisisLevel::Critical);
        assert!(alert
            .transitions
            .iter()
            .any(|t| t.reason == "user response escalation"));
        // The Critical additions were dispatched on top of the High steps
        assert!(alert
            .interventions_triggered
            .contains(&InterventionType::SafetyPlanActivation));
    }

    #[tokio::test]
    async fn test_positive_reply_only_plans_follow_up() {
        let (engine, _) = engine().await;
        seed_counselor(&engine).await;

        let result = engine.assess(request("I want to end it all")).await;
        let alert_id = result.alert_id.unwrap();
        let records = engine
            .storage()
            .interventions_for_alert(alert_id)
            .await
            .unwrap();

        let plan = engine
            .handle_response(records[0].id, "thank you, i'm safe and feeling better")
            .await
            .unwrap();

        assert_eq!(plan.risk, ResponseRisk::Low);
        let alert = engine.storage().get_alert(alert_id).await.unwrap().unwrap();
        assert_eq!(alert.level, CrisisLevel::High);

        let refreshed = engine
            .storage()
            .get_intervention(records[0].id)
            .await
            .unwrap()
            .unwrap();
        assert!(refreshed.responded_at.is_some());
    }

    #[tokio::test]
    async fn test_resolve_cancels_timers_and_releases_counselor() {
        let (engine, _) = engine().await;
        seed_counselor(&engine).await;

        let result = engine.assess(request("I want to end it all")).await;
        let alert_id = result.alert_id.unwrap();
        assert!(engine.pending_tasks(alert_id) > 0);

        engine.resolve_alert(alert_id, "counselor:c1").await.unwrap();

        assert_eq!(engine.pending_tasks(alert_id), 0);
        let counselor = engine.storage().get_counselor("c1").await.unwrap().unwrap();
        assert_eq!(counselor.current_load, 0);

        let err = engine.execute_protocol(alert_id).await.unwrap_err();
        assert!(matches!(err, EngineError::AlertResolved(_)));
    }

    #[tokio::test]
    async fn test_delayed_step_claimed_but_not_dispatched_inline() {
        let (engine, _) = engine().await;
        // Medium-level alert: check-in now, peer support after 15 minutes
        let mut req = request(
            "I feel hopeless, worthless, trapped, like I should give up, \
             no point, can't go on, it's unbearable and I can't take it anymore",
        );
        req.biometrics = Some(crate::model::BiometricReading {
            heart_rate: Some(140.0),
            stress_level: Some("critical".to_string()),
            ..Default::default()
        });
        req.context = Some(crate::model::SessionContext {
            session_kind: Some("crisis".to_string()),
            duration_minutes: Some(120),
            prior_crisis_count: 4,
        });
        req.emotions = vec![
            crate::model::EmotionScore { emotion: "sadness".to_string(), confidence: 0.9 },
            crate::model::EmotionScore { emotion: "fear".to_string(), confidence: 0.8 },
            crate::model::EmotionScore { emotion: "anger".to_string(), confidence: 0.85 },
        ];
        let result = engine.assess(req).await;
        assert_eq!(result.level, CrisisLevel::Medium);
        let alert_id = result.alert_id.unwrap();

        let alert = engine.storage().get_alert(alert_id).await.unwrap().unwrap();
        assert!(alert
            .interventions_triggered
            .contains(&InterventionType::PeerSupport));

        // Claimed for idempotency, but no record exists until the timer fires
        let records = engine
            .storage()
            .interventions_for_alert(alert_id)
            .await
            .unwrap();
        assert!(records.iter().all(|r| r.kind != InterventionType::PeerSupport));
    }

    #[tokio::test]
    async fn test_fallback_assumes_highest_risk() {
        let assessment = scoring::assess(&request("I feel hopeless"));
        let result = emergency_fallback(assessment);

        assert_eq!(result.level, CrisisLevel::Critical);
        assert!(result.immediate_action_required);
        assert!(result.fallback_message.is_some());
        assert!(result.escalation_protocol.is_some());
    }
}
