//! Intervention dispatch: executing protocol steps against an alert.
//!
//! Each intervention type has a documented behavior and a documented
//! fallback. Resource exhaustion (no counselor, no reachable contact)
//! fails over to the next tier; it never aborts the alert. Every attempt —
//! success, skip, or failure — appends a `CrisisIntervention` record so
//! the audit trail is complete.

use chrono::{DateTime, Timelike, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::delivery::Delivery;
use crate::model::{
    ContactChannel, CrisisAlert, CrisisIntervention, CrisisLevel, EmergencyContact,
    InterventionOutcome, InterventionType, SafetyPlan,
};
use crate::storage::Storage;

/// Hours within which non-24/7 contacts may be disturbed.
const APPROPRIATE_HOURS_START: u32 = 8;
const APPROPRIATE_HOURS_END: u32 = 22;

/// A cascade stops after this many contacts have been reached.
const CASCADE_MAX_REACHED: usize = 3;

/// What one dispatch call actually did.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Intervention types executed, in order. Contains more than one entry
    /// when a fallback fired (counselor exhaustion → contact cascade).
    pub executed: Vec<InterventionType>,

    /// Names of emergency contacts actually reached.
    pub contacts_reached: Vec<String>,
}

/// Executes intervention types against alerts. Stateless apart from its
/// storage and delivery handles; safe to clone into scheduled tasks.
#[derive(Clone)]
pub struct Dispatcher {
    storage: Storage,
    delivery: Delivery,
}

impl Dispatcher {
    pub fn new(storage: Storage, delivery: Delivery) -> Self {
        Self { storage, delivery }
    }

    /// Execute one intervention type, including its fallback behavior.
    pub async fn dispatch(
        &self,
        alert: &CrisisAlert,
        kind: InterventionType,
        now: DateTime<Utc>,
    ) -> anyhow::Result<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();

        match kind {
            InterventionType::AutomatedCheckIn => {
                self.automated_check_in(alert).await?;
                outcome.executed.push(kind);
            }
            InterventionType::PeerSupport => {
                self.peer_support(alert).await?;
                outcome.executed.push(kind);
            }
            InterventionType::CounselorAssignment => {
                let assigned = self.assign_counselor(alert).await?;
                outcome.executed.push(kind);
                if !assigned {
                    // Pool exhausted: fail over to the contact cascade
                    // rather than silently dropping the step.
                    let reached = self.emergency_contact_cascade(alert, now).await?;
                    outcome.executed.push(InterventionType::EmergencyContactCascade);
                    outcome.contacts_reached = reached;
                }
            }
            InterventionType::TherapistAlert => {
                self.therapist_alert(alert).await?;
                outcome.executed.push(kind);
            }
            InterventionType::EmergencyContactCascade => {
                outcome.contacts_reached = self.emergency_contact_cascade(alert, now).await?;
                outcome.executed.push(kind);
            }
            InterventionType::SafetyPlanActivation => {
                self.activate_safety_plan(alert).await?;
                outcome.executed.push(kind);
            }
            InterventionType::EmergencyServicesHandoff => {
                self.stage_emergency_services(alert).await?;
                outcome.executed.push(kind);
            }
        }

        Ok(outcome)
    }

    /// Synchronous check-in message, tiered by level. Always records an
    /// intervention; a delivery failure is captured in the outcome.
    pub async fn automated_check_in(&self, alert: &CrisisAlert) -> anyhow::Result<()> {
        let message = check_in_message(alert.level);
        let result = self
            .delivery
            .send(ContactChannel::Sms, &alert.user_id, message)
            .await;

        self.record(
            alert.id,
            InterventionType::AutomatedCheckIn,
            Some(ContactChannel::Sms),
            Some(&alert.user_id),
            message,
            delivery_outcome(result.delivered),
            false,
        )
        .await
    }

    async fn peer_support(&self, alert: &CrisisAlert) -> anyhow::Result<()> {
        let message = "A peer supporter from the community is available to talk \
                       whenever you're ready. Would you like us to connect you?";
        let result = self
            .delivery
            .send(ContactChannel::Sms, &alert.user_id, message)
            .await;

        self.record(
            alert.id,
            InterventionType::PeerSupport,
            Some(ContactChannel::Sms),
            Some(&alert.user_id),
            "peer/async support invitation",
            delivery_outcome(result.delivered),
            false,
        )
        .await
    }

    /// Claim the best available counselor. Returns false when the pool is
    /// exhausted (the caller fails over to the contact cascade).
    pub async fn assign_counselor(&self, alert: &CrisisAlert) -> anyhow::Result<bool> {
        match self.storage.claim_counselor().await? {
            Some(counselor) => {
                info!(
                    alert_id = %alert.id,
                    counselor_id = %counselor.id,
                    load = counselor.current_load,
                    "Counselor assigned"
                );

                self.delivery
                    .send(
                        ContactChannel::Sms,
                        &counselor.id,
                        &format!(
                            "Crisis assignment: user {} at level {}. Please reach out now.",
                            alert.user_id,
                            alert.level.label()
                        ),
                    )
                    .await;

                self.record(
                    alert.id,
                    InterventionType::CounselorAssignment,
                    None,
                    Some(&counselor.id),
                    &format!("assigned counselor {}", counselor.name),
                    InterventionOutcome::Assigned,
                    false,
                )
                .await?;
                Ok(true)
            }
            None => {
                warn!(alert_id = %alert.id, "No counselor available, failing over to contacts");
                self.record(
                    alert.id,
                    InterventionType::CounselorAssignment,
                    None,
                    None,
                    "no counselor available",
                    InterventionOutcome::Failed,
                    true,
                )
                .await?;
                Ok(false)
            }
        }
    }

    async fn therapist_alert(&self, alert: &CrisisAlert) -> anyhow::Result<()> {
        let message = format!(
            "Your client {} triggered a {} crisis alert. Please review the session.",
            alert.user_id,
            alert.level.label()
        );
        let result = self
            .delivery
            .send(ContactChannel::Email, "treating-therapist", &message)
            .await;

        self.record(
            alert.id,
            InterventionType::TherapistAlert,
            Some(ContactChannel::Email),
            Some("treating-therapist"),
            "treating therapist notified",
            delivery_outcome(result.delivered),
            false,
        )
        .await
    }

    /// Walk the user's contacts by priority.
    ///
    /// Contacts without consent are skipped (and the skip recorded).
    /// Outside 08:00–22:00 only 24/7 contacts are tried, unless the alert
    /// is Critical — then the window restriction is bypassed. The cascade
    /// stops after three successful contacts or when the list runs out.
    pub async fn emergency_contact_cascade(
        &self,
        alert: &CrisisAlert,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<String>> {
        let contacts = self.storage.contacts_for_user(&alert.user_id).await?;
        let in_window = within_appropriate_hours(now.hour());
        let bypass_window = alert.level >= CrisisLevel::Critical;

        let mut reached = Vec::new();

        for contact in &contacts {
            if reached.len() >= CASCADE_MAX_REACHED {
                break;
            }

            if !contact.consent_to_contact {
                self.record_cascade_skip(alert.id, contact, "no consent on file")
                    .await?;
                continue;
            }

            if !in_window && !contact.available_24_7 && !bypass_window {
                self.record_cascade_skip(alert.id, contact, "outside appropriate hours")
                    .await?;
                continue;
            }

            let message = contact_message(alert, &contact.name);
            let result = self
                .delivery
                .send(contact.preferred_channel, &contact.phone, &message)
                .await;

            self.record(
                alert.id,
                InterventionType::EmergencyContactCascade,
                Some(contact.preferred_channel),
                Some(&contact.name),
                &format!("emergency contact attempt (priority {})", contact.priority),
                delivery_outcome(result.delivered),
                !result.delivered,
            )
            .await?;

            if result.delivered {
                reached.push(contact.name.clone());
            }
        }

        info!(
            alert_id = %alert.id,
            attempted = contacts.len(),
            reached = reached.len(),
            "Emergency contact cascade finished"
        );

        Ok(reached)
    }

    async fn record_cascade_skip(
        &self,
        alert_id: Uuid,
        contact: &EmergencyContact,
        reason: &str,
    ) -> anyhow::Result<()> {
        self.record(
            alert_id,
            InterventionType::EmergencyContactCascade,
            Some(contact.preferred_channel),
            Some(&contact.name),
            reason,
            InterventionOutcome::Skipped,
            false,
        )
        .await
    }

    /// Activate the user's safety plan, synthesizing the default plan when
    /// none exists rather than failing.
    pub async fn activate_safety_plan(&self, alert: &CrisisAlert) -> anyhow::Result<()> {
        let plan = match self.storage.get_safety_plan(&alert.user_id).await? {
            Some(plan) => plan,
            None => {
                let plan = default_safety_plan(&alert.user_id);
                self.storage.upsert_safety_plan(&plan).await?;
                info!(user_id = %alert.user_id, "Synthesized default safety plan");
                plan
            }
        };

        self.storage
            .record_plan_activation(&alert.user_id, Utc::now())
            .await?;

        let message = format!(
            "Your safety plan is here for you.\nCoping strategies: {}\nEmergency numbers: {}",
            plan.coping_strategies.join("; "),
            plan.emergency_numbers.join(", ")
        );
        self.delivery
            .send(ContactChannel::Sms, &alert.user_id, &message)
            .await;

        self.record(
            alert.id,
            InterventionType::SafetyPlanActivation,
            Some(ContactChannel::Sms),
            Some(&alert.user_id),
            &format!("safety plan activated (activation #{})", plan.activation_count + 1),
            InterventionOutcome::Delivered,
            false,
        )
        .await
    }

    /// Stage an emergency-services handoff. The engine never places a real
    /// emergency call on its own: the record is held for human
    /// verification with `follow_up_required` set.
    pub async fn stage_emergency_services(&self, alert: &CrisisAlert) -> anyhow::Result<()> {
        warn!(
            alert_id = %alert.id,
            user_id = %alert.user_id,
            "Emergency services handoff staged, awaiting human verification"
        );

        self.record(
            alert.id,
            InterventionType::EmergencyServicesHandoff,
            Some(ContactChannel::Phone),
            Some("emergency-services"),
            "handoff staged for human verification before dispatch",
            InterventionOutcome::Staged,
            true,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        alert_id: Uuid,
        kind: InterventionType,
        channel: Option<ContactChannel>,
        target: Option<&str>,
        detail: &str,
        outcome: InterventionOutcome,
        follow_up_required: bool,
    ) -> anyhow::Result<()> {
        let intervention = CrisisIntervention {
            id: Uuid::new_v4(),
            alert_id,
            kind,
            channel,
            target: target.map(str::to_string),
            detail: detail.to_string(),
            outcome,
            follow_up_required,
            initiated_at: Utc::now(),
            responded_at: None,
        };

        self.storage.insert_intervention(&intervention).await
    }
}

/// Whether non-24/7 contacts may be disturbed at this hour.
pub fn within_appropriate_hours(hour: u32) -> bool {
    (APPROPRIATE_HOURS_START..APPROPRIATE_HOURS_END).contains(&hour)
}

fn delivery_outcome(delivered: bool) -> InterventionOutcome {
    if delivered {
        InterventionOutcome::Delivered
    } else {
        InterventionOutcome::Failed
    }
}

/// Level-tiered check-in templates.
fn check_in_message(level: CrisisLevel) -> &'static str {
    match level {
        CrisisLevel::None | CrisisLevel::Low => {
            "Hey, just checking in. How are you feeling right now? \
             Reply anytime, we're listening."
        }
        CrisisLevel::Medium => {
            "We noticed you might be going through a hard moment. \
             You're not alone. Would you like to talk to someone?"
        }
        CrisisLevel::High => {
            "We're concerned about you and want to help right now. \
             A counselor is being connected. If you're in immediate danger, \
             call or text 988."
        }
        CrisisLevel::Critical => {
            "Your safety matters most right now. Please stay with us. \
             Help is on the way. Call or text 988 or dial 911 if you are \
             in immediate danger."
        }
    }
}

fn contact_message(alert: &CrisisAlert, contact_name: &str) -> String {
    format!(
        "Hi {}, this is the Lifeline support team. {} listed you as an \
         emergency contact and may need your support right now. Please \
         reach out to them when you can.",
        contact_name, alert.user_id
    )
}

/// The minimal plan synthesized when a user has none on file.
pub fn default_safety_plan(user_id: &str) -> SafetyPlan {
    SafetyPlan {
        user_id: user_id.to_string(),
        warning_signs: vec![
            "Feeling overwhelmed or hopeless".to_string(),
            "Withdrawing from people".to_string(),
            "Trouble sleeping".to_string(),
        ],
        coping_strategies: vec![
            "Deep breathing for five minutes".to_string(),
            "Call or text someone you trust".to_string(),
            "Go to a safe, public place".to_string(),
        ],
        support_contacts: vec![],
        professional_contacts: vec![],
        emergency_numbers: vec![
            "988 (Suicide & Crisis Lifeline)".to_string(),
            "741741 (Crisis Text Line, text HOME)".to_string(),
            "911".to_string(),
        ],
        activation_count: 0,
        last_reviewed_at: None,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::SimulatedDelivery;
    use crate::model::{LevelTransition, TriggerSource};
    use chrono::TimeZone;

    async fn setup() -> (Dispatcher, Storage, SimulatedDelivery) {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let simulated = SimulatedDelivery::new();
        let dispatcher = Dispatcher::new(storage.clone(), Delivery::Simulated(simulated.clone()));
        (dispatcher, storage, simulated)
    }

    fn alert_at(level: CrisisLevel) -> CrisisAlert {
        let now = Utc::now();
        CrisisAlert {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            level,
            score: 80.0,
            trigger_source: TriggerSource::BehavioralSignal,
            risk_factors: vec![],
            protective_factors: vec![],
            transitions: vec![LevelTransition {
                from: CrisisLevel::None,
                to: level,
                reason: "alert opened".to_string(),
                at: now,
            }],
            imminent_danger: false,
            previous_alert_id: None,
            interventions_triggered: vec![],
            created_at: now,
            last_escalated_at: None,
            resolved_at: None,
            resolved_by: None,
        }
    }

    fn contact(name: &str, priority: i64, consent: bool, always_reachable: bool) -> EmergencyContact {
        EmergencyContact {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            name: name.to_string(),
            relationship: "friend".to_string(),
            phone: format!("+1555{priority:04}"),
            priority,
            preferred_channel: ContactChannel::Sms,
            available_24_7: always_reachable,
            consent_to_contact: consent,
        }
    }

    fn daytime() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    fn nighttime() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 2, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_check_in_records_intervention() {
        let (dispatcher, storage, simulated) = setup().await;
        let alert = alert_at(CrisisLevel::Low);
        storage.create_alert(&alert).await.unwrap();

        dispatcher.automated_check_in(&alert).await.unwrap();

        let records = storage.interventions_for_alert(alert.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, InterventionType::AutomatedCheckIn);
        assert_eq!(records[0].outcome, InterventionOutcome::Delivered);
        assert_eq!(simulated.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_check_in_failure_recorded_not_thrown() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let dispatcher = Dispatcher::new(
            storage.clone(),
            Delivery::Simulated(SimulatedDelivery::failing()),
        );
        let alert = alert_at(CrisisLevel::Low);
        storage.create_alert(&alert).await.unwrap();

        dispatcher.automated_check_in(&alert).await.unwrap();

        let records = storage.interventions_for_alert(alert.id).await.unwrap();
        assert_eq!(records[0].outcome, InterventionOutcome::Failed);
    }

    #[tokio::test]
    async fn test_counselor_exhaustion_fails_over_to_cascade() {
        let (dispatcher, storage, _) = setup().await;
        let alert = alert_at(CrisisLevel::High);
        storage.create_alert(&alert).await.unwrap();
        storage
            .upsert_contact(&contact("Alex", 1, true, true))
            .await
            .unwrap();

        let outcome = dispatcher
            .dispatch(&alert, InterventionType::CounselorAssignment, daytime())
            .await
            .unwrap();

        assert_eq!(
            outcome.executed,
            vec![
                InterventionType::CounselorAssignment,
                InterventionType::EmergencyContactCascade
            ]
        );
        assert_eq!(outcome.contacts_reached, vec!["Alex".to_string()]);

        let records = storage.interventions_for_alert(alert.id).await.unwrap();
        let failed_assignment = records
            .iter()
            .find(|r| r.kind == InterventionType::CounselorAssignment)
            .unwrap();
        assert_eq!(failed_assignment.outcome, InterventionOutcome::Failed);
    }

    #[tokio::test]
    async fn test_cascade_respects_consent() {
        let (dispatcher, storage, _) = setup().await;
        let alert = alert_at(CrisisLevel::Medium);
        storage.create_alert(&alert).await.unwrap();

        for c in [
            contact("Alex", 1, true, true),
            contact("Brook", 2, false, true),
            contact("Casey", 3, true, true),
            contact("Drew", 4, false, true),
            contact("Emery", 5, true, true),
        ] {
            storage.upsert_contact(&c).await.unwrap();
        }

        let reached = dispatcher
            .emergency_contact_cascade(&alert, daytime())
            .await
            .unwrap();

        assert_eq!(reached, vec!["Alex", "Casey", "Emery"]);
        assert!(!reached.contains(&"Brook".to_string()));
        assert!(!reached.contains(&"Drew".to_string()));
    }

    #[tokio::test]
    async fn test_cascade_enforces_hours_window() {
        let (dispatcher, storage, _) = setup().await;
        let alert = alert_at(CrisisLevel::Medium);
        storage.create_alert(&alert).await.unwrap();

        storage
            .upsert_contact(&contact("Daysleeper", 1, true, false))
            .await
            .unwrap();
        storage
            .upsert_contact(&contact("Nightowl", 2, true, true))
            .await
            .unwrap();

        let reached = dispatcher
            .emergency_contact_cascade(&alert, nighttime())
            .await
            .unwrap();

        // Only the 24/7 contact is disturbed at 02:00 for a Medium alert
        assert_eq!(reached, vec!["Nightowl"]);
    }

    #[tokio::test]
    async fn test_critical_bypasses_hours_window() {
        let (dispatcher, storage, _) = setup().await;
        let alert = alert_at(CrisisLevel::Critical);
        storage.create_alert(&alert).await.unwrap();

        storage
            .upsert_contact(&contact("Daysleeper", 1, true, false))
            .await
            .unwrap();

        let reached = dispatcher
            .emergency_contact_cascade(&alert, nighttime())
            .await
            .unwrap();

        assert_eq!(reached, vec!["Daysleeper"]);
    }

    #[tokio::test]
    async fn test_cascade_mixed_consent_outside_hours() {
        // Five contacts, two lacking consent, 02:00, Medium alert: only
        // consenting contacts are attempted and the hours window holds.
        let (dispatcher, storage, _) = setup().await;
        let alert = alert_at(CrisisLevel::Medium);
        storage.create_alert(&alert).await.unwrap();

        for c in [
            contact("Alex", 1, true, true),
            contact("Brook", 2, false, true),
            contact("Casey", 3, true, false),
            contact("Drew", 4, false, false),
            contact("Emery", 5, true, true),
        ] {
            storage.upsert_contact(&c).await.unwrap();
        }

        let reached = dispatcher
            .emergency_contact_cascade(&alert, nighttime())
            .await
            .unwrap();

        assert_eq!(reached, vec!["Alex", "Emery"]);
        assert!(reached.len() <= 3);
        assert!(!reached.contains(&"Brook".to_string()));
        assert!(!reached.contains(&"Drew".to_string()));

        let records = storage.interventions_for_alert(alert.id).await.unwrap();
        let skipped: Vec<_> = records
            .iter()
            .filter(|r| r.outcome == InterventionOutcome::Skipped)
            .collect();
        assert_eq!(skipped.len(), 3);
    }

    #[tokio::test]
    async fn test_cascade_stops_after_three() {
        let (dispatcher, storage, _) = setup().await;
        let alert = alert_at(CrisisLevel::Medium);
        storage.create_alert(&alert).await.unwrap();

        for i in 1..=5 {
            storage
                .upsert_contact(&contact(&format!("Contact{i}"), i, true, true))
                .await
                .unwrap();
        }

        let reached = dispatcher
            .emergency_contact_cascade(&alert, daytime())
            .await
            .unwrap();

        assert_eq!(reached.len(), 3);
        assert_eq!(reached, vec!["Contact1", "Contact2", "Contact3"]);
    }

    #[tokio::test]
    async fn test_safety_plan_synthesized_when_missing() {
        let (dispatcher, storage, _) = setup().await;
        let alert = alert_at(CrisisLevel::Critical);
        storage.create_alert(&alert).await.unwrap();

        assert!(storage.get_safety_plan("user-1").await.unwrap().is_none());

        dispatcher.activate_safety_plan(&alert).await.unwrap();

        let plan = storage.get_safety_plan("user-1").await.unwrap().unwrap();
        assert_eq!(plan.activation_count, 1);
        assert!(plan
            .emergency_numbers
            .iter()
            .any(|n| n.contains("988")));

        // Second activation keeps the same plan and bumps the counter
        dispatcher.activate_safety_plan(&alert).await.unwrap();
        let plan = storage.get_safety_plan("user-1").await.unwrap().unwrap();
        assert_eq!(plan.activation_count, 2);
    }

    #[tokio::test]
    async fn test_emergency_services_always_staged() {
        let (dispatcher, storage, _) = setup().await;
        let alert = alert_at(CrisisLevel::Critical);
        storage.create_alert(&alert).await.unwrap();

        dispatcher.stage_emergency_services(&alert).await.unwrap();

        let records = storage.interventions_for_alert(alert.id).await.unwrap();
        assert_eq!(records[0].outcome, InterventionOutcome::Staged);
        assert!(records[0].follow_up_required);
    }

    #[tokio::test]
    async fn test_counselor_load_invariant_under_contention() {
        let (dispatcher, storage, _) = setup().await;
        storage
            .upsert_counselor(&crate::model::CrisisCounselor {
                id: "c1".to_string(),
                name: "Dana".to_string(),
                status: crate::model::CounselorStatus::Available,
                current_load: 0,
                max_load: 1,
                avg_response_minutes: 5.0,
            })
            .await
            .unwrap();

        let alert = alert_at(CrisisLevel::High);
        storage.create_alert(&alert).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dispatcher = dispatcher.clone();
            let alert = alert.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.assign_counselor(&alert).await.unwrap()
            }));
        }

        let mut assigned = 0;
        for handle in handles {
            if handle.await.unwrap() {
                assigned += 1;
            }
        }

        assert_eq!(assigned, 1);
        let counselor = storage.get_counselor("c1").await.unwrap().unwrap();
        assert_eq!(counselor.current_load, 1);
        assert!(counselor.current_load <= counselor.max_load);
    }

    #[test]
    fn test_hours_window() {
        assert!(within_appropriate_hours(8));
        assert!(within_appropriate_hours(21));
        assert!(!within_appropriate_hours(22));
        assert!(!within_appropriate_hours(2));
        assert!(!within_appropriate_hours(7));
    }
}
