//! SQLite storage layer for Lifeline.
//!
//! All persistence goes through this module as keyed lookups and
//! append-only updates; no query language leaks past this boundary. Alerts
//! and interventions are never deleted, only resolved or updated in place
//! by id, so the audit trail survives the alert lifecycle.

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use uuid::Uuid;

use crate::model::{
    ContactChannel, CounselorStatus, CrisisAlert, CrisisCounselor, CrisisIntervention,
    CrisisLevel, EmergencyContact, InterventionOutcome, InterventionType, LevelTransition,
    SafetyPlan, TriggerSource,
};

/// How many times a counselor claim retries after losing a race.
const CLAIM_RETRIES: u32 = 5;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:lifeline.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                level TEXT NOT NULL,
                score REAL NOT NULL,
                trigger_source TEXT NOT NULL,
                risk_factors TEXT NOT NULL,
                protective_factors TEXT NOT NULL,
                imminent_danger INTEGER NOT NULL,
                previous_alert_id TEXT,
                interventions_triggered TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_escalated_at INTEGER,
                resolved_at INTEGER,
                resolved_by TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_alerts_user_created
            ON alerts(user_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                alert_id TEXT NOT NULL,
                from_level TEXT NOT NULL,
                to_level TEXT NOT NULL,
                reason TEXT NOT NULL,
                at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interventions (
                id TEXT PRIMARY KEY,
                alert_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                channel TEXT,
                target TEXT,
                detail TEXT NOT NULL,
                outcome TEXT NOT NULL,
                follow_up_required INTEGER NOT NULL,
                initiated_at INTEGER NOT NULL,
                responded_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_interventions_alert
            ON interventions(alert_id, initiated_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS safety_plans (
                user_id TEXT PRIMARY KEY,
                warning_signs TEXT NOT NULL,
                coping_strategies TEXT NOT NULL,
                support_contacts TEXT NOT NULL,
                professional_contacts TEXT NOT NULL,
                emergency_numbers TEXT NOT NULL,
                activation_count INTEGER NOT NULL,
                last_reviewed_at INTEGER,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emergency_contacts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                relationship TEXT NOT NULL,
                phone TEXT NOT NULL,
                priority INTEGER NOT NULL,
                preferred_channel TEXT NOT NULL,
                available_24_7 INTEGER NOT NULL,
                consent_to_contact INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_contacts_user_priority
            ON emergency_contacts(user_id, priority)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS counselors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                current_load INTEGER NOT NULL,
                max_load INTEGER NOT NULL,
                avg_response_minutes REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Alerts ──────────────────────────────────────────────

    /// Persist a freshly opened alert together with its opening transition.
    pub async fn create_alert(&self, alert: &CrisisAlert) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, user_id, level, score, trigger_source, risk_factors,
                protective_factors, imminent_danger, previous_alert_id,
                interventions_triggered, created_at, last_escalated_at,
                resolved_at, resolved_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.id.to_string())
        .bind(&alert.user_id)
        .bind(alert.level.label())
        .bind(alert.score)
        .bind(alert.trigger_source.label())
        .bind(serde_json::to_string(&alert.risk_factors)?)
        .bind(serde_json::to_string(&alert.protective_factors)?)
        .bind(alert.imminent_danger)
        .bind(alert.previous_alert_id.map(|id| id.to_string()))
        .bind(serde_json::to_string(&alert.interventions_triggered)?)
        .bind(alert.created_at.timestamp())
        .bind(alert.last_escalated_at.map(|t| t.timestamp()))
        .bind(alert.resolved_at.map(|t| t.timestamp()))
        .bind(alert.resolved_by.as_deref())
        .execute(&self.pool)
        .await?;

        for transition in &alert.transitions {
            self.append_transition(alert.id, transition).await?;
        }

        Ok(())
    }

    /// Append one level-transition record.
    pub async fn append_transition(
        &self,
        alert_id: Uuid,
        transition: &LevelTransition,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_transitions (alert_id, from_level, to_level, reason, at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert_id.to_string())
        .bind(transition.from.label())
        .bind(transition.to.label())
        .bind(&transition.reason)
        .bind(transition.at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Move an open alert to a new level. Refuses resolved alerts at the
    /// SQL level; returns whether a row was actually updated.
    pub async fn update_alert_level(
        &self,
        alert_id: Uuid,
        level: CrisisLevel,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts SET level = ?, last_escalated_at = ?
            WHERE id = ? AND resolved_at IS NULL
            "#,
        )
        .bind(level.label())
        .bind(at.timestamp())
        .bind(alert_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Stamp an alert resolved. Returns false if it was already resolved
    /// (the stamp is first-writer-wins).
    pub async fn mark_resolved(
        &self,
        alert_id: Uuid,
        at: DateTime<Utc>,
        resolved_by: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts SET resolved_at = ?, resolved_by = ?
            WHERE id = ? AND resolved_at IS NULL
            "#,
        )
        .bind(at.timestamp())
        .bind(resolved_by)
        .bind(alert_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Rewrite the append-only list of triggered intervention types.
    pub async fn set_interventions_triggered(
        &self,
        alert_id: Uuid,
        triggered: &[InterventionType],
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE alerts SET interventions_triggered = ? WHERE id = ?")
            .bind(serde_json::to_string(triggered)?)
            .bind(alert_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Fetch one alert with its full transition history.
    pub async fn get_alert(&self, alert_id: Uuid) -> anyhow::Result<Option<CrisisAlert>> {
        let row = sqlx::query("SELECT * FROM alerts WHERE id = ?")
            .bind(alert_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut alert = alert_from_row(&row)?;
        alert.transitions = self.transitions_for(alert_id).await?;
        Ok(Some(alert))
    }

    async fn transitions_for(&self, alert_id: Uuid) -> anyhow::Result<Vec<LevelTransition>> {
        let rows = sqlx::query(
            "SELECT from_level, to_level, reason, at FROM alert_transitions WHERE alert_id = ? ORDER BY id ASC",
        )
        .bind(alert_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LevelTransition {
                    from: parse_level(row.get("from_level"))?,
                    to: parse_level(row.get("to_level"))?,
                    reason: row.get("reason"),
                    at: timestamp(row.get("at"))?,
                })
            })
            .collect()
    }

    /// The user's most recent unresolved alert, if any.
    pub async fn latest_open_alert(&self, user_id: &str) -> anyhow::Result<Option<CrisisAlert>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM alerts
            WHERE user_id = ? AND resolved_at IS NULL
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut alert = alert_from_row(&row)?;
                alert.transitions = self.transitions_for(alert.id).await?;
                Ok(Some(alert))
            }
            None => Ok(None),
        }
    }

    /// The user's most recently resolved alert, for reopen linking.
    pub async fn latest_resolved_alert(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Option<CrisisAlert>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM alerts
            WHERE user_id = ? AND resolved_at IS NOT NULL
            ORDER BY resolved_at DESC LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(alert_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Recent alerts for a user, newest first, without transition history.
    pub async fn recent_alerts(
        &self,
        user_id: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<CrisisAlert>> {
        let rows = sqlx::query(
            "SELECT * FROM alerts WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    // ── Interventions ───────────────────────────────────────

    pub async fn insert_intervention(
        &self,
        intervention: &CrisisIntervention,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interventions (
                id, alert_id, kind, channel, target, detail, outcome,
                follow_up_required, initiated_at, responded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(intervention.id.to_string())
        .bind(intervention.alert_id.to_string())
        .bind(intervention.kind.label())
        .bind(intervention.channel.map(|c| c.label()))
        .bind(intervention.target.as_deref())
        .bind(&intervention.detail)
        .bind(intervention.outcome.label())
        .bind(intervention.follow_up_required)
        .bind(intervention.initiated_at.timestamp())
        .bind(intervention.responded_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_intervention(
        &self,
        intervention_id: Uuid,
    ) -> anyhow::Result<Option<CrisisIntervention>> {
        let row = sqlx::query("SELECT * FROM interventions WHERE id = ?")
            .bind(intervention_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(intervention_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Stamp the time the person replied to an intervention. Delivery
    /// confirmation arrives asynchronously, so this updates by id only.
    pub async fn mark_intervention_responded(
        &self,
        intervention_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE interventions SET responded_at = ? WHERE id = ?")
            .bind(at.timestamp())
            .bind(intervention_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Update a delivery outcome after an asynchronous confirmation event.
    pub async fn update_intervention_outcome(
        &self,
        intervention_id: Uuid,
        outcome: InterventionOutcome,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE interventions SET outcome = ? WHERE id = ?")
            .bind(outcome.label())
            .bind(intervention_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn interventions_for_alert(
        &self,
        alert_id: Uuid,
    ) -> anyhow::Result<Vec<CrisisIntervention>> {
        let rows = sqlx::query(
            "SELECT * FROM interventions WHERE alert_id = ? ORDER BY initiated_at ASC, id ASC",
        )
        .bind(alert_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(intervention_from_row).collect()
    }

    /// Recent interventions across all of a user's alerts, newest first.
    pub async fn recent_interventions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<CrisisIntervention>> {
        let rows = sqlx::query(
            r#"
            SELECT i.* FROM interventions i
            JOIN alerts a ON a.id = i.alert_id
            WHERE a.user_id = ?
            ORDER BY i.initiated_at DESC LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(intervention_from_row).collect()
    }

    // ── Safety plans ────────────────────────────────────────

    pub async fn get_safety_plan(&self, user_id: &str) -> anyhow::Result<Option<SafetyPlan>> {
        let row = sqlx::query("SELECT * FROM safety_plans WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(safety_plan_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace the user's single active plan. Activation history
    /// (the counter) is carried in the row itself.
    pub async fn upsert_safety_plan(&self, plan: &SafetyPlan) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO safety_plans (
                user_id, warning_signs, coping_strategies, support_contacts,
                professional_contacts, emergency_numbers, activation_count,
                last_reviewed_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                warning_signs = excluded.warning_signs,
                coping_strategies = excluded.coping_strategies,
                support_contacts = excluded.support_contacts,
                professional_contacts = excluded.professional_contacts,
                emergency_numbers = excluded.emergency_numbers,
                last_reviewed_at = excluded.last_reviewed_at
            "#,
        )
        .bind(&plan.user_id)
        .bind(serde_json::to_string(&plan.warning_signs)?)
        .bind(serde_json::to_string(&plan.coping_strategies)?)
        .bind(serde_json::to_string(&plan.support_contacts)?)
        .bind(serde_json::to_string(&plan.professional_contacts)?)
        .bind(serde_json::to_string(&plan.emergency_numbers)?)
        .bind(plan.activation_count)
        .bind(plan.last_reviewed_at.map(|t| t.timestamp()))
        .bind(plan.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Bump the activation counter and stamp the review time.
    pub async fn record_plan_activation(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE safety_plans
            SET activation_count = activation_count + 1, last_reviewed_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(at.timestamp())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Emergency contacts ──────────────────────────────────

    /// A user's contacts in stable priority order (1 first).
    pub async fn contacts_for_user(&self, user_id: &str) -> anyhow::Result<Vec<EmergencyContact>> {
        let rows = sqlx::query(
            "SELECT * FROM emergency_contacts WHERE user_id = ? ORDER BY priority ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(contact_from_row).collect()
    }

    pub async fn upsert_contact(&self, contact: &EmergencyContact) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO emergency_contacts (
                id, user_id, name, relationship, phone, priority,
                preferred_channel, available_24_7, consent_to_contact
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(contact.id.to_string())
        .bind(&contact.user_id)
        .bind(&contact.name)
        .bind(&contact.relationship)
        .bind(&contact.phone)
        .bind(contact.priority)
        .bind(contact.preferred_channel.label())
        .bind(contact.available_24_7)
        .bind(contact.consent_to_contact)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Counselor pool ──────────────────────────────────────

    pub async fn upsert_counselor(&self, counselor: &CrisisCounselor) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO counselors (
                id, name, status, current_load, max_load, avg_response_minutes
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&counselor.id)
        .bind(&counselor.name)
        .bind(counselor.status.label())
        .bind(counselor.current_load)
        .bind(counselor.max_load)
        .bind(counselor.avg_response_minutes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_counselor(&self, id: &str) -> anyhow::Result<Option<CrisisCounselor>> {
        let row = sqlx::query("SELECT * FROM counselors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(counselor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Atomically claim the best available counselor: lowest load, ties
    /// broken by lowest average response time.
    ///
    /// The claim is a conditional UPDATE, so concurrent claims against the
    /// same counselor race on `rows_affected` and the load can never pass
    /// `max_load`. Reaching the maximum flips the status to busy in the
    /// same statement. Returns `None` when the pool is exhausted.
    pub async fn claim_counselor(&self) -> anyhow::Result<Option<CrisisCounselor>> {
        for _ in 0..CLAIM_RETRIES {
            let candidate = sqlx::query(
                r#"
                SELECT id FROM counselors
                WHERE status = 'available' AND current_load < max_load
                ORDER BY current_load ASC, avg_response_minutes ASC
                LIMIT 1
                "#,
            )
            .fetch_optional(&self.pool)
            .await?;

            let Some(candidate) = candidate else {
                return Ok(None);
            };
            let id: String = candidate.get("id");

            let claimed = sqlx::query(
                r#"
                UPDATE counselors
                SET current_load = current_load + 1,
                    status = CASE WHEN current_load + 1 >= max_load THEN 'busy' ELSE status END
                WHERE id = ? AND status = 'available' AND current_load < max_load
                "#,
            )
            .bind(&id)
            .execute(&self.pool)
            .await?;

            if claimed.rows_affected() == 1 {
                return self.get_counselor(&id).await;
            }
            // Lost the race to another claim; pick again.
        }

        Ok(None)
    }

    /// Release one unit of counselor load, reopening the counselor when
    /// they drop below their maximum.
    pub async fn release_counselor(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE counselors
            SET current_load = MAX(current_load - 1, 0),
                status = CASE
                    WHEN status = 'busy' AND current_load - 1 < max_load THEN 'available'
                    ELSE status
                END
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Aggregate statistics (read-only, eventually consistent) ─

    pub async fn total_alerts(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM alerts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn active_alerts(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM alerts WHERE resolved_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Open alerts currently at High or Critical.
    pub async fn active_high_risk(&self) -> anyhow::Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as n FROM alerts WHERE resolved_at IS NULL AND level IN ('high', 'critical')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    pub async fn resolved_alerts(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM alerts WHERE resolved_at IS NOT NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Mean minutes between dispatch and user response, over interventions
    /// that got a response. `None` when nothing has been responded to yet.
    pub async fn avg_user_response_minutes(&self) -> anyhow::Result<Option<f64>> {
        let row = sqlx::query(
            r#"
            SELECT AVG((responded_at - initiated_at) / 60.0) as avg_minutes
            FROM interventions
            WHERE responded_at IS NOT NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("avg_minutes"))
    }

    /// Count of intervention records per intervention type.
    pub async fn intervention_counts(&self) -> anyhow::Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT kind, COUNT(*) as n FROM interventions GROUP BY kind ORDER BY n DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("kind"), row.get("n")))
            .collect())
    }
}

// ── Row mapping ─────────────────────────────────────────────

fn timestamp(ts: i64) -> anyhow::Result<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| anyhow!("invalid timestamp {ts}"))
}

fn parse_level(s: String) -> anyhow::Result<CrisisLevel> {
    CrisisLevel::parse(&s).ok_or_else(|| anyhow!("unknown crisis level '{s}'"))
}

fn parse_uuid(s: String) -> anyhow::Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| anyhow!("invalid id '{s}': {e}"))
}

fn alert_from_row(row: &SqliteRow) -> anyhow::Result<CrisisAlert> {
    let previous: Option<String> = row.get("previous_alert_id");
    let last_escalated: Option<i64> = row.get("last_escalated_at");
    let resolved: Option<i64> = row.get("resolved_at");

    Ok(CrisisAlert {
        id: parse_uuid(row.get("id"))?,
        user_id: row.get("user_id"),
        level: parse_level(row.get("level"))?,
        score: row.get("score"),
        trigger_source: TriggerSource::parse(&row.get::<String, _>("trigger_source"))
            .ok_or_else(|| anyhow!("unknown trigger source"))?,
        risk_factors: serde_json::from_str(&row.get::<String, _>("risk_factors"))?,
        protective_factors: serde_json::from_str(&row.get::<String, _>("protective_factors"))?,
        transitions: Vec::new(),
        imminent_danger: row.get("imminent_danger"),
        previous_alert_id: previous.map(parse_uuid).transpose()?,
        interventions_triggered: serde_json::from_str(
            &row.get::<String, _>("interventions_triggered"),
        )?,
        created_at: timestamp(row.get("created_at"))?,
        last_escalated_at: last_escalated.map(timestamp).transpose()?,
        resolved_at: resolved.map(timestamp).transpose()?,
        resolved_by: row.get("resolved_by"),
    })
}

fn intervention_from_row(row: &SqliteRow) -> anyhow::Result<CrisisIntervention> {
    let channel: Option<String> = row.get("channel");
    let responded: Option<i64> = row.get("responded_at");

    Ok(CrisisIntervention {
        id: parse_uuid(row.get("id"))?,
        alert_id: parse_uuid(row.get("alert_id"))?,
        kind: InterventionType::parse(&row.get::<String, _>("kind"))
            .ok_or_else(|| anyhow!("unknown intervention type"))?,
        channel: channel.as_deref().and_then(ContactChannel::parse),
        target: row.get("target"),
        detail: row.get("detail"),
        outcome: InterventionOutcome::parse(&row.get::<String, _>("outcome"))
            .ok_or_else(|| anyhow!("unknown intervention outcome"))?,
        follow_up_required: row.get("follow_up_required"),
        initiated_at: timestamp(row.get("initiated_at"))?,
        responded_at: responded.map(timestamp).transpose()?,
    })
}

fn safety_plan_from_row(row: &SqliteRow) -> anyhow::Result<SafetyPlan> {
    let reviewed: Option<i64> = row.get("last_reviewed_at");

    Ok(SafetyPlan {
        user_id: row.get("user_id"),
        warning_signs: serde_json::from_str(&row.get::<String, _>("warning_signs"))?,
        coping_strategies: serde_json::from_str(&row.get::<String, _>("coping_strategies"))?,
        support_contacts: serde_json::from_str(&row.get::<String, _>("support_contacts"))?,
        professional_contacts: serde_json::from_str(
            &row.get::<String, _>("professional_contacts"),
        )?,
        emergency_numbers: serde_json::from_str(&row.get::<String, _>("emergency_numbers"))?,
        activation_count: row.get("activation_count"),
        last_reviewed_at: reviewed.map(timestamp).transpose()?,
        created_at: timestamp(row.get("created_at"))?,
    })
}

fn contact_from_row(row: &SqliteRow) -> anyhow::Result<EmergencyContact> {
    Ok(EmergencyContact {
        id: parse_uuid(row.get("id"))?,
        user_id: row.get("user_id"),
        name: row.get("name"),
        relationship: row.get("relationship"),
        phone: row.get("phone"),
        priority: row.get("priority"),
        preferred_channel: ContactChannel::parse(&row.get::<String, _>("preferred_channel"))
            .ok_or_else(|| anyhow!("unknown contact channel"))?,
        available_24_7: row.get("available_24_7"),
        consent_to_contact: row.get("consent_to_contact"),
    })
}

fn counselor_from_row(row: &SqliteRow) -> anyhow::Result<CrisisCounselor> {
    Ok(CrisisCounselor {
        id: row.get("id"),
        name: row.get("name"),
        status: CounselorStatus::parse(&row.get::<String, _>("status"))
            .ok_or_else(|| anyhow!("unknown counselor status"))?,
        current_load: row.get("current_load"),
        max_load: row.get("max_load"),
        avg_response_minutes: row.get("avg_response_minutes"),
    })
}
