//! Lifeline - a crisis risk assessment and escalation engine.
//!
//! # Overview
//!
//! Lifeline turns noisy, multi-source signals about a person in a therapy
//! session (free text, biometrics, derived emotions, session context) into
//! a bounded risk classification, and drives a time-bound escalation
//! protocol that gets the right kind of help to the right person within a
//! guaranteed response window.
//!
//! Assessment flows one direction: signals are normalized into risk
//! factors, scored into a crisis level, and handed to the alert lifecycle
//! manager, which dispatches the level's interventions. The loop closes
//! only through response analysis, which can feed a re-escalation back
//! into the lifecycle manager.
//!
//! # Modules
//!
//! - [`model`]: Core data types (alerts, plans, contacts, counselors)
//! - [`signals`]: Signal normalization into scored risk factors
//! - [`scoring`]: Weighted risk scoring and the override floor
//! - [`protocol`]: The static escalation protocol table
//! - [`alerts`]: The alert state machine (escalation, resolution)
//! - [`dispatch`]: Intervention execution and fallbacks
//! - [`response`]: Reply analysis and follow-up planning
//! - [`scheduler`]: Cancellable per-alert timers
//! - [`delivery`]: The outbound channel collaborator
//! - [`engine`]: The assembled service instance
//! - [`storage`]: SQLite persistence
//! - [`dashboard`]: Per-user and platform-wide read views
//! - [`api`]: HTTP API handlers

pub mod alerts;
pub mod api;
pub mod dashboard;
pub mod delivery;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod model;
pub mod protocol;
pub mod response;
pub mod scheduler;
pub mod scoring;
pub mod signals;
pub mod storage;
