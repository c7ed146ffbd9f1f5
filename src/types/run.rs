//! Workflow Run State
//!
//! One `WorkflowRun` exists per report: the persisted state of the
//! report-generation state machine. The run survives process restarts;
//! `AwaitingApproval` is the only state in which it is durably suspended
//! for an unbounded time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plan::{PhotoNote, ReportPlan};

/// States of the report-generation state machine.
///
/// ```text
/// Planning → Drafting → AwaitingApproval → Finalizing → Completed
///                ↑            |
///                └─ Revising ←┘ (request-revision)
/// ```
///
/// `Failed` is reachable from any non-terminal state; `Cancelled` only from
/// `AwaitingApproval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Planning,
    Drafting,
    AwaitingApproval,
    Revising,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Drafting => "drafting",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Revising => "revising",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(Self::Planning),
            "drafting" => Some(Self::Drafting),
            "awaiting_approval" => Some(Self::AwaitingApproval),
            "revising" => Some(Self::Revising),
            "finalizing" => Some(Self::Finalizing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The only state in which the run is durably suspended awaiting an
    /// external decision
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::AwaitingApproval)
    }

    /// States in which the engine is actively advancing the pipeline
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Planning | Self::Drafting | Self::Revising | Self::Finalizing
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs captured when a report generation starts. Persisted with the run
/// so revisions and resumed runs replan from the same material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportInput {
    /// Pre-computed photo descriptions/tags from the field capture flow
    pub photo_notes: Vec<PhotoNote>,
    /// Organization- or report-type-specific structure rules
    #[serde(default)]
    pub structure_rules: String,
}

/// Persisted state of one workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub report_id: String,
    pub state: RunState,
    /// Current plan snapshot, or None before the first planning pass
    pub plan: Option<ReportPlan>,
    /// Last unconsumed human revision instruction
    pub feedback: Option<String>,
    pub input: ReportInput,
    /// Finalized markdown, set when the run completes
    pub final_document: Option<String>,
    /// Error that moved the run to `Failed`, prefixed with the state it
    /// failed from
    pub last_error: Option<String>,
    /// Optimistic concurrency token; bumped on every persisted write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Create a fresh run ready for its first planning pass
    pub fn new(report_id: impl Into<String>, input: ReportInput) -> Self {
        let now = Utc::now();
        Self {
            report_id: report_id.into(),
            state: RunState::Planning,
            plan: None,
            feedback: None,
            input,
            final_document: None,
            last_error: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// How long the run has been sitting in its current state. Used by
    /// operators to surface abandoned approvals; suspension itself has no
    /// timeout.
    pub fn idle_duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

/// Human decision submitted against a suspended run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    RequestRevision { feedback: String },
    Cancel,
}

/// Snapshot returned by status queries and carried by push notifications.
/// Both views read the same persisted row, so a pull immediately after a
/// transition reflects the post-transition state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub report_id: String,
    pub state: RunState,
    pub plan: Option<ReportPlan>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowRun> for RunStatus {
    fn from(run: &WorkflowRun) -> Self {
        Self {
            report_id: run.report_id.clone(),
            state: run.state,
            plan: run.plan.clone(),
            updated_at: run.updated_at,
        }
    }
}
