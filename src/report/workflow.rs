//! Workflow State Machine
//!
//! Orchestrates one report generation from planning through completion:
//!
//! ```text
//! Planning → Drafting → AwaitingApproval → Finalizing → Completed
//!                ↑            |
//!                └─ Revising ←┘ (request-revision)
//! ```
//!
//! The run is persisted after every transition, so a process restart resumes
//! from the last persisted state with no lost drafts. `AwaitingApproval` is
//! a durable suspension with no timeout; the run sits there until a human
//! decision arrives.
//!
//! Concurrency: all mutating operations on one report serialize behind a
//! per-report lock, and every persisted write carries a version
//! compare-and-set as a second line of defense (other processes share the
//! database but not the lock map). Status queries bypass the lock entirely.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::ai::SharedProvider;
use crate::report::drafter::SectionDrafter;
use crate::report::notify::StatusNotifier;
use crate::report::planner::{PlanGenerator, PlanRequest};
use crate::report::suggestion::{MessageIntent, SuggestionEngine};
use crate::report::sync::{SectionEdit, join_plan_with_sections, sections_to_document};
use crate::storage::{PlanEntry, SharedDatabase};
use crate::types::{
    ApprovalDecision, ConflictKind, Document, ReportInput, ReportPlan, Result, RunState,
    RunStatus, ScribeError, Suggestion, ValidationError, ValidationKind, WorkflowRun,
};

/// Result of one conversational message against a report
#[derive(Debug, Clone)]
pub enum MessageOutcome {
    /// An edit was proposed; it is staged and awaits accept/reject
    SuggestionStaged(Suggestion),
    /// The message did not request a change; a plain answer
    Reply(String),
}

/// The report generation engine. One instance serves all reports; state
/// lives in the database, not in this struct.
pub struct ReportEngine {
    db: SharedDatabase,
    planner: PlanGenerator,
    drafter: SectionDrafter,
    suggestions: SuggestionEngine,
    notifier: Arc<dyn StatusNotifier>,
    /// Per-report write locks. Entries are created on first use and kept
    /// for the process lifetime; the map stays small (one entry per report
    /// touched by this process).
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ReportEngine {
    pub fn new(
        db: SharedDatabase,
        provider: SharedProvider,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Self {
        Self {
            db,
            planner: PlanGenerator::new(Arc::clone(&provider)),
            drafter: SectionDrafter::new(Arc::clone(&provider)),
            suggestions: SuggestionEngine::new(provider),
            notifier,
            locks: DashMap::new(),
        }
    }

    /// Override generation timeouts, mainly for tests and fast models.
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.planner = self.planner.with_timeout(timeout);
        self.drafter = self.drafter.with_timeout(timeout);
        self
    }

    /// Override the per-call retry budget for generation calls.
    pub fn with_retry_attempts(mut self, attempts: usize) -> Self {
        self.planner = self.planner.with_max_attempts(attempts);
        self.drafter = self.drafter.with_max_attempts(attempts);
        self
    }

    fn lock_for(&self, report_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(report_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn require_run(&self, report_id: &str) -> Result<WorkflowRun> {
        self.db.load_run(report_id)?.ok_or_else(|| {
            ValidationError::new(
                ValidationKind::General,
                format!("no report generation run for '{report_id}'"),
            )
            .into()
        })
    }

    // =========================================================================
    // Exposed Operations
    // =========================================================================

    /// Start a new run for a report, or resume an existing one.
    ///
    /// Idempotent: a run that is suspended or terminal returns its status
    /// without doing any work; a run interrupted mid-pipeline picks up from
    /// its persisted state.
    #[instrument(skip(self, input), fields(report_id = %report_id))]
    pub async fn start_or_resume(&self, report_id: &str, input: ReportInput) -> Result<RunStatus> {
        let lock = self.lock_for(report_id);
        let _guard = lock.lock().await;

        match self.db.load_run(report_id)? {
            Some(mut run) => {
                if run.state.is_active() {
                    info!(state = %run.state, "Resuming interrupted run");
                    self.advance(&mut run).await
                } else {
                    debug!(state = %run.state, "Run needs no work");
                    Ok(RunStatus::from(&run))
                }
            }
            None => {
                let mut run = WorkflowRun::new(report_id, input);
                self.db.create_run(&run)?;
                self.notifier.notify(&run);
                info!("Started new report generation");
                self.advance(&mut run).await
            }
        }
    }

    /// Apply a human decision to a suspended run.
    ///
    /// A decision against an already finalized run is a distinct conflict
    /// (the earlier decision won); one against a run that is still working
    /// or already cancelled/failed is a state error.
    #[instrument(skip(self, decision), fields(report_id = %report_id))]
    pub async fn submit_decision(
        &self,
        report_id: &str,
        decision: ApprovalDecision,
    ) -> Result<RunStatus> {
        let lock = self.lock_for(report_id);
        let _guard = lock.lock().await;

        let mut run = self.require_run(report_id)?;
        match run.state {
            RunState::AwaitingApproval => {}
            RunState::Finalizing | RunState::Completed => {
                return Err(ConflictKind::DecisionAlreadyApplied.into());
            }
            other => {
                return Err(ScribeError::state(
                    "submit approval decision",
                    RunState::AwaitingApproval.as_str(),
                    other.as_str(),
                ));
            }
        }

        match decision {
            ApprovalDecision::Approve => {
                self.transition(&mut run, RunState::Finalizing)?;
                self.advance(&mut run).await
            }
            ApprovalDecision::RequestRevision { feedback } => {
                run.feedback = Some(feedback);
                self.transition(&mut run, RunState::Revising)?;
                self.advance(&mut run).await
            }
            ApprovalDecision::Cancel => {
                self.transition(&mut run, RunState::Cancelled)?;
                Ok(RunStatus::from(&run))
            }
        }
    }

    /// Current status of a run. Lock-free: one snapshot read of the
    /// persisted row, so it reflects every transition already committed and
    /// never blocks behind an in-flight workflow step.
    pub fn get_status(&self, report_id: &str) -> Result<RunStatus> {
        let run = self.require_run(report_id)?;
        Ok(RunStatus::from(&run))
    }

    /// Apply a direct edit to one section and return the rebuilt document.
    ///
    /// `expected_version` guards against concurrent writers; when omitted,
    /// the current version is used (the per-report lock still serializes
    /// writers within this process).
    #[instrument(skip(self, edit), fields(report_id = %report_id, section_id = %section_id))]
    pub async fn update_section(
        &self,
        report_id: &str,
        section_id: &str,
        edit: SectionEdit,
        expected_version: Option<i64>,
    ) -> Result<Document> {
        edit.validate()?;
        let lock = self.lock_for(report_id);
        let _guard = lock.lock().await;

        let run = self.require_run(report_id)?;
        if !matches!(run.state, RunState::AwaitingApproval | RunState::Completed) {
            return Err(ScribeError::state(
                "update section",
                "awaiting_approval or completed",
                run.state.as_str(),
            ));
        }

        let current = self
            .db
            .load_section(report_id, section_id)?
            .ok_or_else(|| ValidationError::section_not_found(section_id))?;
        let expected = expected_version.unwrap_or(current.version);

        self.db.update_section(
            report_id,
            section_id,
            edit.content.as_deref(),
            edit.heading.as_deref(),
            expected,
        )?;
        self.assemble_document(&run)
    }

    /// Interpret a conversational message against the report. Edit requests
    /// are staged as suggestions without touching the report; anything else
    /// gets a reply.
    #[instrument(skip(self, message), fields(report_id = %report_id, message_id = %message_id))]
    pub async fn handle_message(
        &self,
        report_id: &str,
        message_id: &str,
        message: &str,
    ) -> Result<MessageOutcome> {
        let lock = self.lock_for(report_id);
        let _guard = lock.lock().await;

        let run = self.require_run(report_id)?;
        if !matches!(run.state, RunState::AwaitingApproval | RunState::Completed) {
            return Err(ScribeError::state(
                "converse about report",
                "awaiting_approval or completed",
                run.state.as_str(),
            ));
        }

        let document = self.assemble_document(&run)?;
        match self.suggestions.classify(message, &document).await? {
            MessageIntent::EditProposal {
                section_id,
                original_text,
                suggested_text,
            } => {
                let suggestion = Suggestion::proposed(
                    message_id,
                    report_id,
                    section_id,
                    original_text,
                    suggested_text,
                );
                self.db.insert_suggestion(&suggestion)?;
                info!(section_id = %suggestion.section_id, "Suggestion staged");
                Ok(MessageOutcome::SuggestionStaged(suggestion))
            }
            MessageIntent::Research { query } => Ok(MessageOutcome::Reply(format!(
                "That needs information outside this report (lookup: {query}). \
                 No external research is performed here."
            ))),
            MessageIntent::ToolInvocation { tool } => Ok(MessageOutcome::Reply(format!(
                "That asks for an external action ('{tool}'), which this workflow \
                 does not perform. Only report edits and questions are handled."
            ))),
            MessageIntent::Reply(text) => Ok(MessageOutcome::Reply(text)),
        }
    }

    /// Accept a staged suggestion: replace the quoted span in the target
    /// section and resolve the suggestion, atomically. Returns the rebuilt
    /// document.
    #[instrument(skip(self), fields(report_id = %report_id, message_id = %message_id))]
    pub async fn accept_suggestion(&self, report_id: &str, message_id: &str) -> Result<Document> {
        let lock = self.lock_for(report_id);
        let _guard = lock.lock().await;

        let run = self.require_run(report_id)?;
        let suggestion = self.lookup_suggestion(report_id, message_id)?;
        if !suggestion.is_pending() {
            return Err(ConflictKind::AlreadyResolved.into());
        }

        let record = self
            .db
            .load_section(report_id, &suggestion.section_id)?
            .ok_or_else(|| ValidationError::section_not_found(&suggestion.section_id))?;
        let body = record.content.clone().unwrap_or_default();
        if !body.contains(&suggestion.original_text) {
            return Err(ConflictKind::SectionChanged.into());
        }

        let new_content = body.replacen(&suggestion.original_text, &suggestion.suggested_text, 1);
        self.db.apply_accepted_suggestion(
            message_id,
            report_id,
            &suggestion.section_id,
            &new_content,
            record.version,
        )?;
        info!(section_id = %suggestion.section_id, "Suggestion accepted");
        self.assemble_document(&run)
    }

    /// Reject a staged suggestion. The report is left untouched.
    #[instrument(skip(self), fields(report_id = %report_id, message_id = %message_id))]
    pub async fn reject_suggestion(&self, report_id: &str, message_id: &str) -> Result<()> {
        let lock = self.lock_for(report_id);
        let _guard = lock.lock().await;

        self.lookup_suggestion(report_id, message_id)?;
        self.db.reject_suggestion(message_id)
    }

    /// The canonical document for a report in its current persisted state.
    pub fn document(&self, report_id: &str) -> Result<Document> {
        let run = self.require_run(report_id)?;
        self.assemble_document(&run)
    }

    /// Suspended runs idle beyond the given threshold.
    pub fn list_stale_runs(&self, threshold: ChronoDuration) -> Result<Vec<WorkflowRun>> {
        self.db.list_stale_runs(threshold)
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Drive the run forward until it suspends or terminates.
    async fn advance(&self, run: &mut WorkflowRun) -> Result<RunStatus> {
        loop {
            match run.state {
                RunState::Planning => self.run_planning(run).await?,
                RunState::Revising => self.run_revision(run).await?,
                RunState::Drafting => {
                    self.run_drafting(run).await?;
                    return Ok(RunStatus::from(&*run));
                }
                RunState::Finalizing => {
                    self.run_finalizing(run)?;
                    return Ok(RunStatus::from(&*run));
                }
                _ => return Ok(RunStatus::from(&*run)),
            }
        }
    }

    async fn run_planning(&self, run: &mut WorkflowRun) -> Result<()> {
        let request = PlanRequest {
            input: &run.input,
            prior_plan: None,
            feedback: None,
        };
        let plan = match self.planner.generate(&request).await {
            Ok(plan) => plan,
            Err(e) => return self.fail(run, e),
        };

        self.db
            .sync_sections_to_plan(&run.report_id, &section_entries(&plan, None))?;
        run.plan = Some(plan);
        self.transition(run, RunState::Drafting)
    }

    /// Replan with feedback, keeping drafts of sections whose drafting
    /// inputs did not change. A changed title, purpose, or photo set
    /// invalidates the draft; reordering alone does not.
    async fn run_revision(&self, run: &mut WorkflowRun) -> Result<()> {
        let prior = run.plan.clone();
        let feedback = run.feedback.clone();
        let request = PlanRequest {
            input: &run.input,
            prior_plan: prior.as_ref(),
            feedback: feedback.as_deref(),
        };
        let plan = match self.planner.generate(&request).await {
            Ok(plan) => plan,
            Err(e) => return self.fail(run, e),
        };

        if let Some(prior) = &prior {
            for (section, _) in plan.ordered_sections() {
                if let Some(old) = prior.find_section(&section.section_id)
                    && old.drafting_inputs() != section.drafting_inputs()
                {
                    debug!(section_id = %section.section_id, "Draft invalidated by revision");
                    self.db
                        .invalidate_section(&run.report_id, &section.section_id)?;
                }
            }
        }
        self.db
            .sync_sections_to_plan(&run.report_id, &section_entries(&plan, prior.as_ref()))?;

        run.plan = Some(plan);
        run.feedback = None;
        self.transition(run, RunState::Drafting)
    }

    /// Draft every section that has no content yet. Sections draft
    /// independently; ones already drafted (from a resumed run or preserved
    /// through a revision) are skipped. All drafts are persisted before the
    /// suspension transition commits.
    async fn run_drafting(&self, run: &mut WorkflowRun) -> Result<()> {
        let plan = match &run.plan {
            Some(plan) => plan.clone(),
            None => {
                return Err(ScribeError::Storage(format!(
                    "run '{}' is drafting without a plan",
                    run.report_id
                )));
            }
        };
        let records = self.db.load_sections(&run.report_id)?;

        for (section, _) in plan.ordered_sections() {
            let record = records
                .iter()
                .find(|r| r.section_id == section.section_id)
                .ok_or_else(|| {
                    ScribeError::Storage(format!(
                        "section '{}' has no stored row",
                        section.section_id
                    ))
                })?;
            if record.is_drafted() {
                continue;
            }

            match self.drafter.draft(section, &plan.strategy).await {
                Ok(text) => {
                    self.db.update_section(
                        &run.report_id,
                        &section.section_id,
                        Some(&text),
                        None,
                        record.version,
                    )?;
                }
                Err(e) => return self.fail(run, e),
            }
        }

        self.transition(run, RunState::AwaitingApproval)
    }

    fn run_finalizing(&self, run: &mut WorkflowRun) -> Result<()> {
        let document = self.assemble_document(run)?;
        run.final_document = Some(document.to_markdown());
        self.transition(run, RunState::Completed)
    }

    fn assemble_document(&self, run: &WorkflowRun) -> Result<Document> {
        let plan = run.plan.as_ref().ok_or_else(|| {
            ScribeError::Storage(format!("run '{}' has no plan", run.report_id))
        })?;
        let records = self.db.load_sections(&run.report_id)?;
        Ok(sections_to_document(join_plan_with_sections(plan, &records)))
    }

    fn lookup_suggestion(&self, report_id: &str, message_id: &str) -> Result<Suggestion> {
        let suggestion = self
            .db
            .load_suggestion(message_id)?
            .filter(|s| s.report_id == report_id)
            .ok_or_else(|| ValidationError::message_not_found(message_id))?;
        Ok(suggestion)
    }

    /// Persist a state transition and push the new status.
    fn transition(&self, run: &mut WorkflowRun, next: RunState) -> Result<()> {
        info!(report_id = %run.report_id, from = %run.state, to = %next, "State transition");
        run.state = next;
        self.db.save_run(run)?;
        self.notifier.notify(run);
        Ok(())
    }

    /// Move the run to `Failed`, recording which state it failed from, and
    /// surface the original error.
    fn fail(&self, run: &mut WorkflowRun, err: ScribeError) -> Result<()> {
        run.last_error = Some(format!("{}: {}", run.state.as_str(), err));
        self.transition(run, RunState::Failed)?;
        Err(err)
    }
}

/// Flatten a plan into storage rows. Sections kept from `prior` under the
/// same title are not marked retitled, so a heading edited by hand is left
/// alone by the sync.
fn section_entries(plan: &ReportPlan, prior: Option<&ReportPlan>) -> Vec<PlanEntry> {
    plan.ordered_sections()
        .into_iter()
        .map(|(section, depth)| PlanEntry {
            section_id: section.section_id.clone(),
            heading: section.title.clone(),
            level: depth,
            retitled: prior
                .and_then(|p| p.find_section(&section.section_id))
                .is_none_or(|old| old.title != section.title),
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
