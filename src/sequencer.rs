//! Phase sequencer for one investigation
//!
//! Linear FSM driving a case from intake to policy decision. Each `step`
//! call performs at most one unit of work and returns what happened, so a
//! poll-driven caller can pull the investigation forward incrementally and
//! suspend it at any question. Phase errors are recorded on the case and the
//! pipeline continues with an unavailable result; only dialogue invariant
//! violations and serialization failures surface as hard errors.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audit;
use crate::config::OrchestratorConfig;
use crate::dialogue::{DialogueLoop, DialogueOutcome};
use crate::error::OrchestrationError;
use crate::executor::FanOutExecutor;
use crate::models::{Case, CaseSnapshot, ContextSlot, Phase};
use crate::tasks::{AnalysisSuite, AnalysisTask};
use crate::Result;

const TOTAL_STEPS: u32 = 9;

/// What one `step` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One phase (or dialogue exchange) completed; call again for more.
    Progressed,
    /// A question is awaiting the account holder; stepping again is a no-op
    /// until the answer arrives.
    AwaitingAnswer,
    /// The policy decision has been made; nothing left to do.
    Finished,
}

pub struct Investigation {
    case: Case,
    phase: Phase,
    dialogue: DialogueLoop,
    suite: Arc<AnalysisSuite>,
    executor: FanOutExecutor,
}

impl Investigation {
    pub fn new(
        external_id: impl Into<String>,
        transaction: serde_json::Value,
        suite: Arc<AnalysisSuite>,
        config: OrchestratorConfig,
    ) -> Self {
        let executor = FanOutExecutor::new(&config);
        let dialogue = DialogueLoop::new(config);
        Self {
            case: Case::new(external_id, transaction),
            phase: Phase::Init,
            dialogue,
            suite,
            executor,
        }
    }

    /// Rebuild a suspended investigation from its snapshot.
    ///
    /// The dialogue memo cache is not part of the snapshot; a resumed session
    /// re-computes reassessments on first use, which is correct just slower.
    pub fn resume(
        snapshot: CaseSnapshot,
        suite: Arc<AnalysisSuite>,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        if !audit::verify_snapshot(&snapshot) {
            return Err(OrchestrationError::PhaseError(format!(
                "snapshot digest mismatch for case {}",
                snapshot.case.case_id
            )));
        }

        let executor = FanOutExecutor::new(&config);
        let dialogue = DialogueLoop::new(config);
        Ok(Self {
            case: snapshot.case,
            phase: snapshot.phase,
            dialogue,
            suite,
            executor,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn case(&self) -> &Case {
        &self.case
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Decided | Phase::Closed)
    }

    pub fn awaiting_input(&self) -> bool {
        self.phase == Phase::Dialoguing && self.case.has_pending_question()
    }

    /// Perform one unit of work.
    ///
    /// Idempotent at suspension points: while a question is pending or the
    /// case is finished, repeated calls return the same outcome without side
    /// effects.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        match self.phase {
            // A phase whose completion flag is already set (replay, re-armed
            // snapshot) advances without re-running its work: a no-op, not
            // an error.
            Phase::Init => {
                if !self.case.flags.contexts_built {
                    self.build_contexts().await;
                    self.case.flags.contexts_built = true;
                }
                self.phase = Phase::ContextBuilt;
                Ok(StepOutcome::Progressed)
            }
            Phase::ContextBuilt => {
                if !self.case.flags.risk_synth_done {
                    let synthesizer = Arc::clone(&self.suite.synthesizer);
                    self.run_single(&synthesizer, "risk_synthesis").await;
                    self.case.flags.risk_synth_done = true;
                }
                self.phase = Phase::SynthesisDone;
                Ok(StepOutcome::Progressed)
            }
            Phase::SynthesisDone => {
                if !self.case.flags.triage_done {
                    let triage = Arc::clone(&self.suite.triage);
                    self.run_single(&triage, "triage").await;
                    self.case.flags.triage_done = true;
                }
                self.phase = Phase::TriageDone;
                Ok(StepOutcome::Progressed)
            }
            Phase::TriageDone => {
                self.phase = Phase::Dialoguing;
                self.dialogue_step().await
            }
            Phase::Dialoguing => {
                // A finalize request overrides a pending question; the
                // unanswered turn stays in the transcript as-is.
                if self.case.has_pending_question() && !self.case.finalize_requested {
                    return Ok(StepOutcome::AwaitingAnswer);
                }
                if self.case.flags.chat_done {
                    if !self.case.flags.finalized {
                        let finalizer = Arc::clone(&self.suite.finalizer);
                        self.run_single(&finalizer, "final_assessment").await;
                        self.case.flags.finalized = true;
                    }
                    self.phase = Phase::Finalized;
                    return Ok(StepOutcome::Progressed);
                }
                self.dialogue_step().await
            }
            Phase::Finalized => {
                if !self.case.flags.policy_decision_done {
                    let policy = Arc::clone(&self.suite.policy);
                    self.run_single(&policy, "policy_decision").await;
                    self.case.flags.policy_decision_done = true;
                }
                self.phase = Phase::Decided;
                info!(
                    case_id = %self.case.case_id,
                    external_id = %self.case.external_id,
                    "Investigation decided"
                );
                Ok(StepOutcome::Progressed)
            }
            Phase::Decided | Phase::Closed => Ok(StepOutcome::Finished),
        }
    }

    /// Fill the pending question's answer slot.
    pub fn submit_answer(&mut self, text: impl Into<String>) -> Result<()> {
        self.case.fill_answer(text)
    }

    /// Request conclusion at the next dialogue step regardless of the gate.
    pub fn force_finalize(&mut self) {
        self.case.finalize_requested = true;
    }

    pub fn close(&mut self) {
        self.phase = Phase::Closed;
    }

    /// Serializable view of the investigation at this moment.
    pub fn snapshot(&self) -> CaseSnapshot {
        CaseSnapshot {
            digest: audit::snapshot_digest(&self.case, self.phase),
            case: self.case.clone(),
            phase: self.phase,
            awaiting_input: self.awaiting_input(),
            finished: self.is_finished(),
            current_step: self.current_step(),
            total_steps: TOTAL_STEPS,
        }
    }

    fn current_step(&self) -> u32 {
        match self.phase {
            Phase::Init => 0,
            Phase::ContextBuilt => 4,
            Phase::SynthesisDone => 5,
            Phase::TriageDone => 6,
            Phase::Dialoguing => 7,
            Phase::Finalized => 8,
            Phase::Decided | Phase::Closed => TOTAL_STEPS,
        }
    }

    async fn dialogue_step(&mut self) -> Result<StepOutcome> {
        let outcome = self.dialogue.advance(&mut self.case, &self.suite).await?;
        match outcome {
            DialogueOutcome::QuestionPosted => Ok(StepOutcome::AwaitingAnswer),
            DialogueOutcome::GatePassed(_)
            | DialogueOutcome::BudgetExhausted(_)
            | DialogueOutcome::Forced(_) => {
                self.case.flags.chat_done = true;
                Ok(StepOutcome::Progressed)
            }
        }
    }

    /// Fan out the four context tasks and merge their slots into the case.
    async fn build_contexts(&mut self) {
        let snapshot = Arc::new(self.snapshot());
        let results = self
            .executor
            .run(snapshot, &self.suite.context_tasks)
            .await;

        for result in results {
            if let ContextSlot::Unavailable { reason } = &result.slot {
                self.case
                    .phase_errors
                    .insert(result.kind.key().to_string(), reason.clone());
            }

            let summary = result
                .slot
                .text()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "[unavailable]".to_string());
            self.case.record_task(&result.task_name, summary);
            self.case
                .contexts
                .insert(result.kind.key().to_string(), result.slot);
        }
    }

    /// Run one single-task phase. A task error is recorded on the case and
    /// the result marked unavailable; the phase still completes so the
    /// pipeline keeps moving.
    async fn run_single(&mut self, task: &Arc<dyn AnalysisTask>, result_key: &str) {
        let snapshot = self.snapshot();
        match task.invoke(&snapshot).await {
            Ok(text) => {
                self.case.record_task(task.name(), &text);
                self.case.findings.insert(result_key.to_string(), text);
            }
            Err(e) => {
                warn!(
                    case_id = %self.case.case_id,
                    task = task.name(),
                    error = %e,
                    "Phase task failed, continuing with unavailable result"
                );
                self.case
                    .phase_errors
                    .insert(result_key.to_string(), e.to_string());
                self.case
                    .findings
                    .insert(result_key.to_string(), "[unavailable]".to_string());
            }
        }
    }

    /// Drive the investigation until it suspends or finishes.
    /// Convenience for non-interactive runs; pollers call `step` directly.
    pub async fn run_until_suspend(&mut self) -> Result<StepOutcome> {
        loop {
            match self.step().await {
                Ok(StepOutcome::Progressed) => continue,
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    error!(case_id = %self.case.case_id, error = %e, "Investigation step failed");
                    return Err(e);
                }
            }
        }
    }
}
