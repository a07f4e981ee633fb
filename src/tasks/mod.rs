//! Analysis task trait and the fixed task suite
//!
//! An analysis task is one independent investigative angle: it receives a
//! read-only case snapshot and returns a named partial result. Tasks are
//! swappable collaborators — the orchestrator only depends on this trait.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::OrchestrationError;
use crate::models::{CaseSnapshot, ContextKind};
use crate::Result;

pub mod remote;
pub use remote::RemoteAnalysisTask;

/// Trait for a single analysis task.
///
/// Implementations must be safely callable concurrently and must never
/// mutate their input; all case mutation happens in the orchestration layer.
#[async_trait]
pub trait AnalysisTask: Send + Sync {
    fn name(&self) -> &str;
    async fn invoke(&self, case: &CaseSnapshot) -> Result<String>;
}

/// The fixed set of tasks one investigation runs, by role.
///
/// The four context tasks fan out concurrently; everything else runs as a
/// single task within its phase.
pub struct AnalysisSuite {
    pub context_tasks: Vec<(ContextKind, Arc<dyn AnalysisTask>)>,
    /// Merges the four contexts into one risk picture.
    pub synthesizer: Arc<dyn AnalysisTask>,
    /// Decides escalation/dialogue requirements.
    pub triage: Arc<dyn AnalysisTask>,
    /// Produces the next question for the account holder.
    pub interviewer: Arc<dyn AnalysisTask>,
    /// Incremental risk re-evaluation over the growing transcript.
    pub reassessor: Arc<dyn AnalysisTask>,
    /// One last assessment over the full transcript before deciding.
    pub finalizer: Arc<dyn AnalysisTask>,
    /// Policy decision over everything the case gathered.
    pub policy: Arc<dyn AnalysisTask>,
}

impl AnalysisSuite {
    /// The production suite: every task backed by the reasoning service.
    pub fn remote(client: Arc<crate::reasoning::ReasoningClient>) -> Self {
        let task = |name: &str, role: &str, instruction: &str| {
            Arc::new(RemoteAnalysisTask::new(
                name,
                role,
                instruction,
                Arc::clone(&client),
            )) as Arc<dyn AnalysisTask>
        };

        Self {
            context_tasks: vec![
                (
                    ContextKind::Transaction,
                    task(
                        "transaction_context_task",
                        "You are a payments analyst specializing in transaction forensics.",
                        "Summarize what is notable about this transaction: amount, payee \
                         history, channel, and timing. Be factual and brief.",
                    ),
                ),
                (
                    ContextKind::Customer,
                    task(
                        "customer_context_task",
                        "You are a customer intelligence analyst.",
                        "Summarize the customer's profile and vulnerability indicators \
                         relevant to scam risk. Be factual and brief.",
                    ),
                ),
                (
                    ContextKind::Merchant,
                    task(
                        "merchant_context_task",
                        "You are a merchant risk analyst.",
                        "Summarize what is known about the payee: registration age, \
                         category, complaint history. Be factual and brief.",
                    ),
                ),
                (
                    ContextKind::Behavioral,
                    task(
                        "behavioral_context_task",
                        "You are a behavioral anomaly analyst.",
                        "Summarize deviations from this customer's normal behavior: \
                         device, location, session pattern, payment cadence.",
                    ),
                ),
            ],
            synthesizer: task(
                "risk_synthesizer",
                "You are a fraud risk officer.",
                "Merge the context summaries into a single risk picture with a LOW, \
                 MEDIUM, or HIGH rating and the key drivers.",
            ),
            triage: task(
                "triage",
                "You are a fraud operations triage lead.",
                "Decide whether this case needs a customer dialogue before a decision \
                 can be made, and what the dialogue should establish.",
            ),
            interviewer: task(
                "interviewer",
                "You are a fraud investigator interviewing the account holder. Ask \
                 exactly one short, plain-language question.",
                "Given everything above, ask the single most informative next question. \
                 Reply with the question only.",
            ),
            reassessor: task(
                "risk_reassessor",
                "You are a fraud risk officer.",
                "Re-evaluate the risk rating in light of the latest answers. Note any \
                 change and what drove it.",
            ),
            finalizer: task(
                "final_assessor",
                "You are a senior fraud risk officer.",
                "Produce the final risk assessment over the full case, including the \
                 complete customer conversation.",
            ),
            policy: task(
                "policy_decision",
                "You are a payments policy engine.",
                "Decide the disposition for this transaction: release, hold for review, \
                 or block. State the decision first, then the grounds.",
            ),
        }
    }

    /// A fully scripted suite for tests and offline runs.
    pub fn scripted() -> Self {
        Self {
            context_tasks: ContextKind::ALL
                .iter()
                .map(|kind| {
                    (
                        *kind,
                        Arc::new(ScriptedTask::new(
                            format!("{}_task", kind.key()),
                            format!("scripted {} summary", kind.key()),
                        )) as Arc<dyn AnalysisTask>,
                    )
                })
                .collect(),
            synthesizer: Arc::new(ScriptedTask::new(
                "risk_synthesizer",
                "scripted risk synthesis: MEDIUM",
            )),
            triage: Arc::new(ScriptedTask::new(
                "triage",
                "scripted triage: dialogue required",
            )),
            interviewer: Arc::new(ScriptedTask::new(
                "interviewer",
                "Can you describe how this payment was requested?",
            )),
            reassessor: Arc::new(ScriptedTask::new(
                "risk_reassessor",
                "scripted incremental reassessment",
            )),
            finalizer: Arc::new(ScriptedTask::new(
                "final_assessor",
                "scripted final assessment: HIGH",
            )),
            policy: Arc::new(ScriptedTask::new(
                "policy_decision",
                "scripted policy: hold transaction and contact customer",
            )),
        }
    }
}

/// Deterministic task double. Replies with a fixed string; optionally
/// sleeps first (to exercise timeouts and lock serialization) or fails.
pub struct ScriptedTask {
    name: String,
    reply: String,
    delay: Duration,
    fail: bool,
}

impl ScriptedTask {
    pub fn new(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: reply.into(),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl AnalysisTask for ScriptedTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _case: &CaseSnapshot) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(OrchestrationError::TaskError(format!(
                "{} scripted failure",
                self.name
            )));
        }
        Ok(self.reply.clone())
    }
}
