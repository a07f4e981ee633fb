//! Core data models for the scam investigation orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::OrchestrationError;
use crate::Result;

//
// ================= Phases =================
//

/// Ordered pipeline phases for one case.
///
/// `Dialoguing` is the only phase that can be re-entered after partial
/// progress; everything else runs at most once per case lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    ContextBuilt,
    SynthesisDone,
    TriageDone,
    Dialoguing,
    Finalized,
    Decided,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::ContextBuilt => "context_built",
            Phase::SynthesisDone => "synthesis_done",
            Phase::TriageDone => "triage_done",
            Phase::Dialoguing => "dialoguing",
            Phase::Finalized => "finalized",
            Phase::Decided => "decided",
            Phase::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// One completion flag per phase. Once set, a flag is never cleared within a
/// case lifetime except through [`PhaseFlags::re_arm`], which exists for
/// replay and tests only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseFlags {
    pub contexts_built: bool,
    pub risk_synth_done: bool,
    pub triage_done: bool,
    pub chat_done: bool,
    pub finalized: bool,
    pub policy_decision_done: bool,
}

impl PhaseFlags {
    /// Clear the completion flag for a phase so it can run again.
    /// Replay/testing escape hatch; never called on the live path.
    pub fn re_arm(&mut self, phase: Phase) {
        match phase {
            Phase::ContextBuilt => self.contexts_built = false,
            Phase::SynthesisDone => self.risk_synth_done = false,
            Phase::TriageDone => self.triage_done = false,
            Phase::Dialoguing => self.chat_done = false,
            Phase::Finalized => self.finalized = false,
            Phase::Decided => self.policy_decision_done = false,
            Phase::Init | Phase::Closed => {}
        }
    }
}

//
// ================= Contexts =================
//

/// The fixed set of investigative angles built during fan-out.
/// Each kind maps to exactly one result key, which is what makes the
/// fan-in merge commutative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Transaction,
    Customer,
    Merchant,
    Behavioral,
}

impl ContextKind {
    pub const ALL: [ContextKind; 4] = [
        ContextKind::Transaction,
        ContextKind::Customer,
        ContextKind::Merchant,
        ContextKind::Behavioral,
    ];

    /// Fixed result key for this context in `Case::contexts`.
    pub fn key(self) -> &'static str {
        match self {
            ContextKind::Transaction => "transaction_context",
            ContextKind::Customer => "customer_context",
            ContextKind::Merchant => "merchant_context",
            ContextKind::Behavioral => "behavioral_context",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Result slot for a single analysis task. A failed or timed-out task fills
/// its slot with an explicit `Unavailable` marker instead of aborting the
/// batch; partial context is a valid outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContextSlot {
    Available { text: String },
    Unavailable { reason: String },
}

impl ContextSlot {
    pub fn is_available(&self) -> bool {
        matches!(self, ContextSlot::Available { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ContextSlot::Available { text } => Some(text),
            ContextSlot::Unavailable { .. } => None,
        }
    }
}

//
// ================= Dialogue =================
//

/// One question/answer exchange in the interrogation transcript.
///
/// A turn is appended with an empty answer slot when the question is posted
/// and filled in place when the account holder replies. The orchestrator
/// never appends a second question while one is awaiting its answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogueTurn {
    pub question: String,
    /// Name of the analysis task that produced the question.
    pub asked_by: String,
    pub asked_at: DateTime<Utc>,
    pub answer: Option<String>,
    pub answered_at: Option<DateTime<Utc>>,
}

impl DialogueTurn {
    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }
}

//
// ================= Gate =================
//

/// Immutable snapshot of one gate evaluation, retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateReason {
    pub transaction_present: bool,
    pub customer_present: bool,
    pub merchant_present: bool,
    pub behavioral_present: bool,
    pub answered_turns: usize,
    /// Strong indicator phrases matched in answers or built context.
    pub matched_indicators: Vec<String>,
    /// True when the gate outcome was overridden by a force-finalize
    /// request. The objective evaluation is still recorded above.
    pub forced: bool,
    pub passed: bool,
    pub evaluated_at: DateTime<Utc>,
}

//
// ================= Case =================
//

/// One investigation instance tied to a single external transaction
/// identifier. Mutated exclusively by the orchestration layer; analysis
/// tasks only ever see read-only snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub case_id: Uuid,
    pub external_id: String,
    /// Original transaction record, kept opaque.
    pub transaction: serde_json::Value,
    /// Fixed key-per-task context results (fan-out output).
    pub contexts: BTreeMap<String, ContextSlot>,
    /// Single-task phase results (risk synthesis, triage, final assessment,
    /// policy decision) keyed by phase result name.
    pub findings: BTreeMap<String, String>,
    /// Analysis-task names in invocation order. Advisory, not load-bearing.
    pub invoked: Vec<String>,
    /// One response summary per task, in completion order.
    pub responses: Vec<String>,
    pub turns: Vec<DialogueTurn>,
    pub flags: PhaseFlags,
    /// Phase-level errors keyed by phase result name. A phase that errors
    /// still advances; downstream consumers treat the result as unavailable.
    pub phase_errors: BTreeMap<String, String>,
    /// Every gate evaluation ever made for this case, oldest first.
    pub gate_history: Vec<GateReason>,
    /// Human-override escape hatch: when set, the next gate check passes
    /// regardless of the objective evaluation.
    pub finalize_requested: bool,
    pub created_at: DateTime<Utc>,
}

impl Case {
    pub fn new(external_id: impl Into<String>, transaction: serde_json::Value) -> Self {
        Self {
            case_id: Uuid::new_v4(),
            external_id: external_id.into(),
            transaction,
            contexts: BTreeMap::new(),
            findings: BTreeMap::new(),
            invoked: Vec::new(),
            responses: Vec::new(),
            turns: Vec::new(),
            flags: PhaseFlags::default(),
            phase_errors: BTreeMap::new(),
            gate_history: Vec::new(),
            finalize_requested: false,
            created_at: Utc::now(),
        }
    }

    /// Number of agent questions asked so far (answered or not).
    pub fn agent_turns(&self) -> usize {
        self.turns.len()
    }

    /// Number of turns that have received an answer.
    pub fn answered_turns(&self) -> usize {
        self.turns.iter().filter(|t| t.is_answered()).count()
    }

    /// The most recent question still awaiting its answer, if any.
    pub fn pending_question(&self) -> Option<&DialogueTurn> {
        self.turns.last().filter(|t| !t.is_answered())
    }

    pub fn has_pending_question(&self) -> bool {
        self.pending_question().is_some()
    }

    /// Append a new agent question with an empty answer slot.
    /// Refused while a previous question is still unanswered, which is what
    /// keeps the transcript strictly alternating.
    pub fn append_question(
        &mut self,
        question: impl Into<String>,
        asked_by: impl Into<String>,
    ) -> Result<()> {
        if self.has_pending_question() {
            return Err(OrchestrationError::TurnOrder(
                "previous question is still awaiting its answer".to_string(),
            ));
        }
        self.turns.push(DialogueTurn {
            question: question.into(),
            asked_by: asked_by.into(),
            asked_at: Utc::now(),
            answer: None,
            answered_at: None,
        });
        Ok(())
    }

    /// Fill the most recent empty agent turn in place.
    pub fn fill_answer(&mut self, text: impl Into<String>) -> Result<()> {
        match self.turns.last_mut() {
            Some(turn) if !turn.is_answered() => {
                turn.answer = Some(text.into());
                turn.answered_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(OrchestrationError::NoPendingQuestion),
        }
    }

    /// All answer text concatenated, for indicator scanning.
    pub fn answer_text(&self) -> String {
        self.turns
            .iter()
            .filter_map(|t| t.answer.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All available context text concatenated, for indicator scanning.
    pub fn context_text(&self) -> String {
        self.contexts
            .values()
            .filter_map(|slot| slot.text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Record one task invocation and its response summary.
    pub fn record_task(&mut self, name: impl Into<String>, summary: impl Into<String>) {
        self.invoked.push(name.into());
        self.responses.push(summary.into());
    }
}

//
// ================= Snapshot =================
//

/// Serializable view of a case at a suspension point. Sufficient to
/// reconstruct the session if the process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSnapshot {
    pub case: Case,
    pub phase: Phase,
    /// Suspended awaiting a user answer (distinct from finished).
    pub awaiting_input: bool,
    pub finished: bool,
    pub current_step: u32,
    pub total_steps: u32,
    /// SHA-256 digest of the snapshot payload, for integrity checks.
    pub digest: String,
}

impl CaseSnapshot {
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}
