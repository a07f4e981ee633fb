//! Dialogue loop: question/answer interrogation with throttled reassessment
//!
//! Drives the interactive phase of an investigation. Each advance either
//! concludes the phase (gate pass, budget exhaustion, or a force-finalize
//! request) or posts one new question and suspends. Incremental risk
//! reassessments over the growing transcript are throttled and memoized so
//! repeated suspend/resume cycles do not re-bill identical work.

use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use crate::audit;
use crate::config::OrchestratorConfig;
use crate::gate;
use crate::models::{Case, CaseSnapshot, GateReason, Phase};
use crate::tasks::AnalysisSuite;
use crate::Result;

/// Answer phrases that trigger an immediate reassessment regardless of the
/// turn-count throttle.
const HIGH_SIGNAL_PHRASES: &[&str] = &["scam", "fraud", "unauthorized", "suspicious", "fake"];

/// Questions about these topics collect identity data, not risk evidence.
/// Their answers skip reassessment unless a high-signal phrase appears.
const IDENTITY_KEYWORDS: &[&str] = &[
    "name",
    "date of birth",
    "dob",
    "identity",
    "address",
    "email",
    "phone",
];

/// How far back the memo key looks into the transcript.
const MEMO_TURN_WINDOW: usize = 3;

/// Result of one dialogue advance.
#[derive(Debug, Clone)]
pub enum DialogueOutcome {
    /// A new question was posted; the case is suspended awaiting its answer.
    QuestionPosted,
    /// The gate passed on objective evidence; dialogue is complete.
    GatePassed(GateReason),
    /// The turn budget ran out; dialogue is complete whatever the gate says.
    BudgetExhausted(GateReason),
    /// A force-finalize request overrode the gate.
    Forced(GateReason),
}

pub struct DialogueLoop {
    config: OrchestratorConfig,
    memo: MemoCache,
}

impl DialogueLoop {
    pub fn new(config: OrchestratorConfig) -> Self {
        let memo = MemoCache::new(config.memo_capacity);
        Self { config, memo }
    }

    /// Advance the dialogue by one step. Callers must only invoke this when
    /// no question is pending (the sequencer suspends on pending questions).
    pub async fn advance(
        &mut self,
        case: &mut Case,
        suite: &AnalysisSuite,
    ) -> Result<DialogueOutcome> {
        if case.finalize_requested {
            let mut reason = gate::evaluate(case, self.config.min_answered_turns);
            reason.forced = true;
            reason.passed = true;
            info!(case_id = %case.case_id, "Dialogue concluded by finalize request");
            case.gate_history.push(reason.clone());
            return Ok(DialogueOutcome::Forced(reason));
        }

        // The budget is a hard cap: it wins even over a gate that would
        // otherwise keep asking.
        if case.agent_turns() >= self.config.max_dialogue_turns {
            let reason = gate::evaluate(case, self.config.min_answered_turns);
            info!(
                case_id = %case.case_id,
                turns = case.agent_turns(),
                "Dialogue turn budget exhausted"
            );
            case.gate_history.push(reason.clone());
            return Ok(DialogueOutcome::BudgetExhausted(reason));
        }

        let reason = gate::evaluate(case, self.config.min_answered_turns);
        if reason.passed {
            info!(
                case_id = %case.case_id,
                answered_turns = reason.answered_turns,
                indicators = ?reason.matched_indicators,
                "Dialogue gate passed"
            );
            case.gate_history.push(reason.clone());
            return Ok(DialogueOutcome::GatePassed(reason));
        }
        case.gate_history.push(reason);

        if self.should_reassess(case) {
            self.reassess(case, suite).await?;
        }

        let snapshot = freeze(case);
        let question = suite.interviewer.invoke(&snapshot).await?;
        case.record_task(suite.interviewer.name(), &question);
        case.append_question(question, suite.interviewer.name())?;

        debug!(
            case_id = %case.case_id,
            turn = case.agent_turns(),
            "Posted question, suspending for answer"
        );
        Ok(DialogueOutcome::QuestionPosted)
    }

    /// Throttle: reassess on every second answered turn, on every turn once
    /// the transcript is deep enough, or immediately when the latest answer
    /// carries a high-signal phrase. Identity-collection answers are exempt
    /// unless high-signal.
    fn should_reassess(&self, case: &Case) -> bool {
        let answered = case.answered_turns();
        if answered == 0 {
            return false;
        }

        let last_answered = match case.turns.iter().rev().find(|t| t.is_answered()) {
            Some(turn) => turn,
            None => return false,
        };

        let answer = last_answered
            .answer
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        let high_signal = HIGH_SIGNAL_PHRASES.iter().any(|p| answer.contains(p));
        if high_signal {
            return true;
        }

        let question = last_answered.question.to_lowercase();
        if IDENTITY_KEYWORDS.iter().any(|k| question.contains(k)) {
            return false;
        }

        answered % self.config.reassess_every == 0 || answered >= self.config.reassess_after
    }

    /// Memoized incremental reassessment over the recent transcript.
    async fn reassess(&mut self, case: &mut Case, suite: &AnalysisSuite) -> Result<()> {
        let key = format!(
            "risk_assessment_{}_{}",
            case.answered_turns(),
            audit::turn_window_digest(&case.turns, MEMO_TURN_WINDOW)
        );

        if let Some(cached) = self.memo.get(&key) {
            debug!(case_id = %case.case_id, "Reassessment memo hit");
            case.findings
                .insert("risk_reassessment".to_string(), cached.clone());
            return Ok(());
        }

        let snapshot = freeze(case);
        let assessment = suite.reassessor.invoke(&snapshot).await?;
        case.record_task(suite.reassessor.name(), &assessment);
        case.findings
            .insert("risk_reassessment".to_string(), assessment.clone());
        self.memo.insert(key, assessment);
        Ok(())
    }
}

fn freeze(case: &Case) -> CaseSnapshot {
    CaseSnapshot {
        digest: audit::snapshot_digest(case, Phase::Dialoguing),
        case: case.clone(),
        phase: Phase::Dialoguing,
        awaiting_input: false,
        finished: false,
        current_step: 7,
        total_steps: 9,
    }
}

//
// ================= Memo cache =================
//

/// Bounded memo cache with least-recently-used eviction.
struct MemoCache {
    capacity: usize,
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl MemoCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: &str) -> Option<&String> {
        if self.entries.contains_key(key) {
            self.touch(key);
            self.entries.get(key)
        } else {
            None
        }
    }

    fn insert(&mut self, key: String, value: String) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        } else {
            self.touch(&key);
        }

        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos).unwrap_or_else(|| key.to_string());
            self.order.push_back(k);
        }
    }
}
