//! Session management for concurrent investigations
//!
//! One session wraps one investigation behind a per-session async mutex, so
//! every case operation (advance, answer, finalize) is serialized per case
//! while distinct cases proceed fully in parallel. A registry keyed by
//! session id plus an external-id index enforces one live session per
//! transaction alert.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::OrchestrationError;
use crate::models::CaseSnapshot;
use crate::sequencer::{Investigation, StepOutcome};
use crate::tasks::AnalysisSuite;
use crate::Result;

pub struct Session {
    pub id: Uuid,
    pub external_id: String,
    investigation: Mutex<Investigation>,
    /// Set by `end`; checked without taking the investigation lock so a
    /// close request never queues behind a long-running step.
    closed: AtomicBool,
}

impl Session {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    /// external transaction id -> live session id
    index: RwLock<HashMap<String, Uuid>>,
    suite: Arc<AnalysisSuite>,
    config: OrchestratorConfig,
}

impl SessionManager {
    pub fn new(suite: Arc<AnalysisSuite>, config: OrchestratorConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            suite,
            config,
        }
    }

    /// Open a session for an external transaction id.
    ///
    /// A second session for the same external id is rejected unless
    /// `replace` is set, in which case the old session is closed first.
    pub async fn create(
        &self,
        external_id: &str,
        transaction: serde_json::Value,
        replace: bool,
    ) -> Result<(Uuid, CaseSnapshot)> {
        let investigation = Investigation::new(
            external_id,
            transaction,
            Arc::clone(&self.suite),
            self.config.clone(),
        );
        let snapshot = investigation.snapshot();

        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            investigation: Mutex::new(investigation),
            closed: AtomicBool::new(false),
        });
        let id = session.id;

        // Existence check, displacement of the old session, and insert form
        // one critical section under the write locks; racing creates for the
        // same external id must never leave two live sessions.
        {
            let mut sessions = self.sessions.write().await;
            let mut index = self.index.write().await;

            if let Some(old_id) = index.get(external_id).copied() {
                if !replace {
                    return Err(OrchestrationError::SessionExists(external_id.to_string()));
                }
                // The displaced session is unregistered here; its closed flag
                // makes any in-flight advance abort at the next check.
                if let Some(old) = sessions.remove(&old_id) {
                    old.closed.store(true, Ordering::SeqCst);
                }
            }

            sessions.insert(id, Arc::clone(&session));
            index.insert(external_id.to_string(), id);
        }

        info!(session_id = %id, external_id = %external_id, "Session created");
        Ok((id, snapshot))
    }

    /// Pull the investigation forward by one unit of work.
    pub async fn advance(&self, session_id: Uuid) -> Result<(StepOutcome, CaseSnapshot)> {
        let session = self.get(session_id).await?;
        if session.is_closed() {
            return Err(OrchestrationError::SessionClosed(session_id.to_string()));
        }

        let mut investigation = session.investigation.lock().await;
        let outcome = investigation.step().await?;

        // A close that landed while we were stepping wins: the step's work
        // is kept but the session reports closed from here on.
        if session.is_closed() {
            investigation.close();
            return Ok((StepOutcome::Finished, investigation.snapshot()));
        }

        Ok((outcome, investigation.snapshot()))
    }

    /// Current state without advancing.
    pub async fn status(&self, session_id: Uuid) -> Result<CaseSnapshot> {
        let session = self.get(session_id).await?;
        let investigation = session.investigation.lock().await;
        Ok(investigation.snapshot())
    }

    /// Deliver the account holder's answer to the pending question.
    pub async fn submit_answer(&self, session_id: Uuid, text: &str) -> Result<CaseSnapshot> {
        let session = self.get(session_id).await?;
        if session.is_closed() {
            return Err(OrchestrationError::SessionClosed(session_id.to_string()));
        }

        let mut investigation = session.investigation.lock().await;
        investigation.submit_answer(text)?;
        Ok(investigation.snapshot())
    }

    /// Request conclusion of the dialogue at the next advance.
    pub async fn force_finalize(&self, session_id: Uuid) -> Result<CaseSnapshot> {
        let session = self.get(session_id).await?;
        if session.is_closed() {
            return Err(OrchestrationError::SessionClosed(session_id.to_string()));
        }

        let mut investigation = session.investigation.lock().await;
        investigation.force_finalize();
        info!(session_id = %session_id, "Finalize requested");
        Ok(investigation.snapshot())
    }

    /// Close a session and remove it from the registry. Returns the final
    /// snapshot. Safe to call while an advance is in flight: the flag is set
    /// immediately and the in-flight step notices it on completion.
    pub async fn end(&self, session_id: Uuid) -> Result<CaseSnapshot> {
        let session = self.get(session_id).await?;
        session.closed.store(true, Ordering::SeqCst);

        {
            let mut sessions = self.sessions.write().await;
            let mut index = self.index.write().await;
            sessions.remove(&session_id);
            if index.get(&session.external_id) == Some(&session_id) {
                index.remove(&session.external_id);
            }
        }

        let mut investigation = session.investigation.lock().await;
        investigation.close();
        info!(session_id = %session_id, external_id = %session.external_id, "Session ended");
        Ok(investigation.snapshot())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn get(&self, session_id: Uuid) -> Result<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::SessionNotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Phase;
    use crate::tasks::ScriptedTask;
    use serde_json::json;
    use std::time::Duration;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(AnalysisSuite::scripted()),
            OrchestratorConfig::default(),
        )
    }

    /// Drive a session until it suspends or finishes.
    async fn pump(manager: &SessionManager, id: Uuid) -> (StepOutcome, CaseSnapshot) {
        loop {
            let (outcome, snapshot) = manager.advance(id).await.unwrap();
            if outcome != StepOutcome::Progressed {
                return (outcome, snapshot);
            }
        }
    }

    #[tokio::test]
    async fn test_duplicate_external_id_rejected() {
        let manager = manager();
        manager.create("ALRT-1", json!({}), false).await.unwrap();

        let err = manager.create("ALRT-1", json!({}), false).await;
        assert!(matches!(err, Err(OrchestrationError::SessionExists(_))));
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_replace_closes_previous_session() {
        let manager = manager();
        let (old_id, _) = manager.create("ALRT-1", json!({}), false).await.unwrap();
        let (new_id, _) = manager.create("ALRT-1", json!({}), true).await.unwrap();

        assert_ne!(old_id, new_id);
        assert_eq!(manager.session_count().await, 1);
        assert!(matches!(
            manager.advance(old_id).await,
            Err(OrchestrationError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_replacing_creates_leave_one_session() {
        let manager = Arc::new(manager());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.create("ALRT-RACE", json!({}), true).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Exactly one session survives; it is the one the index points at,
        // and every displaced session is gone from the registry.
        assert_eq!(manager.session_count().await, 1);
        let survivor = *manager.index.read().await.get("ALRT-RACE").unwrap();
        assert!(manager.status(survivor).await.is_ok());
    }

    #[tokio::test]
    async fn test_full_session_flow() {
        let manager = manager();
        let (id, snapshot) = manager.create("ALRT-2", json!({"amount": 900}), false).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Init);

        let (outcome, snapshot) = pump(&manager, id).await;
        assert_eq!(outcome, StepOutcome::AwaitingAnswer);
        assert!(snapshot.awaiting_input);

        manager.submit_answer(id, "a caller guided me").await.unwrap();
        let (outcome, _) = pump(&manager, id).await;
        assert_eq!(outcome, StepOutcome::AwaitingAnswer);

        manager.submit_answer(id, "they mentioned a security code").await.unwrap();
        let (outcome, snapshot) = pump(&manager, id).await;
        assert_eq!(outcome, StepOutcome::Finished);
        assert_eq!(snapshot.phase, Phase::Decided);
        assert!(snapshot.finished);
    }

    #[tokio::test]
    async fn test_answer_without_pending_question_rejected() {
        let manager = manager();
        let (id, _) = manager.create("ALRT-3", json!({}), false).await.unwrap();

        let err = manager.submit_answer(id, "unprompted").await;
        assert!(matches!(err, Err(OrchestrationError::NoPendingQuestion)));
    }

    #[tokio::test]
    async fn test_ended_session_rejects_operations() {
        let manager = manager();
        let (id, _) = manager.create("ALRT-4", json!({}), false).await.unwrap();

        let snapshot = manager.end(id).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Closed);
        assert!(matches!(
            manager.advance(id).await,
            Err(OrchestrationError::SessionNotFound(_))
        ));
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let manager = manager();
        assert!(matches!(
            manager.status(Uuid::new_v4()).await,
            Err(OrchestrationError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_advances_serialize_per_session() {
        // A slow synthesizer makes the race window wide: two concurrent
        // advances must execute one after the other, each completing
        // exactly one phase.
        let mut suite = AnalysisSuite::scripted();
        suite.synthesizer = Arc::new(
            ScriptedTask::new("risk_synthesizer", "slow synthesis")
                .with_delay(Duration::from_millis(50)),
        );
        let manager = Arc::new(SessionManager::new(
            Arc::new(suite),
            OrchestratorConfig::default(),
        ));

        let (id, _) = manager.create("ALRT-5", json!({}), false).await.unwrap();
        manager.advance(id).await.unwrap(); // contexts

        let a = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.advance(id).await })
        };
        let b = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.advance(id).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // One advance ran synthesis, the other triage; never both the same.
        let snapshot = manager.status(id).await.unwrap();
        assert_eq!(snapshot.phase, Phase::TriageDone);
        assert!(snapshot.case.findings.contains_key("risk_synthesis"));
        assert!(snapshot.case.findings.contains_key("triage"));
    }

    #[tokio::test]
    async fn test_end_during_advance_is_safe() {
        let mut suite = AnalysisSuite::scripted();
        suite.synthesizer = Arc::new(
            ScriptedTask::new("risk_synthesizer", "slow synthesis")
                .with_delay(Duration::from_millis(50)),
        );
        let manager = Arc::new(SessionManager::new(
            Arc::new(suite),
            OrchestratorConfig::default(),
        ));

        let (id, _) = manager.create("ALRT-6", json!({}), false).await.unwrap();
        manager.advance(id).await.unwrap(); // contexts

        let advancing = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.advance(id).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.end(id).await.unwrap();

        // The in-flight advance either finished before the close landed or
        // reports the session as finished; it never panics or deadlocks.
        let result = advancing.await.unwrap();
        match result {
            Ok((outcome, _)) => assert!(matches!(
                outcome,
                StepOutcome::Progressed | StepOutcome::Finished
            )),
            Err(e) => assert!(matches!(e, OrchestrationError::SessionClosed(_))),
        }
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_force_finalize_flows_through_session() {
        let manager = manager();
        let (id, _) = manager.create("ALRT-7", json!({}), false).await.unwrap();
        pump(&manager, id).await;

        manager.submit_answer(id, "only one answer").await.unwrap();
        manager.force_finalize(id).await.unwrap();

        let (outcome, snapshot) = pump(&manager, id).await;
        assert_eq!(outcome, StepOutcome::Finished);
        assert!(snapshot.case.gate_history.last().unwrap().forced);
    }
}
