//! Fan-out/fan-in executor for context analysis tasks
//!
//! Runs a fixed batch of independent tasks concurrently against a shared
//! read-only case snapshot, with bounded parallelism and a per-task timeout.
//! A failed or timed-out task fills its slot with an `unavailable` marker
//! instead of aborting the batch; the call returns only after every task has
//! settled.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::OrchestratorConfig;
use crate::models::{CaseSnapshot, ContextKind, ContextSlot};
use crate::tasks::AnalysisTask;

/// Outcome of one task in a batch, in completion order.
#[derive(Debug, Clone)]
pub struct ContextResult {
    pub kind: ContextKind,
    pub task_name: String,
    pub slot: ContextSlot,
    pub elapsed_ms: u64,
}

pub struct FanOutExecutor {
    max_parallel: usize,
    task_timeout: std::time::Duration,
}

impl FanOutExecutor {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            max_parallel: config.max_parallel_tasks.max(1),
            task_timeout: config.task_timeout,
        }
    }

    /// Execute every task in the batch and return one result per task.
    ///
    /// Results arrive in completion order, which is acceptable because each
    /// task owns a fixed result key — the merge is commutative and two tasks
    /// can never contend for the same slot.
    pub async fn run(
        &self,
        snapshot: Arc<CaseSnapshot>,
        tasks: &[(ContextKind, Arc<dyn AnalysisTask>)],
    ) -> Vec<ContextResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut set = JoinSet::new();

        debug!(
            batch_size = tasks.len(),
            max_parallel = self.max_parallel,
            "Starting fan-out batch"
        );

        for (kind, task) in tasks {
            let kind = *kind;
            let task = Arc::clone(task);
            let snapshot = Arc::clone(&snapshot);
            let semaphore = Arc::clone(&semaphore);
            let task_timeout = self.task_timeout;

            set.spawn(async move {
                // Closed-semaphore acquisition cannot happen here; the
                // semaphore lives as long as the batch.
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");

                let task_name = task.name().to_string();
                let start = Instant::now();

                let slot = match timeout(task_timeout, task.invoke(&snapshot)).await {
                    Ok(Ok(text)) => ContextSlot::Available { text },
                    Ok(Err(e)) => {
                        warn!(task = %task_name, error = %e, "Context task failed");
                        ContextSlot::Unavailable {
                            reason: e.to_string(),
                        }
                    }
                    Err(_) => {
                        warn!(task = %task_name, "Context task timed out");
                        ContextSlot::Unavailable {
                            reason: format!("timed out after {:?}", task_timeout),
                        }
                    }
                };

                ContextResult {
                    kind,
                    task_name,
                    slot,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                }
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                // A panicking task still yields an unavailable slot so the
                // batch keeps its one-result-per-task contract. The slot
                // kind is unknown at this point, so recover it from the
                // missing set below.
                Err(e) => warn!(error = %e, "Context task panicked"),
            }
        }

        // Backfill slots for any panicked tasks.
        for (kind, task) in tasks {
            if !results.iter().any(|r| r.kind == *kind) {
                results.push(ContextResult {
                    kind: *kind,
                    task_name: task.name().to_string(),
                    slot: ContextSlot::Unavailable {
                        reason: "task aborted".to_string(),
                    },
                    elapsed_ms: 0,
                });
            }
        }

        debug!(settled = results.len(), "Fan-out batch complete");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Case, Phase};
    use crate::tasks::ScriptedTask;
    use serde_json::json;
    use std::time::Duration;

    fn snapshot() -> Arc<CaseSnapshot> {
        Arc::new(CaseSnapshot {
            case: Case::new("ALRT-3001", json!({"amount": 300})),
            phase: Phase::Init,
            awaiting_input: false,
            finished: false,
            current_step: 0,
            total_steps: 9,
            digest: String::new(),
        })
    }

    fn config_with_timeout(timeout: Duration) -> OrchestratorConfig {
        OrchestratorConfig {
            task_timeout: timeout,
            ..OrchestratorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_all_tasks_settle() {
        let tasks: Vec<(ContextKind, Arc<dyn AnalysisTask>)> = ContextKind::ALL
            .iter()
            .map(|kind| {
                (
                    *kind,
                    Arc::new(ScriptedTask::new(kind.key(), format!("{} ok", kind.key())))
                        as Arc<dyn AnalysisTask>,
                )
            })
            .collect();

        let executor = FanOutExecutor::new(&OrchestratorConfig::default());
        let results = executor.run(snapshot(), &tasks).await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.slot.is_available()));
    }

    #[tokio::test]
    async fn test_failures_become_unavailable_markers() {
        let tasks: Vec<(ContextKind, Arc<dyn AnalysisTask>)> = vec![
            (
                ContextKind::Transaction,
                Arc::new(ScriptedTask::new("tx", "ok")),
            ),
            (
                ContextKind::Customer,
                Arc::new(ScriptedTask::new("cust", "unused").failing()),
            ),
            (
                ContextKind::Merchant,
                Arc::new(ScriptedTask::new("merch", "ok")),
            ),
            (
                ContextKind::Behavioral,
                Arc::new(ScriptedTask::new("beh", "unused").failing()),
            ),
        ];

        let executor = FanOutExecutor::new(&OrchestratorConfig::default());
        let results = executor.run(snapshot(), &tasks).await;

        assert_eq!(results.len(), 4);
        let unavailable = results.iter().filter(|r| !r.slot.is_available()).count();
        assert_eq!(unavailable, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fills_slot_and_batch_completes() {
        let tasks: Vec<(ContextKind, Arc<dyn AnalysisTask>)> = vec![
            (
                ContextKind::Transaction,
                Arc::new(ScriptedTask::new("fast", "ok")),
            ),
            (
                ContextKind::Customer,
                Arc::new(
                    ScriptedTask::new("slow", "never seen")
                        .with_delay(Duration::from_secs(120)),
                ),
            ),
        ];

        let executor = FanOutExecutor::new(&config_with_timeout(Duration::from_secs(1)));
        let results = executor.run(snapshot(), &tasks).await;

        assert_eq!(results.len(), 2);
        let slow = results
            .iter()
            .find(|r| r.kind == ContextKind::Customer)
            .unwrap();
        match &slow.slot {
            ContextSlot::Unavailable { reason } => assert!(reason.contains("timed out")),
            _ => panic!("expected timeout marker"),
        }
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingTask {
            running: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        #[async_trait::async_trait]
        impl AnalysisTask for CountingTask {
            fn name(&self) -> &str {
                "counting"
            }

            async fn invoke(&self, _case: &CaseSnapshot) -> crate::Result<String> {
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.running.fetch_sub(1, Ordering::SeqCst);
                Ok("ok".to_string())
            }
        }

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<(ContextKind, Arc<dyn AnalysisTask>)> = ContextKind::ALL
            .iter()
            .map(|kind| {
                (
                    *kind,
                    Arc::new(CountingTask {
                        running: Arc::clone(&running),
                        peak: Arc::clone(&peak),
                    }) as Arc<dyn AnalysisTask>,
                )
            })
            .collect();

        let config = OrchestratorConfig {
            max_parallel_tasks: 2,
            ..OrchestratorConfig::default()
        };
        let executor = FanOutExecutor::new(&config);
        let results = executor.run(snapshot(), &tasks).await;

        assert_eq!(results.len(), 4);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
