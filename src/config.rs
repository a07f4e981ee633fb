//! Orchestrator configuration
//!
//! All knobs are environment-overridable; defaults match the values the
//! investigation pipeline was tuned with in production.

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::time::Duration;

/// Tunable limits for one investigation run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on concurrently running context tasks in one fan-out batch.
    pub max_parallel_tasks: usize,
    /// Per-task timeout inside a fan-out batch.
    pub task_timeout: Duration,
    /// Hard cap on agent (question) turns per case.
    pub max_dialogue_turns: usize,
    /// Answered user turns required before the gate can pass without
    /// strong indicators.
    pub min_answered_turns: usize,
    /// Run an incremental risk reassessment every Nth answered turn.
    pub reassess_every: usize,
    /// From this answered-turn count on, reassess every turn.
    pub reassess_after: usize,
    /// Bounded capacity of the reassessment memo cache (LRU).
    pub memo_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 4,
            task_timeout: Duration::from_secs(30),
            max_dialogue_turns: 10,
            min_answered_turns: 2,
            reassess_every: 2,
            reassess_after: 5,
            memo_capacity: 64,
        }
    }
}

impl OrchestratorConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset. Invalid values are an error rather than a silent
    /// fallback so misconfiguration is caught at startup.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            max_parallel_tasks: parse_var(
                "ORCH_MAX_PARALLEL_TASKS",
                defaults.max_parallel_tasks,
            )?,
            task_timeout: Duration::from_secs(parse_var(
                "ORCH_TASK_TIMEOUT_SECS",
                defaults.task_timeout.as_secs(),
            )?),
            max_dialogue_turns: parse_var(
                "ORCH_MAX_DIALOGUE_TURNS",
                defaults.max_dialogue_turns,
            )?,
            min_answered_turns: parse_var(
                "ORCH_MIN_ANSWERED_TURNS",
                defaults.min_answered_turns,
            )?,
            reassess_every: parse_var("ORCH_REASSESS_EVERY", defaults.reassess_every)?,
            reassess_after: parse_var("ORCH_REASSESS_AFTER", defaults.reassess_after)?,
            memo_capacity: parse_var("ORCH_MEMO_CAPACITY", defaults.memo_capacity)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            OrchestrationError::ConfigError(format!("{} has invalid value: {}", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, PoisonError};

    // The process environment is global and tests run on parallel threads;
    // every test that mutates ORCH_* vars must hold this guard.
    static ENV_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.max_parallel_tasks, 4);
        assert_eq!(cfg.task_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_dialogue_turns, 10);
        assert_eq!(cfg.min_answered_turns, 2);
    }

    #[test]
    fn test_env_override() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(PoisonError::into_inner);

        env::set_var("ORCH_MAX_DIALOGUE_TURNS", "6");
        let cfg = OrchestratorConfig::from_env().unwrap();
        env::remove_var("ORCH_MAX_DIALOGUE_TURNS");

        assert_eq!(cfg.max_dialogue_turns, 6);
    }

    #[test]
    fn test_invalid_value_rejected() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(PoisonError::into_inner);

        env::set_var("ORCH_MEMO_CAPACITY", "lots");
        let result = OrchestratorConfig::from_env();
        env::remove_var("ORCH_MEMO_CAPACITY");

        assert!(result.is_err());
    }
}
