//! Scam Investigation Orchestrator
//!
//! Orchestration and session layer for interactive scam investigations:
//! - Fans four context analyses out in parallel and merges partial results
//! - Sequences the case through a linear phase pipeline
//! - Suspends at each customer question and resumes on the answer
//! - Gates the conclusion on objective case-state evidence
//! - Serves many concurrent cases behind a poll-driven REST API
//!
//! PIPELINE:
//! INTAKE → CONTEXTS (parallel) → SYNTHESIS → TRIAGE → DIALOGUE (suspend/resume)
//! → FINAL ASSESSMENT → POLICY DECISION

pub mod api;
pub mod audit;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod executor;
pub mod gate;
pub mod models;
pub mod reasoning;
pub mod sequencer;
pub mod session;
pub mod tasks;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use sequencer::{Investigation, StepOutcome};
pub use session::SessionManager;
