//! Error types for the scam investigation orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Task-level (recovered locally, see executor)
    // =============================

    #[error("Analysis task error: {0}")]
    TaskError(String),

    // =============================
    // Phase-level (recorded on the case, pipeline continues)
    // =============================

    #[error("Phase error: {0}")]
    PhaseError(String),

    // =============================
    // Dialogue invariants
    // =============================

    #[error("Turn order violation: {0}")]
    TurnOrder(String),

    #[error("No pending agent question to answer")]
    NoPendingQuestion,

    // =============================
    // Session-level (fatal to the calling request)
    // =============================

    #[error("Session already exists for case: {0}")]
    SessionExists(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    // =============================
    // Collaborators & Configuration
    // =============================

    #[error("Reasoning service error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
