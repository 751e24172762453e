//! Core types and error definitions for the Conclave agent swarm.
//!
//! This crate provides the foundational types shared across all Conclave crates:
//! the unified error taxonomy, the closed set of agent roles, and the task-type
//! classification used for temperature selection.
//!
//! # Main types
//!
//! - [`ConclaveError`]: Unified error enum for all Conclave subsystems.
//! - [`ConclaveResult`]: Convenience alias for `Result<T, ConclaveError>`.
//! - [`AgentRole`]: A named agent specialization.
//! - [`TaskType`]: Coarse classification of a prompt's intent.
//! - [`TaskId`]: Identifier of a task within a plan.

/// Agent roles and task-type classification.
pub mod role;

pub use role::{AgentRole, TaskType};

/// Identifier of a task, unique within one plan.
pub type TaskId = u32;

// --- Error types ---

/// Top-level error type for the Conclave framework.
///
/// Task-level failures are captured into results by the scheduler and never
/// escape a run; the variants here describe why a single call, step or run
/// did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum ConclaveError {
    /// Planning output could not be turned into a well-formed plan.
    #[error("Plan parse error: {0}")]
    PlanParse(String),

    /// A model backend returned an error.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A call or a run exceeded its time budget.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The circuit breaker for a provider rejected the call without attempting it.
    #[error("Circuit open for provider '{0}'")]
    CircuitOpen(String),

    /// The backend asked us to slow down.
    #[error("Rate limited: {0}")]
    RateLimit(String),

    /// Input rejected; retrying will not help.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Several task failures gathered into one run-level report.
    #[error("{} task(s) failed: {}", .0.len(), .0.join("; "))]
    Aggregate(Vec<String>),

    /// The bounded pool refused the work item because its queue is full.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// The work item was dropped before it ran (pool drain).
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Every entry of a fallback chain failed.
    #[error("Fallback chain exhausted for role '{role}': {last_error}")]
    ChainExhausted {
        /// Role whose chain was tried.
        role: String,
        /// Error reported by the last attempted step.
        last_error: String,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the orchestration engine itself.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConclaveError {
    /// Whether the failure is transient (provider hiccup, timeout, throttling).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConclaveError::Provider(_) | ConclaveError::Timeout(_) | ConclaveError::RateLimit(_)
        )
    }

    /// Whether the backend throttled the call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ConclaveError::RateLimit(_))
    }

    /// Whether the call was rejected by an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ConclaveError::CircuitOpen(_))
    }

    /// Whether this outcome counts as a provider failure for circuit breaking.
    ///
    /// A validation error means the provider answered, so it does not count.
    pub fn trips_breaker(&self) -> bool {
        !matches!(
            self,
            ConclaveError::Validation(_)
                | ConclaveError::CircuitOpen(_)
                | ConclaveError::Cancelled(_)
        )
    }
}

/// A convenience `Result` alias using [`ConclaveError`].
pub type ConclaveResult<T> = Result<T, ConclaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ConclaveError::Provider("502".into()).is_retryable());
        assert!(ConclaveError::Timeout("step".into()).is_retryable());
        assert!(ConclaveError::RateLimit("429".into()).is_retryable());
        assert!(!ConclaveError::Validation("bad".into()).is_retryable());
        assert!(!ConclaveError::CircuitOpen("remote".into()).is_retryable());
    }

    #[test]
    fn test_trips_breaker() {
        assert!(ConclaveError::Timeout("t".into()).trips_breaker());
        assert!(ConclaveError::Provider("p".into()).trips_breaker());
        assert!(!ConclaveError::Validation("v".into()).trips_breaker());
        assert!(!ConclaveError::CircuitOpen("remote".into()).trips_breaker());
    }

    #[test]
    fn test_aggregate_display() {
        let err = ConclaveError::Aggregate(vec!["task 1: boom".into(), "task 3: timeout".into()]);
        assert_eq!(err.to_string(), "2 task(s) failed: task 1: boom; task 3: timeout");
    }

    #[test]
    fn test_chain_exhausted_display() {
        let err = ConclaveError::ChainExhausted {
            role: "strategist".into(),
            last_error: "Timeout: step".into(),
        };
        assert!(err.to_string().contains("strategist"));
        assert!(err.to_string().contains("Timeout: step"));
    }
}
