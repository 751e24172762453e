//! Multi-agent orchestration: planning, dependency-aware scheduling and synthesis.
//!
//! A run decomposes an objective into a [`Plan`] of role-tagged tasks,
//! executes them group by group through a [`BoundedPool`], and merges the
//! results into one answer, recording everything in a [`Transcript`].
//!
//! # Main types
//!
//! - [`Orchestrator`]: Runs the speculate, plan, execute, synthesize, log and archive steps.
//! - [`TaskGraph`]: Task statuses and dependency-gated group selection.
//! - [`BoundedPool`]: Concurrency and queue limits for task execution.
//! - [`AgentMonitor`]: Per-role status and metrics.
//! - [`ConclaveConfig`]: File-backed configuration for every layer.

/// Transcript archiving.
pub mod archive;
/// Configuration file loading and validation.
pub mod config;
/// The run protocol.
pub mod engine;
/// Dependency graph over a plan.
pub mod graph;
/// Per-role status and metrics.
pub mod monitor;
/// Plan parsing and normalization.
pub mod plan;
/// Bounded worker pool.
pub mod pool;
/// Worker registry keyed by role and model.
pub mod registry;
/// Retained run results.
pub mod results;
/// Group-by-group plan execution.
pub mod scheduler;
/// Shared orchestration types.
pub mod types;

pub use archive::{render_markdown, ArchiveStore, FileArchiveStore};
pub use config::{ConclaveConfig, OrchestratorConfig, DEFAULT_CONFIG_FILE};
pub use engine::{needs_research, Orchestrator, OrchestratorResult};
pub use graph::{execution_waves, has_cycle, next_ready_group, TaskGraph};
pub use monitor::AgentMonitor;
pub use plan::{default_plan, extract_json, parse_plan, plan_or_default};
pub use pool::BoundedPool;
pub use registry::{AgentRegistry, AgentWorker, WorkerStats};
pub use results::ResultStore;
pub use scheduler::{execute_plan, DependencyOutput, ExecutionReport};
pub use types::{
    AgentMetrics, AgentResult, AgentState, ComplexityLevel, Plan, Priority, RunMode, StepOutput,
    Task, TaskStatus, Transcript, TranscriptSteps, WorkerStatus,
};
