use chrono::{DateTime, Utc};
use conclave_agent::ChainOutcome;
use conclave_core::{AgentRole, ConclaveError, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Lifecycle of a task: `Pending → Running → Completed | Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Case-insensitive; anything unrecognized is `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" | "urgent" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// Planner's estimate of how hard the objective is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl ComplexityLevel {
    /// Case-insensitive; anything unrecognized is `Moderate`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" | "low" | "easy" => ComplexityLevel::Simple,
            "complex" | "high" | "hard" => ComplexityLevel::Complex,
            _ => ComplexityLevel::Moderate,
        }
    }
}

/// A node of the task graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub agent: AgentRole,
    pub description: String,
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Overrides the configured per-task timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Task {
    pub fn new(id: TaskId, agent: AgentRole, description: impl Into<String>) -> Self {
        Self {
            id,
            agent,
            description: description.into(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            context: None,
            timeout_ms: None,
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Pending, and every dependency is in `completed`.
    pub fn is_ready(&self, completed: &HashSet<TaskId>) -> bool {
        self.status == TaskStatus::Pending
            && self.dependencies.iter().all(|dep| completed.contains(dep))
    }
}

/// A decomposed objective: tasks plus the order in which groups may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub objective: String,
    pub complexity: ComplexityLevel,
    pub tasks: Vec<Task>,
    /// Ordered waves of task ids; every task id appears in exactly one group.
    pub parallel_groups: Vec<Vec<TaskId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
}

impl Plan {
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Index of the parallel group containing `id`.
    pub fn group_of(&self, id: TaskId) -> Option<usize> {
        self.parallel_groups.iter().position(|g| g.contains(&id))
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id).collect()
    }
}

/// Outcome of one task attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub success: bool,
    pub agent: AgentRole,
    pub model_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl AgentResult {
    pub fn from_outcome(task_id: Option<TaskId>, outcome: &ChainOutcome) -> Self {
        Self {
            success: true,
            agent: outcome.role_used,
            model_used: outcome.model_used.clone(),
            response: Some(outcome.text.clone()),
            error: None,
            duration_ms: outcome.duration_ms,
            token_count: outcome.token_count,
            task_id,
        }
    }

    pub fn failure(
        task_id: Option<TaskId>,
        agent: AgentRole,
        model_used: impl Into<String>,
        error: &ConclaveError,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: false,
            agent,
            model_used: model_used.into(),
            response: None,
            error: Some(error.to_string()),
            duration_ms,
            token_count: None,
            task_id,
        }
    }
}

/// How much of the six-step protocol a run performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Speculate, plan, execute, synthesize, log, archive.
    #[default]
    Swarm,
    /// Skips speculate and log.
    Quick,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Swarm => write!(f, "swarm"),
            RunMode::Quick => write!(f, "quick"),
        }
    }
}

/// Textual output of a single-call protocol step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub duration_ms: u64,
}

impl StepOutput {
    pub fn ok(outcome: &ChainOutcome) -> Self {
        Self {
            output: Some(outcome.text.clone()),
            error: None,
            model_used: Some(outcome.model_used.clone()),
            duration_ms: outcome.duration_ms,
        }
    }

    pub fn failed(error: &ConclaveError, duration_ms: u64) -> Self {
        Self {
            output: None,
            error: Some(error.to_string()),
            model_used: None,
            duration_ms,
        }
    }

    /// Output produced without a model call.
    pub fn local(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            error: None,
            model_used: None,
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSteps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speculate: Option<StepOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<StepOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute: Option<Vec<AgentResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesize: Option<StepOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<StepOutput>,
}

/// Record of one orchestration run; each step is written once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: String,
    pub objective: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub steps: TranscriptSteps,
}

impl Transcript {
    pub fn new(session_id: impl Into<String>, objective: impl Into<String>, mode: RunMode) -> Self {
        Self {
            session_id: session_id.into(),
            objective: objective.into(),
            mode,
            started_at: Utc::now(),
            steps: TranscriptSteps::default(),
        }
    }
}

/// Metrics tracked per agent role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks: u32,
    pub errors: u32,
    pub duration_ms: u64,
    pub tokens_used: u64,
}

/// Real-time snapshot of an agent role's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub role: AgentRole,
    pub current_task: Option<TaskId>,
    pub status: WorkerStatus,
    pub metrics: AgentMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Working,
    Error,
}
