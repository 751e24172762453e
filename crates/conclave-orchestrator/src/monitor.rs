use crate::types::{AgentMetrics, AgentState, WorkerStatus};
use conclave_core::{AgentRole, TaskId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tracks state and metrics for every agent role in the swarm.
pub struct AgentMonitor {
    states: Arc<RwLock<HashMap<AgentRole, AgentState>>>,
}

impl AgentMonitor {
    pub fn new() -> Self {
        let states = AgentRole::ALL
            .into_iter()
            .map(|role| {
                (
                    role,
                    AgentState {
                        role,
                        current_task: None,
                        status: WorkerStatus::Idle,
                        metrics: AgentMetrics::default(),
                    },
                )
            })
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }

    /// Mark a role as working, optionally on a plan task.
    pub async fn start_task(&self, role: AgentRole, task_id: Option<TaskId>) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&role) {
            state.current_task = task_id;
            state.status = WorkerStatus::Working;
        }
    }

    /// Record a successful call and return the role to idle.
    pub async fn finish_task(&self, role: AgentRole, duration_ms: u64, tokens: Option<u32>) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&role) {
            state.current_task = None;
            state.status = WorkerStatus::Idle;
            state.metrics.tasks += 1;
            state.metrics.duration_ms += duration_ms;
            state.metrics.tokens_used += u64::from(tokens.unwrap_or(0));
        }
    }

    /// Record a failed call; the role stays in `Error` until its next start.
    pub async fn record_error(&self, role: AgentRole, duration_ms: u64) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&role) {
            state.current_task = None;
            state.status = WorkerStatus::Error;
            state.metrics.errors += 1;
            state.metrics.duration_ms += duration_ms;
        }
    }

    /// Snapshot of every role, in role order.
    pub async fn snapshot(&self) -> Vec<AgentState> {
        let states = self.states.read().await;
        let mut all: Vec<AgentState> = states.values().cloned().collect();
        all.sort_by_key(|s| s.role);
        all
    }

    pub async fn get_state(&self, role: AgentRole) -> Option<AgentState> {
        let states = self.states.read().await;
        states.get(&role).cloned()
    }

    /// Sum of all roles' metrics.
    pub async fn aggregate_metrics(&self) -> AgentMetrics {
        let states = self.states.read().await;
        states
            .values()
            .fold(AgentMetrics::default(), |mut total, state| {
                total.tasks += state.metrics.tasks;
                total.errors += state.metrics.errors;
                total.duration_ms += state.metrics.duration_ms;
                total.tokens_used += state.metrics.tokens_used;
                total
            })
    }

    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "agents": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}
