use conclave_agent::role_profile;
use conclave_core::AgentRole;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A (role, model) pairing that has handled calls during this orchestrator's life.
#[derive(Debug)]
pub struct AgentWorker {
    role: AgentRole,
    model: String,
    persona: String,
    invocations: AtomicU64,
    failures: AtomicU64,
}

impl AgentWorker {
    fn new(role: AgentRole, model: &str) -> Self {
        Self {
            role,
            model: model.to_string(),
            persona: role_profile(role).persona,
            invocations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn record(&self, success: bool) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            role: self.role,
            model: self.model.clone(),
            invocations: self.invocations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub role: AgentRole,
    pub model: String,
    pub invocations: u64,
    pub failures: u64,
}

/// Workers keyed by `(role, model)`, created on first use.
///
/// Owned by one orchestrator; separate orchestrators never share workers.
#[derive(Default)]
pub struct AgentRegistry {
    workers: Mutex<HashMap<(AgentRole, String), Arc<AgentWorker>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker(&self, role: AgentRole, model: &str) -> Arc<AgentWorker> {
        let mut workers = self.workers.lock();
        workers
            .entry((role, model.to_string()))
            .or_insert_with(|| Arc::new(AgentWorker::new(role, model)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stats for every worker, sorted by role then model.
    pub fn stats(&self) -> Vec<WorkerStats> {
        let mut stats: Vec<WorkerStats> = self.workers.lock().values().map(|w| w.stats()).collect();
        stats.sort_by(|a, b| a.role.cmp(&b.role).then_with(|| a.model.cmp(&b.model)));
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_worker() {
        let registry = AgentRegistry::new();
        let a = registry.worker(AgentRole::Coder, "m1");
        let b = registry.worker(AgentRole::Coder, "m1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.worker(AgentRole::Coder, "m2");
        registry.worker(AgentRole::Tester, "m1");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_registries_are_isolated() {
        let first = AgentRegistry::new();
        let second = AgentRegistry::new();
        first.worker(AgentRole::Analyst, "m").record(true);
        assert!(second.is_empty());
    }

    #[test]
    fn test_stats() {
        let registry = AgentRegistry::new();
        let worker = registry.worker(AgentRole::Writer, "fast");
        worker.record(true);
        worker.record(false);
        assert!(!worker.persona().is_empty());
        let stats = registry.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].invocations, 2);
        assert_eq!(stats[0].failures, 1);
    }
}
