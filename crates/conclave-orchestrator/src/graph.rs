use crate::types::{AgentResult, Plan, Task, TaskStatus};
use conclave_core::TaskId;
use std::collections::{HashMap, HashSet};

/// First parallel group that still has runnable work.
///
/// Scans `plan.parallel_groups` in order and returns the ids of the first
/// group with at least one `Pending` task whose dependencies are all in
/// `completed`. Only those runnable ids are returned; a task whose dependency
/// failed is never selected.
pub fn next_ready_group(plan: &Plan, completed: &HashSet<TaskId>) -> Option<Vec<TaskId>> {
    plan.parallel_groups.iter().find_map(|group| {
        let ready: Vec<TaskId> = group
            .iter()
            .filter(|id| plan.task(**id).is_some_and(|t| t.is_ready(completed)))
            .copied()
            .collect();
        (!ready.is_empty()).then_some(ready)
    })
}

/// Whether the dependency edges of `tasks` contain a cycle.
pub fn has_cycle(tasks: &[Task]) -> bool {
    let edges: HashMap<TaskId, &[TaskId]> = tasks
        .iter()
        .map(|t| (t.id, t.dependencies.as_slice()))
        .collect();
    let mut visited = HashMap::new();
    tasks
        .iter()
        .any(|t| dfs_cycle(t.id, &edges, &mut visited))
}

fn dfs_cycle(
    id: TaskId,
    edges: &HashMap<TaskId, &[TaskId]>,
    visited: &mut HashMap<TaskId, u8>,
) -> bool {
    match visited.get(&id) {
        Some(1) => return true,  // back edge
        Some(2) => return false, // done
        _ => {}
    }
    visited.insert(id, 1);
    if let Some(deps) = edges.get(&id) {
        for dep in deps.iter() {
            if dfs_cycle(*dep, edges, visited) {
                return true;
            }
        }
    }
    visited.insert(id, 2);
    false
}

/// Waves the scheduler would run if every task succeeded.
pub fn execution_waves(plan: &Plan) -> Vec<Vec<TaskId>> {
    let mut graph = TaskGraph::new(plan.clone());
    let mut waves = Vec::new();
    while let Some(group) = graph.next_ready_group() {
        for id in &group {
            graph.mark_completed(*id);
        }
        waves.push(group);
    }
    waves
}

/// A plan plus its execution state.
///
/// The scheduler is the only mutator: it moves tasks from `Pending` to
/// `Running` to `Completed` or `Failed`.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    plan: Plan,
    completed: HashSet<TaskId>,
    failed: HashSet<TaskId>,
}

impl TaskGraph {
    pub fn new(plan: Plan) -> Self {
        let completed = plan
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id)
            .collect();
        let failed = plan
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.id)
            .collect();
        Self {
            plan,
            completed,
            failed,
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn into_plan(self) -> Plan {
        self.plan
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.plan.task(id)
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.plan.task(id).map(|t| t.status)
    }

    pub fn next_ready_group(&self) -> Option<Vec<TaskId>> {
        next_ready_group(&self.plan, &self.completed)
    }

    fn set_status(&mut self, id: TaskId, status: TaskStatus) -> bool {
        match self.plan.task_mut(id) {
            Some(task) => {
                task.status = status;
                true
            }
            None => false,
        }
    }

    pub fn mark_running(&mut self, id: TaskId) -> bool {
        self.set_status(id, TaskStatus::Running)
    }

    pub fn mark_completed(&mut self, id: TaskId) -> bool {
        let found = self.set_status(id, TaskStatus::Completed);
        if found {
            self.completed.insert(id);
        }
        found
    }

    pub fn mark_failed(&mut self, id: TaskId) -> bool {
        let found = self.set_status(id, TaskStatus::Failed);
        if found {
            self.failed.insert(id);
        }
        found
    }

    /// Apply a finished attempt to its task.
    pub fn apply(&mut self, result: &AgentResult) -> bool {
        match result.task_id {
            Some(id) if result.success => self.mark_completed(id),
            Some(id) => self.mark_failed(id),
            None => false,
        }
    }

    pub fn completed_ids(&self) -> &HashSet<TaskId> {
        &self.completed
    }

    pub fn failed_ids(&self) -> &HashSet<TaskId> {
        &self.failed
    }

    /// Tasks still `Running`.
    pub fn running_ids(&self) -> Vec<TaskId> {
        self.ids_with(TaskStatus::Running)
    }

    /// Tasks that never ran, in plan order.
    pub fn unexecuted(&self) -> Vec<TaskId> {
        self.ids_with(TaskStatus::Pending)
    }

    fn ids_with(&self, status: TaskStatus) -> Vec<TaskId> {
        self.plan
            .tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.id)
            .collect()
    }

    pub fn is_done(&self) -> bool {
        self.plan.tasks.iter().all(|t| t.status.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComplexityLevel;
    use conclave_core::AgentRole;

    fn plan(tasks: Vec<Task>, groups: Vec<Vec<TaskId>>) -> Plan {
        Plan {
            objective: "test".into(),
            complexity: ComplexityLevel::Moderate,
            tasks,
            parallel_groups: groups,
            estimated_time: None,
        }
    }

    fn scenario() -> Plan {
        plan(
            vec![
                Task::new(1, AgentRole::Researcher, "one"),
                Task::new(2, AgentRole::Coder, "two").with_dependencies(vec![1]),
                Task::new(3, AgentRole::Analyst, "three"),
            ],
            vec![vec![1, 3], vec![2]],
        )
    }

    #[test]
    fn test_first_group_runs_first() {
        let graph = TaskGraph::new(scenario());
        assert_eq!(graph.next_ready_group(), Some(vec![1, 3]));
    }

    #[test]
    fn test_dependent_waits_for_completion() {
        let mut graph = TaskGraph::new(scenario());
        graph.mark_running(1);
        graph.mark_running(3);
        assert_eq!(graph.next_ready_group(), None);

        graph.mark_completed(1);
        graph.mark_failed(3);
        assert_eq!(graph.next_ready_group(), Some(vec![2]));
    }

    #[test]
    fn test_failed_dependency_leaves_task_pending() {
        let mut graph = TaskGraph::new(scenario());
        graph.mark_failed(1);
        graph.mark_completed(3);
        assert_eq!(graph.next_ready_group(), None);
        assert_eq!(graph.unexecuted(), vec![2]);
        assert!(!graph.is_done());
    }

    #[test]
    fn test_same_group_dependency_resolves_in_later_wave() {
        let p = plan(
            vec![
                Task::new(1, AgentRole::Coder, "a"),
                Task::new(2, AgentRole::Tester, "b").with_dependencies(vec![1]),
            ],
            vec![vec![1, 2]],
        );
        assert_eq!(execution_waves(&p), vec![vec![1], vec![2]]);
    }

    #[test]
    fn test_execution_waves_scenario() {
        assert_eq!(execution_waves(&scenario()), vec![vec![1, 3], vec![2]]);
    }

    #[test]
    fn test_apply_result() {
        let mut graph = TaskGraph::new(scenario());
        let ok = AgentResult {
            success: true,
            agent: AgentRole::Researcher,
            model_used: "m".into(),
            response: Some("r".into()),
            error: None,
            duration_ms: 1,
            token_count: None,
            task_id: Some(1),
        };
        assert!(graph.apply(&ok));
        assert_eq!(graph.status(1), Some(TaskStatus::Completed));
        assert!(graph.completed_ids().contains(&1));
    }

    #[test]
    fn test_no_cycle() {
        assert!(!has_cycle(&scenario().tasks));
    }

    #[test]
    fn test_cycle_detection() {
        let tasks = vec![
            Task::new(1, AgentRole::Coder, "a").with_dependencies(vec![2]),
            Task::new(2, AgentRole::Coder, "b").with_dependencies(vec![1]),
        ];
        assert!(has_cycle(&tasks));
    }

    #[test]
    fn test_is_done() {
        let mut graph = TaskGraph::new(scenario());
        for id in [1, 2, 3] {
            graph.mark_completed(id);
        }
        assert!(graph.is_done());
        assert!(graph.unexecuted().is_empty());
    }
}
