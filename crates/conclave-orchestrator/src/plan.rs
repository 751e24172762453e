//! Turning raw planning output into a well-formed [`Plan`].
//!
//! The planner answers in free text that should contain one JSON object:
//!
//! ```json
//! {"objective": "...", "complexity": "moderate",
//!  "tasks": [{"id": 1, "agent": "researcher", "task": "...", "dependencies": [], "priority": "high"}],
//!  "parallelGroups": [[1]], "estimatedTime": "10m"}
//! ```
//!
//! [`parse_plan`] normalizes that object or explains why it cannot;
//! [`plan_or_default`] substitutes a single-task plan so the scheduler always
//! receives something runnable.

use crate::graph::has_cycle;
use crate::types::{ComplexityLevel, Plan, Priority, Task};
use conclave_core::{AgentRole, ConclaveError, ConclaveResult, TaskId};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePlan {
    #[serde(default)]
    objective: Option<String>,
    #[serde(default)]
    complexity: Option<String>,
    tasks: Vec<WireTask>,
    #[serde(default)]
    parallel_groups: Option<Vec<Vec<WireId>>>,
    #[serde(default)]
    estimated_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTask {
    id: WireId,
    #[serde(default)]
    agent: Option<String>,
    #[serde(alias = "description")]
    task: String,
    #[serde(default)]
    dependencies: Option<Vec<WireId>>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Task ids arrive as numbers or numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

impl WireId {
    fn resolve(&self) -> Option<TaskId> {
        match self {
            WireId::Number(n) => TaskId::try_from(*n).ok(),
            WireId::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// The JSON object inside a planner answer.
///
/// Prefers a fenced ```json block, then any fenced block starting with `{`,
/// then the span from the first `{` to the last `}`.
pub fn extract_json(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```json") {
        let body = &raw[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }
    let mut rest = raw;
    while let Some(start) = rest.find("```") {
        let body = &rest[start + 3..];
        let Some(end) = body.find("```") else { break };
        let block = body[..end].trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        let block = block.trim();
        if block.starts_with('{') {
            return Some(block);
        }
        rest = &body[end + 3..];
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Parse and normalize planning output.
///
/// Tasks get `dependencies = []`, `priority = Medium` and `status = Pending`
/// when absent; unknown agents become [`AgentRole::DEFAULT_AGENT`]. Without
/// `parallelGroups` every task lands in one group. Ids that name no task are
/// dropped from groups and dependencies, and tasks missing from every group
/// are appended as a final group. Duplicate ids, dependencies pointing at a
/// later group, and cycles are rejected.
pub fn parse_plan(raw: &str) -> ConclaveResult<Plan> {
    let json = extract_json(raw)
        .ok_or_else(|| ConclaveError::PlanParse("no JSON object in planner output".into()))?;
    let wire: WirePlan = serde_json::from_str(json)
        .map_err(|e| ConclaveError::PlanParse(format!("malformed plan: {e}")))?;

    let objective = wire
        .objective
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .ok_or_else(|| ConclaveError::PlanParse("plan has no objective".into()))?
        .to_string();
    if wire.tasks.is_empty() {
        return Err(ConclaveError::PlanParse("plan has no tasks".into()));
    }

    let mut tasks = Vec::with_capacity(wire.tasks.len());
    let mut seen = HashSet::new();
    for wt in &wire.tasks {
        let id = wt
            .id
            .resolve()
            .ok_or_else(|| ConclaveError::PlanParse(format!("invalid task id {:?}", wt.id)))?;
        if !seen.insert(id) {
            return Err(ConclaveError::PlanParse(format!("duplicate task id {id}")));
        }
        let description = wt.task.trim();
        if description.is_empty() {
            return Err(ConclaveError::PlanParse(format!("task {id} has no description")));
        }
        let agent = wt
            .agent
            .as_deref()
            .map(AgentRole::parse_lenient)
            .unwrap_or(AgentRole::DEFAULT_AGENT);
        let mut task = Task::new(id, agent, description).with_priority(
            wt.priority
                .as_deref()
                .map(Priority::parse_lenient)
                .unwrap_or_default(),
        );
        task.context = wt.context.clone().filter(|c| !c.trim().is_empty());
        task.timeout_ms = wt.timeout_ms.filter(|ms| *ms > 0);
        tasks.push((task, wt.dependencies.as_deref().unwrap_or_default()));
    }

    let known: HashSet<TaskId> = seen;
    let tasks: Vec<Task> = tasks
        .into_iter()
        .map(|(task, deps)| {
            let mut unique = HashSet::new();
            let dependencies = deps
                .iter()
                .filter_map(WireId::resolve)
                .filter(|d| *d != task.id && known.contains(d) && unique.insert(*d))
                .collect();
            task.with_dependencies(dependencies)
        })
        .collect();

    let parallel_groups = normalize_groups(wire.parallel_groups.as_deref(), &tasks);

    let plan = Plan {
        objective,
        complexity: wire
            .complexity
            .as_deref()
            .map(ComplexityLevel::parse_lenient)
            .unwrap_or_default(),
        tasks,
        parallel_groups,
        estimated_time: wire.estimated_time.filter(|s| !s.trim().is_empty()),
    };
    validate_order(&plan)?;
    Ok(plan)
}

fn normalize_groups(groups: Option<&[Vec<WireId>]>, tasks: &[Task]) -> Vec<Vec<TaskId>> {
    let known: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
    let mut placed = HashSet::new();
    let mut out: Vec<Vec<TaskId>> = groups
        .unwrap_or_default()
        .iter()
        .map(|group| {
            group
                .iter()
                .filter_map(WireId::resolve)
                .filter(|id| known.contains(id) && placed.insert(*id))
                .collect::<Vec<_>>()
        })
        .filter(|g| !g.is_empty())
        .collect();

    let leftover: Vec<TaskId> = tasks
        .iter()
        .map(|t| t.id)
        .filter(|id| !placed.contains(id))
        .collect();
    if !leftover.is_empty() {
        out.push(leftover);
    }
    out
}

fn validate_order(plan: &Plan) -> ConclaveResult<()> {
    for task in &plan.tasks {
        let own = plan.group_of(task.id);
        for dep in &task.dependencies {
            if plan.group_of(*dep) > own {
                return Err(ConclaveError::PlanParse(format!(
                    "task {} depends on task {dep} from a later group",
                    task.id
                )));
            }
        }
    }
    if has_cycle(&plan.tasks) {
        return Err(ConclaveError::PlanParse("dependency cycle in plan".into()));
    }
    Ok(())
}

/// Single-task plan handing the whole objective to the default agent.
pub fn default_plan(objective: &str) -> Plan {
    Plan {
        objective: objective.to_string(),
        complexity: ComplexityLevel::Simple,
        tasks: vec![Task::new(1, AgentRole::DEFAULT_AGENT, objective)],
        parallel_groups: vec![vec![1]],
        estimated_time: None,
    }
}

/// Parse planning output, falling back to [`default_plan`].
///
/// The flag is `true` when the fallback was used.
pub fn plan_or_default(raw: &str, objective: &str) -> (Plan, bool) {
    match parse_plan(raw) {
        Ok(plan) => (plan, false),
        Err(e) => {
            warn!(error = %e, "Unusable plan, falling back to single-task plan");
            (default_plan(objective), true)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    #[test]
    fn test_parse_fenced_plan() {
        let raw = r#"Here is the plan:
```json
{
  "objective": "Ship the parser",
  "complexity": "complex",
  "tasks": [
    {"id": 1, "agent": "researcher", "task": "Survey formats"},
    {"id": 2, "agent": "Coder", "task": "Write it", "dependencies": [1], "priority": "high"},
    {"id": 3, "agent": "writer", "task": "Document it"}
  ],
  "parallelGroups": [[1, 3], [2]],
  "estimatedTime": "2h"
}
```
Good luck."#;
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.objective, "Ship the parser");
        assert_eq!(plan.complexity, ComplexityLevel::Complex);
        assert_eq!(plan.parallel_groups, vec![vec![1, 3], vec![2]]);
        assert_eq!(plan.task(2).unwrap().agent, AgentRole::Coder);
        assert_eq!(plan.task(2).unwrap().priority, Priority::High);
        assert_eq!(plan.task(2).unwrap().dependencies, vec![1]);
        assert_eq!(plan.task(1).unwrap().status, TaskStatus::Pending);
        assert_eq!(plan.estimated_time.as_deref(), Some("2h"));
    }

    #[test]
    fn test_defaults_and_single_group() {
        let raw = r#"{"objective": "x", "tasks": [{"id": "1", "task": "a"}, {"id": 2, "agent": "wizard", "task": "b"}]}"#;
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.complexity, ComplexityLevel::Moderate);
        assert_eq!(plan.parallel_groups, vec![vec![1, 2]]);
        assert_eq!(plan.task(1).unwrap().agent, AgentRole::DEFAULT_AGENT);
        assert_eq!(plan.task(2).unwrap().agent, AgentRole::DEFAULT_AGENT);
        assert_eq!(plan.task(1).unwrap().priority, Priority::Medium);
    }

    #[test]
    fn test_unknown_ids_dropped_and_missing_tasks_appended() {
        let raw = r#"{"objective": "x",
            "tasks": [{"id": 1, "task": "a", "dependencies": [9]}, {"id": 2, "task": "b"}, {"id": 3, "task": "c"}],
            "parallelGroups": [[1, 7], [2]]}"#;
        let plan = parse_plan(raw).unwrap();
        assert!(plan.task(1).unwrap().dependencies.is_empty());
        assert_eq!(plan.parallel_groups, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_rejects_structural_problems() {
        assert!(parse_plan("no json here").is_err());
        assert!(parse_plan(r#"{"objective": "", "tasks": [{"id": 1, "task": "a"}]}"#).is_err());
        assert!(parse_plan(r#"{"objective": "x", "tasks": []}"#).is_err());
        assert!(parse_plan(r#"{"objective": "x", "tasks": {"id": 1}}"#).is_err());
        assert!(parse_plan(r#"{"objective": "x", "tasks": [{"id": 1}]}"#).is_err());
        assert!(parse_plan(r#"{"objective": "x", "tasks": [{"id": 1, "task": "a"}, {"id": 1, "task": "b"}]}"#).is_err());
    }

    #[test]
    fn test_rejects_forward_dependency() {
        let raw = r#"{"objective": "x",
            "tasks": [{"id": 1, "task": "a", "dependencies": [2]}, {"id": 2, "task": "b"}],
            "parallelGroups": [[1], [2]]}"#;
        let err = parse_plan(raw).unwrap_err();
        assert!(matches!(err, ConclaveError::PlanParse(_)));
    }

    #[test]
    fn test_rejects_cycle() {
        let raw = r#"{"objective": "x",
            "tasks": [{"id": 1, "task": "a", "dependencies": [2]}, {"id": 2, "task": "b", "dependencies": [1]}]}"#;
        assert!(parse_plan(raw).is_err());
    }

    #[test]
    fn test_plan_or_default() {
        let (plan, fallback) = plan_or_default("I could not decide.", "Fix the bug");
        assert!(fallback);
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].agent, AgentRole::DEFAULT_AGENT);
        assert_eq!(plan.tasks[0].description, "Fix the bug");
        assert_eq!(plan.parallel_groups, vec![vec![1]]);
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(extract_json("prefix {\"a\":{}} suffix"), Some("{\"a\":{}}"));
        assert_eq!(extract_json("nothing"), None);
    }
}
