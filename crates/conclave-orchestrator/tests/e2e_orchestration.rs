//! End-to-end orchestration test.
//!
//! Drives full runs against a scripted remote backend that answers the
//! planner, the task agents, the synthesizer and the scribe by looking at
//! the prompt it receives. Checks dependency gating, failure containment,
//! fallback planning and synthesis, run modes, the total deadline and
//! archiving.

use async_trait::async_trait;
use conclave_agent::{GenerateRequest, GenerateResponse, ModelBackend, ProviderKind};
use conclave_core::{AgentRole, ConclaveError, ConclaveResult, TaskId};
use conclave_orchestrator::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Script {
    plan: String,
    fail_plan: bool,
    fail_synthesis: bool,
    fail_tasks: Vec<TaskId>,
    hang_tasks: Vec<TaskId>,
    task_delay: Duration,
}

struct ScriptedRemote {
    script: Script,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedRemote {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Task ids in the order their prompts arrived (first attempt only).
    fn task_order(&self) -> Vec<TaskId> {
        let mut order = Vec::new();
        for prompt in self.prompts() {
            if let Some(id) = task_id_of(&prompt) {
                if !order.contains(&id) {
                    order.push(id);
                }
            }
        }
        order
    }

    fn task_prompt(&self, id: TaskId) -> Option<String> {
        self.prompts()
            .into_iter()
            .find(|p| task_id_of(p) == Some(id))
    }
}

fn task_id_of(prompt: &str) -> Option<TaskId> {
    let start = prompt.find("Your task (#")? + "Your task (#".len();
    let rest = &prompt[start..];
    let end = rest.find(')')?;
    rest[..end].parse().ok()
}

#[async_trait]
impl ModelBackend for ScriptedRemote {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Remote
    }

    async fn generate(&self, request: &GenerateRequest) -> ConclaveResult<GenerateResponse> {
        let prompt = request.prompt.clone();
        self.prompts.lock().unwrap().push(prompt.clone());

        if prompt.contains("Write the session log entry") {
            return Ok(GenerateResponse::text("Session went fine."));
        }
        if prompt.contains("Available agents:") {
            if self.script.fail_plan {
                return Err(ConclaveError::Provider("planner unavailable".into()));
            }
            return Ok(GenerateResponse::text(self.script.plan.clone()));
        }
        if prompt.contains("Merge these results") {
            if self.script.fail_synthesis {
                return Err(ConclaveError::Provider("synthesizer unavailable".into()));
            }
            return Ok(GenerateResponse::text("The merged final answer."));
        }
        if prompt.contains("Before this objective is planned") {
            return Ok(GenerateResponse::text("Background research notes."));
        }
        if let Some(id) = task_id_of(&prompt) {
            if self.script.hang_tasks.contains(&id) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if !self.script.task_delay.is_zero() {
                tokio::time::sleep(self.script.task_delay).await;
            }
            if self.script.fail_tasks.contains(&id) {
                return Err(ConclaveError::Provider(format!("task {id} exploded")));
            }
            return Ok(GenerateResponse {
                text: format!("output of task {id}"),
                token_count: Some(10),
            });
        }
        Err(ConclaveError::Validation(format!(
            "unexpected prompt: {}",
            &prompt[..prompt.len().min(80)]
        )))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const DIAMOND_PLAN: &str = r#"Here is the plan:
```json
{
  "objective": "Build an LRU cache",
  "complexity": "moderate",
  "tasks": [
    {"id": 1, "agent": "architect", "task": "Design the cache API", "dependencies": []},
    {"id": 2, "agent": "coder", "task": "Implement the cache", "dependencies": [1]},
    {"id": 3, "agent": "writer", "task": "Draft the README", "dependencies": []}
  ],
  "parallelGroups": [[1, 3], [2]],
  "estimatedTime": "15m"
}
```"#;

fn config() -> ConclaveConfig {
    let mut config = ConclaveConfig::default();
    // Failing tasks walk the whole chain; keep the shared breaker closed.
    config.breaker.failure_threshold = 100;
    config
}

fn orchestrator(config: ConclaveConfig, backend: Arc<ScriptedRemote>) -> Orchestrator {
    Orchestrator::new(config, vec![backend as Arc<dyn ModelBackend>]).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_dependency_groups() {
    let backend = ScriptedRemote::new(Script {
        plan: DIAMOND_PLAN.into(),
        ..Script::default()
    });
    let orch = orchestrator(config(), backend.clone());

    let result = orch.run("Build an LRU cache", RunMode::Swarm).await.unwrap();

    assert!(result.is_success(), "error: {:?}", result.error);
    assert!(!result.used_fallback_plan);
    assert!(!result.synthesis_fallback);
    assert_eq!(result.final_answer.as_deref(), Some("The merged final answer."));
    for id in [1, 2, 3] {
        assert_eq!(result.task_statuses[&id], TaskStatus::Completed);
    }
    assert!(result.unexecuted.is_empty());

    // Task 2 starts only after both members of the first group.
    let order = backend.task_order();
    assert_eq!(order.len(), 3);
    assert_eq!(order[2], 2);

    // The dependent task sees its dependency's output.
    let prompt = backend.task_prompt(2).unwrap();
    assert!(prompt.contains("### Task 1\noutput of task 1"));
    assert!(!prompt.contains("output of task 3"));

    // Swarm mode without research keywords: no speculation, but a log entry.
    assert!(result.transcript.steps.speculate.is_none());
    assert!(result.transcript.steps.log.is_some());
    assert_eq!(result.results().len(), 3);

    assert!(orch.results().get(&result.session_id).is_some());
}

#[tokio::test]
async fn test_e2e_failed_dependency_blocks_dependents() {
    let backend = ScriptedRemote::new(Script {
        plan: DIAMOND_PLAN.into(),
        fail_tasks: vec![1],
        ..Script::default()
    });
    let orch = orchestrator(config(), backend.clone());

    let result = orch.run("Build an LRU cache", RunMode::Quick).await.unwrap();

    assert_eq!(result.task_statuses[&1], TaskStatus::Failed);
    assert_eq!(result.task_statuses[&2], TaskStatus::Pending);
    assert_eq!(result.task_statuses[&3], TaskStatus::Completed);
    assert_eq!(result.unexecuted, vec![2]);
    assert!(backend.task_prompt(2).is_none(), "task 2 must never start");

    // Partial completion still produces an answer.
    assert!(result.is_success());
    let report = result.failure_report().unwrap();
    assert!(report.to_string().contains("task 1 (architect)"));

    let synthesis_input = backend
        .prompts()
        .into_iter()
        .find(|p| p.contains("Merge these results"))
        .unwrap();
    assert!(synthesis_input.contains("output of task 3"));
    assert!(!synthesis_input.contains("task 1 exploded"));
}

#[tokio::test]
async fn test_e2e_unparseable_plan_falls_back_to_single_task() {
    let backend = ScriptedRemote::new(Script {
        plan: "I would rather not produce JSON today.".into(),
        ..Script::default()
    });
    let orch = orchestrator(config(), backend.clone());

    let result = orch.run("Explain ownership", RunMode::Quick).await.unwrap();

    assert!(result.used_fallback_plan);
    let plan = result.plan.as_ref().unwrap();
    assert_eq!(plan.tasks.len(), 1);
    assert_eq!(plan.tasks[0].agent, AgentRole::Analyst);
    assert_eq!(plan.tasks[0].description, "Explain ownership");
    assert_eq!(result.task_statuses[&1], TaskStatus::Completed);
    assert!(result.is_success());
}

#[tokio::test]
async fn test_e2e_planning_failure_aborts() {
    let backend = ScriptedRemote::new(Script {
        fail_plan: true,
        ..Script::default()
    });
    let orch = orchestrator(config(), backend.clone());

    let result = orch.run("Build an LRU cache", RunMode::Quick).await.unwrap();

    assert!(result.plan.is_none());
    assert!(result.final_answer.is_none());
    assert!(result.error.is_some());
    assert!(backend.task_order().is_empty());
    let plan_step = result.transcript.steps.plan.as_ref().unwrap();
    assert!(plan_step.error.is_some());
}

#[tokio::test]
async fn test_e2e_synthesis_failure_concatenates() {
    let backend = ScriptedRemote::new(Script {
        plan: DIAMOND_PLAN.into(),
        fail_synthesis: true,
        ..Script::default()
    });
    let orch = orchestrator(config(), backend);

    let result = orch.run("Build an LRU cache", RunMode::Quick).await.unwrap();

    assert!(result.synthesis_fallback);
    let answer = result.final_answer.unwrap();
    assert!(answer.starts_with("## Results for: Build an LRU cache"));
    assert!(answer.contains("### Task 1 (architect)\noutput of task 1"));
    assert!(answer.contains("### Task 2 (coder)\noutput of task 2"));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_e2e_quick_mode_skips_research_and_log() {
    let plan = r#"{"objective": "o", "tasks": [{"id": 1, "agent": "researcher", "task": "Look it up"}]}"#;

    let backend = ScriptedRemote::new(Script {
        plan: plan.into(),
        ..Script::default()
    });
    let orch = orchestrator(config(), backend.clone());
    let quick = orch
        .run("Compare the latest async runtimes", RunMode::Quick)
        .await
        .unwrap();
    assert!(quick.transcript.steps.speculate.is_none());
    assert!(quick.transcript.steps.log.is_none());
    assert!(!backend
        .prompts()
        .iter()
        .any(|p| p.contains("Before this objective is planned")));

    let backend = ScriptedRemote::new(Script {
        plan: plan.into(),
        ..Script::default()
    });
    let orch = orchestrator(config(), backend.clone());
    let swarm = orch
        .run("Compare the latest async runtimes", RunMode::Swarm)
        .await
        .unwrap();
    let speculate = swarm.transcript.steps.speculate.as_ref().unwrap();
    assert_eq!(speculate.output.as_deref(), Some("Background research notes."));
    assert!(swarm.transcript.steps.log.is_some());
    let plan_prompt = backend
        .prompts()
        .into_iter()
        .find(|p| p.contains("Available agents:"))
        .unwrap();
    assert!(plan_prompt.contains("Background research notes."));
}

#[tokio::test(start_paused = true)]
async fn test_e2e_total_timeout_returns_partial_results() {
    let backend = ScriptedRemote::new(Script {
        plan: DIAMOND_PLAN.into(),
        hang_tasks: vec![1],
        ..Script::default()
    });
    let mut config = config();
    config.orchestrator.total_timeout_secs = 5;
    let orch = orchestrator(config, backend.clone());

    let result = orch.run("Build an LRU cache", RunMode::Swarm).await.unwrap();

    assert!(result.timed_out);
    assert!(result.error.as_deref().unwrap().contains("Timeout"));
    assert_eq!(result.task_statuses[&1], TaskStatus::Failed);
    assert_eq!(result.task_statuses[&3], TaskStatus::Completed);
    assert_eq!(result.task_statuses[&2], TaskStatus::Pending);
    assert!(backend.task_prompt(2).is_none());

    // No model call for synthesis or logging after the deadline.
    assert!(result.synthesis_fallback);
    assert!(result.final_answer.unwrap().contains("output of task 3"));
    assert!(result.transcript.steps.log.is_none());
    assert!(!backend
        .prompts()
        .iter()
        .any(|p| p.contains("Merge these results")));
}

#[tokio::test(start_paused = true)]
async fn test_e2e_concurrency_limit() {
    let plan = r#"{"objective": "o", "tasks": [
        {"id": 1, "agent": "analyst", "task": "A"},
        {"id": 2, "agent": "analyst", "task": "B"},
        {"id": 3, "agent": "analyst", "task": "C"}
    ], "parallelGroups": [[1, 2, 3]]}"#;
    let backend = ScriptedRemote::new(Script {
        plan: plan.into(),
        task_delay: Duration::from_millis(50),
        ..Script::default()
    });
    let mut config = config();
    config.orchestrator.max_concurrent = 2;
    let orch = orchestrator(config, backend);

    let result = orch.run("Do three things", RunMode::Quick).await.unwrap();

    assert!(result.is_success());
    assert_eq!(orch.pool().peak_active(), 2);
    assert_eq!(orch.pool().active(), 0);
}

#[tokio::test]
async fn test_e2e_monitor_and_registry_tracking() {
    let backend = ScriptedRemote::new(Script {
        plan: DIAMOND_PLAN.into(),
        fail_tasks: vec![3],
        ..Script::default()
    });
    let orch = orchestrator(config(), backend);

    orch.run("Build an LRU cache", RunMode::Quick).await.unwrap();

    let coder = orch.monitor().get_state(AgentRole::Coder).await.unwrap();
    assert_eq!(coder.metrics.tasks, 1);
    assert_eq!(coder.status, WorkerStatus::Idle);
    let writer = orch.monitor().get_state(AgentRole::Writer).await.unwrap();
    assert_eq!(writer.metrics.errors, 1);
    assert_eq!(writer.status, WorkerStatus::Error);

    let stats = orch.registry().stats();
    assert!(stats
        .iter()
        .any(|s| s.role == AgentRole::Coder && s.invocations == 1 && s.failures == 0));
    assert!(stats
        .iter()
        .any(|s| s.role == AgentRole::Writer && s.failures == 1));
}

#[tokio::test]
async fn test_e2e_archive_written() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedRemote::new(Script {
        plan: DIAMOND_PLAN.into(),
        ..Script::default()
    });
    let mut config = config();
    config.orchestrator.archive_dir = Some(dir.path().to_path_buf());
    let orch = orchestrator(config, backend);

    let result = orch.run("Build an LRU cache", RunMode::Swarm).await.unwrap();

    let path = dir.path().join(FileArchiveStore::file_name(&result));
    let content = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(content.contains(&result.session_id));
    assert!(content.contains("| 2 | coder | completed | 1 |"));
    assert!(content.contains("The merged final answer."));
    assert!(content.contains("## Log"));
}

#[tokio::test]
async fn test_e2e_empty_objective_rejected() {
    let backend = ScriptedRemote::new(Script::default());
    let orch = orchestrator(config(), backend.clone());
    let err = orch.run("   ", RunMode::Quick).await.unwrap_err();
    assert!(matches!(err, ConclaveError::Validation(_)));
    assert!(backend.prompts().is_empty());
}

#[tokio::test]
async fn test_e2e_separate_orchestrators_share_nothing() {
    let first = orchestrator(
        config(),
        ScriptedRemote::new(Script {
            plan: DIAMOND_PLAN.into(),
            ..Script::default()
        }),
    );
    let second = orchestrator(config(), ScriptedRemote::new(Script::default()));

    first.run("Build an LRU cache", RunMode::Quick).await.unwrap();

    assert!(!first.registry().is_empty());
    assert!(second.registry().is_empty());
    assert!(second.results().is_empty());
}
