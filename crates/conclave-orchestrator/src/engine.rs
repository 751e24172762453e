use crate::archive::{ArchiveStore, FileArchiveStore};
use crate::config::{ConclaveConfig, OrchestratorConfig};
use crate::graph::TaskGraph;
use crate::monitor::AgentMonitor;
use crate::plan::plan_or_default;
use crate::pool::BoundedPool;
use crate::registry::AgentRegistry;
use crate::results::ResultStore;
use crate::scheduler::{execute_plan, DependencyOutput};
use crate::types::{AgentResult, Plan, RunMode, StepOutput, Task, TaskStatus, Transcript};
use conclave_agent::{
    ChainOutcome, ChainRequest, FallbackChainExecutor, ModelBackend, ProviderRouter,
    TemperatureController,
};
use conclave_core::{AgentRole, ConclaveError, ConclaveResult, TaskId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

static RESEARCH_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(research|investigate|compare|comparison|latest|current|trends?|best practices?|documentation|look up|find out|survey|state of the art)\b",
    )
    .ok()
});

/// Whether an objective needs a speculative research pass before planning.
pub fn needs_research(objective: &str) -> bool {
    RESEARCH_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(objective))
}

/// Result of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub session_id: String,
    pub transcript: Transcript,
    /// Absent when planning itself failed.
    pub plan: Option<Plan>,
    /// Final status of every planned task.
    pub task_statuses: BTreeMap<TaskId, TaskStatus>,
    pub final_answer: Option<String>,
    /// Top-level error that cut the run short.
    pub error: Option<String>,
    /// Tasks that never ran because a dependency did not complete.
    pub unexecuted: Vec<TaskId>,
    /// Planning output was unusable and the single-task plan ran instead.
    pub used_fallback_plan: bool,
    /// The final answer was assembled locally instead of by a synthesis call.
    pub synthesis_fallback: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl OrchestratorResult {
    /// Result with nothing recorded yet.
    pub fn empty(transcript: Transcript) -> Self {
        Self {
            session_id: transcript.session_id.clone(),
            transcript,
            plan: None,
            task_statuses: BTreeMap::new(),
            final_answer: None,
            error: None,
            unexecuted: Vec::new(),
            used_fallback_plan: false,
            synthesis_fallback: false,
            timed_out: false,
            duration_ms: 0,
        }
    }

    /// Every task attempt of the execute step.
    pub fn results(&self) -> &[AgentResult] {
        self.transcript.steps.execute.as_deref().unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.final_answer.is_some()
    }

    /// All task failures gathered into one error, if any task failed.
    pub fn failure_report(&self) -> Option<ConclaveError> {
        let failures: Vec<String> = self
            .results()
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                let id = r
                    .task_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "?".into());
                format!(
                    "task {id} ({}): {}",
                    r.agent,
                    r.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();
        (!failures.is_empty()).then_some(ConclaveError::Aggregate(failures))
    }
}

/// Runs the speculate → plan → execute → synthesize → log → archive protocol.
///
/// Owns its worker registry, monitor, pool and result store, so separately
/// constructed orchestrators share nothing.
pub struct Orchestrator {
    config: OrchestratorConfig,
    executor: FallbackChainExecutor,
    pool: BoundedPool,
    registry: AgentRegistry,
    monitor: Arc<AgentMonitor>,
    results: ResultStore,
    archive: Option<Arc<dyn ArchiveStore>>,
}

impl Orchestrator {
    /// Build an orchestrator over the given backends.
    ///
    /// Archives to `orchestrator.archive_dir` when it is set.
    pub fn new(
        config: ConclaveConfig,
        backends: Vec<Arc<dyn ModelBackend>>,
    ) -> ConclaveResult<Self> {
        config.validate()?;
        let mut router = ProviderRouter::new(config.routing.clone(), config.breaker.clone());
        for backend in backends {
            router.register(backend);
        }
        let executor = FallbackChainExecutor::new(
            Arc::new(router),
            Arc::new(TemperatureController::new(config.temperature.clone())),
            config.retry.clone(),
            config.orchestrator.step_timeout(),
        );
        let orch = &config.orchestrator;
        let archive = orch
            .archive_dir
            .as_ref()
            .map(|dir| Arc::new(FileArchiveStore::new(dir.clone())) as Arc<dyn ArchiveStore>);

        Ok(Self {
            pool: BoundedPool::new(orch.max_concurrent, orch.max_queue_size),
            results: ResultStore::new(orch.max_retained_results, orch.result_ttl()),
            registry: AgentRegistry::new(),
            monitor: Arc::new(AgentMonitor::new()),
            executor,
            archive,
            config: config.orchestrator,
        })
    }

    /// Replace the archive destination.
    pub fn with_archive(mut self, archive: Arc<dyn ArchiveStore>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        &self.monitor
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn executor(&self) -> &FallbackChainExecutor {
        &self.executor
    }

    pub fn pool(&self) -> &BoundedPool {
        &self.pool
    }

    /// Stop accepting work and wait for running tasks.
    pub async fn shutdown(&self) {
        self.pool.drain().await;
    }

    /// Run the full protocol for `objective`.
    ///
    /// Task failures never surface here; they are recorded in the result.
    /// Only an empty objective is rejected outright. A failed planning call
    /// or an exhausted run budget ends the run early with `error` set.
    pub async fn run(&self, objective: &str, mode: RunMode) -> ConclaveResult<OrchestratorResult> {
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(ConclaveError::Validation("objective is empty".into()));
        }
        let started = Instant::now();
        let deadline = started + self.config.total_timeout();
        let session_id = Uuid::new_v4().simple().to_string();
        let mut result =
            OrchestratorResult::empty(Transcript::new(session_id.as_str(), objective, mode));
        info!(session_id = %session_id, mode = %mode, "Run started");

        // Step 1: speculate
        let mut research = None;
        if mode == RunMode::Swarm && needs_research(objective) {
            info!(session_id = %session_id, "Step 1: speculate");
            match self
                .step(AgentRole::Researcher, speculate_prompt(objective), deadline)
                .await
            {
                Ok(outcome) => {
                    result.transcript.steps.speculate = Some(StepOutput::ok(&outcome));
                    research = Some(outcome.text);
                }
                Err((e, ms)) => {
                    warn!(session_id = %session_id, error = %e, "Speculation failed, planning without it");
                    result.transcript.steps.speculate = Some(StepOutput::failed(&e, ms));
                }
            }
        }

        // Step 2: plan
        info!(session_id = %session_id, "Step 2: plan");
        let plan = match self
            .step(
                AgentRole::Strategist,
                plan_prompt(objective, research.as_deref()),
                deadline,
            )
            .await
        {
            Ok(outcome) => {
                result.transcript.steps.plan = Some(StepOutput::ok(&outcome));
                let (plan, fallback) = plan_or_default(&outcome.text, objective);
                result.used_fallback_plan = fallback;
                plan
            }
            Err((e, ms)) => {
                error!(session_id = %session_id, error = %e, "Planning failed, aborting run");
                result.transcript.steps.plan = Some(StepOutput::failed(&e, ms));
                result.timed_out = matches!(e, ConclaveError::Timeout(_)) && Instant::now() >= deadline;
                result.error = Some(e.to_string());
                return Ok(self.finish(result, started).await);
            }
        };
        info!(
            session_id = %session_id,
            tasks = plan.tasks.len(),
            groups = plan.parallel_groups.len(),
            fallback = result.used_fallback_plan,
            "Plan ready"
        );

        // Step 3: execute
        info!(session_id = %session_id, "Step 3: execute");
        let mut graph = TaskGraph::new(plan);
        let report = execute_plan(&mut graph, &self.pool, Some(deadline), |task, deps| {
            self.run_task(objective, task, deps, deadline)
        })
        .await;
        let timed_out = report.timed_out || Instant::now() >= deadline;
        result.unexecuted = graph.unexecuted();
        let plan = graph.into_plan();
        result.task_statuses = plan.tasks.iter().map(|t| (t.id, t.status)).collect();
        result.plan = Some(plan);
        result.transcript.steps.execute = Some(report.results);

        // Step 4: synthesize
        info!(session_id = %session_id, "Step 4: synthesize");
        let successes: Vec<AgentResult> = result
            .results()
            .iter()
            .filter(|r| r.success)
            .cloned()
            .collect();
        let fallback_answer = (!successes.is_empty()).then(|| concatenate(objective, &successes));
        if timed_out {
            result.timed_out = true;
            result.error = Some(
                ConclaveError::Timeout(format!(
                    "run exceeded its {}s budget",
                    self.config.total_timeout_secs
                ))
                .to_string(),
            );
            if let Some(answer) = fallback_answer {
                result.transcript.steps.synthesize = Some(StepOutput::local(answer.as_str()));
                result.final_answer = Some(answer);
                result.synthesis_fallback = true;
            }
        } else if let Some(answer) = fallback_answer {
            let prompt = synthesis_prompt(objective, &successes);
            match self.step(AgentRole::Synthesizer, prompt, deadline).await {
                Ok(outcome) if !outcome.text.trim().is_empty() => {
                    result.transcript.steps.synthesize = Some(StepOutput::ok(&outcome));
                    result.final_answer = Some(outcome.text);
                }
                other => {
                    if let Err((e, _)) = &other {
                        warn!(session_id = %session_id, error = %e, "Synthesis failed, concatenating results");
                    }
                    result.transcript.steps.synthesize = Some(StepOutput::local(answer.as_str()));
                    result.final_answer = Some(answer);
                    result.synthesis_fallback = true;
                }
            }
        } else {
            let err = result
                .failure_report()
                .unwrap_or_else(|| ConclaveError::Orchestrator("no task produced a result".into()));
            warn!(session_id = %session_id, error = %err, "Nothing to synthesize");
            result.error = Some(err.to_string());
        }

        // Step 5: log
        if mode == RunMode::Swarm && !result.timed_out {
            info!(session_id = %session_id, "Step 5: log");
            match self
                .step(AgentRole::Scribe, log_prompt(&result), deadline)
                .await
            {
                Ok(outcome) => result.transcript.steps.log = Some(StepOutput::ok(&outcome)),
                Err((e, ms)) => {
                    warn!(session_id = %session_id, error = %e, "Log step failed");
                    result.transcript.steps.log = Some(StepOutput::failed(&e, ms));
                }
            }
        }

        Ok(self.finish(result, started).await)
    }

    /// Step 6 (archive) plus retention.
    async fn finish(&self, mut result: OrchestratorResult, started: Instant) -> OrchestratorResult {
        result.duration_ms = started.elapsed().as_millis() as u64;
        if let Some(archive) = &self.archive {
            info!(session_id = %result.session_id, "Step 6: archive");
            match archive.save(&result).await {
                Ok(path) => info!(session_id = %result.session_id, path = %path.display(), "Transcript archived"),
                Err(e) => warn!(session_id = %result.session_id, error = %e, "Archiving failed"),
            }
        }
        info!(
            session_id = %result.session_id,
            duration_ms = result.duration_ms,
            success = result.is_success(),
            unexecuted = result.unexecuted.len(),
            "Run finished"
        );
        self.results.insert(result.clone());
        result
    }

    async fn run_task(
        &self,
        objective: &str,
        task: Task,
        deps: Vec<DependencyOutput>,
        deadline: Instant,
    ) -> AgentResult {
        info!(task_id = task.id, role = %task.agent, "Task started");
        let cap = task
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.task_timeout());
        let prompt = task_prompt(objective, &task, &deps);
        match self
            .invoke(task.agent, prompt, Some(task.id), budget(deadline, cap))
            .await
        {
            Ok(outcome) => {
                info!(task_id = task.id, role = %task.agent, model = %outcome.model_used, "Task completed");
                AgentResult::from_outcome(Some(task.id), &outcome)
            }
            Err((e, ms)) => {
                error!(task_id = task.id, role = %task.agent, error = %e, "Task failed");
                let model = self.executor.router().route(task.agent).model;
                AgentResult::failure(Some(task.id), task.agent, model, &e, ms)
            }
        }
    }

    /// One protocol-step call, bounded by the task timeout and the run deadline.
    async fn step(
        &self,
        role: AgentRole,
        prompt: String,
        deadline: Instant,
    ) -> Result<ChainOutcome, (ConclaveError, u64)> {
        self.invoke(role, prompt, None, budget(deadline, self.config.task_timeout()))
            .await
    }

    async fn invoke(
        &self,
        role: AgentRole,
        prompt: String,
        task_id: Option<TaskId>,
        budget: Duration,
    ) -> Result<ChainOutcome, (ConclaveError, u64)> {
        self.monitor.start_task(role, task_id).await;
        let started = Instant::now();
        let request = ChainRequest::new(role, prompt);
        let outcome = if budget.is_zero() {
            Err(ConclaveError::Timeout("run budget exhausted".into()))
        } else {
            tokio::time::timeout(budget, self.executor.execute(&request))
                .await
                .unwrap_or_else(|_| {
                    Err(ConclaveError::Timeout(format!(
                        "{role} did not finish within {}ms",
                        budget.as_millis()
                    )))
                })
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(outcome) => {
                self.registry
                    .worker(outcome.role_used, &outcome.model_used)
                    .record(true);
                self.monitor
                    .finish_task(role, elapsed_ms, outcome.token_count)
                    .await;
                Ok(outcome)
            }
            Err(e) => {
                let primary = self.executor.router().route(role);
                self.registry.worker(role, &primary.model).record(false);
                self.monitor.record_error(role, elapsed_ms).await;
                Err((e, elapsed_ms))
            }
        }
    }
}

fn budget(deadline: Instant, cap: Duration) -> Duration {
    deadline.saturating_duration_since(Instant::now()).min(cap)
}

fn speculate_prompt(objective: &str) -> String {
    format!(
        "Objective: {objective}\n\n\
         Before this objective is planned, gather the background a planner needs: \
         relevant facts, current practice, and open questions. Keep it brief."
    )
}

fn plan_prompt(objective: &str, research: Option<&str>) -> String {
    let mut prompt = format!("Objective: {objective}\n\n");
    if let Some(notes) = research {
        let _ = writeln!(prompt, "Research notes:\n{notes}\n");
    }
    let agents = AgentRole::ALL
        .iter()
        .filter(|r| !matches!(r, AgentRole::Strategist | AgentRole::Synthesizer | AgentRole::Scribe))
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let _ = write!(
        prompt,
        "Available agents: {agents}.\n\
         Decompose the objective into tasks and reply with the JSON plan only."
    );
    prompt
}

fn task_prompt(objective: &str, task: &Task, deps: &[DependencyOutput]) -> String {
    let mut prompt = format!(
        "Overall objective: {objective}\n\nYour task (#{}): {}\n",
        task.id, task.description
    );
    if let Some(context) = &task.context {
        let _ = writeln!(prompt, "\nContext: {context}");
    }
    if !deps.is_empty() {
        let _ = writeln!(prompt, "\nResults from prerequisite tasks:");
        for dep in deps {
            let _ = writeln!(prompt, "\n### Task {}\n{}", dep.task_id, dep.output);
        }
    }
    prompt
}

fn synthesis_prompt(objective: &str, successes: &[AgentResult]) -> String {
    let mut prompt = format!("Objective: {objective}\n\nAgent results:\n");
    for r in successes {
        let id = r.task_id.map(|id| id.to_string()).unwrap_or_default();
        let _ = writeln!(
            prompt,
            "\n### Task {id} ({})\n{}",
            r.agent,
            r.response.as_deref().unwrap_or_default()
        );
    }
    prompt.push_str("\nMerge these results into one final answer to the objective.");
    prompt
}

fn log_prompt(result: &OrchestratorResult) -> String {
    let completed = result
        .task_statuses
        .values()
        .filter(|s| **s == TaskStatus::Completed)
        .count();
    let failed = result
        .task_statuses
        .values()
        .filter(|s| **s == TaskStatus::Failed)
        .count();
    let answer: String = result
        .final_answer
        .as_deref()
        .unwrap_or("(none)")
        .chars()
        .take(500)
        .collect();
    format!(
        "Session {}\nObjective: {}\nTasks completed: {completed}, failed: {failed}, not run: {}\n\
         Final answer (excerpt):\n{answer}\n\nWrite the session log entry.",
        result.session_id,
        result.transcript.objective,
        result.unexecuted.len()
    )
}

/// Deterministic final answer used when synthesis is unavailable.
fn concatenate(objective: &str, successes: &[AgentResult]) -> String {
    let mut out = format!("## Results for: {objective}\n");
    for r in successes {
        let id = r.task_id.map(|id| id.to_string()).unwrap_or_default();
        let _ = write!(
            out,
            "\n### Task {id} ({})\n{}\n",
            r.agent,
            r.response.as_deref().unwrap_or_default().trim()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(id: TaskId, text: &str) -> AgentResult {
        AgentResult {
            success: true,
            agent: AgentRole::Analyst,
            model_used: "m".into(),
            response: Some(text.into()),
            error: None,
            duration_ms: 1,
            token_count: None,
            task_id: Some(id),
        }
    }

    #[test]
    fn test_needs_research() {
        assert!(needs_research("Compare the latest Rust web frameworks"));
        assert!(needs_research("What are best practices for retries?"));
        assert!(!needs_research("Write a haiku about autumn"));
    }

    #[test]
    fn test_concatenate_is_deterministic() {
        let a = ok(1, "first");
        let b = ok(3, "third ");
        let text = concatenate("obj", &[a, b]);
        assert_eq!(
            text,
            "## Results for: obj\n\n### Task 1 (analyst)\nfirst\n\n### Task 3 (analyst)\nthird\n"
        );
    }

    #[test]
    fn test_task_prompt_includes_dependencies() {
        let task = Task::new(2, AgentRole::Coder, "Write it").with_context("use tokio");
        let prompt = task_prompt(
            "Build a cache",
            &task,
            &[DependencyOutput {
                task_id: 1,
                output: "design notes".into(),
            }],
        );
        assert!(prompt.contains("Build a cache"));
        assert!(prompt.contains("#2"));
        assert!(prompt.contains("use tokio"));
        assert!(prompt.contains("### Task 1\ndesign notes"));
    }

    #[test]
    fn test_failure_report() {
        let mut result =
            OrchestratorResult::empty(Transcript::new("s", "o", RunMode::Quick));
        assert!(result.failure_report().is_none());
        let mut failed = ok(2, "");
        failed.success = false;
        failed.response = None;
        failed.error = Some("boom".into());
        result.transcript.steps.execute = Some(vec![ok(1, "fine"), failed]);
        match result.failure_report() {
            Some(ConclaveError::Aggregate(items)) => {
                assert_eq!(items, vec!["task 2 (analyst): boom".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
