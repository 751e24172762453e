use crate::graph::TaskGraph;
use crate::pool::BoundedPool;
use crate::types::{AgentResult, Task};
use conclave_core::{ConclaveError, TaskId};
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Output of a completed dependency, handed to the dependent task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyOutput {
    pub task_id: TaskId,
    pub output: String,
}

/// What the scheduler loop did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Every attempt, in completion order.
    pub results: Vec<AgentResult>,
    /// Groups in the order they were submitted.
    pub waves: Vec<Vec<TaskId>>,
    /// The run deadline cut the loop short.
    pub timed_out: bool,
}

/// Drive `graph` to completion, one ready group at a time.
///
/// Each group's tasks go through `pool` concurrently, with no ordering
/// among them; the next group is computed only after the whole group has
/// settled. A group larger than [`BoundedPool::capacity`] is submitted in
/// consecutive slices of that size so the pool never has to refuse a task.
/// A task only starts once all its dependencies are `Completed`, so a task
/// whose dependency failed stays `Pending`. If `deadline` passes,
/// tasks still running are marked `Failed` and the loop stops with the
/// results gathered so far.
pub async fn execute_plan<F, Fut>(
    graph: &mut TaskGraph,
    pool: &BoundedPool,
    deadline: Option<Instant>,
    run_task: F,
) -> ExecutionReport
where
    F: Fn(Task, Vec<DependencyOutput>) -> Fut,
    Fut: Future<Output = AgentResult>,
{
    let mut report = ExecutionReport::default();
    let mut outputs: HashMap<TaskId, String> = HashMap::new();

    while let Some(group) = graph.next_ready_group() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            report.timed_out = true;
            break;
        }
        info!(wave = report.waves.len(), tasks = ?group, "Submitting parallel group");

        let chunk_size = pool.capacity().max(1);
        if group.len() > chunk_size {
            debug!(tasks = group.len(), chunk_size, "Group exceeds pool capacity, submitting in chunks");
        }
        let mut timed_out = false;
        for chunk in group.chunks(chunk_size) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                timed_out = true;
                break;
            }
            timed_out = run_chunk(
                graph,
                pool,
                deadline,
                &run_task,
                chunk,
                &mut outputs,
                &mut report,
            )
            .await;
            if timed_out {
                break;
            }
        }
        report.waves.push(group);

        if timed_out {
            let cut = ConclaveError::Timeout("run deadline reached while task was running".into());
            for id in graph.running_ids() {
                let agent = graph.task(id).map(|t| t.agent);
                graph.mark_failed(id);
                if let Some(agent) = agent {
                    report
                        .results
                        .push(AgentResult::failure(Some(id), agent, "", &cut, 0));
                }
            }
            warn!(completed = graph.completed_ids().len(), "Run deadline reached, stopping scheduler");
            report.timed_out = true;
            break;
        }
    }

    debug!(
        waves = report.waves.len(),
        unexecuted = ?graph.unexecuted(),
        "Scheduler finished"
    );
    report
}

/// Run one slice of a group through the pool and fold its results into
/// `graph`. Returns true if the deadline cut the slice short.
async fn run_chunk<F, Fut>(
    graph: &mut TaskGraph,
    pool: &BoundedPool,
    deadline: Option<Instant>,
    run_task: &F,
    chunk: &[TaskId],
    outputs: &mut HashMap<TaskId, String>,
    report: &mut ExecutionReport,
) -> bool
where
    F: Fn(Task, Vec<DependencyOutput>) -> Fut,
    Fut: Future<Output = AgentResult>,
{
    let mut jobs = Vec::with_capacity(chunk.len());
    for id in chunk {
        let Some(task) = graph.task(*id).cloned() else {
            continue;
        };
        let deps = task
            .dependencies
            .iter()
            .filter_map(|d| {
                outputs.get(d).map(|o| DependencyOutput {
                    task_id: *d,
                    output: o.clone(),
                })
            })
            .collect();
        graph.mark_running(*id);
        jobs.push((task, deps));
    }

    let finished = Mutex::new(Vec::with_capacity(jobs.len()));
    let wave = join_all(jobs.into_iter().map(|(task, deps)| {
        let finished = &finished;
        let (id, agent) = (task.id, task.agent);
        let work = run_task(task, deps);
        async move {
            let result = match pool.submit(work).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(task_id = id, error = %e, "Pool refused task");
                    AgentResult::failure(Some(id), agent, "", &e, 0)
                }
            };
            finished.lock().push(result);
        }
    }));

    let timed_out = match deadline {
        Some(d) => tokio::time::timeout_at(d, wave).await.is_err(),
        None => {
            wave.await;
            false
        }
    };

    for result in finished.into_inner() {
        graph.apply(&result);
        if let (true, Some(id), Some(text)) = (result.success, result.task_id, &result.response) {
            outputs.insert(id, text.clone());
        }
        report.results.push(result);
    }
    timed_out
}
