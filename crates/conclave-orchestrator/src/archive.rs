use crate::engine::OrchestratorResult;
use crate::types::{AgentResult, StepOutput};
use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Durable destination for finished transcripts.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Persist one run; returns where it was written.
    async fn save(&self, result: &OrchestratorResult) -> ConclaveResult<PathBuf>;
}

/// Writes one Markdown document per session, named `<session_id>-<YYYY-MM-DD>.md`.
pub struct FileArchiveStore {
    base_dir: PathBuf,
}

impl FileArchiveStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn file_name(result: &OrchestratorResult) -> String {
        format!(
            "{}-{}.md",
            result.session_id,
            result.transcript.started_at.format("%Y-%m-%d")
        )
    }
}

#[async_trait]
impl ArchiveStore for FileArchiveStore {
    async fn save(&self, result: &OrchestratorResult) -> ConclaveResult<PathBuf> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(ConclaveError::Io)?;
        let path = self.base_dir.join(Self::file_name(result));
        tokio::fs::write(&path, render_markdown(result))
            .await
            .map_err(ConclaveError::Io)?;
        Ok(path)
    }
}

/// Human-readable transcript of a run.
pub fn render_markdown(result: &OrchestratorResult) -> String {
    let t = &result.transcript;
    let mut md = String::new();
    let _ = writeln!(md, "# Conclave session {}\n", t.session_id);
    let _ = writeln!(md, "- **Objective:** {}", t.objective);
    let _ = writeln!(md, "- **Mode:** {}", t.mode);
    let _ = writeln!(md, "- **Started:** {}", t.started_at.to_rfc3339());
    let _ = writeln!(md, "- **Duration:** {} ms", result.duration_ms);
    if result.used_fallback_plan {
        let _ = writeln!(md, "- **Plan:** single-task fallback");
    }
    if result.timed_out {
        let _ = writeln!(md, "- **Timed out:** yes");
    }
    if let Some(err) = &result.error {
        let _ = writeln!(md, "- **Error:** {err}");
    }
    md.push('\n');

    step_section(&mut md, "Speculate", t.steps.speculate.as_ref());
    step_section(&mut md, "Plan", t.steps.plan.as_ref());

    if let Some(plan) = &result.plan {
        let _ = writeln!(md, "## Tasks\n");
        let _ = writeln!(md, "| id | agent | status | depends on | description |");
        let _ = writeln!(md, "|---|---|---|---|---|");
        for task in &plan.tasks {
            let status = result
                .task_statuses
                .get(&task.id)
                .copied()
                .unwrap_or(task.status);
            let deps = task
                .dependencies
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} |",
                task.id,
                task.agent,
                status,
                deps,
                task.description.replace('|', "\\|").replace('\n', " ")
            );
        }
        md.push('\n');
    }

    if let Some(results) = &t.steps.execute {
        let _ = writeln!(md, "## Execute\n");
        for r in results {
            result_section(&mut md, r);
        }
    }

    step_section(&mut md, "Synthesize", t.steps.synthesize.as_ref());
    step_section(&mut md, "Log", t.steps.log.as_ref());
    md
}

fn step_section(md: &mut String, title: &str, step: Option<&StepOutput>) {
    let Some(step) = step else { return };
    let _ = writeln!(md, "## {title}\n");
    if let Some(model) = &step.model_used {
        let _ = writeln!(md, "_model: {model}, {} ms_\n", step.duration_ms);
    }
    match (&step.output, &step.error) {
        (Some(out), _) => {
            let _ = writeln!(md, "{out}\n");
        }
        (None, Some(err)) => {
            let _ = writeln!(md, "**Error:** {err}\n");
        }
        (None, None) => {}
    }
}

fn result_section(md: &mut String, r: &AgentResult) {
    let id = r
        .task_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".into());
    let verdict = if r.success { "ok" } else { "failed" };
    let _ = writeln!(md, "### Task {id} ({}, {verdict})\n", r.agent);
    if !r.model_used.is_empty() {
        let _ = writeln!(md, "_model: {}, {} ms_\n", r.model_used, r.duration_ms);
    }
    if let Some(response) = &r.response {
        let _ = writeln!(md, "{response}\n");
    }
    if let Some(err) = &r.error {
        let _ = writeln!(md, "**Error:** {err}\n");
    }
}
