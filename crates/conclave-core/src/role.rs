use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Specialization of an agent in the swarm.
///
/// The set is closed: everything keyed by role (temperature profile, model
/// tier, fallback chain) is an exhaustive `match`, so adding a variant is a
/// compile error until every table handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Decomposes objectives into plans.
    Strategist,
    /// Gathers background before planning.
    Researcher,
    /// Designs structure and interfaces.
    Architect,
    /// Writes code.
    Coder,
    /// Writes and reasons about tests.
    Tester,
    /// Audits for vulnerabilities.
    Security,
    /// Diagnoses failures.
    Debugger,
    /// Reviews work for quality.
    Reviewer,
    /// General-purpose analysis; the default agent.
    Analyst,
    /// Produces prose and documentation.
    Writer,
    /// Merges task results into a final answer.
    Synthesizer,
    /// Keeps the session log.
    Scribe,
}

impl AgentRole {
    /// Every role, in declaration order.
    pub const ALL: [AgentRole; 12] = [
        AgentRole::Strategist,
        AgentRole::Researcher,
        AgentRole::Architect,
        AgentRole::Coder,
        AgentRole::Tester,
        AgentRole::Security,
        AgentRole::Debugger,
        AgentRole::Reviewer,
        AgentRole::Analyst,
        AgentRole::Writer,
        AgentRole::Synthesizer,
        AgentRole::Scribe,
    ];

    /// Role that receives single-task fallback plans and unknown role names.
    pub const DEFAULT_AGENT: AgentRole = AgentRole::Analyst;

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Strategist => "strategist",
            AgentRole::Researcher => "researcher",
            AgentRole::Architect => "architect",
            AgentRole::Coder => "coder",
            AgentRole::Tester => "tester",
            AgentRole::Security => "security",
            AgentRole::Debugger => "debugger",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Analyst => "analyst",
            AgentRole::Writer => "writer",
            AgentRole::Synthesizer => "synthesizer",
            AgentRole::Scribe => "scribe",
        }
    }

    /// Parse a role name, mapping anything unknown to [`AgentRole::DEFAULT_AGENT`].
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::DEFAULT_AGENT)
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        AgentRole::ALL
            .into_iter()
            .find(|r| r.as_str() == lower)
            .ok_or_else(|| format!("unknown agent role: {s}"))
    }
}

/// Coarse classification of what a prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Writing or changing code.
    Code,
    /// Examining data or a system.
    Analysis,
    /// Open-ended generation.
    Creative,
    /// Breaking work down.
    Planning,
    /// Judging existing work.
    Review,
    /// Gathering information.
    Research,
    /// Anything else.
    General,
}

impl TaskType {
    /// Every task type.
    pub const ALL: [TaskType; 7] = [
        TaskType::Code,
        TaskType::Analysis,
        TaskType::Creative,
        TaskType::Planning,
        TaskType::Review,
        TaskType::Research,
        TaskType::General,
    ];
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskType::Code => "code",
            TaskType::Analysis => "analysis",
            TaskType::Creative => "creative",
            TaskType::Planning => "planning",
            TaskType::Review => "review",
            TaskType::Research => "research",
            TaskType::General => "general",
        };
        f.write_str(name)
    }
}
