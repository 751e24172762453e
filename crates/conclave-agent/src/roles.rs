use crate::config::ModelTier;
use conclave_core::{AgentRole, TaskType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inclusive sampling-temperature range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: f32,
    pub max: f32,
}

impl TemperatureRange {
    /// Create a range; bounds are swapped if given in the wrong order.
    pub fn new(min: f32, max: f32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Centre of the range.
    pub fn midpoint(&self) -> f32 {
        (self.min + self.max) / 2.0
    }
}

/// One entry of a role's fallback chain before routing resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub tier: ModelTier,
    pub role: AgentRole,
}

/// Static configuration of an agent role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleProfile {
    pub role: AgentRole,
    /// Tier of the role's primary model.
    pub tier: ModelTier,
    /// Execution-tier roles are eligible for forced local routing.
    pub execution_tier: bool,
    pub creativity_bias: f32,
    pub precision_bias: f32,
    /// Base temperature range per task type; always contains `General`.
    pub base_ranges: HashMap<TaskType, TemperatureRange>,
    /// Ordered (tier, role) alternatives, primary first.
    pub fallback_chain: Vec<ChainEntry>,
    pub persona: String,
}

impl RoleProfile {
    /// Base range for a task type, falling back to the role's `General` range.
    pub fn range_for(&self, task_type: TaskType) -> TemperatureRange {
        self.base_ranges
            .get(&task_type)
            .or_else(|| self.base_ranges.get(&TaskType::General))
            .copied()
            .unwrap_or(TemperatureRange { min: 0.3, max: 0.7 })
    }
}

/// Profile for one role.
pub fn role_profile(role: AgentRole) -> RoleProfile {
    match role {
        AgentRole::Strategist => strategist_profile(),
        AgentRole::Researcher => researcher_profile(),
        AgentRole::Architect => architect_profile(),
        AgentRole::Coder => coder_profile(),
        AgentRole::Tester => tester_profile(),
        AgentRole::Security => security_profile(),
        AgentRole::Debugger => debugger_profile(),
        AgentRole::Reviewer => reviewer_profile(),
        AgentRole::Analyst => analyst_profile(),
        AgentRole::Writer => writer_profile(),
        AgentRole::Synthesizer => synthesizer_profile(),
        AgentRole::Scribe => scribe_profile(),
    }
}

/// Profiles for every role.
pub fn default_profiles() -> Vec<RoleProfile> {
    AgentRole::ALL.into_iter().map(role_profile).collect()
}

fn ranges(table: &[(TaskType, f32, f32)]) -> HashMap<TaskType, TemperatureRange> {
    table.iter()
        .map(|&(tt, min, max)| (tt, TemperatureRange::new(min, max)))
        .collect()
}

fn chain(table: &[(ModelTier, AgentRole)]) -> Vec<ChainEntry> {
    table.iter()
        .map(|&(tier, role)| ChainEntry { tier, role })
        .collect()
}

fn strategist_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Strategist,
        tier: ModelTier::Pro,
        execution_tier: false,
        creativity_bias: 0.0,
        precision_bias: 0.05,
        base_ranges: ranges(&[
            (TaskType::Planning, 0.2, 0.5),
            (TaskType::Analysis, 0.2, 0.5),
            (TaskType::General, 0.3, 0.6),
        ]),
        fallback_chain: chain(&[
            (ModelTier::Pro, AgentRole::Strategist),
            (ModelTier::Standard, AgentRole::Strategist),
            (ModelTier::Fast, AgentRole::Analyst),
        ]),
        persona: STRATEGIST_PROMPT.to_string(),
    }
}

fn researcher_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Researcher,
        tier: ModelTier::Standard,
        execution_tier: false,
        creativity_bias: 0.05,
        precision_bias: 0.0,
        base_ranges: ranges(&[
            (TaskType::Research, 0.3, 0.6),
            (TaskType::Analysis, 0.2, 0.5),
            (TaskType::General, 0.3, 0.7),
        ]),
        fallback_chain: chain(&[
            (ModelTier::Standard, AgentRole::Researcher),
            (ModelTier::Pro, AgentRole::Researcher),
            (ModelTier::Fast, AgentRole::Analyst),
        ]),
        persona: RESEARCHER_PROMPT.to_string(),
    }
}

fn architect_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Architect,
        tier: ModelTier::Pro,
        execution_tier: false,
        creativity_bias: 0.05,
        precision_bias: 0.0,
        base_ranges: ranges(&[
            (TaskType::Planning, 0.3, 0.6),
            (TaskType::Code, 0.2, 0.4),
            (TaskType::General, 0.3, 0.6),
        ]),
        fallback_chain: chain(&[
            (ModelTier::Pro, AgentRole::Architect),
            (ModelTier::Standard, AgentRole::Architect),
            (ModelTier::Standard, AgentRole::Strategist),
        ]),
        persona: ARCHITECT_PROMPT.to_string(),
    }
}

fn coder_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Coder,
        tier: ModelTier::Standard,
        execution_tier: true,
        creativity_bias: 0.0,
        precision_bias: 0.05,
        base_ranges: ranges(&[
            (TaskType::Code, 0.1, 0.3),
            (TaskType::Review, 0.1, 0.3),
            (TaskType::General, 0.2, 0.5),
        ]),
        fallback_chain: chain(&[
            (ModelTier::Standard, AgentRole::Coder),
            (ModelTier::Pro, AgentRole::Coder),
            (ModelTier::Local, AgentRole::Coder),
        ]),
        persona: CODER_PROMPT.to_string(),
    }
}

fn tester_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Tester,
        tier: ModelTier::Standard,
        execution_tier: true,
        creativity_bias: 0.0,
        precision_bias: 0.05,
        base_ranges: ranges(&[(TaskType::Code, 0.1, 0.3), (TaskType::General, 0.2, 0.4)]),
        fallback_chain: chain(&[
            (ModelTier::Standard, AgentRole::Tester),
            (ModelTier::Fast, AgentRole::Tester),
            (ModelTier::Local, AgentRole::Tester),
        ]),
        persona: TESTER_PROMPT.to_string(),
    }
}

fn security_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Security,
        tier: ModelTier::Pro,
        execution_tier: false,
        creativity_bias: 0.0,
        precision_bias: 0.1,
        base_ranges: ranges(&[
            (TaskType::Review, 0.05, 0.25),
            (TaskType::Analysis, 0.1, 0.3),
            (TaskType::General, 0.1, 0.4),
        ]),
        fallback_chain: chain(&[
            (ModelTier::Pro, AgentRole::Security),
            (ModelTier::Standard, AgentRole::Security),
            (ModelTier::Standard, AgentRole::Reviewer),
        ]),
        persona: SECURITY_PROMPT.to_string(),
    }
}

fn debugger_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Debugger,
        tier: ModelTier::Standard,
        execution_tier: true,
        creativity_bias: 0.0,
        precision_bias: 0.05,
        base_ranges: ranges(&[
            (TaskType::Code, 0.1, 0.3),
            (TaskType::Analysis, 0.1, 0.4),
            (TaskType::General, 0.2, 0.5),
        ]),
        fallback_chain: chain(&[
            (ModelTier::Standard, AgentRole::Debugger),
            (ModelTier::Pro, AgentRole::Debugger),
            (ModelTier::Local, AgentRole::Debugger),
        ]),
        persona: DEBUGGER_PROMPT.to_string(),
    }
}

fn reviewer_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Reviewer,
        tier: ModelTier::Standard,
        execution_tier: false,
        creativity_bias: 0.0,
        precision_bias: 0.05,
        base_ranges: ranges(&[(TaskType::Review, 0.1, 0.3), (TaskType::General, 0.2, 0.5)]),
        fallback_chain: chain(&[
            (ModelTier::Standard, AgentRole::Reviewer),
            (ModelTier::Fast, AgentRole::Reviewer),
            (ModelTier::Local, AgentRole::Analyst),
        ]),
        persona: REVIEWER_PROMPT.to_string(),
    }
}

fn analyst_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Analyst,
        tier: ModelTier::Standard,
        execution_tier: false,
        creativity_bias: 0.0,
        precision_bias: 0.0,
        base_ranges: ranges(&[
            (TaskType::Analysis, 0.2, 0.5),
            (TaskType::Research, 0.3, 0.6),
            (TaskType::General, 0.3, 0.7),
        ]),
        fallback_chain: chain(&[
            (ModelTier::Standard, AgentRole::Analyst),
            (ModelTier::Fast, AgentRole::Analyst),
            (ModelTier::Local, AgentRole::Analyst),
        ]),
        persona: ANALYST_PROMPT.to_string(),
    }
}

fn writer_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Writer,
        tier: ModelTier::Fast,
        execution_tier: true,
        creativity_bias: 0.1,
        precision_bias: 0.0,
        base_ranges: ranges(&[(TaskType::Creative, 0.6, 1.0), (TaskType::General, 0.5, 0.8)]),
        fallback_chain: chain(&[
            (ModelTier::Fast, AgentRole::Writer),
            (ModelTier::Standard, AgentRole::Writer),
            (ModelTier::Local, AgentRole::Writer),
        ]),
        persona: WRITER_PROMPT.to_string(),
    }
}

fn synthesizer_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Synthesizer,
        tier: ModelTier::Pro,
        execution_tier: false,
        creativity_bias: 0.0,
        precision_bias: 0.0,
        base_ranges: ranges(&[(TaskType::General, 0.3, 0.6), (TaskType::Creative, 0.4, 0.8)]),
        fallback_chain: chain(&[
            (ModelTier::Pro, AgentRole::Synthesizer),
            (ModelTier::Standard, AgentRole::Synthesizer),
            (ModelTier::Fast, AgentRole::Writer),
        ]),
        persona: SYNTHESIZER_PROMPT.to_string(),
    }
}

fn scribe_profile() -> RoleProfile {
    RoleProfile {
        role: AgentRole::Scribe,
        tier: ModelTier::Fast,
        execution_tier: true,
        creativity_bias: 0.0,
        precision_bias: 0.05,
        base_ranges: ranges(&[(TaskType::General, 0.1, 0.3)]),
        fallback_chain: chain(&[
            (ModelTier::Fast, AgentRole::Scribe),
            (ModelTier::Local, AgentRole::Scribe),
        ]),
        persona: SCRIBE_PROMPT.to_string(),
    }
}

const STRATEGIST_PROMPT: &str = "\
You are the Strategist of a Conclave swarm. Decompose the objective into \
concrete tasks for specialist agents, declare dependencies between them, and \
group independent tasks so they can run in parallel.

Respond with a single JSON object:
{\"objective\": string, \"complexity\": \"simple\"|\"moderate\"|\"complex\", \
\"tasks\": [{\"id\": number, \"agent\": string, \"task\": string, \
\"dependencies\": [number], \"priority\": \"high\"|\"medium\"|\"low\"}], \
\"parallelGroups\": [[number]], \"estimatedTime\": string}
";

const RESEARCHER_PROMPT: &str = "\
You are the Researcher. Collect the facts, prior art and constraints the \
planner needs. Be concise and cite what you rely on.
";

const ARCHITECT_PROMPT: &str = "\
You are the Architect. Design structure, interfaces and data flow. Prefer \
simple designs and state trade-offs explicitly.
";

const CODER_PROMPT: &str = "\
You are the Coder. Write correct, idiomatic code that follows the design you \
are given. Output code in fenced blocks with file paths as comments.
";

const TESTER_PROMPT: &str = "\
You are the Tester. Write tests covering happy paths, edge cases and error \
conditions for the code you are given.
";

const SECURITY_PROMPT: &str = "\
You are the Security auditor. Look for vulnerabilities, unsafe input handling \
and missing authorization. Rate every finding by severity.
";

const DEBUGGER_PROMPT: &str = "\
You are the Debugger. Find the root cause of the failure you are given and \
propose the smallest fix that addresses it.
";

const REVIEWER_PROMPT: &str = "\
You are the Reviewer. Judge the work for correctness, clarity and \
maintainability. List concrete, actionable issues.
";

const ANALYST_PROMPT: &str = "\
You are the Analyst. Work through the task carefully and answer it directly.
";

const WRITER_PROMPT: &str = "\
You are the Writer. Produce clear, well-structured prose for the audience \
described in the task.
";

const SYNTHESIZER_PROMPT: &str = "\
You are the Synthesizer. Merge the results of the specialist agents into one \
coherent final answer to the objective. Resolve contradictions and drop \
repetition.
";

const SCRIBE_PROMPT: &str = "\
You are the Scribe. Summarize the session in a few lines: objective, what was \
done, what failed.
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles_count() {
        assert_eq!(default_profiles().len(), AgentRole::ALL.len());
    }

    #[test]
    fn test_every_profile_has_general_range() {
        for profile in default_profiles() {
            assert!(
                profile.base_ranges.contains_key(&TaskType::General),
                "{} lacks a general range",
                profile.role
            );
        }
    }

    #[test]
    fn test_chain_starts_with_primary() {
        for profile in default_profiles() {
            let first = profile.fallback_chain.first().unwrap();
            assert_eq!(first.tier, profile.tier);
            assert_eq!(first.role, profile.role);
        }
    }

    #[test]
    fn test_range_falls_back_to_general() {
        let scribe = role_profile(AgentRole::Scribe);
        assert_eq!(scribe.range_for(TaskType::Code), TemperatureRange::new(0.1, 0.3));
    }

    #[test]
    fn test_coder_low_temperature() {
        let coder = role_profile(AgentRole::Coder);
        assert!(coder.range_for(TaskType::Code).max <= 0.3);
    }

    #[test]
    fn test_range_new_orders_bounds() {
        let r = TemperatureRange::new(0.8, 0.2);
        assert_eq!(r.min, 0.2);
        assert_eq!(r.max, 0.8);
        assert!((r.midpoint() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_profiles_have_personas() {
        for profile in default_profiles() {
            assert!(!profile.persona.is_empty());
        }
    }
}
