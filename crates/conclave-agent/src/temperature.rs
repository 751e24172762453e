//! Per-agent sampling-temperature selection with online learning.
//!
//! A temperature starts from the role's base range for the detected task type,
//! is nudged by the role's biases and the prompt length, and is blended with
//! what has historically worked for that role. While a multi-step chain runs,
//! [`TemperatureController::adjust_temperature_during_generation`] layers
//! annealing, uncertainty and recent-outcome feedback on top.

use crate::config::ProviderKind;
use crate::roles::{role_profile, RoleProfile, TemperatureRange};
use chrono::{DateTime, Utc};
use conclave_core::{AgentRole, ConclaveError, ConclaveResult, TaskType};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::LazyLock;
use tracing::debug;

/// Prompt characters per step of the length penalty.
const PROMPT_LENGTH_STEP: f32 = 1000.0;
/// Temperature removed per step of prompt length.
const PROMPT_LENGTH_PENALTY: f32 = 0.02;
/// Cap on the prompt length penalty.
const PROMPT_LENGTH_MAX_PENALTY: f32 = 0.1;
/// Records inspected by the context-awareness layer.
const RECENT_WINDOW: usize = 5;

/// Tuning knobs of the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureConfig {
    /// Performance records kept per role.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// EMA rate at which the preferred temperature follows new evidence.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    /// History size before the history-derived optimum is blended in.
    #[serde(default = "default_min_history_for_blend")]
    pub min_history_for_blend: usize,
    /// Weight of the history-derived optimum in the blend.
    #[serde(default = "default_history_blend_weight")]
    pub history_blend_weight: f32,
    /// Quality above which a successful record counts as a good outcome.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    /// Good records considered when updating the preferred temperature.
    #[serde(default = "default_learning_window")]
    pub learning_window: usize,
    /// Per-step decay applied while a chain progresses.
    #[serde(default = "default_annealing_rate")]
    pub annealing_rate: f32,
    /// Annealing never takes the temperature below this.
    #[serde(default = "default_annealing_floor")]
    pub annealing_floor: f32,
}

fn default_history_cap() -> usize {
    50
}
fn default_learning_rate() -> f32 {
    0.1
}
fn default_min_history_for_blend() -> usize {
    6
}
fn default_history_blend_weight() -> f32 {
    0.2
}
fn default_quality_threshold() -> f32 {
    0.6
}
fn default_learning_window() -> usize {
    20
}
fn default_annealing_rate() -> f32 {
    0.95
}
fn default_annealing_floor() -> f32 {
    0.1
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            learning_rate: default_learning_rate(),
            min_history_for_blend: default_min_history_for_blend(),
            history_blend_weight: default_history_blend_weight(),
            quality_threshold: default_quality_threshold(),
            learning_window: default_learning_window(),
            annealing_rate: default_annealing_rate(),
            annealing_floor: default_annealing_floor(),
        }
    }
}

impl TemperatureConfig {
    /// Reject out-of-range knobs.
    pub fn validate(&self) -> ConclaveResult<()> {
        if self.history_cap == 0 || self.learning_window == 0 {
            return Err(ConclaveError::Config(
                "temperature.history_cap and temperature.learning_window must be at least 1"
                    .into(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ConclaveError::Config(format!(
                "temperature.learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.history_blend_weight)
            || !(0.0..=1.0).contains(&self.quality_threshold)
            || !(0.0..=1.0).contains(&self.annealing_rate)
        {
            return Err(ConclaveError::Config(
                "temperature.history_blend_weight, quality_threshold and annealing_rate must be in [0, 1]"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one generation attempt, as fed to the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub temperature: f32,
    pub task_type: TaskType,
    /// Normalized [0, 1] quality estimate.
    pub quality_score: f32,
    pub response_time_ms: u64,
    pub was_successful: bool,
    pub timestamp: DateTime<Utc>,
}

impl PerformanceRecord {
    /// Record stamped with the current time; quality is clamped to [0, 1].
    pub fn new(
        temperature: f32,
        task_type: TaskType,
        quality_score: f32,
        response_time_ms: u64,
        was_successful: bool,
    ) -> Self {
        Self {
            temperature,
            task_type,
            quality_score: quality_score.clamp(0.0, 1.0),
            response_time_ms,
            was_successful,
            timestamp: Utc::now(),
        }
    }
}

/// Learned temperature state of one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTemperatureProfile {
    pub role: AgentRole,
    pub base_ranges: HashMap<TaskType, TemperatureRange>,
    pub creativity_bias: f32,
    pub precision_bias: f32,
    /// Running estimate of the temperature that works best for this role.
    pub preferred_temperature: f32,
    /// Oldest first, capped at [`TemperatureConfig::history_cap`].
    pub performance_history: VecDeque<PerformanceRecord>,
}

impl AgentTemperatureProfile {
    fn range_for(&self, task_type: TaskType) -> TemperatureRange {
        self.base_ranges
            .get(&task_type)
            .or_else(|| self.base_ranges.get(&TaskType::General))
            .copied()
            .unwrap_or(TemperatureRange { min: 0.3, max: 0.7 })
    }
}

impl From<&RoleProfile> for AgentTemperatureProfile {
    fn from(profile: &RoleProfile) -> Self {
        Self {
            role: profile.role,
            base_ranges: profile.base_ranges.clone(),
            creativity_bias: profile.creativity_bias,
            precision_bias: profile.precision_bias,
            preferred_temperature: profile.range_for(TaskType::General).midpoint(),
            performance_history: VecDeque::new(),
        }
    }
}

/// Where a call sits inside a running chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationContext {
    /// 0-based position in the chain.
    pub step: usize,
    pub total_steps: usize,
    /// Caller's confidence in [0, 1], if known.
    pub confidence: Option<f32>,
    /// The call repeats or replaces an earlier failed attempt.
    pub is_retry: bool,
    /// Family whose range the result is clamped to.
    pub provider: ProviderKind,
}

/// Per-role temperature selection and online learning.
///
/// Profiles are shared by concurrently running tasks of the same role, so
/// history updates go through a single lock.
pub struct TemperatureController {
    config: TemperatureConfig,
    profiles: RwLock<HashMap<AgentRole, AgentTemperatureProfile>>,
}

impl TemperatureController {
    /// Controller seeded with every role's static profile.
    pub fn new(config: TemperatureConfig) -> Self {
        let profiles = AgentRole::ALL
            .into_iter()
            .map(|role| (role, AgentTemperatureProfile::from(&role_profile(role))))
            .collect();
        Self {
            config,
            profiles: RwLock::new(profiles),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &TemperatureConfig {
        &self.config
    }

    /// Copy of a role's current profile.
    pub fn profile(&self, role: AgentRole) -> AgentTemperatureProfile {
        self.profiles
            .read()
            .get(&role)
            .cloned()
            .unwrap_or_else(|| AgentTemperatureProfile::from(&role_profile(role)))
    }

    /// Replace a role's profile (restoring learned state, or test setup).
    pub fn set_profile(&self, profile: AgentTemperatureProfile) {
        self.profiles.write().insert(profile.role, profile);
    }

    /// Forget everything learned for a role.
    pub fn reset_history(&self, role: AgentRole) {
        self.profiles
            .write()
            .insert(role, AgentTemperatureProfile::from(&role_profile(role)));
    }

    /// Starting temperature for a call by `role` on `prompt`.
    ///
    /// Midpoint of the base range for the task type, plus creativity bias,
    /// minus precision bias, minus a prompt-length penalty; once enough
    /// history exists, blended with the quality-weighted temperature of past
    /// good outcomes for the same task type.
    pub fn get_temperature_for_agent(
        &self,
        role: AgentRole,
        prompt: &str,
        task_type: Option<TaskType>,
    ) -> f32 {
        let task_type = task_type.unwrap_or_else(|| detect_task_type(prompt));
        let profiles = self.profiles.read();
        let fallback;
        let profile = match profiles.get(&role) {
            Some(p) => p,
            None => {
                fallback = AgentTemperatureProfile::from(&role_profile(role));
                &fallback
            }
        };

        let mut temperature = profile.range_for(task_type).midpoint() + profile.creativity_bias
            - profile.precision_bias;
        temperature -= prompt_length_penalty(prompt);

        if profile.performance_history.len() >= self.config.min_history_for_blend {
            if let Some(optimum) = history_optimum(
                &profile.performance_history,
                task_type,
                self.config.quality_threshold,
            ) {
                let w = self.config.history_blend_weight;
                temperature = temperature * (1.0 - w) + optimum * w;
            }
        }

        let (min, max) = ProviderKind::Remote.temperature_bounds();
        temperature.clamp(min, max)
    }

    /// Adjust a starting temperature for the call's position in a running chain.
    pub fn adjust_temperature_during_generation(
        &self,
        role: AgentRole,
        base_temperature: f32,
        ctx: &GenerationContext,
    ) -> f32 {
        let mut t = base_temperature;
        let multi_step = ctx.total_steps > 1;

        // Annealing
        if multi_step && ctx.step > 0 {
            let annealed = t * self.config.annealing_rate.powi(ctx.step as i32);
            t = annealed.max(self.config.annealing_floor.min(base_temperature));
        }

        // Uncertainty boost
        if let Some(confidence) = ctx.confidence {
            let confidence = confidence.clamp(0.0, 1.0);
            if confidence < 0.5 {
                t += (0.5 - confidence) * 0.4;
            }
        }
        if ctx.is_retry {
            t += 0.1;
        }

        // Context awareness
        {
            let profiles = self.profiles.read();
            if let Some(profile) = profiles.get(&role) {
                t = apply_recent_outcomes(t, &profile.performance_history);
            }
        }

        // Step position: a little hotter early, a little cooler late
        if multi_step {
            let last = (ctx.total_steps - 1) as f32;
            let progress = (ctx.step as f32 / last).min(1.0);
            t += 0.05 * (1.0 - 2.0 * progress);
        }

        ctx.provider.clamp_temperature(t)
    }

    /// Append an outcome to the role's history and update its preferred temperature.
    ///
    /// Every call moves the preferred value by `learning_rate` toward the
    /// recency-weighted mean of the last `learning_window` good outcomes
    /// (successful, quality above the threshold). With no good outcome on
    /// record the estimate stays put.
    pub fn learn_from_result(&self, role: AgentRole, record: PerformanceRecord) {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .entry(role)
            .or_insert_with(|| AgentTemperatureProfile::from(&role_profile(role)));

        profile.performance_history.push_back(record);
        while profile.performance_history.len() > self.config.history_cap {
            profile.performance_history.pop_front();
        }

        let good: Vec<&PerformanceRecord> = profile
            .performance_history
            .iter()
            .rev()
            .filter(|r| r.was_successful && r.quality_score > self.config.quality_threshold)
            .take(self.config.learning_window)
            .collect();
        if good.is_empty() {
            return;
        }

        // Newest record weighs `n`, oldest weighs 1.
        let n = good.len();
        let (weighted, weights) = good
            .iter()
            .enumerate()
            .fold((0.0f32, 0.0f32), |(sum, total), (i, r)| {
                let w = (n - i) as f32;
                (sum + r.temperature * w, total + w)
            });
        let target = weighted / weights;
        let lr = self.config.learning_rate;
        let previous = profile.preferred_temperature;
        profile.preferred_temperature = previous * (1.0 - lr) + target * lr;

        debug!(
            role = %role,
            previous,
            preferred = profile.preferred_temperature,
            samples = n,
            "Preferred temperature updated"
        );
    }
}

impl Default for TemperatureController {
    fn default() -> Self {
        Self::new(TemperatureConfig::default())
    }
}

fn prompt_length_penalty(prompt: &str) -> f32 {
    let chars = prompt.chars().count() as f32;
    (chars / PROMPT_LENGTH_STEP * PROMPT_LENGTH_PENALTY).min(PROMPT_LENGTH_MAX_PENALTY)
}

/// Quality-weighted mean temperature of good outcomes for `task_type`.
fn history_optimum(
    history: &VecDeque<PerformanceRecord>,
    task_type: TaskType,
    quality_threshold: f32,
) -> Option<f32> {
    let (sum, weight) = history
        .iter()
        .filter(|r| r.task_type == task_type && r.was_successful && r.quality_score > quality_threshold)
        .fold((0.0f32, 0.0f32), |(sum, weight), r| {
            (sum + r.temperature * r.quality_score, weight + r.quality_score)
        });
    (weight > 0.0).then(|| sum / weight)
}

/// Pull toward recent good temperatures, push away from recent bad ones.
fn apply_recent_outcomes(t: f32, history: &VecDeque<PerformanceRecord>) -> f32 {
    let recent: Vec<&PerformanceRecord> = history.iter().rev().take(RECENT_WINDOW).collect();
    let Some(last) = recent.first() else {
        return t;
    };
    let avg_quality = recent.iter().map(|r| r.quality_score).sum::<f32>() / recent.len() as f32;

    if avg_quality >= 0.75 {
        let successes: Vec<f32> = recent
            .iter()
            .filter(|r| r.was_successful)
            .map(|r| r.temperature)
            .collect();
        if successes.is_empty() {
            return t;
        }
        let target = successes.iter().sum::<f32>() / successes.len() as f32;
        t * 0.7 + target * 0.3
    } else if avg_quality < 0.4 {
        if t >= last.temperature {
            t + 0.1
        } else {
            t - 0.1
        }
    } else {
        t
    }
}

static TASK_PATTERNS: LazyLock<Vec<(TaskType, Regex)>> = LazyLock::new(|| {
    [
        (
            TaskType::Review,
            r"(?i)\b(review|audit|critique|inspect|assess the quality)\b",
        ),
        (
            TaskType::Code,
            r"(?i)\b(code|function|implement\w*|refactor\w*|bug|compile\w*|unit tests?|api|class|rust|python|typescript|script)\b",
        ),
        (
            TaskType::Planning,
            r"(?i)\b(plan\w*|roadmap|decompose|strategy|milestones?|break down)\b",
        ),
        (
            TaskType::Research,
            r"(?i)\b(research\w*|investigate|sources|survey|compare|literature|look up)\b",
        ),
        (
            TaskType::Analysis,
            r"(?i)\b(analy[sz]\w*|evaluate|metrics|data|diagnose|explain why)\b",
        ),
        (
            TaskType::Creative,
            r"(?i)\b(story|poem|creative|brainstorm|slogan|imagine|fiction)\b",
        ),
    ]
    .into_iter()
    .filter_map(|(tt, pattern)| Regex::new(pattern).ok().map(|re| (tt, re)))
    .collect()
});

/// Classify a prompt by keyword; the first matching category wins.
pub fn detect_task_type(prompt: &str) -> TaskType {
    TASK_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(prompt))
        .map(|(tt, _)| *tt)
        .unwrap_or(TaskType::General)
}

static REFUSAL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(i cannot|i can't|i'm unable|as an ai|error:|failed to)").ok()
});

/// Heuristic [0, 1] quality score for a response.
pub fn estimate_quality(response: &str) -> f32 {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let chars = trimmed.chars().count();
    let mut score: f32 = 0.5;
    if chars >= 200 {
        score += 0.2;
    }
    if chars >= 1000 {
        score += 0.1;
    }
    let structured = trimmed.contains("```")
        || trimmed.lines().any(|l| {
            let l = l.trim_start();
            l.starts_with('#') || l.starts_with("- ") || l.starts_with("* ")
        });
    if structured {
        score += 0.1;
    }
    if REFUSAL_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(trimmed))
    {
        score -= 0.3;
    }
    score.clamp(0.0, 1.0)
}
