use crate::backend::GenerateRequest;
use crate::config::ProviderKind;
use crate::retry::RetryPolicy;
use crate::roles::role_profile;
use crate::router::ProviderRouter;
use crate::temperature::{
    detect_task_type, estimate_quality, GenerationContext, PerformanceRecord, TemperatureController,
};
use conclave_core::{AgentRole, ConclaveError, ConclaveResult, TaskType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default generation budget per call.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// One unit of work for the chain executor.
#[derive(Debug, Clone)]
pub struct ChainRequest {
    pub role: AgentRole,
    pub prompt: String,
    /// Detected from the prompt when absent.
    pub task_type: Option<TaskType>,
    /// Caller's confidence in [0, 1]; low values raise the temperature.
    pub confidence: Option<f32>,
    pub max_tokens: u32,
    /// Per-step timeout override.
    pub step_timeout: Option<Duration>,
}

impl ChainRequest {
    pub fn new(role: AgentRole, prompt: impl Into<String>) -> Self {
        Self {
            role,
            prompt: prompt.into(),
            task_type: None,
            confidence: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            step_timeout: None,
        }
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Successful result of a chain run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainOutcome {
    pub text: String,
    /// Model id of the step that answered.
    pub model_used: String,
    /// Persona of the step that answered; differs from the requested role
    /// when the chain fell back to another role.
    pub role_used: AgentRole,
    pub provider: ProviderKind,
    pub temperature: f32,
    pub token_count: Option<u32>,
    /// Backend calls made, including failed ones.
    pub attempts: u32,
    /// Position of the answering step in the chain (0 = primary).
    pub step_index: usize,
    pub duration_ms: u64,
}

/// Runs a role's fallback chain until one step answers.
///
/// Per step: pick a temperature, check the provider's circuit breaker, and
/// call the backend under the step timeout. Rate-limited calls are retried
/// in place with backoff; other provider failures and timeouts move on to
/// the next step; an open circuit skips the step without calling;
/// validation errors stop the chain.
pub struct FallbackChainExecutor {
    router: Arc<ProviderRouter>,
    temperature: Arc<TemperatureController>,
    retry: RetryPolicy,
    step_timeout: Duration,
}

impl FallbackChainExecutor {
    pub fn new(
        router: Arc<ProviderRouter>,
        temperature: Arc<TemperatureController>,
        retry: RetryPolicy,
        step_timeout: Duration,
    ) -> Self {
        Self {
            router,
            temperature,
            retry,
            step_timeout,
        }
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn temperature(&self) -> &Arc<TemperatureController> {
        &self.temperature
    }

    pub async fn execute(&self, request: &ChainRequest) -> ConclaveResult<ChainOutcome> {
        let started = Instant::now();
        let steps = self.router.resolve_chain(request.role);
        let total_steps = steps.len();
        let task_type = request
            .task_type
            .unwrap_or_else(|| detect_task_type(&request.prompt));
        let timeout = request.step_timeout.unwrap_or(self.step_timeout);

        let mut last_error: Option<ConclaveError> = None;
        let mut attempts = 0u32;

        for (index, step) in steps.iter().enumerate() {
            let backend = match self.router.backend(step.provider) {
                Ok(b) => b,
                Err(e) => {
                    warn!(role = %request.role, step = index, provider = %step.provider, error = %e, "Chain step has no backend");
                    last_error = Some(e);
                    continue;
                }
            };
            let breaker = self.router.breaker(step.provider);
            let base = self
                .temperature
                .get_temperature_for_agent(step.role, &request.prompt, Some(task_type));
            let persona = role_profile(step.role).persona;

            let mut retry = 0u32;
            loop {
                let temperature = self.temperature.adjust_temperature_during_generation(
                    step.role,
                    base,
                    &GenerationContext {
                        step: index,
                        total_steps,
                        confidence: request.confidence,
                        is_retry: index > 0 || retry > 0,
                        provider: step.provider,
                    },
                );
                let call = GenerateRequest {
                    prompt: request.prompt.clone(),
                    system: Some(persona.clone()),
                    model: step.model.clone(),
                    temperature,
                    max_tokens: request.max_tokens,
                };

                let call_started = Instant::now();
                let result = breaker
                    .call(async {
                        match tokio::time::timeout(timeout, backend.generate(&call)).await {
                            Ok(r) => r,
                            Err(_) => Err(ConclaveError::Timeout(format!(
                                "model '{}' did not answer within {}ms",
                                step.model,
                                timeout.as_millis()
                            ))),
                        }
                    })
                    .await;
                let elapsed_ms = call_started.elapsed().as_millis() as u64;

                match result {
                    Ok(response) => {
                        attempts += 1;
                        let quality = estimate_quality(&response.text);
                        self.temperature.learn_from_result(
                            step.role,
                            PerformanceRecord::new(temperature, task_type, quality, elapsed_ms, true),
                        );
                        if index > 0 {
                            info!(
                                role = %request.role,
                                model = %step.model,
                                step = index,
                                "Fallback step answered"
                            );
                        }
                        return Ok(ChainOutcome {
                            text: response.text,
                            model_used: step.model.clone(),
                            role_used: step.role,
                            provider: step.provider,
                            temperature,
                            token_count: response.token_count,
                            attempts,
                            step_index: index,
                            duration_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    Err(e) if e.is_circuit_open() => {
                        debug!(role = %request.role, provider = %step.provider, step = index, "Circuit open, skipping step");
                        last_error = Some(e);
                        break;
                    }
                    Err(e @ ConclaveError::Validation(_)) => {
                        warn!(role = %request.role, model = %step.model, error = %e, "Validation error, aborting chain");
                        return Err(e);
                    }
                    Err(e) => {
                        attempts += 1;
                        self.temperature.learn_from_result(
                            step.role,
                            PerformanceRecord::new(temperature, task_type, 0.0, elapsed_ms, false),
                        );
                        if e.is_rate_limited() && self.retry.allows_retry(retry) {
                            let delay = self.retry.backoff(retry);
                            info!(
                                role = %request.role,
                                model = %step.model,
                                retry,
                                delay_ms = delay.as_millis() as u64,
                                "Rate limited, backing off"
                            );
                            tokio::time::sleep(delay).await;
                            retry += 1;
                            continue;
                        }
                        warn!(
                            role = %request.role,
                            model = %step.model,
                            step = index,
                            error = %e,
                            "Chain step failed, moving to next"
                        );
                        last_error = Some(e);
                        break;
                    }
                }
            }
        }

        Err(ConclaveError::ChainExhausted {
            role: request.role.to_string(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "chain has no steps".into()),
        })
    }
}
