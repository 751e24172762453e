//! Fallback chain behaviour against scripted backends.
//!
//! Covers timeout-driven fallback to the next model and the circuit breaker
//! lifecycle as seen through repeated chain executions.

use async_trait::async_trait;
use conclave_agent::{
    ChainRequest, CircuitBreakerConfig, CircuitState, FallbackChainExecutor, GenerateRequest,
    GenerateResponse, ModelBackend, ProviderKind, ProviderRouter, RetryPolicy, RoutingConfig,
    TemperatureController,
};
use conclave_core::{AgentRole, ConclaveResult};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Mock backends
// ---------------------------------------------------------------------------

/// Remote backend that never answers for models listed in `hangs_on` while unhealthy.
struct FlakyRemote {
    hangs_on: Vec<&'static str>,
    healthy: AtomicBool,
    calls: AtomicU32,
}

impl FlakyRemote {
    fn new(hangs_on: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            hangs_on,
            healthy: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ModelBackend for FlakyRemote {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Remote
    }

    async fn generate(&self, request: &GenerateRequest) -> ConclaveResult<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy.load(Ordering::SeqCst) && self.hangs_on.contains(&request.model.as_str()) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(GenerateResponse {
            text: format!("answer from {}", request.model),
            token_count: Some(42),
        })
    }
}

struct LocalEcho;

#[async_trait]
impl ModelBackend for LocalEcho {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn generate(&self, request: &GenerateRequest) -> ConclaveResult<GenerateResponse> {
        Ok(GenerateResponse::text(format!("local {}", request.model)))
    }
}

fn executor(remote: Arc<FlakyRemote>) -> FallbackChainExecutor {
    let router = ProviderRouter::new(RoutingConfig::default(), CircuitBreakerConfig::default())
        .with_backend(remote)
        .with_backend(Arc::new(LocalEcho));
    FallbackChainExecutor::new(
        Arc::new(router),
        Arc::new(TemperatureController::default()),
        RetryPolicy::default(),
        Duration::from_secs(5),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn timed_out_primary_falls_back_to_next_model() {
    let remote = FlakyRemote::new(vec!["gemini-2.5-pro"]);
    let exec = executor(remote.clone());

    let outcome = exec
        .execute(&ChainRequest::new(AgentRole::Strategist, "Plan the release"))
        .await
        .unwrap();

    assert_eq!(outcome.model_used, "gemini-2.5-flash");
    assert_eq!(outcome.text, "answer from gemini-2.5-flash");
    assert_eq!(outcome.token_count, Some(42));
    assert_eq!(outcome.step_index, 1);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn breaker_opens_skips_and_recovers() {
    // Analyst chain: standard (remote) → fast (remote) → local
    let remote = FlakyRemote::new(vec!["gemini-2.5-flash", "gemini-2.5-flash-lite"]);
    let exec = executor(remote.clone());
    let breaker = exec.router().breaker(ProviderKind::Remote);
    let request = ChainRequest::new(AgentRole::Analyst, "Summarize the findings");

    // Two remote timeouts, then local.
    let first = exec.execute(&request).await.unwrap();
    assert_eq!(first.provider, ProviderKind::Local);
    assert_eq!(breaker.state(), CircuitState::Closed);

    // Third consecutive timeout opens the breaker; the fast step is skipped.
    let second = exec.execute(&request).await.unwrap();
    assert_eq!(second.provider, ProviderKind::Local);
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(remote.calls.load(Ordering::SeqCst), 3);

    // While open, no remote call is attempted at all.
    let third = exec.execute(&request).await.unwrap();
    assert_eq!(third.provider, ProviderKind::Local);
    assert_eq!(third.attempts, 1);
    assert_eq!(remote.calls.load(Ordering::SeqCst), 3);

    // Cooldown elapses and the provider recovers.
    tokio::time::advance(Duration::from_secs(31)).await;
    remote.healthy.store(true, Ordering::SeqCst);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let trial = exec.execute(&request).await.unwrap();
    assert_eq!(trial.model_used, "gemini-2.5-flash");
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    exec.execute(&request).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn forced_local_execution_never_touches_remote() {
    let remote = FlakyRemote::new(vec![]);
    let router = ProviderRouter::new(
        RoutingConfig {
            force_local_execution: true,
            ..RoutingConfig::default()
        },
        CircuitBreakerConfig::default(),
    )
    .with_backend(remote.clone())
    .with_backend(Arc::new(LocalEcho));
    let exec = FallbackChainExecutor::new(
        Arc::new(router),
        Arc::new(TemperatureController::default()),
        RetryPolicy::default(),
        Duration::from_secs(5),
    );

    let outcome = exec
        .execute(&ChainRequest::new(AgentRole::Coder, "Implement the parser"))
        .await
        .unwrap();
    assert_eq!(outcome.text, "local llama3.2:3b");
    assert!(outcome.temperature <= 1.5);
    assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
}
