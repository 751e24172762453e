//! Model-facing layer of Conclave: backends, routing, resilience and
//! adaptive sampling temperature.
//!
//! A call for an [`AgentRole`](conclave_core::AgentRole) goes through the
//! [`FallbackChainExecutor`], which walks the role's chain as resolved by the
//! [`ProviderRouter`], gates each step on the provider's [`CircuitBreaker`],
//! and asks the [`TemperatureController`] for a temperature.

pub mod backend;
pub mod chain;
pub mod circuit_breaker;
pub mod config;
pub mod retry;
pub mod roles;
pub mod router;
pub mod stream;
pub mod temperature;

pub use backend::{GenerateRequest, GenerateResponse, ModelBackend};
pub use chain::{ChainOutcome, ChainRequest, FallbackChainExecutor};
pub use circuit_breaker::{
    BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
pub use config::{ModelTier, ProviderKind, RoutingConfig};
pub use retry::RetryPolicy;
pub use roles::{role_profile, RoleProfile, TemperatureRange};
pub use router::{ChainStep, ProviderRouter};
pub use stream::StreamEvent;
pub use temperature::{
    detect_task_type, estimate_quality, AgentTemperatureProfile, GenerationContext,
    PerformanceRecord, TemperatureConfig, TemperatureController,
};
