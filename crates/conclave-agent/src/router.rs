use crate::backend::ModelBackend;
use crate::circuit_breaker::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig};
use crate::config::{ModelTier, ProviderKind, RoutingConfig};
use crate::roles::role_profile;
use conclave_core::{AgentRole, ConclaveError, ConclaveResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A resolved fallback-chain step: which backend, which model, which persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStep {
    pub provider: ProviderKind,
    pub tier: ModelTier,
    pub model: String,
    pub role: AgentRole,
}

/// Maps agent roles to backends and concrete model ids, and owns the
/// per-provider circuit breakers that gate every call.
pub struct ProviderRouter {
    routing: RoutingConfig,
    backends: HashMap<ProviderKind, Arc<dyn ModelBackend>>,
    breakers: BreakerRegistry,
}

impl ProviderRouter {
    pub fn new(routing: RoutingConfig, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            routing,
            backends: HashMap::new(),
            breakers: BreakerRegistry::new(breaker_config),
        }
    }

    /// Register a backend under its own [`ProviderKind`], replacing any previous one.
    pub fn register(&mut self, backend: Arc<dyn ModelBackend>) {
        self.backends.insert(backend.kind(), backend);
    }

    /// Builder-style [`ProviderRouter::register`].
    pub fn with_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Breaker guarding a provider family.
    pub fn breaker(&self, provider: ProviderKind) -> Arc<CircuitBreaker> {
        self.breakers.get(provider)
    }

    /// Backend registered for a provider family.
    pub fn backend(&self, provider: ProviderKind) -> ConclaveResult<Arc<dyn ModelBackend>> {
        self.backends
            .get(&provider)
            .cloned()
            .ok_or_else(|| ConclaveError::Provider(format!("no backend registered for {provider}")))
    }

    fn step(&self, tier: ModelTier, role: AgentRole) -> ChainStep {
        ChainStep {
            provider: tier.provider(),
            tier,
            model: self.routing.model_for(tier).to_string(),
            role,
        }
    }

    /// Primary step for a role.
    pub fn route(&self, role: AgentRole) -> ChainStep {
        let profile = role_profile(role);
        if self.routing.force_local_execution && profile.execution_tier {
            return self.step(ModelTier::Local, role);
        }
        self.step(profile.tier, role)
    }

    /// Full fallback chain for a role, primary first.
    ///
    /// With `force_local_execution`, execution-tier roles get a single local step.
    pub fn resolve_chain(&self, role: AgentRole) -> Vec<ChainStep> {
        let profile = role_profile(role);
        if self.routing.force_local_execution && profile.execution_tier {
            return vec![self.step(ModelTier::Local, role)];
        }
        profile
            .fallback_chain
            .iter()
            .map(|entry| self.step(entry.tier, entry.role))
            .collect()
    }
}
