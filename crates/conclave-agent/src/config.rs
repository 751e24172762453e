use serde::{Deserialize, Serialize};

/// Family of model backend a call is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Tiered remote model service.
    Remote,
    /// Locally hosted model runtime.
    Local,
}

impl ProviderKind {
    /// Valid sampling-temperature range `(min, max)` for this family.
    pub fn temperature_bounds(&self) -> (f32, f32) {
        match self {
            ProviderKind::Remote => (0.0, 2.0),
            ProviderKind::Local => (0.0, 1.5),
        }
    }

    /// Clamp a temperature into this family's valid range.
    pub fn clamp_temperature(&self, temperature: f32) -> f32 {
        let (min, max) = self.temperature_bounds();
        temperature.clamp(min, max)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Remote => write!(f, "remote"),
            ProviderKind::Local => write!(f, "local"),
        }
    }
}

/// Capability tier a role asks for; the router resolves it to a concrete model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Highest-capability remote model.
    Pro,
    /// Balanced remote model.
    Standard,
    /// Cheap, low-latency remote model.
    Fast,
    /// Model served by the local runtime.
    Local,
}

impl ModelTier {
    /// Provider family serving this tier.
    pub fn provider(&self) -> ProviderKind {
        match self {
            ModelTier::Pro | ModelTier::Standard | ModelTier::Fast => ProviderKind::Remote,
            ModelTier::Local => ProviderKind::Local,
        }
    }
}

/// Model ids per tier plus the provider-forcing override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_pro_model")]
    pub pro_model: String,
    #[serde(default = "default_standard_model")]
    pub standard_model: String,
    #[serde(default = "default_fast_model")]
    pub fast_model: String,
    #[serde(default = "default_local_model")]
    pub local_model: String,
    /// Route every execution-tier role to the local backend only.
    #[serde(default)]
    pub force_local_execution: bool,
}

fn default_pro_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_standard_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_fast_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

fn default_local_model() -> String {
    "llama3.2:3b".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            pro_model: default_pro_model(),
            standard_model: default_standard_model(),
            fast_model: default_fast_model(),
            local_model: default_local_model(),
            force_local_execution: false,
        }
    }
}

impl RoutingConfig {
    /// Concrete model id for a tier.
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Pro => &self.pro_model,
            ModelTier::Standard => &self.standard_model,
            ModelTier::Fast => &self.fast_model,
            ModelTier::Local => &self.local_model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_to_family_range() {
        assert_eq!(ProviderKind::Remote.clamp_temperature(2.7), 2.0);
        assert_eq!(ProviderKind::Local.clamp_temperature(1.9), 1.5);
        assert_eq!(ProviderKind::Local.clamp_temperature(-0.2), 0.0);
    }

    #[test]
    fn test_tier_provider() {
        assert_eq!(ModelTier::Pro.provider(), ProviderKind::Remote);
        assert_eq!(ModelTier::Local.provider(), ProviderKind::Local);
    }

    #[test]
    fn test_routing_defaults_from_partial_toml() {
        let cfg: RoutingConfig = toml::from_str("local_model = \"qwen2.5:7b\"").unwrap();
        assert_eq!(cfg.local_model, "qwen2.5:7b");
        assert_eq!(cfg.model_for(ModelTier::Pro), "gemini-2.5-pro");
        assert!(!cfg.force_local_execution);
    }
}
