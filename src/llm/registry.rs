use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{default_detail, default_max_tokens, AppConfig, LlmConfig};
use crate::errors::{NavError, NavResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(llm_config: LlmConfig) -> Self {
        Self {
            providers: HashMap::new(),
            active: llm_config.active_provider.clone(),
            llm_config,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> NavResult<Arc<dyn LlmProvider>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            NavError::Config(format!("Active provider '{}' not found in registry", self.active))
        })
    }

    /// Return the provider and call configuration for the navigation query.
    ///
    /// Resolution order:
    /// 1. `[llm.vision]` in config.toml
    /// 2. Fallback: active provider with its default model / temperature, no streaming
    pub fn vision_call_config(&self) -> NavResult<(Arc<dyn LlmProvider>, CallConfig)> {
        if let Some(role) = &self.llm_config.vision {
            let provider = self.providers.get(&role.provider).cloned().ok_or_else(|| {
                NavError::Config(format!(
                    "vision role references unknown provider '{}'",
                    role.provider
                ))
            })?;
            let temperature = role.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&role.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.0)
            });
            tracing::debug!(
                provider = %role.provider,
                model = %role.model,
                stream = role.stream,
                temperature = temperature,
                "resolved vision role config"
            );
            return Ok((
                provider,
                CallConfig {
                    model: role.model.clone(),
                    temperature,
                    max_tokens: role.max_tokens,
                    stream: role.stream,
                    detail: role.detail.clone(),
                },
            ));
        }

        let provider = self.get_active()?;
        let (model, temperature) = self
            .llm_config
            .providers
            .get(&self.active)
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.0));
        tracing::debug!(
            provider = %self.active,
            model = %model,
            "vision role not configured, using active provider fallback"
        );
        Ok((
            provider,
            CallConfig {
                model,
                temperature,
                max_tokens: default_max_tokens(),
                stream: false,
                detail: default_detail(),
            },
        ))
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `DRONE_NAV_<ID>_API_KEY`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new(config.llm.clone());
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("DRONE_NAV_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            if api_key.is_empty() {
                tracing::warn!(provider = %id, "no API key configured");
            }
            let provider =
                OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key);
            registry.register(Arc::new(provider));
        }
        registry
    }
}
