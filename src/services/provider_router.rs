use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::config::ProviderDefaults;
use crate::models::internal::{Connector, ProviderKind};
use crate::services::llm::anthropic::ANTHROPIC_BASE_URL;
use crate::services::llm::openai_compat::{COPILOT_BASE_URL, MISTRAL_BASE_URL, OPENAI_BASE_URL};
use crate::services::llm::{AnthropicBackend, LanguageModel, OpenAiCompatibleBackend};

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_COPILOT_MODEL: &str = "gpt-4o";
const DEFAULT_MISTRAL_MODEL: &str = "mistral-large-latest";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderRouteError {
    #[error("No API key configured for provider {0}")]
    MissingCredential(ProviderKind),
    #[error("No endpoint configured for provider {0}")]
    MissingEndpoint(ProviderKind),
}

impl ProviderRouteError {
    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::MissingCredential(p) | Self::MissingEndpoint(p) => *p,
        }
    }
}

/// A connector with every field its backend needs already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedProvider {
    Anthropic {
        api_key: String,
        model: String,
    },
    OpenAi {
        api_key: String,
        model: String,
    },
    AzureOpenAi {
        api_key: String,
        endpoint: String,
        api_version: String,
        deployment: String,
    },
    Copilot {
        api_key: String,
        model: String,
    },
    Mistral {
        api_key: String,
        model: String,
    },
    Custom {
        api_key: String,
        base_url: String,
        model: String,
    },
}

impl ResolvedProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Anthropic { .. } => ProviderKind::Anthropic,
            Self::OpenAi { .. } => ProviderKind::OpenAi,
            Self::AzureOpenAi { .. } => ProviderKind::AzureOpenAi,
            Self::Copilot { .. } => ProviderKind::Copilot,
            Self::Mistral { .. } => ProviderKind::Mistral,
            Self::Custom { .. } => ProviderKind::Custom,
        }
    }
}

/// Turns a resolved provider into a callable model.
pub trait ModelFactory: Send + Sync {
    fn build(&self, provider: &ResolvedProvider) -> Arc<dyn LanguageModel>;
}

pub struct ProviderRouter {
    defaults: ProviderDefaults,
}

impl ProviderRouter {
    pub fn new(defaults: ProviderDefaults) -> Self {
        Self { defaults }
    }

    /// Highest-priority connector; ties keep configuration order.
    pub fn select_connector<'a>(&self, connectors: &'a [Connector]) -> Option<&'a Connector> {
        connectors.iter().min_by_key(|c| c.provider.priority())
    }

    /// Connector-stored key first, then the process default for the provider.
    pub fn resolve_credential(
        &self,
        provider: ProviderKind,
        connector_key: Option<&str>,
    ) -> Option<String> {
        non_empty(connector_key).or_else(|| {
            let default = match provider {
                ProviderKind::Anthropic => &self.defaults.anthropic_api_key,
                ProviderKind::OpenAi => &self.defaults.openai_api_key,
                ProviderKind::AzureOpenAi => &self.defaults.azure_openai_api_key,
                ProviderKind::Copilot => &self.defaults.copilot_api_key,
                ProviderKind::Mistral => &self.defaults.mistral_api_key,
                ProviderKind::Custom => &self.defaults.custom_api_key,
            };
            non_empty(default.as_deref())
        })
    }

    pub fn resolve(&self, connector: &Connector) -> Result<ResolvedProvider, ProviderRouteError> {
        let provider = connector.provider;
        let api_key = self
            .resolve_credential(provider, connector.api_key.as_deref())
            .ok_or(ProviderRouteError::MissingCredential(provider))?;
        let model = non_empty(connector.model.as_deref());

        let resolved = match provider {
            ProviderKind::Anthropic => ResolvedProvider::Anthropic {
                api_key,
                model: model.unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            },
            ProviderKind::OpenAi => ResolvedProvider::OpenAi {
                api_key,
                model: model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
            ProviderKind::AzureOpenAi => {
                let endpoint = non_empty(connector.endpoint.as_deref())
                    .or_else(|| non_empty(self.defaults.azure_openai_endpoint.as_deref()))
                    .ok_or(ProviderRouteError::MissingEndpoint(provider))?;
                let api_version = non_empty(connector.api_version.as_deref())
                    .or_else(|| non_empty(self.defaults.azure_openai_api_version.as_deref()))
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
                ResolvedProvider::AzureOpenAi {
                    api_key,
                    endpoint,
                    api_version,
                    deployment: model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                }
            }
            ProviderKind::Copilot => ResolvedProvider::Copilot {
                api_key,
                model: model.unwrap_or_else(|| DEFAULT_COPILOT_MODEL.to_string()),
            },
            ProviderKind::Mistral => ResolvedProvider::Mistral {
                api_key,
                model: model.unwrap_or_else(|| DEFAULT_MISTRAL_MODEL.to_string()),
            },
            ProviderKind::Custom => ResolvedProvider::Custom {
                api_key,
                base_url: non_empty(connector.endpoint.as_deref())
                    .or_else(|| non_empty(self.defaults.custom_base_url.as_deref()))
                    .ok_or(ProviderRouteError::MissingEndpoint(provider))?,
                model: model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
        };

        debug!(connector_id = %connector.id, provider = %provider, "Resolved connector");
        Ok(resolved)
    }
}

impl ModelFactory for ProviderRouter {
    fn build(&self, provider: &ResolvedProvider) -> Arc<dyn LanguageModel> {
        match provider.clone() {
            ResolvedProvider::Anthropic { api_key, model } => Arc::new(
                AnthropicBackend::with_base_url(
                    self.defaults
                        .anthropic_base_url
                        .clone()
                        .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
                    api_key,
                    model,
                ),
            ),
            ResolvedProvider::OpenAi { api_key, model } => {
                let base_url = self
                    .defaults
                    .openai_base_url
                    .as_deref()
                    .unwrap_or(OPENAI_BASE_URL);
                Arc::new(OpenAiCompatibleBackend::new("openai", base_url, api_key, model))
            }
            ResolvedProvider::AzureOpenAi {
                api_key,
                endpoint,
                api_version,
                deployment,
            } => Arc::new(OpenAiCompatibleBackend::azure(
                &endpoint,
                &api_version,
                api_key,
                deployment,
            )),
            ResolvedProvider::Copilot { api_key, model } => Arc::new(
                OpenAiCompatibleBackend::copilot(COPILOT_BASE_URL, api_key, model),
            ),
            ResolvedProvider::Mistral { api_key, model } => Arc::new(
                OpenAiCompatibleBackend::new("mistral", MISTRAL_BASE_URL, api_key, model),
            ),
            ResolvedProvider::Custom {
                api_key,
                base_url,
                model,
            } => Arc::new(OpenAiCompatibleBackend::new(
                "custom", &base_url, api_key, model,
            )),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
