//! Turns a [`Config`] plus the credentials in scope into a ready
//! [`Orchestrator`]. Enabled flags are decided here, once per run.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::capability::CapabilityClass;
use crate::config::{Backend, Config, ProviderSpec};
use crate::credentials::CredentialSource;
use crate::error::{Result, StocklensError};
use crate::orchestrator::Orchestrator;
use crate::orchestrator::registry::{ProviderRegistry, ProviderSlot};
use crate::providers::cloudflare::CloudflareProvider;
use crate::providers::gemini::GeminiProvider;
use crate::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::providers::{Generation, Provider, ProviderError, TaskRequest};

/// Shared HTTP client. The timeout bounds every provider call.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("stocklens/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| StocklensError::ConfigLoad(format!("failed to construct HTTP client: {e}")))
}

/// Stand-in for a provider whose credentials are missing. Its slot is
/// disabled, so the orchestrator never calls it.
struct Unconfigured {
    key: String,
}

#[async_trait::async_trait]
impl Provider for Unconfigured {
    fn name(&self) -> &str {
        &self.key
    }

    async fn invoke(&self, _request: &TaskRequest) -> std::result::Result<String, ProviderError> {
        Err(ProviderError::other(format!("{}: credentials not configured", self.key)))
    }
}

fn instantiate(
    spec: &ProviderSpec,
    class: CapabilityClass,
    credentials: &dyn CredentialSource,
    generation: Generation,
    client: &reqwest::Client,
) -> Option<Arc<dyn Provider>> {
    let models = spec.models(class).to_vec();
    let provider: Arc<dyn Provider> = match &spec.backend {
        Backend::OpenAiCompatible {
            api_key_env,
            headers,
        } => {
            let key = credentials.key(api_key_env)?;
            Arc::new(
                OpenAiCompatibleProvider::new(&spec.key, &spec.base_url, key, models, client.clone())
                    .with_headers(headers.clone())
                    .with_generation(generation),
            )
        }
        Backend::Gemini { api_key_envs } => {
            let keys: Vec<_> = api_key_envs
                .iter()
                .filter_map(|name| credentials.key(name))
                .collect();
            if keys.is_empty() {
                return None;
            }
            Arc::new(
                GeminiProvider::new(&spec.key, &spec.base_url, keys, models, client.clone())
                    .with_generation(generation),
            )
        }
        Backend::Cloudflare {
            account_id_env,
            api_token_env,
        } => {
            let account_id = credentials.key(account_id_env)?;
            let token = credentials.key(api_token_env)?;
            Arc::new(
                CloudflareProvider::new(
                    &spec.key,
                    &spec.base_url,
                    account_id.expose_secret(),
                    token,
                    models,
                    client.clone(),
                )
                .with_generation(generation),
            )
        }
    };
    Some(provider)
}

/// Build one roster per capability class in configured priority order.
pub fn build_registry(
    config: &Config,
    credentials: &dyn CredentialSource,
    client: &reqwest::Client,
) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for class in CapabilityClass::ALL {
        for key in config.priority(class) {
            // Config validation guarantees every priority key resolves.
            let Some(spec) = config.provider(key) else {
                continue;
            };
            let slot = match instantiate(spec, class, credentials, config.generation, client) {
                Some(provider) => ProviderSlot::new(key, &spec.display_name, class, true, provider),
                None => ProviderSlot::new(
                    key,
                    &spec.display_name,
                    class,
                    false,
                    Arc::new(Unconfigured { key: key.clone() }),
                ),
            };
            registry.register(slot);
        }
    }
    registry
}

pub fn build_orchestrator(
    config: &Config,
    credentials: &dyn CredentialSource,
) -> Result<Orchestrator> {
    let client = http_client(config.run.request_timeout)?;
    Ok(Orchestrator::new(build_registry(config, credentials, &client)))
}

/// Log which providers are usable for each class.
pub fn log_provider_status(registry: &ProviderRegistry) {
    for class in CapabilityClass::ALL {
        for slot in registry.slots(class) {
            info!(
                %class,
                provider = slot.key(),
                enabled = slot.is_enabled(),
                "{}: {}",
                slot.display_name(),
                if slot.is_enabled() { "enabled" } else { "disabled" }
            );
        }
    }
}
