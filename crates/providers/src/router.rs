//! Provider selection by identifier.

use std::sync::Arc;

use looper_config::AppConfig;
use looper_core::error::{Error, Result};
use looper_core::provider::Provider;
use tracing::{debug, warn};

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;

/// Build the provider named by `config.provider`.
///
/// A missing API key does not fail here; the adapter reports
/// `MissingApiKey` on its first request.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>> {
    build_named(&config.provider, config)
}

/// Build a provider by identifier, reading keys and overrides from `config`.
pub fn build_named(id: &str, config: &AppConfig) -> Result<Arc<dyn Provider>> {
    let api_key = config.api_key_for(id).unwrap_or_default();
    if api_key.is_empty() {
        warn!(provider = id, "No API key configured");
    }
    let model = config.model_for(id);
    let base_url = config.base_url_for(id);
    debug!(provider = id, model = %model, base_url = ?base_url, "Building provider");

    let provider: Arc<dyn Provider> = match id {
        "anthropic" => {
            let mut p = AnthropicProvider::new(api_key)
                .with_model(model)
                .with_defaults(config.max_tokens, config.temperature);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        "openai" => {
            let mut p = OpenAiProvider::new(api_key)
                .with_model(model)
                .with_defaults(config.max_tokens, config.temperature);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        other => return Err(Error::UnsupportedProvider(other.to_string())),
    };

    Ok(provider)
}
