use std::sync::Arc;

use chat_provider::{GenerationProvider, ProviderInitError};
use chat_provider_mock::{MockProvider, MOCK_PROVIDER_ID};
use chat_provider_ollama::{OllamaProvider, OllamaProviderConfig, OLLAMA_PROVIDER_ID};

use crate::config::ChatConfig;
use crate::session::ModelSelection;

pub fn provider_for_config(config: &ChatConfig) -> Result<Arc<dyn GenerationProvider>, ProviderInitError> {
    match config.provider_id.as_str() {
        OLLAMA_PROVIDER_ID => {
            let mut provider_config = OllamaProviderConfig::new();
            if let Some(base_url) = &config.base_url {
                provider_config = provider_config.with_base_url(base_url.clone());
            }
            Ok(Arc::new(OllamaProvider::new(provider_config)?))
        }
        MOCK_PROVIDER_ID => Ok(Arc::new(MockProvider::default())),
        unknown => Err(ProviderInitError::new(format!(
            "Unsupported provider '{unknown}'. Available providers: {OLLAMA_PROVIDER_ID}, {MOCK_PROVIDER_ID}"
        ))),
    }
}

/// Picks the model a fresh session starts with.
///
/// A configured model is loaded on the provider and the name it reports is
/// used. Without one, the first listed model is used. When neither works the
/// session starts without a model and the user must pick one.
pub fn initial_model_selection(
    provider: &dyn GenerationProvider,
    configured: Option<&str>,
) -> Option<ModelSelection> {
    if let Some(model) = configured {
        return match provider.load_model(model) {
            Ok(loaded) => Some(loaded.into()),
            Err(error) => {
                tracing::warn!(model, %error, "configured model could not be loaded");
                Some(ModelSelection::from_name(model))
            }
        };
    }

    match provider.list_models() {
        Ok(models) => models.into_iter().next().map(ModelSelection::from),
        Err(error) => {
            tracing::warn!(%error, "model listing failed; no model selected");
            None
        }
    }
}
