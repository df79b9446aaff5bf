//! Inference-server implementation of the shared `chat_provider` contract.
//!
//! This adapter drives `ollama_api` streams on a private current-thread
//! runtime and re-emits each cumulative text update as a `RunEvent` while the
//! stream is still open.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chat_provider::{
    CancelSignal, GenerationProvider, GenerationRequest, ModelOption, ProviderInitError,
    ProviderProfile, RunEvent,
};
use ollama_api::{
    GenerateRequest, GenerateStreamEvent, OllamaApiClient, OllamaApiConfig, OllamaApiError,
    StreamResult,
};

/// Stable provider identifier used by startup selection.
pub const OLLAMA_PROVIDER_ID: &str = "ollama";

/// Runtime configuration for the inference-server provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OllamaProviderConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
}

impl OllamaProviderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    fn into_api_config(self) -> OllamaApiConfig {
        let mut config = OllamaApiConfig::default();

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(user_agent) = self.user_agent {
            config = config.with_user_agent(user_agent);
        }

        config
    }
}

trait StreamClient: Send + Sync {
    fn endpoint(&self) -> Option<String>;

    fn stream(
        &self,
        request: &GenerateRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(GenerateStreamEvent),
    ) -> Result<StreamResult, OllamaApiError>;

    fn list_models(&self) -> Result<Vec<String>, OllamaApiError>;

    fn load_model(&self, model: &str) -> Result<String, OllamaApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: OllamaApiClient,
}

impl DefaultStreamClient {
    fn runtime() -> Result<tokio::runtime::Runtime, OllamaApiError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                OllamaApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })
    }
}

impl StreamClient for DefaultStreamClient {
    fn endpoint(&self) -> Option<String> {
        self.client
            .generate_endpoint()
            .ok()
            .map(|url| url.to_string())
    }

    fn stream(
        &self,
        request: &GenerateRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(GenerateStreamEvent),
    ) -> Result<StreamResult, OllamaApiError> {
        let runtime = Self::runtime()?;
        runtime.block_on(
            self.client
                .stream_with_handler(request, Some(cancel), |event| on_event(event)),
        )
    }

    fn list_models(&self) -> Result<Vec<String>, OllamaApiError> {
        let runtime = Self::runtime()?;
        let tags = runtime.block_on(self.client.list_models(None))?;
        Ok(tags.into_iter().map(|tag| tag.name).collect())
    }

    fn load_model(&self, model: &str) -> Result<String, OllamaApiError> {
        let runtime = Self::runtime()?;
        runtime.block_on(self.client.load_model(model, None))
    }
}

/// `GenerationProvider` adapter backed by `ollama_api` transport primitives.
pub struct OllamaProvider {
    stream_client: Arc<dyn StreamClient>,
}

impl OllamaProvider {
    /// Creates a provider using real HTTP transport.
    pub fn new(config: OllamaProviderConfig) -> Result<Self, ProviderInitError> {
        let stream_client = Arc::new(DefaultStreamClient {
            client: OllamaApiClient::new(config.into_api_config()).map_err(map_init_error)?,
        });

        Ok(Self { stream_client })
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(stream_client: Arc<dyn StreamClient>) -> Self {
        Self { stream_client }
    }
}

impl GenerationProvider for OllamaProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: OLLAMA_PROVIDER_ID.to_string(),
            endpoint: self.stream_client.endpoint(),
        }
    }

    fn list_models(&self) -> Result<Vec<ModelOption>, String> {
        match self.stream_client.list_models() {
            Ok(names) => Ok(names.into_iter().map(ModelOption::from_name).collect()),
            Err(error) => {
                tracing::warn!(%error, "failed to list models");
                Err(format!("Failed to list models: {error}"))
            }
        }
    }

    fn load_model(&self, model: &str) -> Result<ModelOption, String> {
        match self.stream_client.load_model(model) {
            Ok(loaded) => {
                tracing::info!(model = %loaded, "model loaded");
                Ok(ModelOption::from_name(loaded))
            }
            Err(error) => {
                tracing::warn!(%error, model, "failed to load model");
                Err(format!("Failed to load model '{model}': {error}"))
            }
        }
    }

    fn generate(
        &self,
        req: GenerationRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String> {
        let run_id = req.run_id;

        emit(RunEvent::Started { run_id });

        if cancel.load(Ordering::Acquire) {
            emit(RunEvent::Cancelled { run_id });
            return Ok(());
        }

        let request = GenerateRequest::new(req.model, req.prompt);
        let outcome = self.stream_client.stream(&request, &cancel, &mut |event| {
            if let GenerateStreamEvent::TextDelta { text } = event {
                emit(RunEvent::Delta { run_id, text });
            }
        });

        match outcome {
            Ok(result) => {
                tracing::debug!(run_id, done = result.done, reason = ?result.done_reason, "generation finished");
                emit(RunEvent::Completed {
                    run_id,
                    text: result.text,
                });
            }
            Err(OllamaApiError::Cancelled) => emit(RunEvent::Cancelled { run_id }),
            Err(error) => {
                tracing::error!(run_id, %error, "generation failed");
                emit(RunEvent::Failed {
                    run_id,
                    error: format!("Generation request failed: {error}"),
                });
            }
        }

        Ok(())
    }
}

fn map_init_error(error: OllamaApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize ollama provider: {error}"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::{Mutex, MutexGuard};

    use super::*;

    enum FakeStreamOutcome {
        Success {
            deltas: Vec<String>,
            result: StreamResult,
        },
        Error(OllamaApiError),
    }

    struct FakeStreamClient {
        observed_request: Mutex<Option<GenerateRequest>>,
        outcome: Mutex<Option<FakeStreamOutcome>>,
        models: Vec<String>,
    }

    impl FakeStreamClient {
        fn success(deltas: &[&str], result: StreamResult) -> Arc<Self> {
            Arc::new(Self {
                observed_request: Mutex::new(None),
                outcome: Mutex::new(Some(FakeStreamOutcome::Success {
                    deltas: deltas.iter().map(ToString::to_string).collect(),
                    result,
                })),
                models: Vec::new(),
            })
        }

        fn failure(error: OllamaApiError) -> Arc<Self> {
            Arc::new(Self {
                observed_request: Mutex::new(None),
                outcome: Mutex::new(Some(FakeStreamOutcome::Error(error))),
                models: Vec::new(),
            })
        }

        fn with_models(models: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                observed_request: Mutex::new(None),
                outcome: Mutex::new(None),
                models: models.iter().map(ToString::to_string).collect(),
            })
        }

        fn observed_request(&self) -> Option<GenerateRequest> {
            lock(&self.observed_request).clone()
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    impl StreamClient for FakeStreamClient {
        fn endpoint(&self) -> Option<String> {
            Some("http://fake/api/generate".to_string())
        }

        fn stream(
            &self,
            request: &GenerateRequest,
            _cancel: &CancelSignal,
            on_event: &mut dyn FnMut(GenerateStreamEvent),
        ) -> Result<StreamResult, OllamaApiError> {
            *lock(&self.observed_request) = Some(request.clone());

            match lock(&self.outcome).take() {
                Some(FakeStreamOutcome::Success { deltas, result }) => {
                    for text in deltas {
                        on_event(GenerateStreamEvent::TextDelta { text });
                    }
                    on_event(GenerateStreamEvent::Done { reason: None });
                    Ok(result)
                }
                Some(FakeStreamOutcome::Error(error)) => Err(error),
                None => panic!("fake stream outcome should be consumed exactly once"),
            }
        }

        fn list_models(&self) -> Result<Vec<String>, OllamaApiError> {
            Ok(self.models.clone())
        }

        fn load_model(&self, model: &str) -> Result<String, OllamaApiError> {
            if self.models.iter().any(|name| name == model) {
                Ok(model.to_string())
            } else {
                Err(OllamaApiError::StreamFailed {
                    message: format!("model '{model}' not found"),
                })
            }
        }
    }

    fn run_events(provider: &OllamaProvider, cancelled: bool) -> Vec<RunEvent> {
        let cancel = Arc::new(AtomicBool::new(cancelled));
        let mut events = Vec::new();

        provider
            .generate(
                GenerationRequest::new(9, "hello", "llama3.2"),
                cancel,
                &mut |event| events.push(event),
            )
            .expect("generate should not return provider-level failure");

        events
    }

    #[test]
    fn profile_reports_provider_id_and_endpoint() {
        let provider = OllamaProvider::with_stream_client_for_tests(FakeStreamClient::with_models(&[]));

        let profile = provider.profile();
        assert_eq!(profile.provider_id, OLLAMA_PROVIDER_ID);
        assert_eq!(profile.endpoint.as_deref(), Some("http://fake/api/generate"));
    }

    #[test]
    fn generate_forwards_cumulative_deltas_then_completes_with_full_text() {
        let stream = FakeStreamClient::success(
            &["Hel", "Hello"],
            StreamResult {
                text: "Hello".to_string(),
                done: true,
                done_reason: Some("stop".to_string()),
            },
        );
        let provider =
            OllamaProvider::with_stream_client_for_tests(Arc::clone(&stream) as Arc<dyn StreamClient>);

        let events = run_events(&provider, false);

        let observed = stream.observed_request().expect("request should be observed");
        assert_eq!(observed, GenerateRequest::new("llama3.2", "hello"));
        assert_eq!(
            events,
            vec![
                RunEvent::Started { run_id: 9 },
                RunEvent::Delta {
                    run_id: 9,
                    text: "Hel".to_string()
                },
                RunEvent::Delta {
                    run_id: 9,
                    text: "Hello".to_string()
                },
                RunEvent::Completed {
                    run_id: 9,
                    text: "Hello".to_string()
                },
            ]
        );
    }

    #[test]
    fn generate_maps_cancelled_transport_to_cancelled_terminal_event() {
        let provider = OllamaProvider::with_stream_client_for_tests(FakeStreamClient::failure(
            OllamaApiError::Cancelled,
        ));

        let events = run_events(&provider, false);

        assert!(matches!(events.first(), Some(RunEvent::Started { run_id: 9 })));
        assert!(matches!(
            events.last(),
            Some(RunEvent::Cancelled { run_id: 9 })
        ));
    }

    #[test]
    fn generate_skips_transport_when_already_cancelled() {
        let stream = FakeStreamClient::failure(OllamaApiError::Unknown("unused".to_string()));
        let provider =
            OllamaProvider::with_stream_client_for_tests(Arc::clone(&stream) as Arc<dyn StreamClient>);

        let events = run_events(&provider, true);

        assert!(stream.observed_request().is_none());
        assert_eq!(
            events,
            vec![
                RunEvent::Started { run_id: 9 },
                RunEvent::Cancelled { run_id: 9 }
            ]
        );
    }

    #[test]
    fn generate_maps_transport_error_to_failed_terminal_event() {
        let provider = OllamaProvider::with_stream_client_for_tests(FakeStreamClient::failure(
            OllamaApiError::Unknown("connection refused".to_string()),
        ));

        let events = run_events(&provider, false);

        assert!(matches!(events.first(), Some(RunEvent::Started { run_id: 9 })));
        assert!(matches!(
            events.last(),
            Some(RunEvent::Failed { run_id: 9, error }) if error.contains("connection refused")
        ));
    }

    #[test]
    fn list_models_maps_names_to_options() {
        let provider = OllamaProvider::with_stream_client_for_tests(FakeStreamClient::with_models(&[
            "llama3.2:latest",
            "qwen3:8b",
        ]));

        let models = provider.list_models().expect("listing should succeed");
        assert_eq!(
            models,
            vec![
                ModelOption::from_name("llama3.2:latest"),
                ModelOption::from_name("qwen3:8b"),
            ]
        );
    }

    #[test]
    fn load_model_reports_failure_with_model_name() {
        let provider =
            OllamaProvider::with_stream_client_for_tests(FakeStreamClient::with_models(&["qwen3:8b"]));

        assert_eq!(
            provider.load_model("qwen3:8b"),
            Ok(ModelOption::from_name("qwen3:8b"))
        );
        let error = provider
            .load_model("ghost")
            .expect_err("unknown model should fail to load");
        assert!(error.contains("'ghost'"));
    }
}
