//! Minimal provider-agnostic contract for executing a single generation run.
//!
//! This crate defines only the shared run lifecycle and model-selection value
//! types. It excludes transport details, wire payloads, and session/transcript
//! concerns.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

/// Identifier for one generation run.
pub type RunId = u64;

/// Shared cancellation flag for a run.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing/configuring a provider before any run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new provider initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Input required to start a generation run.
///
/// `stream` is always true for requests built through [`GenerationRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub run_id: RunId,
    pub prompt: String,
    pub model: String,
    pub stream: bool,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(run_id: RunId, prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            run_id,
            prompt: prompt.into(),
            model: model.into(),
            stream: true,
        }
    }
}

/// Selectable model entry, as shown by a model picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOption {
    pub label: String,
    pub value: String,
}

impl ModelOption {
    /// Builds an option whose label and value are both the server-side model name.
    #[must_use]
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            value: name,
        }
    }
}

/// Provider-emitted lifecycle event for a run.
///
/// `Delta` and `Completed` carry the full text accumulated so far, not the
/// increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started { run_id: RunId },
    Delta { run_id: RunId, text: String },
    Completed { run_id: RunId, text: String },
    Failed { run_id: RunId, error: String },
    Cancelled { run_id: RunId },
}

impl RunEvent {
    /// Returns the run identifier associated with this event.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            Self::Started { run_id } | Self::Cancelled { run_id } => *run_id,
            Self::Delta { run_id, .. }
            | Self::Completed { run_id, .. }
            | Self::Failed { run_id, .. } => *run_id,
        }
    }

    /// Returns true when this event terminates the run lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Immutable metadata describing a generation provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub endpoint: Option<String>,
}

/// Provider interface for executing one generation request.
pub trait GenerationProvider: Send + Sync + 'static {
    /// Returns provider identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Lists the models the provider can serve.
    ///
    /// Providers may return an error when listing is unsupported.
    fn list_models(&self) -> Result<Vec<ModelOption>, String> {
        Err("Model listing is not supported by this provider".to_string())
    }

    /// Asks the provider to load `model` ahead of the next run.
    ///
    /// Returns the model the provider reports as loaded.
    fn load_model(&self, model: &str) -> Result<ModelOption, String> {
        Ok(ModelOption::from_name(model))
    }

    /// Executes a generation request and emits lifecycle events in provider order.
    ///
    /// Implementations emit exactly one terminal event unless they return `Err`,
    /// in which case the caller reports the failure.
    fn generate(
        &self,
        req: GenerationRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::{
        CancelSignal, GenerationProvider, GenerationRequest, ModelOption, ProviderInitError,
        ProviderProfile, RunEvent,
    };

    struct MinimalProvider;

    impl GenerationProvider for MinimalProvider {
        fn profile(&self) -> ProviderProfile {
            ProviderProfile {
                provider_id: "minimal".to_string(),
                endpoint: None,
            }
        }

        fn generate(
            &self,
            req: GenerationRequest,
            _cancel: CancelSignal,
            emit: &mut dyn FnMut(RunEvent),
        ) -> Result<(), String> {
            emit(RunEvent::Started { run_id: req.run_id });
            emit(RunEvent::Completed {
                run_id: req.run_id,
                text: String::new(),
            });
            Ok(())
        }
    }

    #[test]
    fn run_event_run_id_returns_event_run_id() {
        let run_id = 42;
        let events = [
            RunEvent::Started { run_id },
            RunEvent::Delta {
                run_id,
                text: "partial".to_string(),
            },
            RunEvent::Completed {
                run_id,
                text: "partial answer".to_string(),
            },
            RunEvent::Failed {
                run_id,
                error: "failure".to_string(),
            },
            RunEvent::Cancelled { run_id },
        ];

        for event in events {
            assert_eq!(event.run_id(), run_id);
        }
    }

    #[test]
    fn run_event_terminal_detection_matches_lifecycle() {
        assert!(!RunEvent::Started { run_id: 1 }.is_terminal());
        assert!(!RunEvent::Delta {
            run_id: 1,
            text: "hello".to_string(),
        }
        .is_terminal());
        assert!(RunEvent::Completed {
            run_id: 1,
            text: "hello".to_string(),
        }
        .is_terminal());
        assert!(RunEvent::Failed {
            run_id: 1,
            error: "boom".to_string(),
        }
        .is_terminal());
        assert!(RunEvent::Cancelled { run_id: 1 }.is_terminal());
    }

    #[test]
    fn provider_init_error_preserves_message() {
        let error = ProviderInitError::new("missing base url");
        assert_eq!(error.message(), "missing base url");
        assert_eq!(error.to_string(), "missing base url");
    }

    #[test]
    fn generation_request_always_streams() {
        let request = GenerationRequest::new(7, "why is the sky blue?", "llama3");

        assert_eq!(request.run_id, 7);
        assert_eq!(request.prompt, "why is the sky blue?");
        assert_eq!(request.model, "llama3");
        assert!(request.stream);
    }

    #[test]
    fn model_option_from_name_uses_name_for_label_and_value() {
        let option = ModelOption::from_name("deepseek-r1:7b");
        assert_eq!(option.label, "deepseek-r1:7b");
        assert_eq!(option.value, "deepseek-r1:7b");
    }

    #[test]
    fn default_model_listing_reports_unsupported() {
        let error = MinimalProvider
            .list_models()
            .expect_err("minimal provider should not support listing");

        assert_eq!(error, "Model listing is not supported by this provider");
    }

    #[test]
    fn default_load_model_echoes_requested_model() {
        let loaded = MinimalProvider
            .load_model("mistral")
            .expect("default load should succeed");
        assert_eq!(loaded, ModelOption::from_name("mistral"));
    }
}
