//! Deterministic mock implementation of the shared `chat_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and session-level integration testing.

use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chat_provider::{
    CancelSignal, GenerationProvider, GenerationRequest, ModelOption, ProviderProfile, RunEvent,
};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Deterministic mock provider used by session tests and local runs.
///
/// Each scripted chunk is split into word-sized tokens; every token extends
/// the accumulated text and is emitted as a cumulative `Delta`.
#[derive(Debug)]
pub struct MockProvider {
    chunks: Vec<String>,
    models: Vec<String>,
    failure: Option<String>,
    run_delay: Duration,
    token_delay: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockProvider {
    const RUN_DELAY_MS: u64 = 200;
    const TOKEN_DELAY_MS: u64 = 50;

    /// Creates a mock provider with caller-provided chunks and default models.
    #[must_use]
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            models: vec!["mock".to_string(), "mock-alt".to_string()],
            failure: None,
            run_delay: Duration::from_millis(Self::RUN_DELAY_MS),
            token_delay: Duration::from_millis(Self::TOKEN_DELAY_MS),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the advertised model list.
    #[must_use]
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models
            .into_iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect();
        self
    }

    /// Emits `error` as the terminal event after the scripted chunks.
    #[must_use]
    pub fn failing_with(mut self, error: impl Into<String>) -> Self {
        self.failure = Some(error.into());
        self
    }

    #[must_use]
    pub fn with_delays(mut self, run_delay: Duration, token_delay: Duration) -> Self {
        self.run_delay = run_delay;
        self.token_delay = token_delay;
        self
    }

    /// Removes all artificial latency.
    #[must_use]
    pub fn instant(self) -> Self {
        self.with_delays(Duration::ZERO, Duration::ZERO)
    }

    /// Requests received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    fn pause(delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(vec![
            "<think> </think>".to_string(),
            "Hello! This is the mock provider answering from a scripted reply.\n".to_string(),
            "\n".to_string(),
            "Tokens arrive one word at a time so the console can show ".to_string(),
            "the reply growing while the stream is open.\n".to_string(),
            "Completed successfully.\n".to_string(),
        ])
    }
}

impl GenerationProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            endpoint: None,
        }
    }

    fn list_models(&self) -> Result<Vec<ModelOption>, String> {
        Ok(self
            .models
            .iter()
            .cloned()
            .map(ModelOption::from_name)
            .collect())
    }

    fn load_model(&self, model: &str) -> Result<ModelOption, String> {
        if self.models.iter().any(|name| name == model) {
            Ok(ModelOption::from_name(model))
        } else {
            Err(format!("model '{model}' not found"))
        }
    }

    fn generate(
        &self,
        req: GenerationRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String> {
        let run_id = req.run_id;
        lock_unpoisoned(&self.requests).push(req);

        emit(RunEvent::Started { run_id });
        Self::pause(self.run_delay);

        if cancel.load(Ordering::SeqCst) {
            emit(RunEvent::Cancelled { run_id });
            return Ok(());
        }

        let mut text = String::new();
        for chunk in &self.chunks {
            let mut pending_token = String::new();
            for ch in chunk.chars() {
                pending_token.push(ch);

                if matches!(ch, ' ' | '\n') {
                    if cancel.load(Ordering::SeqCst) {
                        emit(RunEvent::Cancelled { run_id });
                        return Ok(());
                    }
                    text.push_str(&std::mem::take(&mut pending_token));
                    emit(RunEvent::Delta {
                        run_id,
                        text: text.clone(),
                    });
                    Self::pause(self.token_delay);
                }
            }

            if !pending_token.is_empty() {
                if cancel.load(Ordering::SeqCst) {
                    emit(RunEvent::Cancelled { run_id });
                    return Ok(());
                }

                text.push_str(&pending_token);
                emit(RunEvent::Delta {
                    run_id,
                    text: text.clone(),
                });
                Self::pause(self.token_delay);
            }
        }

        if cancel.load(Ordering::SeqCst) {
            emit(RunEvent::Cancelled { run_id });
        } else if let Some(error) = &self.failure {
            emit(RunEvent::Failed {
                run_id,
                error: error.clone(),
            });
        } else {
            emit(RunEvent::Completed { run_id, text });
        }

        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
