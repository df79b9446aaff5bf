//! Session controller: the single owner of the transcript and of the
//! at-most-one in-flight generation.
//!
//! Sending and regenerating share one generation path parameterized by
//! `(prompt, target id)`. Starting a generation while another one streams
//! supersedes it: the old run is cancelled through [`HostOps`] and every later
//! event carrying its run id is ignored.

use chat_provider::{ModelOption, RunId};
use thiserror::Error;
use uuid::Uuid;

use crate::transcript::{Message, MessageId, Sender, Transcript};

/// Side effects the session asks its host to perform.
pub trait HostOps {
    /// Starts a streaming generation and returns its run id.
    fn start_generation(&mut self, prompt: String, model: String) -> Result<RunId, String>;
    fn cancel_generation(&mut self, run_id: RunId);
    fn request_render(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming { run_id: RunId, target_id: MessageId },
}

/// Selected model: `value` is sent to the server, `label` is display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub label: String,
    pub value: String,
}

impl ModelSelection {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name)
    }
}

impl From<ModelOption> for ModelSelection {
    fn from(option: ModelOption) -> Self {
        Self::new(option.label, option.value)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("no model selected")]
    NoModelSelected,

    #[error("message {id} is not an assistant reply and cannot be regenerated")]
    NotRegenerable { id: MessageId },

    #[error("failed to start generation: {0}")]
    StartFailed(String),
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    state: SessionState,
    transcript: Transcript,
    streamed_text: Option<String>,
    selected_model: Option<ModelSelection>,
    last_error: Option<String>,
    session_id: Uuid,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            transcript: Transcript::new(),
            streamed_text: None,
            selected_model: None,
            last_error: None,
            session_id: Uuid::new_v4(),
        }
    }

    pub fn with_model(model: Option<ModelSelection>) -> Self {
        Self {
            selected_model: model,
            ..Self::new()
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.transcript.get(id)
    }

    /// Live text of the message being streamed, if any.
    pub fn streamed_text(&self) -> Option<&str> {
        self.streamed_text.as_deref()
    }

    pub fn streaming_target(&self) -> Option<MessageId> {
        match self.state {
            SessionState::Streaming { target_id, .. } => Some(target_id),
            SessionState::Idle => None,
        }
    }

    pub fn active_run_id(&self) -> Option<RunId> {
        match self.state {
            SessionState::Streaming { run_id, .. } => Some(run_id),
            SessionState::Idle => None,
        }
    }

    pub fn is_awaiting_response(&self) -> bool {
        matches!(self.state, SessionState::Streaming { .. })
    }

    pub fn selected_model(&self) -> Option<&ModelSelection> {
        self.selected_model.as_ref()
    }

    pub fn select_model(&mut self, selection: ModelSelection) {
        tracing::info!(session_id = %self.session_id, model = %selection.value, "model selected");
        self.selected_model = Some(selection);
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Appends the user prompt plus an empty assistant placeholder and streams
    /// the reply into the placeholder. Returns the placeholder id.
    pub fn send_message(
        &mut self,
        text: &str,
        host: &mut dyn HostOps,
    ) -> Result<MessageId, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        let model = self.require_model()?;

        let prompt = text.to_string();
        let run_id = self.begin_generation(prompt.clone(), model, host)?;

        let appended = self
            .transcript
            .append(Message::user(prompt))
            .map(|_| ())
            .and_then(|()| {
                self.transcript
                    .append(Message::assistant(String::new()))
                    .map(|placeholder| placeholder.id)
            });
        let target_id = match appended {
            Ok(target_id) => target_id,
            Err(error) => {
                host.cancel_generation(run_id);
                return Err(SessionError::StartFailed(error.to_string()));
            }
        };

        self.enter_streaming(run_id, target_id);
        host.request_render();
        Ok(target_id)
    }

    /// Streams a new reply for assistant message `id`, reusing that id. The
    /// message's stored text is sent as the prompt.
    pub fn regenerate(&mut self, id: MessageId, host: &mut dyn HostOps) -> Result<(), SessionError> {
        let model = self.require_model()?;
        let prompt = match self.transcript.get(id) {
            Some(message) if message.sender == Sender::Assistant => message.text.clone(),
            _ => return Err(SessionError::NotRegenerable { id }),
        };

        let run_id = self.begin_generation(prompt, model, host)?;
        self.enter_streaming(run_id, id);
        host.request_render();
        Ok(())
    }

    /// Latest assistant message, the default target for regenerate.
    pub fn last_assistant_id(&self) -> Option<MessageId> {
        self.transcript
            .messages()
            .iter()
            .rev()
            .find(|message| message.sender == Sender::Assistant)
            .map(|message| message.id)
    }

    /// Cancels any active stream and empties the session. Safe to call from
    /// any state.
    pub fn new_chat(&mut self, host: &mut dyn HostOps) {
        if let SessionState::Streaming { run_id, .. } = self.state {
            host.cancel_generation(run_id);
        }

        self.state = SessionState::Idle;
        self.transcript.clear();
        self.streamed_text = None;
        self.last_error = None;
        self.session_id = Uuid::new_v4();
        tracing::info!(session_id = %self.session_id, "started new chat");
        host.request_render();
    }

    pub fn on_run_started(&mut self, run_id: RunId) {
        if !self.is_active_run(run_id) {
            return;
        }

        tracing::debug!(session_id = %self.session_id, run_id, "generation started");
    }

    pub fn on_run_delta(&mut self, run_id: RunId, text: &str) {
        if !self.is_active_run(run_id) {
            return;
        }

        self.streamed_text = Some(text.to_string());
    }

    pub fn on_run_completed(&mut self, run_id: RunId, text: &str) {
        let Some(target_id) = self.active_target(run_id) else {
            return;
        };

        if let Err(error) = self
            .transcript
            .replace_by_id(target_id, Message::assistant(text))
        {
            tracing::error!(session_id = %self.session_id, run_id, %error, "failed to commit reply");
            self.last_error = Some(error.to_string());
        }

        tracing::info!(
            session_id = %self.session_id,
            run_id,
            target_id,
            chars = text.chars().count(),
            "generation completed"
        );
        self.finish_stream();
    }

    pub fn on_run_failed(&mut self, run_id: RunId, error: &str) {
        if !self.is_active_run(run_id) {
            return;
        }

        tracing::warn!(session_id = %self.session_id, run_id, error, "generation failed");
        self.last_error = Some(error.to_string());
        self.finish_stream();
    }

    pub fn on_run_cancelled(&mut self, run_id: RunId) {
        if !self.is_active_run(run_id) {
            return;
        }

        tracing::debug!(session_id = %self.session_id, run_id, "generation cancelled");
        self.finish_stream();
    }

    fn require_model(&self) -> Result<String, SessionError> {
        self.selected_model
            .as_ref()
            .map(|selection| selection.value.clone())
            .filter(|value| !value.trim().is_empty())
            .ok_or(SessionError::NoModelSelected)
    }

    fn begin_generation(
        &mut self,
        prompt: String,
        model: String,
        host: &mut dyn HostOps,
    ) -> Result<RunId, SessionError> {
        if let SessionState::Streaming { run_id, target_id } = self.state {
            tracing::debug!(session_id = %self.session_id, run_id, target_id, "superseding active generation");
            host.cancel_generation(run_id);
            self.finish_stream();
        }

        match host.start_generation(prompt, model) {
            Ok(run_id) => Ok(run_id),
            Err(error) => {
                tracing::error!(session_id = %self.session_id, %error, "failed to start generation");
                self.last_error = Some(error.clone());
                host.request_render();
                Err(SessionError::StartFailed(error))
            }
        }
    }

    fn enter_streaming(&mut self, run_id: RunId, target_id: MessageId) {
        self.state = SessionState::Streaming { run_id, target_id };
        self.streamed_text = Some(String::new());
        self.last_error = None;
    }

    fn finish_stream(&mut self) {
        self.state = SessionState::Idle;
        self.streamed_text = None;
    }

    fn active_target(&self, run_id: RunId) -> Option<MessageId> {
        match self.state {
            SessionState::Streaming {
                run_id: active,
                target_id,
            } if active == run_id => Some(target_id),
            _ => None,
        }
    }

    fn is_active_run(&self, run_id: RunId) -> bool {
        self.active_target(run_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct HostSpy {
        next_run_id: RunId,
        started: Vec<(String, String)>,
        cancelled: Vec<RunId>,
        renders: usize,
        fail_start: Option<String>,
    }

    impl HostOps for HostSpy {
        fn start_generation(&mut self, prompt: String, model: String) -> Result<RunId, String> {
            if let Some(error) = &self.fail_start {
                return Err(error.clone());
            }
            self.next_run_id += 1;
            self.started.push((prompt, model));
            Ok(self.next_run_id)
        }

        fn cancel_generation(&mut self, run_id: RunId) {
            self.cancelled.push(run_id);
        }

        fn request_render(&mut self) {
            self.renders += 1;
        }
    }

    fn session() -> ChatSession {
        ChatSession::with_model(Some(ModelSelection::from_name("llama3.2")))
    }

    #[test]
    fn blank_prompt_is_rejected_without_side_effects() {
        let mut session = session();
        let mut host = HostSpy::default();

        assert_eq!(
            session.send_message(" \n\t", &mut host),
            Err(SessionError::EmptyPrompt)
        );
        assert!(session.transcript().is_empty());
        assert!(host.started.is_empty());
        assert!(!session.is_awaiting_response());
    }

    #[test]
    fn missing_model_is_rejected_before_network() {
        let mut session = ChatSession::new();
        let mut host = HostSpy::default();

        assert_eq!(
            session.send_message("hi", &mut host),
            Err(SessionError::NoModelSelected)
        );
        assert_eq!(
            session.regenerate(2, &mut host),
            Err(SessionError::NoModelSelected)
        );
        assert!(host.started.is_empty());
    }

    #[test]
    fn start_failure_leaves_transcript_untouched_and_records_error() {
        let mut session = session();
        let mut host = HostSpy {
            fail_start: Some("worker spawn failed".to_string()),
            ..HostSpy::default()
        };

        let error = session
            .send_message("hi", &mut host)
            .expect_err("start failure should surface");

        assert_eq!(error, SessionError::StartFailed("worker spawn failed".to_string()));
        assert!(session.transcript().is_empty());
        assert_eq!(session.last_error(), Some("worker spawn failed"));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn regenerate_rejects_user_and_unknown_messages() {
        let mut session = session();
        let mut host = HostSpy::default();
        session.send_message("q", &mut host).expect("send");
        session.on_run_completed(1, "a");

        assert_eq!(
            session.regenerate(1, &mut host),
            Err(SessionError::NotRegenerable { id: 1 })
        );
        assert_eq!(
            session.regenerate(9, &mut host),
            Err(SessionError::NotRegenerable { id: 9 })
        );
        assert_eq!(host.started.len(), 1);
    }

    #[test]
    fn last_assistant_id_tracks_latest_reply() {
        let mut session = session();
        let mut host = HostSpy::default();
        assert_eq!(session.last_assistant_id(), None);

        session.send_message("one", &mut host).expect("send");
        session.send_message("two", &mut host).expect("send");

        assert_eq!(session.last_assistant_id(), Some(4));
    }

    #[test]
    fn new_chat_rotates_session_id() {
        let mut session = session();
        let mut host = HostSpy::default();
        let before = session.session_id();

        session.new_chat(&mut host);

        assert_ne!(session.session_id(), before);
        assert_eq!(host.renders, 1);
    }
}
