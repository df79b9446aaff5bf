//! Line-oriented console front end.
//!
//! Plain input lines are sent as prompts; lines starting with `/` are slash
//! commands. [`Console::render`] prints only what changed since the previous
//! call, so a streaming reply grows in place on stdout.

use std::io::{self, Write};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use chat_provider::GenerationProvider;

use crate::commands::{parse_slash_command, suggested_prompt, SlashCommand, HELP_TEXT, SUGGESTED_PROMPTS};
use crate::runtime::{lock_unpoisoned, RuntimeWaker};
use crate::session::{ChatSession, HostOps, ModelSelection, SessionError};
use crate::transcript::MessageId;

/// Input and runtime notifications multiplexed onto the console loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleSignal {
    Line(String),
    InputClosed,
    Wake,
    Render,
}

/// [`RuntimeWaker`] that forwards notifications to the console loop.
pub struct ChannelWaker {
    tx: Mutex<Sender<ConsoleSignal>>,
}

impl ChannelWaker {
    pub fn new(tx: Sender<ConsoleSignal>) -> Self {
        Self { tx: Mutex::new(tx) }
    }

    fn send(&self, signal: ConsoleSignal) {
        // The loop may already be gone during shutdown.
        let _ = lock_unpoisoned(&self.tx).send(signal);
    }
}

impl RuntimeWaker for ChannelWaker {
    fn wake(&self) {
        self.send(ConsoleSignal::Wake);
    }

    fn request_render(&self) {
        self.send(ConsoleSignal::Render);
    }
}

#[derive(Debug, Default)]
struct StreamView {
    target: Option<MessageId>,
    printed: String,
}

pub struct Console<W: Write> {
    out: W,
    provider: Arc<dyn GenerationProvider>,
    view: StreamView,
    reported_error: Option<String>,
    should_exit: bool,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            out,
            provider,
            view: StreamView::default(),
            reported_error: None,
            should_exit: false,
        }
    }

    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    pub fn request_exit(&mut self) {
        self.should_exit = true;
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn print_banner(&mut self, session: &ChatSession) -> io::Result<()> {
        let profile = self.provider.profile();
        let endpoint = profile.endpoint.as_deref().unwrap_or("offline");
        writeln!(self.out, "ollama_chat ({} @ {endpoint})", profile.provider_id)?;
        match session.selected_model() {
            Some(model) => writeln!(self.out, "model: {}", model.label)?,
            None => writeln!(self.out, "no model selected; use /models and /model <name>")?,
        }
        writeln!(self.out, "{HELP_TEXT}")?;
        self.out.flush()
    }

    pub fn handle_line(
        &mut self,
        line: &str,
        session: &mut ChatSession,
        host: &mut dyn HostOps,
    ) -> io::Result<()> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let Some(command) = parse_slash_command(trimmed) else {
            return self.send(trimmed, session, host);
        };

        match command {
            SlashCommand::Help => writeln!(self.out, "{HELP_TEXT}")?,
            SlashCommand::New => {
                if self.view.target.is_some() {
                    writeln!(self.out)?;
                }
                session.new_chat(host);
                self.view = StreamView::default();
                self.reported_error = None;
                writeln!(self.out, "Started a new chat")?;
            }
            SlashCommand::Regenerate(id) => {
                let Some(id) = id.or_else(|| session.last_assistant_id()) else {
                    writeln!(self.out, "Nothing to regenerate")?;
                    return self.out.flush();
                };
                if let Err(error) = session.regenerate(id, host) {
                    self.report_session_error(&error)?;
                }
            }
            SlashCommand::Models => self.print_models(session)?,
            SlashCommand::Model(name) => match self.provider.load_model(&name) {
                Ok(loaded) => {
                    let selection = ModelSelection::from(loaded);
                    writeln!(self.out, "model: {}", selection.label)?;
                    session.select_model(selection);
                }
                Err(error) => writeln!(self.out, "error: {error}")?,
            },
            SlashCommand::Prompts => {
                for (index, prompt) in SUGGESTED_PROMPTS.iter().enumerate() {
                    writeln!(self.out, "  {}. {prompt}", index + 1)?;
                }
            }
            SlashCommand::Prompt(index) => {
                if let Some(prompt) = suggested_prompt(index) {
                    return self.send(prompt, session, host);
                }
            }
            SlashCommand::History => self.print_history(session)?,
            SlashCommand::Quit => self.should_exit = true,
            SlashCommand::Usage(usage) => writeln!(self.out, "{usage}")?,
            SlashCommand::Unknown(command) => writeln!(self.out, "Unknown command: {command}")?,
        }

        self.out.flush()
    }

    /// Prints the session changes since the previous call.
    pub fn render(&mut self, session: &ChatSession) -> io::Result<()> {
        let target = session.streaming_target();

        if self.view.target.is_some() && self.view.target != target {
            self.finish_stream_view(session)?;
        }

        if let Some(target_id) = target {
            if self.view.target != Some(target_id) {
                self.view = StreamView {
                    target: Some(target_id),
                    printed: String::new(),
                };
                write!(self.out, "assistant #{target_id}> ")?;
            }
            if let Some(text) = session.streamed_text() {
                self.print_suffix(text)?;
            }
        }

        if let Some(error) = session.last_error() {
            if self.reported_error.as_deref() != Some(error) {
                writeln!(self.out, "error: {error}")?;
                self.reported_error = Some(error.to_string());
            }
        } else {
            self.reported_error = None;
        }

        self.out.flush()
    }

    fn send(&mut self, prompt: &str, session: &mut ChatSession, host: &mut dyn HostOps) -> io::Result<()> {
        if let Err(error) = session.send_message(prompt, host) {
            self.report_session_error(&error)?;
        }
        self.out.flush()
    }

    fn report_session_error(&mut self, error: &SessionError) -> io::Result<()> {
        // Start failures are recorded as the session's last error and shown by render.
        if matches!(error, SessionError::StartFailed(_)) {
            return Ok(());
        }
        writeln!(self.out, "error: {error}")
    }

    fn finish_stream_view(&mut self, session: &ChatSession) -> io::Result<()> {
        let finished = std::mem::take(&mut self.view);
        if let Some(message) = finished.target.and_then(|id| session.message(id)) {
            if let Some(rest) = message.text.strip_prefix(finished.printed.as_str()) {
                write!(self.out, "{rest}")?;
            }
        }
        writeln!(self.out)
    }

    fn print_suffix(&mut self, text: &str) -> io::Result<()> {
        match text.strip_prefix(self.view.printed.as_str()) {
            Some(rest) => write!(self.out, "{rest}")?,
            None => write!(self.out, "\n{text}")?,
        }
        self.view.printed = text.to_string();
        Ok(())
    }

    fn print_models(&mut self, session: &ChatSession) -> io::Result<()> {
        match self.provider.list_models() {
            Ok(models) if models.is_empty() => writeln!(self.out, "No models installed"),
            Ok(models) => {
                let selected = session.selected_model().map(|model| model.value.as_str());
                for model in models {
                    let marker = if selected == Some(model.value.as_str()) { "*" } else { " " };
                    writeln!(self.out, "{marker} {}", model.label)?;
                }
                Ok(())
            }
            Err(error) => writeln!(self.out, "error: {error}"),
        }
    }

    fn print_history(&mut self, session: &ChatSession) -> io::Result<()> {
        if session.transcript().is_empty() {
            return writeln!(self.out, "(empty)");
        }

        for message in session.transcript() {
            writeln!(
                self.out,
                "#{} {}: {}",
                message.id,
                message.sender.as_str(),
                message.text
            )?;
        }
        Ok(())
    }
}
