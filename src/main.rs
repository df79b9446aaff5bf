use std::io::{self, BufRead};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use ollama_chat::config::ChatConfig;
use ollama_chat::console::{ChannelWaker, Console, ConsoleSignal};
use ollama_chat::runtime::RuntimeController;
use ollama_chat::session::ChatSession;
use ollama_chat::{logging, providers};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    logging::init().context("failed to install log subscriber")?;

    let config = ChatConfig::from_env().context("failed to load configuration")?;
    let provider = providers::provider_for_config(&config)?;
    let model = providers::initial_model_selection(provider.as_ref(), config.model.as_deref());
    tracing::info!(provider = %config.provider_id, model = ?model.as_ref().map(|m| &m.value), "starting");

    let session = Arc::new(Mutex::new(ChatSession::with_model(model)));
    let (tx, rx) = mpsc::channel();
    let waker = Arc::new(ChannelWaker::new(tx.clone()));
    let mut host = RuntimeController::new(Arc::clone(&session), waker, Arc::clone(&provider));

    thread::Builder::new()
        .name("ollama-chat-stdin".to_string())
        .spawn(move || read_input_lines(tx))
        .context("failed to spawn input reader")?;

    let mut console = Console::new(io::stdout().lock(), provider);
    console.print_banner(&lock_unpoisoned(&session))?;

    let mut input_closed = false;
    while !console.should_exit() {
        match rx.recv_timeout(IDLE_POLL_INTERVAL) {
            Ok(ConsoleSignal::Line(line)) => {
                let mut session = lock_unpoisoned(&session);
                console.handle_line(&line, &mut session, &mut host)?;
            }
            Ok(ConsoleSignal::InputClosed) => input_closed = true,
            Ok(ConsoleSignal::Wake | ConsoleSignal::Render) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        host.flush_pending_run_events();
        let session = lock_unpoisoned(&session);
        console.render(&session)?;

        // Piped input: let the last reply finish before exiting.
        if input_closed && !session.is_awaiting_response() {
            console.request_exit();
        }
    }

    host.shutdown();
    Ok(())
}

fn read_input_lines(tx: mpsc::Sender<ConsoleSignal>) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if tx.send(ConsoleSignal::Line(line)).is_err() {
            return;
        }
    }

    let _ = tx.send(ConsoleSignal::InputClosed);
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
