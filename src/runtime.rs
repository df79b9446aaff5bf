use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use chat_provider::{CancelSignal, GenerationProvider, GenerationRequest, RunEvent, RunId};

use crate::session::{ChatSession, HostOps};

/// Notification surface of the front end driving the controller.
pub trait RuntimeWaker: Send + Sync {
    /// Run events were queued while the queue was empty; the owner should call
    /// [`RuntimeController::flush_pending_run_events`].
    fn wake(&self);

    fn request_render(&self);
}

struct ActiveRun {
    run_id: RunId,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

pub struct RuntimeController {
    session: Arc<Mutex<ChatSession>>,
    waker: Arc<dyn RuntimeWaker>,
    pending_events: Arc<Mutex<VecDeque<RunEvent>>>,
    next_run_id: AtomicU64,
    active_run: Mutex<Option<ActiveRun>>,
    superseded_runs: Mutex<Vec<ActiveRun>>,
    provider: Arc<dyn GenerationProvider>,
}

impl RuntimeController {
    /// Creates a controller that buffers run events before applying them to
    /// the session.
    ///
    /// Events are applied only by [`RuntimeController::flush_pending_run_events`];
    /// the waker is told whenever the queue turns non-empty.
    pub fn new(
        session: Arc<Mutex<ChatSession>>,
        waker: Arc<dyn RuntimeWaker>,
        provider: Arc<dyn GenerationProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            waker,
            pending_events: Arc::new(Mutex::new(VecDeque::new())),
            next_run_id: AtomicU64::new(1),
            active_run: Mutex::new(None),
            superseded_runs: Mutex::new(Vec::new()),
            provider,
        })
    }

    pub fn provider(&self) -> Arc<dyn GenerationProvider> {
        Arc::clone(&self.provider)
    }

    pub fn session(&self) -> Arc<Mutex<ChatSession>> {
        Arc::clone(&self.session)
    }

    /// Starts a run. An already active run is cancelled and detached; its
    /// remaining events still flow through the queue and are dropped by the
    /// session's run-id filter.
    fn start_run_internal(self: &Arc<Self>, prompt: String, model: String) -> Result<RunId, String> {
        self.reap_superseded_runs();

        let mut active_run = self.lock_active_run();
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let cancel = Arc::new(AtomicBool::new(false));
        let request = GenerationRequest::new(run_id, prompt, model);
        let join_handle = self.spawn_worker(request, Arc::clone(&cancel))?;

        if let Some(previous) = active_run.replace(ActiveRun {
            run_id,
            cancel,
            join_handle: Some(join_handle),
        }) {
            previous.cancel.store(true, Ordering::SeqCst);
            tracing::debug!(run_id = previous.run_id, superseded_by = run_id, "run superseded");
            lock_unpoisoned(&self.superseded_runs).push(previous);
        }

        Ok(run_id)
    }

    fn spawn_worker(
        self: &Arc<Self>,
        request: GenerationRequest,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, String> {
        let run_id = request.run_id;
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name(format!("ollama-chat-run-{run_id}"))
            .spawn(move || controller.run_worker(request, cancel))
            .map_err(|error| format!("Failed to spawn run worker: {error}"))
    }

    fn run_worker(self: Arc<Self>, request: GenerationRequest, cancel: CancelSignal) {
        let run_id = request.run_id;
        self.wait_for_session_run_visibility(run_id);

        let terminal_emitted = Arc::new(AtomicBool::new(false));
        let terminal_emitted_for_emit = Arc::clone(&terminal_emitted);
        let controller = Arc::clone(&self);
        let provider = Arc::clone(&self.provider);

        let mut emit = move |event: RunEvent| {
            if event.is_terminal() {
                terminal_emitted_for_emit.store(true, Ordering::SeqCst);
            }

            controller.enqueue_run_event(event);
        };
        let run_outcome = catch_unwind(AssertUnwindSafe(|| {
            provider.generate(request, Arc::clone(&cancel), &mut emit)
        }));

        match run_outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => emit(RunEvent::Failed { run_id, error }),
            Err(_) => emit(RunEvent::Failed {
                run_id,
                error: "Provider panicked".to_string(),
            }),
        }

        if !terminal_emitted.load(Ordering::SeqCst) && self.is_active_run_id(run_id) {
            emit(RunEvent::Failed {
                run_id,
                error: "Provider exited without terminal event".to_string(),
            });
        }
    }

    fn enqueue_run_event(&self, event: RunEvent) {
        let should_wake = {
            let mut queue = lock_unpoisoned(&self.pending_events);
            let should_wake = queue.is_empty();
            queue.push_back(event);
            should_wake
        };

        if should_wake {
            self.waker.wake();
        }
    }

    fn drain_pending_run_events(&self) -> usize {
        let mut drained = 0usize;

        loop {
            let event = {
                let mut pending_events = lock_unpoisoned(&self.pending_events);
                pending_events.pop_front()
            };

            match event {
                Some(event) => {
                    self.apply_run_event(event);
                    drained += 1;
                }
                None => break,
            }
        }

        drained
    }

    /// Drains queued run events onto the session in arrival order and
    /// requests a render when anything was applied.
    pub fn flush_pending_run_events(&self) -> usize {
        let drained = self.drain_pending_run_events();
        if drained > 0 {
            self.waker.request_render();
        }

        drained
    }

    /// Cancels every run and waits for the worker threads to exit.
    pub fn shutdown(&self) {
        let mut workers = std::mem::take(&mut *lock_unpoisoned(&self.superseded_runs));
        if let Some(active) = self.lock_active_run().take() {
            workers.push(active);
        }

        for mut worker in workers {
            worker.cancel.store(true, Ordering::SeqCst);
            if let Some(join_handle) = worker.join_handle.take() {
                if join_handle.thread().id() != thread::current().id() {
                    let _ = join_handle.join();
                }
            }
        }
    }

    /// Run id of the generation currently owned by the controller.
    pub fn active_run_id(&self) -> Option<RunId> {
        self.lock_active_run().as_ref().map(|active| active.run_id)
    }

    fn wait_for_session_run_visibility(&self, run_id: RunId) {
        for _ in 0..256 {
            let run_visible = {
                let session = lock_unpoisoned(&self.session);
                session.active_run_id() == Some(run_id)
            };

            if run_visible {
                return;
            }

            thread::yield_now();
        }
    }

    fn apply_run_event(&self, event: RunEvent) {
        let run_id = event.run_id();
        let terminal = event.is_terminal();

        {
            let mut session = lock_unpoisoned(&self.session);
            match event {
                RunEvent::Started { run_id } => session.on_run_started(run_id),
                RunEvent::Delta { run_id, text } => session.on_run_delta(run_id, &text),
                RunEvent::Completed { run_id, text } => session.on_run_completed(run_id, &text),
                RunEvent::Failed { run_id, error } => session.on_run_failed(run_id, &error),
                RunEvent::Cancelled { run_id } => session.on_run_cancelled(run_id),
            }
        }

        if terminal {
            self.clear_active_run_if_matching(run_id);
        }
    }

    fn clear_active_run_if_matching(&self, run_id: RunId) {
        let mut active_run = self.lock_active_run();
        let matches = active_run.as_ref().map(|active| active.run_id) == Some(run_id);
        if !matches {
            return;
        }

        let mut completed = match active_run.take() {
            Some(completed) => completed,
            None => return,
        };

        if let Some(join_handle) = completed.join_handle.take() {
            let is_current_thread = join_handle.thread().id() == thread::current().id();
            if !is_current_thread && join_handle.is_finished() {
                let _ = join_handle.join();
            }
        }
    }

    fn reap_superseded_runs(&self) {
        let mut superseded = lock_unpoisoned(&self.superseded_runs);
        superseded.retain_mut(|run| {
            let finished = run
                .join_handle
                .as_ref()
                .map_or(true, JoinHandle::is_finished);
            if finished {
                if let Some(join_handle) = run.join_handle.take() {
                    let _ = join_handle.join();
                }
            }
            !finished
        });
    }

    fn is_active_run_id(&self, run_id: RunId) -> bool {
        self.lock_active_run()
            .as_ref()
            .map(|active| active.run_id)
            == Some(run_id)
    }

    fn cancel_run_internal(&self, run_id: RunId) {
        let active_run = self.lock_active_run();
        if let Some(active_run) = active_run.as_ref() {
            if active_run.run_id == run_id {
                active_run.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    fn lock_active_run(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        lock_unpoisoned(&self.active_run)
    }
}

impl HostOps for Arc<RuntimeController> {
    fn start_generation(&mut self, prompt: String, model: String) -> Result<RunId, String> {
        self.start_run_internal(prompt, model)
    }

    fn cancel_generation(&mut self, run_id: RunId) {
        self.cancel_run_internal(run_id);
    }

    fn request_render(&mut self) {
        self.waker.request_render();
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
