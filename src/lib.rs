//! Streaming chat session engine for a local Ollama-compatible inference server.
//!
//! ## Provider bootstrap
//!
//! The provider is chosen with `OLLAMA_CHAT_PROVIDER`:
//!
//! - `ollama` (default) streams from `OLLAMA_CHAT_BASE_URL`
//!   (default `http://localhost:11434`)
//! - `mock` replays a deterministic scripted reply, for offline runs
//!
//! `OLLAMA_CHAT_MODEL` picks the starting model. Without it the first model the
//! server lists is used. `OLLAMA_CHAT_CONFIG_PATH` may name a UTF-8 JSON file:
//!
//! ```json
//! {
//!   "base_url": "http://localhost:11434",
//!   "model": "llama3.2"
//! }
//! ```
//!
//! Both fields are optional, unknown fields are rejected, and environment
//! variables win over file values.
//!
//! ## Session contract
//!
//! [`session::ChatSession`] owns the transcript and allows at most one
//! in-flight generation. Streamed text is cumulative and lives in a separate
//! live buffer; the transcript only changes when a generation completes.
//! [`runtime::RuntimeController`] runs each generation on its own worker
//! thread and applies run events to the session in arrival order.

pub mod commands;
pub mod config;
pub mod console;
pub mod logging;
pub mod providers;
pub mod runtime;
pub mod session;
pub mod transcript;
