//! Transport-only client primitives for a local inference server.
//!
//! This crate owns request building, the chunked record stream decoder, and the
//! fold of streamed fragments into accumulated text. It contains no session,
//! transcript, or UI logic.
//!
//! Malformed stream chunks are logged and dropped by [`RecordDecoder`]; they
//! never abort a stream. Failures the caller must see are reported as
//! [`OllamaApiError`].

pub mod client;
pub mod config;
pub mod decoder;
pub mod display;
pub mod error;
pub mod events;
pub mod payload;
pub mod url;

pub use client::{consume_record_stream, CancellationSignal, OllamaApiClient};
pub use config::OllamaApiConfig;
pub use decoder::RecordDecoder;
pub use display::{apply_display_transform, THINKING_INDICATOR, THINKING_MARKER};
pub use error::OllamaApiError;
pub use events::{GenerateStreamEvent, StreamResult, TextAccumulator};
pub use payload::{GenerateRecord, GenerateRequest, ModelTag, TagsResponse};
pub use url::{endpoint_url, normalize_base_url, DEFAULT_BASE_URL};
