use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use crate::config::OllamaApiConfig;
use crate::decoder::RecordDecoder;
use crate::error::{parse_error_message, OllamaApiError};
use crate::events::{GenerateStreamEvent, StreamResult, TextAccumulator};
use crate::payload::{GenerateRecord, GenerateRequest, ModelTag, TagsResponse};
use crate::url::{endpoint_url, GENERATE_PATH, TAGS_PATH};

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct OllamaApiClient {
    http: Client,
    config: OllamaApiConfig,
}

impl OllamaApiClient {
    pub fn new(config: OllamaApiConfig) -> Result<Self, OllamaApiError> {
        endpoint_url(&config.base_url, GENERATE_PATH)?;
        let http = Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OllamaApiConfig {
        &self.config
    }

    pub fn generate_endpoint(&self) -> Result<Url, OllamaApiError> {
        endpoint_url(&self.config.base_url, GENERATE_PATH)
    }

    pub fn tags_endpoint(&self) -> Result<Url, OllamaApiError> {
        endpoint_url(&self.config.base_url, TAGS_PATH)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, OllamaApiError> {
        let mut out = HeaderMap::new();
        out.insert(
            USER_AGENT,
            HeaderValue::from_str(self.config.effective_user_agent()).map_err(|_| {
                OllamaApiError::InvalidHeader("invalid user agent value".to_string())
            })?,
        );

        for (key, value) in &self.config.extra_headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| OllamaApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(value).map_err(|_| {
                    OllamaApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_generate_request(
        &self,
        request: &GenerateRequest,
    ) -> Result<RequestBuilder, OllamaApiError> {
        validate_request_payload(request)?;

        Ok(self
            .http
            .post(self.generate_endpoint()?)
            .headers(self.build_headers()?)
            .json(request))
    }

    /// Sends a single attempt and rejects non-success statuses.
    async fn execute(
        &self,
        builder: RequestBuilder,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, OllamaApiError> {
        if is_cancelled(cancellation) {
            return Err(OllamaApiError::Cancelled);
        }

        let response = await_or_cancel(builder.send(), cancellation).await??;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_default();
        let message = parse_error_message(status, &body);
        tracing::error!(%status, %message, "inference server rejected request");
        Err(OllamaApiError::Status { status, message })
    }

    /// Streams one generation and reports each cumulative delta to `on_event`.
    pub async fn stream_with_handler<F>(
        &self,
        request: &GenerateRequest,
        cancellation: Option<&CancellationSignal>,
        on_event: F,
    ) -> Result<StreamResult, OllamaApiError>
    where
        F: FnMut(GenerateStreamEvent),
    {
        let mut payload = request.clone();
        payload.stream = true;

        let builder = self.build_generate_request(&payload)?;
        let response = self.execute(builder, cancellation).await?;
        tracing::debug!(model = %payload.model, "generation stream opened");

        consume_record_stream(Box::pin(response.bytes_stream()), cancellation, on_event).await
    }

    /// Streams one generation and collects every event.
    pub async fn stream(
        &self,
        request: &GenerateRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<(Vec<GenerateStreamEvent>, StreamResult), OllamaApiError> {
        let mut events = Vec::new();
        let result = self
            .stream_with_handler(request, cancellation, |event| events.push(event))
            .await?;

        Ok((events, result))
    }

    /// Lists installed models.
    pub async fn list_models(
        &self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Vec<ModelTag>, OllamaApiError> {
        let builder = self
            .http
            .get(self.tags_endpoint()?)
            .headers(self.build_headers()?);
        let response = self.execute(builder, cancellation).await?;
        let body = await_or_cancel(response.text(), cancellation).await??;
        let tags: TagsResponse = serde_json::from_str(&body)?;

        Ok(tags.models)
    }

    /// Loads `model` on the server with an empty non-streaming prompt and
    /// returns the model name the server reports.
    pub async fn load_model(
        &self,
        model: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<String, OllamaApiError> {
        let request = GenerateRequest::load(model);
        let builder = self.build_generate_request(&request)?;
        let response = self.execute(builder, cancellation).await?;
        let body = await_or_cancel(response.text(), cancellation).await??;
        let record: GenerateRecord = serde_json::from_str(&body)?;

        if let Some(message) = record.error {
            return Err(OllamaApiError::StreamFailed { message });
        }

        Ok(record.model.unwrap_or_else(|| model.to_string()))
    }
}

/// Drives a byte stream through the record decoder and folds records into
/// accumulated text.
///
/// Reading stops at end of body or after the first `done` record, whichever
/// comes first.
pub async fn consume_record_stream<S, B, E, F>(
    mut bytes: S,
    cancellation: Option<&CancellationSignal>,
    mut on_event: F,
) -> Result<StreamResult, OllamaApiError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<OllamaApiError>,
    F: FnMut(GenerateStreamEvent),
{
    let mut decoder = RecordDecoder::default();
    let mut accumulator = TextAccumulator::default();
    let mut done_reason = None;

    loop {
        let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
            break;
        };
        if is_cancelled(cancellation) {
            return Err(OllamaApiError::Cancelled);
        }
        let chunk = chunk.map_err(Into::<OllamaApiError>::into)?;
        for record in decoder.feed(chunk.as_ref()) {
            process_record(record, &mut accumulator, &mut done_reason, &mut on_event)?;
        }
        if decoder.is_finished() {
            break;
        }
    }

    if is_cancelled(cancellation) {
        return Err(OllamaApiError::Cancelled);
    }

    if decoder.skipped() > 0 {
        tracing::debug!(skipped = decoder.skipped(), "stream ended with skipped records");
    }

    Ok(StreamResult {
        text: accumulator.into_text(),
        done: decoder.is_finished(),
        done_reason,
    })
}

fn process_record<F>(
    record: GenerateRecord,
    accumulator: &mut TextAccumulator,
    done_reason: &mut Option<String>,
    on_event: &mut F,
) -> Result<(), OllamaApiError>
where
    F: FnMut(GenerateStreamEvent),
{
    if let Some(message) = record.error.filter(|message| !message.trim().is_empty()) {
        return Err(OllamaApiError::StreamFailed { message });
    }

    if let Some(fragment) = record.response.as_deref().filter(|value| !value.is_empty()) {
        let text = accumulator.push(fragment).to_string();
        on_event(GenerateStreamEvent::TextDelta { text });
    }

    if record.done {
        *done_reason = record.done_reason;
        on_event(GenerateStreamEvent::Done {
            reason: done_reason.clone(),
        });
    }

    Ok(())
}

fn validate_request_payload(request: &GenerateRequest) -> Result<(), OllamaApiError> {
    if request.model.trim().is_empty() {
        return Err(OllamaApiError::InvalidRequestPayload(
            "'model' must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, OllamaApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(OllamaApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(OllamaApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
