use url::Url;

use crate::error::OllamaApiError;

/// Default base URL of a locally-running inference server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Streaming generation endpoint, relative to the base URL.
pub const GENERATE_PATH: &str = "api/generate";

/// Installed-model listing endpoint, relative to the base URL.
pub const TAGS_PATH: &str = "api/tags";

/// Normalize a user-supplied base URL.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_BASE_URL`]
/// 2) a trailing `/api/generate`, `/api/tags` or `/api` suffix is dropped
/// 3) the result always ends in `/` so endpoint paths join beneath it
pub fn normalize_base_url(input: &str) -> Result<Url, OllamaApiError> {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let mut trimmed = base.trim_end_matches('/');
    for suffix in ["/api/generate", "/api/tags", "/api"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            trimmed = stripped;
            break;
        }
    }

    let url = Url::parse(&format!("{trimmed}/"))
        .map_err(|error| OllamaApiError::InvalidBaseUrl(format!("{base}: {error}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(OllamaApiError::InvalidBaseUrl(format!(
            "{base}: unsupported scheme '{}'",
            url.scheme()
        )));
    }

    Ok(url)
}

/// Resolve an endpoint path beneath a normalized base URL.
pub fn endpoint_url(base: &str, path: &str) -> Result<Url, OllamaApiError> {
    normalize_base_url(base)?
        .join(path)
        .map_err(|error| OllamaApiError::InvalidBaseUrl(format!("{base}: {error}")))
}
