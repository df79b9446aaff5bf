use ollama_api::url::{GENERATE_PATH, TAGS_PATH};
use ollama_api::{endpoint_url, normalize_base_url, OllamaApiError, DEFAULT_BASE_URL};

#[test]
fn url_normalization_defaults_blank_input_to_local_server() {
    let url = normalize_base_url("   ").expect("blank base url should normalize");
    assert_eq!(url.as_str(), format!("{DEFAULT_BASE_URL}/"));
}

#[test]
fn url_normalization_strips_known_endpoint_suffixes() {
    for input in [
        "http://gpu-box:11434",
        "http://gpu-box:11434/",
        "http://gpu-box:11434/api",
        "http://gpu-box:11434/api/generate",
        "http://gpu-box:11434/api/tags/",
    ] {
        let url = normalize_base_url(input).expect("base url should normalize");
        assert_eq!(url.as_str(), "http://gpu-box:11434/", "input: {input}");
    }
}

#[test]
fn url_normalization_keeps_path_prefix_for_proxied_servers() {
    let url = endpoint_url("https://proxy.local/ollama", GENERATE_PATH).expect("endpoint");
    assert_eq!(url.as_str(), "https://proxy.local/ollama/api/generate");

    let url = endpoint_url("https://proxy.local/ollama/api", TAGS_PATH).expect("endpoint");
    assert_eq!(url.as_str(), "https://proxy.local/ollama/api/tags");
}

#[test]
fn url_normalization_rejects_non_http_schemes() {
    let error = normalize_base_url("ftp://localhost:11434").expect_err("ftp should be rejected");
    assert!(matches!(error, OllamaApiError::InvalidBaseUrl(_)));

    let error = normalize_base_url("not a url").expect_err("garbage should be rejected");
    assert!(matches!(error, OllamaApiError::InvalidBaseUrl(_)));
}
