//! Environment configuration with an optional JSON file underneath.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const PROVIDER_ENV_VAR: &str = "OLLAMA_CHAT_PROVIDER";
pub const BASE_URL_ENV_VAR: &str = "OLLAMA_CHAT_BASE_URL";
pub const MODEL_ENV_VAR: &str = "OLLAMA_CHAT_MODEL";
pub const CONFIG_PATH_ENV_VAR: &str = "OLLAMA_CHAT_CONFIG_PATH";

pub const DEFAULT_PROVIDER_ID: &str = "ollama";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Shape of the file named by `OLLAMA_CHAT_CONFIG_PATH`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub provider_id: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
            base_url: None,
            model: None,
        }
    }
}

impl ChatConfig {
    /// Reads the config file (when named) and lets environment values
    /// override it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match env_string_opt(CONFIG_PATH_ENV_VAR) {
            Some(path) => ConfigFile::load(Path::new(&path))?,
            None => ConfigFile::default(),
        };

        Ok(Self::resolve(
            file,
            env_string_opt(PROVIDER_ENV_VAR),
            env_string_opt(BASE_URL_ENV_VAR),
            env_string_opt(MODEL_ENV_VAR),
        ))
    }

    fn resolve(
        file: ConfigFile,
        provider_id: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.unwrap_or_else(|| DEFAULT_PROVIDER_ID.to_string()),
            base_url: base_url.or_else(|| non_blank(file.base_url)),
            model: model.or_else(|| non_blank(file.model)),
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, OnceLock};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp config file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn env_defaults_select_ollama_without_overrides() {
        let _lock = env_lock();
        let _g1 = set_env_guard(PROVIDER_ENV_VAR, None);
        let _g2 = set_env_guard(BASE_URL_ENV_VAR, None);
        let _g3 = set_env_guard(MODEL_ENV_VAR, None);
        let _g4 = set_env_guard(CONFIG_PATH_ENV_VAR, None);

        let config = ChatConfig::from_env().expect("defaults should load");
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn env_values_override_config_file() {
        let file = write_config(r#"{"base_url":"http://gpu:11434","model":"qwen3"}"#);
        let path = file.path().to_string_lossy().to_string();

        let _lock = env_lock();
        let _g1 = set_env_guard(PROVIDER_ENV_VAR, Some("mock"));
        let _g2 = set_env_guard(BASE_URL_ENV_VAR, None);
        let _g3 = set_env_guard(MODEL_ENV_VAR, Some("llama3.2"));
        let _g4 = set_env_guard(CONFIG_PATH_ENV_VAR, Some(&path));

        let config = ChatConfig::from_env().expect("config should load");
        assert_eq!(config.provider_id, "mock");
        assert_eq!(config.base_url.as_deref(), Some("http://gpu:11434"));
        assert_eq!(config.model.as_deref(), Some("llama3.2"));
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = ChatConfig::resolve(
            ConfigFile {
                base_url: Some("  ".to_string()),
                model: None,
            },
            None,
            None,
            None,
        );

        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn unknown_file_fields_are_rejected() {
        let file = write_config(r#"{"base_url":"http://gpu:11434","timeout":5}"#);

        let error = ConfigFile::load(file.path()).expect_err("unknown field should fail");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("missing.json");

        let error = ConfigFile::load(&path).expect_err("missing file should fail");
        assert!(error.to_string().contains("missing.json"));
    }
}
