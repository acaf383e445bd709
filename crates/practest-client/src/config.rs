//! practest configuration and API factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use practest_core::model::{SpeakingSettings, WritingSettings};
use practest_core::traits::{ExamApi, TokenStore};

use crate::auth::{FileTokenStore, MemoryTokenStore};
use crate::http::HttpExamApi;

/// Connection settings for the exam service.
///
/// Note: Custom Debug impl masks the token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token. Takes precedence over `token_file`.
    #[serde(default)]
    pub token: Option<String>,
    /// File holding the bearer token; cleared when the service rejects it.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("token_file", &self.token_file)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            token_file: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritingConfig {
    #[serde(default = "default_writing_duration")]
    pub duration_secs: u32,
    #[serde(default = "default_min_words")]
    pub min_words: u32,
    #[serde(default = "default_writing_prompt")]
    pub prompt: String,
}

impl Default for WritingConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_writing_duration(),
            min_words: default_min_words(),
            prompt: default_writing_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakingConfig {
    #[serde(default = "default_prep_secs")]
    pub prep_secs: u32,
    #[serde(default = "default_speak_secs")]
    pub speak_secs: u32,
    #[serde(default = "default_speaking_prompt")]
    pub prompt: String,
}

impl Default for SpeakingConfig {
    fn default() -> Self {
        Self {
            prep_secs: default_prep_secs(),
            speak_secs: default_speak_secs(),
            prompt: default_speaking_prompt(),
        }
    }
}

/// Top-level practest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PractestConfig {
    /// Upper bound on one submission or upload, in seconds.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub writing: WritingConfig,
    #[serde(default)]
    pub speaking: SpeakingConfig,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}
fn default_request_timeout() -> u64 {
    60
}
fn default_writing_duration() -> u32 {
    60 * 60
}
fn default_min_words() -> u32 {
    250
}
fn default_writing_prompt() -> String {
    "Some people think that governments should invest more in public transport than in roads. \
     To what extent do you agree or disagree?"
        .to_string()
}
fn default_prep_secs() -> u32 {
    60
}
fn default_speak_secs() -> u32 {
    120
}
fn default_speaking_prompt() -> String {
    "Describe a place you visited that left a strong impression on you. \
     You should say where it was, when you went there, what you did there, \
     and explain why it impressed you."
        .to_string()
}
fn default_submit_timeout() -> u64 {
    90
}
fn default_user_agent() -> String {
    format!("practest/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for PractestConfig {
    fn default() -> Self {
        Self {
            submit_timeout_secs: default_submit_timeout(),
            user_agent: default_user_agent(),
            api: ApiConfig::default(),
            writing: WritingConfig::default(),
            speaking: SpeakingConfig::default(),
        }
    }
}

impl PractestConfig {
    pub fn writing_settings(&self) -> WritingSettings {
        WritingSettings {
            prompt_text: self.writing.prompt.clone(),
            duration_secs: self.writing.duration_secs,
            min_words: self.writing.min_words,
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn speaking_settings(&self) -> SpeakingSettings {
        SpeakingSettings {
            prompt_text: self.speaking.prompt.clone(),
            prep_secs: self.speaking.prep_secs,
            speak_secs: self.speaking.speak_secs,
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
        }
    }

    /// Token store for the configured credential source.
    ///
    /// An inline token wins over a token file; with neither, the store is
    /// empty and every call fails as unauthorized.
    pub fn token_store(&self) -> Arc<dyn TokenStore> {
        match (&self.api.token, &self.api.token_file) {
            (Some(token), _) if !token.is_empty() => Arc::new(MemoryTokenStore::with_token(token)),
            (_, Some(path)) => Arc::new(FileTokenStore::new(path)),
            _ => Arc::new(MemoryTokenStore::new()),
        }
    }

    /// Copy of the configuration that is safe to print.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if masked.api.token.is_some() {
            masked.api.token = Some("***".to_string());
        }
        masked
    }
}

/// Expand `${VAR}` references from the environment. Unset variables expand
/// to nothing. Substituted text is not scanned again.
fn resolve_env_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..start + 2 + len];
        out.push_str(&std::env::var(name).unwrap_or_default());
        rest = &rest[start + 2 + len + 1..];
    }
    out.push_str(rest);
    out
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `practest.toml` in the current directory
/// 2. `~/.config/practest/config.toml`
///
/// Environment variable overrides: `PRACTEST_TOKEN`, `PRACTEST_BASE_URL`.
pub fn load_config() -> Result<PractestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<PractestConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("practest.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<PractestConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => PractestConfig::default(),
    };

    config.api.base_url = resolve_env_vars(&config.api.base_url);
    config.api.token = config.api.token.as_deref().map(resolve_env_vars);
    config.api.token_file = config
        .api
        .token_file
        .as_ref()
        .map(|p| PathBuf::from(resolve_env_vars(&p.to_string_lossy())));

    // Overrides are taken literally.
    if let Ok(token) = std::env::var("PRACTEST_TOKEN") {
        config.api.token = Some(token);
    }
    if let Ok(url) = std::env::var("PRACTEST_BASE_URL") {
        config.api.base_url = url;
    }

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("practest"))
}

/// Create the exam service client for a configuration.
pub fn create_api(config: &PractestConfig, tokens: Arc<dyn TokenStore>) -> Result<Arc<dyn ExamApi>> {
    let api = HttpExamApi::with_timeout(
        &config.api.base_url,
        tokens,
        Duration::from_secs(config.api.request_timeout_secs),
    )?;
    Ok(Arc::new(api))
}
