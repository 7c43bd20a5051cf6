//! Client configuration loading and validation.
//!
//! Reads `config/arsflow.yaml` and resolves environment variables. A missing
//! file is not an error: every setting has a built-in default, and the backend
//! base URL can be supplied through `ARSFLOW_API_URL` alone.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::BackendError;

/// Relative location of the config file inside the project root.
const CONFIG_RELATIVE_PATH: &str = "config/arsflow.yaml";

/// Environment variable that overrides `api.base_url`.
pub const API_URL_ENV: &str = "ARSFLOW_API_URL";

/// Environment variable pointing at the project root.
pub const PROJECT_ROOT_ENV: &str = "ARSFLOW_PROJECT_ROOT";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// TCP connect timeout. Requests themselves have no overall timeout.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Character-by-character message reveal pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealPacing {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Extra pause after `,`, `;` and `:`.
    #[serde(default = "default_clause_delay_ms")]
    pub clause_delay_ms: u64,
    /// Extra pause after `.`, `!` and `?`.
    #[serde(default = "default_sentence_delay_ms")]
    pub sentence_delay_ms: u64,
}

impl RevealPacing {
    /// No delays at all; messages complete immediately.
    pub fn instant() -> Self {
        Self {
            base_delay_ms: 0,
            clause_delay_ms: 0,
            sentence_delay_ms: 0,
        }
    }
}

impl Default for RevealPacing {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            clause_delay_ms: default_clause_delay_ms(),
            sentence_delay_ms: default_sentence_delay_ms(),
        }
    }
}

/// Chat-flow UI tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    /// Delay before scrolling to a step's anchor, letting layout settle.
    #[serde(default = "default_scroll_delay_ms")]
    pub scroll_delay_ms: u64,
    /// Shorter scroll delay used for auto-advancing steps.
    #[serde(default = "default_auto_advance_scroll_delay_ms")]
    pub auto_advance_scroll_delay_ms: u64,
    /// Step the conversation starts at.
    #[serde(default = "default_first_step")]
    pub first_step: u32,
    /// Maximum consecutive automatic continuations before the flow gives up.
    #[serde(default = "default_max_auto_advance")]
    pub max_auto_advance: u32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            scroll_delay_ms: default_scroll_delay_ms(),
            auto_advance_scroll_delay_ms: default_auto_advance_scroll_delay_ms(),
            first_step: default_first_step(),
            max_auto_advance: default_max_auto_advance(),
        }
    }
}

/// Top-level client configuration (mirrors `config/arsflow.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub reveal: RevealPacing,
    #[serde(default)]
    pub ui: UiConfig,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_base_delay_ms() -> u64 {
    18
}
fn default_clause_delay_ms() -> u64 {
    120
}
fn default_sentence_delay_ms() -> u64 {
    260
}
fn default_scroll_delay_ms() -> u64 {
    500
}
fn default_auto_advance_scroll_delay_ms() -> u64 {
    200
}
fn default_first_step() -> u32 {
    101
}
fn default_max_auto_advance() -> u32 {
    32
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl ClientConfig {
    /// Load the config file if one can be found, else use defaults.
    ///
    /// A file that exists but fails to parse is logged and ignored rather
    /// than aborting the session. `ARSFLOW_API_URL` is applied last.
    pub fn load_or_default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        let mut config = match find_config_path(&cwd) {
            Ok(path) => match load_client_config(&path) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "loaded client config");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "using default client config");
                    ClientConfig::default()
                }
            },
            Err(_) => ClientConfig::default(),
        };
        config.apply_env_overrides();
        config
    }

    /// Apply `ARSFLOW_API_URL`, if set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().to_string();
            }
        }
    }

    /// Reject settings the client cannot work with.
    pub fn validate(&self) -> Result<(), BackendError> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(BackendError::ConfigError {
                reason: format!("api.base_url must be an http(s) URL, got '{url}'"),
            });
        }
        if self.ui.max_auto_advance == 0 {
            return Err(BackendError::ConfigError {
                reason: "ui.max_auto_advance must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Resolve the config path.
///
/// Checks `ARSFLOW_PROJECT_ROOT` first, then searches upward from `start`
/// for `config/arsflow.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, BackendError> {
    if let Ok(root) = std::env::var(PROJECT_ROOT_ENV) {
        let candidate = PathBuf::from(&root).join(CONFIG_RELATIVE_PATH);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_RELATIVE_PATH);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(BackendError::ConfigError {
        reason: format!("could not find {CONFIG_RELATIVE_PATH}"),
    })
}

/// Load and parse a config file, interpolating `${VAR}` / `${VAR:-default}`.
pub fn load_client_config(path: &Path) -> Result<ClientConfig, BackendError> {
    let raw = std::fs::read_to_string(path).map_err(|e| BackendError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let config: ClientConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| BackendError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`; unset variables without default become empty.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => {
            std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
        }
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
