//! Client configuration as seen by the settings panel.
//!
//! Reads `config/arsflow.yaml` with the same loader the session uses, so the
//! panel shows what the running client actually works with.

use serde::Serialize;

use crate::backend::config::{find_config_path, load_client_config, API_URL_ENV};
use crate::backend::ClientConfig;

/// Client configuration exposed to the frontend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigInfo {
    /// Config file in use, if one was found.
    pub config_path: Option<String>,
    pub api_base_url: String,
    /// Whether `ARSFLOW_API_URL` overrides the file.
    pub api_url_from_env: bool,
    pub connect_timeout_secs: u64,
    pub reveal_base_delay_ms: u64,
    pub reveal_clause_delay_ms: u64,
    pub reveal_sentence_delay_ms: u64,
    pub scroll_delay_ms: u64,
    pub auto_advance_scroll_delay_ms: u64,
    pub first_step: u32,
    pub max_auto_advance: u32,
}

impl ClientConfigInfo {
    pub fn from_config(config: &ClientConfig, config_path: Option<String>) -> Self {
        Self {
            config_path,
            api_base_url: config.api.base_url.clone(),
            api_url_from_env: std::env::var(API_URL_ENV).is_ok_and(|v| !v.trim().is_empty()),
            connect_timeout_secs: config.api.connect_timeout_secs,
            reveal_base_delay_ms: config.reveal.base_delay_ms,
            reveal_clause_delay_ms: config.reveal.clause_delay_ms,
            reveal_sentence_delay_ms: config.reveal.sentence_delay_ms,
            scroll_delay_ms: config.ui.scroll_delay_ms,
            auto_advance_scroll_delay_ms: config.ui.auto_advance_scroll_delay_ms,
            first_step: config.ui.first_step,
            max_auto_advance: config.ui.max_auto_advance,
        }
    }
}

/// Get the effective client configuration.
///
/// A missing file means defaults; a file that fails to parse is an error
/// here, unlike at session start, so the panel can point at it.
pub fn get_client_config() -> Result<ClientConfigInfo, String> {
    let cwd = std::env::current_dir().unwrap_or_default();
    let (mut config, path) = match find_config_path(&cwd) {
        Ok(path) => {
            let config =
                load_client_config(&path).map_err(|e| format!("Config load error: {e}"))?;
            (config, Some(path.display().to_string()))
        }
        Err(_) => (ClientConfig::default(), None),
    };
    config.apply_env_overrides();
    Ok(ClientConfigInfo::from_config(&config, path))
}
