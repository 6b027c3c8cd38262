use log::{error, info, warn};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::node::registry::IMAGE_DOWNLOADER_TYPE;
use crate::ui::node_render::image_preview::{PreviewConfig, SourceConvention};

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(rename = "PREVIEW_SERVER_URL")]
    pub server_url: Option<String>,
    #[serde(rename = "PREVIEW_VIEW_ENDPOINT")]
    pub view_endpoint: Option<String>,
    #[serde(rename = "PREVIEW_FALLBACK_PREFIX")]
    pub fallback_prefix: Option<String>,
    #[serde(rename = "PREVIEW_ERROR_SENTINEL")]
    pub error_sentinel: Option<String>,
    #[serde(rename = "PREVIEW_TARGET_CLASS")]
    pub target_class: Option<String>,
    #[serde(rename = "PREVIEW_TARGET_NAME")]
    pub target_display_name: Option<String>,
    /// "file_path" or "inline_payload"
    #[serde(rename = "PREVIEW_SOURCE")]
    pub source: Option<String>,
    #[serde(rename = "PREVIEW_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: Option<u64>,
}

fn read_config_file(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    let config = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Load configuration from `path` (config.yaml by default), then fill unset
/// keys from the environment. A missing or malformed file is logged and
/// treated as empty.
pub fn load_config_from(path: impl AsRef<Path>) -> Config {
    let path = path.as_ref();
    let mut config = match read_config_file(path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e @ Error::Yaml(_)) => {
            error!("Failed to parse {}: {}", path.display(), e);
            Config::default()
        }
        Err(e) => {
            info!(
                "Could not read {} ({}), using environment variables",
                path.display(),
                e
            );
            Config::default()
        }
    };

    config.apply_overrides(|key| std::env::var(key).ok());
    config
}

impl Config {
    /// Fill keys missing from the file using `lookup` (the environment in
    /// production). File values win.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fill(&mut self.server_url, &lookup, "PREVIEW_SERVER_URL");
        fill(&mut self.view_endpoint, &lookup, "PREVIEW_VIEW_ENDPOINT");
        fill(&mut self.fallback_prefix, &lookup, "PREVIEW_FALLBACK_PREFIX");
        fill(&mut self.error_sentinel, &lookup, "PREVIEW_ERROR_SENTINEL");
        fill(&mut self.target_class, &lookup, "PREVIEW_TARGET_CLASS");
        fill(&mut self.target_display_name, &lookup, "PREVIEW_TARGET_NAME");
        fill(&mut self.source, &lookup, "PREVIEW_SOURCE");

        if self.fetch_timeout_secs.is_none() {
            if let Some(val) = lookup("PREVIEW_FETCH_TIMEOUT_SECS") {
                match val.parse() {
                    Ok(parsed) => self.fetch_timeout_secs = Some(parsed),
                    Err(e) => warn!(
                        "Failed to parse PREVIEW_FETCH_TIMEOUT_SECS ({}), using default {}s",
                        e, DEFAULT_FETCH_TIMEOUT_SECS
                    ),
                }
            }
        }
    }

    pub fn preview_config(&self) -> PreviewConfig {
        let mut preview = PreviewConfig::default();

        if let Some(url) = &self.server_url {
            preview.server_url = url.clone();
        }
        if let Some(endpoint) = &self.view_endpoint {
            preview.view_endpoint = endpoint.clone();
        }
        if let Some(prefix) = &self.fallback_prefix {
            preview.fallback_prefix = prefix.clone();
        }
        if let Some(sentinel) = &self.error_sentinel {
            preview.error_sentinel = sentinel.clone();
        }
        if let Some(class) = &self.target_class {
            preview.target_class = class.clone();
        }
        if let Some(name) = &self.target_display_name {
            preview.target_display_name = name.clone();
        }

        match self.source.as_deref() {
            None | Some("file_path") => {}
            Some("inline_payload") => preview.source = SourceConvention::inline_payload(),
            Some(other) => warn!("Unknown PREVIEW_SOURCE '{}', using file_path", other),
        }

        if preview.target_class.is_empty() {
            preview.target_class = IMAGE_DOWNLOADER_TYPE.to_string();
        }
        preview
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS))
    }
}

fn fill(slot: &mut Option<String>, lookup: &impl Fn(&str) -> Option<String>, key: &str) {
    if slot.is_none() {
        *slot = lookup(key).filter(|v| !v.is_empty());
    }
}
