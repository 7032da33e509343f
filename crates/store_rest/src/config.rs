use std::fs;

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct RestSettings {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".into(),
            request_timeout_seconds: 10,
        }
    }
}

/// File keys are all optional; absent keys keep their current value.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    base_url: Option<String>,
    request_timeout_seconds: Option<u64>,
}

/// Defaults, then `sync.toml`, then environment overrides.
pub fn load_settings() -> RestSettings {
    let mut settings = RestSettings::default();

    if let Ok(raw) = fs::read_to_string("sync.toml") {
        apply_file_settings(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("SYNC_BASE_URL") {
        settings.base_url = v;
    }
    if let Ok(v) = std::env::var("SYNC_REQUEST_TIMEOUT_SECONDS") {
        if let Ok(seconds) = v.parse() {
            settings.request_timeout_seconds = seconds;
        }
    }

    settings
}

fn apply_file_settings(settings: &mut RestSettings, raw: &str) {
    match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => {
            if let Some(v) = file_cfg.base_url {
                settings.base_url = v;
            }
            if let Some(v) = file_cfg.request_timeout_seconds {
                settings.request_timeout_seconds = v;
            }
        }
        Err(err) => {
            warn!(error = %err, "rest: ignoring malformed sync.toml");
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
