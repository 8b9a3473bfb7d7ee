use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use client_core::{DEFAULT_LOOKUP_TIMEOUT, RAWG_DEFAULT_BASE_URL};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "backlog.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub rawg_api_key: Option<String>,
    pub rawg_base_url: String,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/backlog.db".into(),
            rawg_api_key: None,
            rawg_base_url: RAWG_DEFAULT_BASE_URL.into(),
            request_timeout_secs: DEFAULT_LOOKUP_TIMEOUT.as_secs(),
            log_level: "warn".into(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    database_url: Option<String>,
    rawg_api_key: Option<String>,
    rawg_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    log_level: Option<String>,
}

/// Defaults, then the TOML file, then environment variables.
///
/// An explicitly named config file must exist; the default one is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound && !required => {}
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileConfig = toml::from_str(raw)?;
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.rawg_api_key {
        settings.rawg_api_key = Some(v);
    }
    if let Some(v) = file_cfg.rawg_base_url {
        settings.rawg_base_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.log_level {
        settings.log_level = v;
    }
    Ok(())
}

/// Later keys in each list win.
fn apply_env<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let last = |keys: &[&str]| keys.iter().filter_map(|k| lookup(k)).last();

    if let Some(v) = last(&["DATABASE_URL", "BACKLOG__DATABASE_URL"]) {
        settings.database_url = v;
    }
    if let Some(v) = last(&["RAWG_API_KEY", "BACKLOG__RAWG_API_KEY"]) {
        settings.rawg_api_key = Some(v);
    }
    if let Some(v) = last(&["BACKLOG__RAWG_BASE_URL"]) {
        settings.rawg_base_url = v;
    }
    if let Some(v) = last(&["BACKLOG__REQUEST_TIMEOUT_SECS"]) {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
    if let Some(v) = last(&["BACKLOG__LOG_LEVEL"]) {
        settings.log_level = v;
    }
}

/// Accepts a full url or a bare file path; backslashes become slashes.
pub fn normalize_database_url(raw: &str) -> String {
    let raw = raw.trim();
    match raw {
        "" => Settings::default().database_url,
        url if url.starts_with("sqlite::memory:") || url.contains("://") => url.to_string(),
        path => {
            let path = path.strip_prefix("sqlite:").unwrap_or(path);
            format!("sqlite://{}", path.replace('\\', "/"))
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
