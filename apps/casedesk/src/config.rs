use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use client_core::RemoteConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend: BackendKind,
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
    pub bucket: String,
    pub database_url: String,
    pub cache_control_seconds: u32,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            backend_url: None,
            api_key: None,
            bucket: "case-documents".into(),
            database_url: "sqlite://./data/casedesk.db".into(),
            cache_control_seconds: 3600,
            log_filter: "info".into(),
        }
    }
}

/// Keys accepted in `casedesk.toml`. Everything is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    backend: Option<BackendKind>,
    backend_url: Option<String>,
    api_key: Option<String>,
    bucket: Option<String>,
    database_url: Option<String>,
    cache_control_seconds: Option<u32>,
    log_filter: Option<String>,
}

impl Settings {
    pub fn remote_config(&self) -> Result<RemoteConfig> {
        let base_url = self
            .backend_url
            .clone()
            .ok_or_else(|| anyhow!("remote backend selected but no backend_url configured"))?;
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("remote backend selected but no api_key configured"))?;
        Ok(RemoteConfig {
            base_url,
            api_key,
            bucket: self.bucket.clone(),
        })
    }
}

/// Defaults, then the config file if present, then environment variables.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings = Settings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?;
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;

    if let Some(v) = file_cfg.backend {
        settings.backend = v;
    }
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = Some(v);
    }
    if let Some(v) = file_cfg.api_key {
        settings.api_key = Some(v);
    }
    if let Some(v) = file_cfg.bucket {
        settings.bucket = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.cache_control_seconds {
        settings.cache_control_seconds = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    Ok(())
}

/// `APP__*` aliases win over the `CASEDESK_*` names.
fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) -> Result<()> {
    let lookup = |primary: &str, alias: &str| var(alias).or_else(|| var(primary));

    if let Some(v) = lookup("CASEDESK_BACKEND", "APP__BACKEND") {
        settings.backend = BackendKind::from_str(&v, true)
            .map_err(|e| anyhow!("invalid backend '{v}': {e}"))?;
    }
    if let Some(v) = lookup("CASEDESK_URL", "APP__BACKEND_URL") {
        settings.backend_url = Some(v);
    }
    if let Some(v) = lookup("CASEDESK_API_KEY", "APP__API_KEY") {
        settings.api_key = Some(v);
    }
    if let Some(v) = lookup("CASEDESK_BUCKET", "APP__BUCKET") {
        settings.bucket = v;
    }
    if let Some(v) = lookup("CASEDESK_DATABASE_URL", "APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("CASEDESK_CACHE_CONTROL_SECONDS", "APP__CACHE_CONTROL_SECONDS") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.cache_control_seconds = parsed;
        }
    }
    if let Some(v) = lookup("RUST_LOG", "APP__LOG") {
        settings.log_filter = v;
    }
    Ok(())
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
