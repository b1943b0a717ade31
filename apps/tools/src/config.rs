use std::{fs, path::Path};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "labeltool.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub history_depth: usize,
    pub log_filter: String,
    /// Stop a replay at the first rejected action.
    pub strict: bool,
    pub pretty: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_depth: label_store::DEFAULT_HISTORY_DEPTH,
            log_filter: "info".into(),
            strict: false,
            pretty: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    history_depth: Option<usize>,
    log_filter: Option<String>,
    strict: Option<bool>,
    pretty: Option<bool>,
}

/// Defaults, then `path` if it exists, then the process environment.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        settings
            .apply_file(&raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?;
    }
    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}

impl Settings {
    pub fn apply_file(&mut self, raw: &str) -> anyhow::Result<()> {
        let file: FileSettings = toml::from_str(raw)?;
        if let Some(v) = file.history_depth {
            self.history_depth = v;
        }
        if let Some(v) = file.log_filter {
            self.log_filter = v;
        }
        if let Some(v) = file.strict {
            self.strict = v;
        }
        if let Some(v) = file.pretty {
            self.pretty = v;
        }
        Ok(())
    }

    /// Reads `LABELTOOL_*` and then `APP__*` variables, so the latter win.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for prefix in ["LABELTOOL_", "APP__"] {
            let var = |name: &str| lookup(&format!("{prefix}{name}"));
            if let Some(v) = var("HISTORY_DEPTH") {
                match v.parse() {
                    Ok(parsed) => self.history_depth = parsed,
                    Err(_) => warn!(value = %v, "ignoring invalid {prefix}HISTORY_DEPTH"),
                }
            }
            if let Some(v) = var("LOG_FILTER") {
                self.log_filter = v;
            }
            if let Some(v) = var("STRICT") {
                match parse_flag(&v) {
                    Some(flag) => self.strict = flag,
                    None => warn!(value = %v, "ignoring invalid {prefix}STRICT"),
                }
            }
            if let Some(v) = var("PRETTY") {
                match parse_flag(&v) {
                    Some(flag) => self.pretty = flag,
                    None => warn!(value = %v, "ignoring invalid {prefix}PRETTY"),
                }
            }
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
