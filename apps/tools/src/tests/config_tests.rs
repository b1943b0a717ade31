use std::collections::HashMap;

use super::*;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_are_lenient_and_pretty() {
    let settings = Settings::default();
    assert_eq!(settings.history_depth, 100);
    assert_eq!(settings.log_filter, "info");
    assert!(!settings.strict);
    assert!(settings.pretty);
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    settings
        .apply_file("history_depth = 5\nstrict = true\n")
        .expect("valid file");
    assert_eq!(settings.history_depth, 5);
    assert!(settings.strict);
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn unknown_file_keys_are_rejected() {
    let mut settings = Settings::default();
    assert!(settings.apply_file("database_url = \"x\"").is_err());
    assert_eq!(settings, Settings::default());
}

#[test]
fn app_prefixed_variables_win_over_tool_prefixed_ones() {
    let mut settings = Settings::default();
    settings.apply_env(env(&[
        ("LABELTOOL_LOG_FILTER", "debug"),
        ("APP__LOG_FILTER", "label_model=trace"),
        ("LABELTOOL_PRETTY", "off"),
        ("APP__HISTORY_DEPTH", "not-a-number"),
    ]));
    assert_eq!(settings.log_filter, "label_model=trace");
    assert!(!settings.pretty);
    assert_eq!(settings.history_depth, 100);
}

#[test]
fn missing_settings_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = load_settings(&dir.path().join("absent.toml")).expect("settings");
    assert_eq!(settings.history_depth, Settings::default().history_depth);
}

#[test]
fn settings_file_is_read_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(DEFAULT_CONFIG_PATH);
    fs::write(&path, "pretty = false\n").expect("write");
    let settings = load_settings(&path).expect("settings");
    assert!(!settings.pretty);
}
