//! YAML configuration loader for UI strings.
use std::sync::LazyLock;

use serde::Deserialize;

// ============================================================================
// UI Configuration
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UiConfig {
    pub status: StatusStrings,
    pub reply: ReplyStrings,
    pub prompt: PromptStrings,
    pub menu: MenuStrings,
    pub settings: SettingsStrings,
    pub about: AboutStrings,
}

#[derive(Debug, Deserialize)]
pub struct StatusStrings {
    pub running_title: String,
    pub running: String,
    pub busy_title: String,
    pub busy: String,
    pub not_running_title: String,
    pub not_running: String,
    pub warning_title: String,
    pub error_title: String,
    pub failed_title: String,
    pub failed: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplyStrings {
    pub title: String,
    pub header: String,
}

#[derive(Debug, Deserialize)]
pub struct PromptStrings {
    pub one_off_title: String,
    pub one_off: String,
    pub clipboard_title: String,
    pub clipboard: String,
}

#[derive(Debug, Deserialize)]
pub struct MenuStrings {
    pub title: String,
    pub running: String,
    pub idle: String,
    pub backend: String,
    pub model: String,
    pub unknown_model: String,
    pub unknown_backend: String,
    pub entries: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SettingsStrings {
    pub no_backend: String,
    pub needs_key: String,
    pub title: String,
    pub location: String,
    pub hint: String,
    pub backend: String,
    pub model: String,
    pub key_set: String,
    pub key_missing: String,
    pub key_not_needed: String,
    pub models: String,
    pub models_no_key: String,
    pub models_bad_key: String,
    pub models_unavailable: String,
    pub key_prompt_title: String,
    pub key_prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct AboutStrings {
    pub title: String,
    pub text: String,
}

// ============================================================================
// Loading Functions
// ============================================================================

fn parse_yaml<T: for<'de> Deserialize<'de>>(name: &str, content: &str) -> T {
    serde_yaml::from_str(content).unwrap_or_else(|e| panic!("Failed to parse {}: {}", name, e))
}

/// Fill `{key}` placeholders in a template string.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| acc.replace(&format!("{{{}}}", key), value))
}

// ============================================================================
// Global Configuration (embedded at compile time)
// ============================================================================

pub static UI: LazyLock<UiConfig> = LazyLock::new(|| parse_yaml("ui.yaml", include_str!("../../../yamls/ui.yaml")));
