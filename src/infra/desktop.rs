//! Front-end collaborator: everything the session shows to or asks of the user.

use std::time::Duration;

use lk_base::config::{UI, fill};

use crate::core::replies::ReplyWindow;
use crate::llms::LlmError;

/// Short notices. Each maps to one titled message.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// A query is in flight; a new one was refused
    Running { backend: String, model: String, bytes: usize, duration: Duration },
    /// The worker is still winding down a cancelled query
    Busy,
    NotRunning,
    Warning(String),
    Failed(String),
    Error(String),
}

impl Status {
    pub fn title(&self) -> &str {
        match self {
            Status::Running { .. } => &UI.status.running_title,
            Status::Busy => &UI.status.busy_title,
            Status::NotRunning => &UI.status.not_running_title,
            Status::Warning(_) => &UI.status.warning_title,
            Status::Failed(_) => &UI.status.failed_title,
            Status::Error(_) => &UI.status.error_title,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Status::Running { backend, model, bytes, duration } => {
                let (bytes, secs) = (bytes.to_string(), format!("{:.1}", duration.as_secs_f64()));
                fill(
                    &UI.status.running,
                    &[
                        ("backend", backend.as_str()),
                        ("model", model.as_str()),
                        ("bytes", bytes.as_str()),
                        ("duration", secs.as_str()),
                    ],
                )
            }
            Status::Busy => UI.status.busy.clone(),
            Status::NotRunning => UI.status.not_running.clone(),
            Status::Warning(msg) | Status::Error(msg) => msg.clone(),
            Status::Failed(msg) => fill(&UI.status.failed, &[("message", msg.as_str())]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub title: String,
    pub message: String,
}

impl PromptRequest {
    pub fn one_off(backend: &str, model: &str) -> Self {
        Self {
            title: UI.prompt.one_off_title.clone(),
            message: fill(&UI.prompt.one_off, &[("model", model), ("backend", backend)]),
        }
    }

    pub fn clipboard() -> Self {
        Self { title: UI.prompt.clipboard_title.clone(), message: UI.prompt.clipboard.clone() }
    }

    pub fn api_key(backend: &str) -> Self {
        Self {
            title: fill(&UI.settings.key_prompt_title, &[("backend", backend)]),
            message: fill(&UI.settings.key_prompt, &[("backend", backend)]),
        }
    }
}

/// Snapshot rendered by the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuView {
    pub running: bool,
    pub backend: Option<String>,
    /// `None` when the model list could not be fetched
    pub model: Option<String>,
}

impl MenuView {
    pub fn lines(&self) -> Vec<String> {
        let state = if self.running { &UI.menu.running } else { &UI.menu.idle };
        let backend = self.backend.as_deref().unwrap_or(UI.menu.unknown_backend.as_str());
        let model = self.model.as_deref().unwrap_or(UI.menu.unknown_model.as_str());
        let mut lines = vec![
            state.clone(),
            fill(&UI.menu.backend, &[("backend", backend)]),
            fill(&UI.menu.model, &[("model", model)]),
            String::new(),
        ];
        lines.extend(UI.menu.entries.iter().cloned());
        lines
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    NotNeeded,
    Configured,
    Missing,
}

/// What asking the backend for its models told us about the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelList {
    Available(Vec<String>),
    NoKey,
    KeyRejected,
    Unavailable(String),
}

impl From<Result<Vec<String>, LlmError>> for ModelList {
    fn from(listing: Result<Vec<String>, LlmError>) -> Self {
        match listing {
            Ok(models) => ModelList::Available(models),
            Err(LlmError::NoCredentials { .. }) => ModelList::NoKey,
            Err(LlmError::AuthenticationFailed { .. }) => ModelList::KeyRejected,
            Err(e) => ModelList::Unavailable(e.to_string()),
        }
    }
}

impl ModelList {
    fn line(&self) -> String {
        match self {
            ModelList::Available(models) => fill(&UI.settings.models, &[("models", models.join(", ").as_str())]),
            ModelList::NoKey => UI.settings.models_no_key.clone(),
            ModelList::KeyRejected => UI.settings.models_bad_key.clone(),
            ModelList::Unavailable(error) => fill(&UI.settings.models_unavailable, &[("error", error.as_str())]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsView {
    pub location: String,
    pub backend: String,
    /// Configured model, else the backend default
    pub model: Option<String>,
    pub key: KeyState,
    pub models: ModelList,
    pub backends: Vec<&'static str>,
}

impl SettingsView {
    pub fn lines(&self) -> Vec<String> {
        let model = self.model.as_deref().unwrap_or(UI.menu.unknown_model.as_str());
        let key = match self.key {
            KeyState::NotNeeded => &UI.settings.key_not_needed,
            KeyState::Configured => &UI.settings.key_set,
            KeyState::Missing => &UI.settings.key_missing,
        };
        vec![
            fill(&UI.settings.location, &[("path", self.location.as_str())]),
            fill(&UI.settings.backend, &[("backend", self.backend.as_str())]),
            fill(&UI.settings.model, &[("model", model)]),
            key.clone(),
            self.models.line(),
            String::new(),
            fill(&UI.settings.hint, &[("backends", self.backends.join(", ").as_str())]),
        ]
    }
}

pub trait Desktop {
    /// Ask for a line of text; `None` means the user backed out.
    fn prompt(&mut self, request: &PromptRequest) -> Option<String>;
    fn notify(&mut self, status: &Status);
    fn show_reply(&mut self, window: &ReplyWindow);
    /// Bring an already-open reply to the front.
    fn raise_reply(&mut self, window: &ReplyWindow);
    fn close_reply(&mut self, id: &str);
    fn show_menu(&mut self, menu: &MenuView);
    fn show_settings(&mut self, view: &SettingsView);
    fn show_about(&mut self);
}
