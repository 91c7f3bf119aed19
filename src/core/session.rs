//! Explicit application context: the active query, open replies and the
//! collaborators every bus handler needs. Constructed once in `main` and
//! passed to handlers by the event bus; nothing here is global.

use std::sync::Arc;

use lk_base::config::{UI, fill};
use lk_base::settings::{Settings, SettingsError, SettingsStore};
use thiserror::Error;

use super::bus::{BusSender, EventBus, EventName, Payload};
use super::query::{Query, QueryOutcome};
use super::replies::{ReplyRegistry, ReplyWindow};
use super::runner::Runner;
use crate::infra::clipboard::{Clipboard, ClipboardError};
use crate::infra::desktop::{Desktop, KeyState, MenuView, ModelList, PromptRequest, SettingsView, Status};
use crate::llms::{Backend, BackendId, BackendRegistry, LlmError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
}

type HandlerFn = fn(&mut Session, Payload) -> Result<(), SessionError>;

pub struct Session {
    settings: Arc<dyn SettingsStore>,
    backends: BackendRegistry,
    runner: Runner,
    query: Option<Arc<Query>>,
    replies: ReplyRegistry,
    desktop: Box<dyn Desktop>,
    clipboard: Box<dyn Clipboard>,
    quit: bool,
}

impl Session {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        backends: BackendRegistry,
        bus: BusSender,
        desktop: Box<dyn Desktop>,
        clipboard: Box<dyn Clipboard>,
    ) -> Self {
        Self {
            settings,
            backends,
            runner: Runner::new(bus),
            query: None,
            replies: ReplyRegistry::new(),
            desktop,
            clipboard,
            quit: false,
        }
    }

    /// Wire every event to its handler. Handler errors are shown once, then
    /// returned so the bus logs them.
    pub fn bind_handlers(bus: &mut EventBus<Session, SessionError>) {
        let handlers: [(EventName, HandlerFn); 16] = [
            (EventName::OneOff, Session::one_off),
            (EventName::Clipboard, Session::clipboard),
            (EventName::OneOffFinished, Session::query_finished),
            (EventName::ClipboardFinished, Session::query_finished),
            (EventName::Failed, Session::failed),
            (EventName::Peek, Session::peek),
            (EventName::Cancel, Session::cancel),
            (EventName::Menu, Session::menu),
            (EventName::Settings, Session::settings),
            (EventName::About, Session::about),
            (EventName::Quit, Session::quit),
            (EventName::CloseLast, Session::close_last),
            (EventName::ReplyClosed, Session::reply_closed),
            (EventName::CycleReplies, Session::cycle_replies),
            (EventName::ChangeBackend, Session::change_backend),
            (EventName::ChangeModel, Session::change_model),
        ];
        for (name, handler) in handlers {
            bus.bind(name, show_errors(handler));
        }
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn replies(&self) -> &ReplyRegistry {
        &self.replies
    }

    // ───────────────────────────────────────────────────────────────────
    // Queries
    // ───────────────────────────────────────────────────────────────────

    fn one_off(&mut self, _: Payload) -> Result<(), SessionError> {
        if !self.ensure_settings_ready()? || self.refuse_if_running() {
            return Ok(());
        }
        let (backend, model) = self.selection()?;
        let Some(prompt) = self.desktop.prompt(&PromptRequest::one_off(backend.name(), &model)) else {
            tracing::debug!("one-off prompt dismissed");
            return Ok(());
        };
        self.start_query(&backend, &model, &prompt, EventName::OneOffFinished)
    }

    fn clipboard(&mut self, _: Payload) -> Result<(), SessionError> {
        if !self.ensure_settings_ready()? || self.refuse_if_running() {
            return Ok(());
        }
        let (backend, model) = self.selection()?;
        let Some(instruction) = self.desktop.prompt(&PromptRequest::clipboard()) else {
            tracing::debug!("clipboard prompt dismissed");
            return Ok(());
        };
        let contents = self.clipboard.paste()?;
        let prompt = format!("{}\n\n{}", instruction, contents);
        self.start_query(&backend, &model, &prompt, EventName::ClipboardFinished)
    }

    fn refuse_if_running(&mut self) -> bool {
        let Some(query) = &self.query else {
            return false;
        };
        let status = Status::Running {
            backend: query.backend().to_string(),
            model: query.model().to_string(),
            bytes: query.byte_count(),
            duration: query.duration(),
        };
        self.desktop.notify(&status);
        true
    }

    fn start_query(
        &mut self,
        backend: &Backend,
        model: &str,
        prompt: &str,
        completion: EventName,
    ) -> Result<(), SessionError> {
        let stream = backend.query(model, prompt)?;
        let query = Arc::new(Query::new(backend.name(), model, stream));
        let worker = query.clone();
        let started = self.runner.start(
            move || {
                Ok(match worker.run()? {
                    QueryOutcome::Finished(text) => Payload::Text(text),
                    QueryOutcome::Cancelled => Payload::None,
                })
            },
            completion,
        );

        if started {
            tracing::info!(backend = backend.name(), model, "query started");
            self.query = Some(query);
        } else {
            // Only possible while a cancelled query is still winding down.
            self.desktop.notify(&Status::Busy);
        }
        Ok(())
    }

    fn query_finished(&mut self, payload: Payload) -> Result<(), SessionError> {
        if !matches!(payload, Payload::Text(_)) {
            tracing::debug!("cancelled query wound down");
            return Ok(());
        }
        if self.runner.is_running() {
            tracing::debug!("stale completion ignored");
            return Ok(());
        }
        let Some(query) = self.query.take_if(|q| q.is_finished()) else {
            return Ok(());
        };

        let text = query.reply()?;
        self.clipboard.copy(&text)?;
        let window = ReplyWindow::new(text, query.duration());
        self.desktop.show_reply(&window);
        self.replies.append(window);
        Ok(())
    }

    fn failed(&mut self, payload: Payload) -> Result<(), SessionError> {
        let message = match payload {
            Payload::Text(message) => message,
            other => format!("{:?}", other),
        };
        tracing::warn!(%message, "query failed");
        if !self.runner.is_running() {
            self.query = None;
        }
        self.desktop.notify(&Status::Failed(message));
        Ok(())
    }

    fn peek(&mut self, _: Payload) -> Result<(), SessionError> {
        let Some(query) = &self.query else {
            self.desktop.notify(&Status::NotRunning);
            return Ok(());
        };
        let (text, duration) = (query.peek(), query.duration());
        self.clipboard.copy(&text)?;
        let window = ReplyWindow::new(text, duration);
        self.desktop.show_reply(&window);
        self.replies.append(window);
        Ok(())
    }

    fn cancel(&mut self, _: Payload) -> Result<(), SessionError> {
        if let Some(query) = self.query.take() {
            tracing::info!(bytes = query.byte_count(), "cancelling query");
            query.cancel();
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────
    // Settings and menu
    // ───────────────────────────────────────────────────────────────────

    /// Warn and open settings when no backend is chosen or its key is missing.
    fn ensure_settings_ready(&mut self) -> Result<bool, SessionError> {
        let settings = self.settings.load()?;
        let Some(name) = settings.backend else {
            self.desktop.notify(&Status::Warning(UI.settings.no_backend.clone()));
            self.settings(Payload::None)?;
            return Ok(false);
        };

        let backend = self.backends.get(&name)?;
        if backend.needs_credentials() && !self.backends.credentials().has_key(backend.name()) {
            self.desktop.notify(&Status::Warning(fill(&UI.settings.needs_key, &[("backend", backend.name())])));
            self.settings(Payload::None)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Selected backend and its configured (or default) model.
    fn selection(&self) -> Result<(Arc<Backend>, String), SessionError> {
        let settings = self.settings.load()?;
        let name = settings.backend.as_deref().unwrap_or(BackendId::ALL[0].as_str());
        let backend = self.backends.get(name)?;
        let model = current_model(&settings, &backend)?;
        Ok((backend, model))
    }

    fn menu(&mut self, _: Payload) -> Result<(), SessionError> {
        let settings = self.settings.load()?;
        let model = match settings.backend.as_deref() {
            Some(name) => {
                let backend = self.backends.get(name)?;
                current_model(&settings, &backend)
                    .inspect_err(|e| tracing::warn!(error = %e, "no model to show"))
                    .ok()
            }
            None => None,
        };
        let view = MenuView { running: self.query.is_some(), backend: settings.backend.clone(), model };
        self.desktop.show_menu(&view);
        Ok(())
    }

    fn settings(&mut self, _: Payload) -> Result<(), SessionError> {
        let mut settings = self.settings.load()?;
        let name = match &settings.backend {
            Some(name) => name.clone(),
            None => {
                let name = BackendId::ALL[0].to_string();
                settings.backend = Some(name.clone());
                self.settings.save(&settings)?;
                name
            }
        };
        let backend = self.backends.get(&name)?;
        self.show_settings_view(&settings, &backend);

        if backend.needs_credentials()
            && let Some(key) = self.desktop.prompt(&PromptRequest::api_key(&name))
        {
            settings.backend_keys.insert(name.clone(), key);
            self.settings.save(&settings)?;
            tracing::info!(backend = %name, "API key updated");
            backend.reset_models();
            self.show_settings_view(&settings, &backend);
        }
        Ok(())
    }

    /// Render settings for `backend`. Listing its models is what tells a
    /// missing or rejected key apart from a working one.
    fn show_settings_view(&mut self, settings: &Settings, backend: &Backend) {
        let key = if !backend.needs_credentials() {
            KeyState::NotNeeded
        } else if self.backends.credentials().has_key(backend.name()) {
            KeyState::Configured
        } else {
            KeyState::Missing
        };
        let models = ModelList::from(backend.models());
        if let ModelList::Unavailable(error) = &models {
            tracing::warn!(backend = backend.name(), %error, "could not list models");
        }

        let view = SettingsView {
            location: self.settings.location(),
            backend: backend.name().to_string(),
            model: current_model(settings, backend).ok(),
            key,
            models,
            backends: BackendId::ALL.iter().map(|b| b.as_str()).collect(),
        };
        self.desktop.show_settings(&view);
    }

    fn change_backend(&mut self, _: Payload) -> Result<(), SessionError> {
        let mut settings = self.settings.load()?;
        let next = BackendRegistry::next(settings.backend.as_deref())?;
        settings.backend = Some(next.to_string());
        self.settings.save(&settings)?;
        tracing::info!(backend = %next, "backend changed");
        self.menu(Payload::None)
    }

    fn change_model(&mut self, _: Payload) -> Result<(), SessionError> {
        let mut settings = self.settings.load()?;
        let Some(name) = settings.backend.clone() else {
            self.desktop.notify(&Status::Warning(UI.settings.no_backend.clone()));
            return Ok(());
        };
        let backend = self.backends.get(&name)?;
        let current = current_model(&settings, &backend).ok();
        let next = backend.next_model(current.as_deref())?;
        tracing::info!(backend = %name, model = %next, "model changed");
        settings.backend_models.insert(name, next);
        self.settings.save(&settings)?;
        self.menu(Payload::None)
    }

    fn about(&mut self, _: Payload) -> Result<(), SessionError> {
        self.desktop.show_about();
        Ok(())
    }

    fn quit(&mut self, _: Payload) -> Result<(), SessionError> {
        tracing::info!("quitting");
        if let Some(query) = self.query.take() {
            query.cancel();
        }
        self.quit = true;
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────
    // Reply windows
    // ───────────────────────────────────────────────────────────────────

    fn close_last(&mut self, _: Payload) -> Result<(), SessionError> {
        if let Some(window) = self.replies.close_last() {
            self.desktop.close_reply(&window.id);
        }
        Ok(())
    }

    fn reply_closed(&mut self, payload: Payload) -> Result<(), SessionError> {
        let Payload::Reply { id } = payload else {
            tracing::warn!(?payload, "reply_closed without an id");
            return Ok(());
        };
        if let Some(window) = self.replies.close_by_id(&id) {
            self.desktop.close_reply(&window.id);
        }
        Ok(())
    }

    fn cycle_replies(&mut self, _: Payload) -> Result<(), SessionError> {
        if let Some(window) = self.replies.cycle() {
            self.desktop.raise_reply(window);
        }
        Ok(())
    }
}

/// Configured model for the backend, else its default.
fn current_model(settings: &Settings, backend: &Backend) -> Result<String, LlmError> {
    match settings.model_for(backend.name()) {
        Some(model) => Ok(model.to_string()),
        None => backend.default_model(),
    }
}

/// Report a handler error to the user, then pass it on for logging.
fn show_errors(handler: HandlerFn) -> impl FnMut(&mut Session, Payload) -> Result<(), SessionError> {
    move |session: &mut Session, payload: Payload| {
        handler(session, payload).inspect_err(|e| session.desktop.notify(&Status::Error(e.to_string())))
    }
}
