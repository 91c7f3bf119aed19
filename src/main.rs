use std::error::Error;
use std::sync::Arc;

use lk_base::credentials::SettingsCredentials;
use lk_base::settings::{FileSettings, SettingsStore};
use llmkey::core::{EventBus, Session, SessionError};
use llmkey::infra::Desktop;
use llmkey::infra::clipboard::open_clipboard;
use llmkey::infra::console::{ConsoleDesktop, spawn_input_reader};
use llmkey::llms::BackendRegistry;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info";

/// `RUST_LOG` directives when set and valid, otherwise `info`.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn main() -> Result<(), Box<dyn Error>> {
    // Logs go to stderr so they never interleave with prompts on stdout.
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    // Panic hook: record the panic with a backtrace before the default report.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        tracing::error!("{}\n\n{}", info, backtrace);
        default_hook(info);
    }));

    tracing::info!("starting llmkey");

    let store = Arc::new(FileSettings::default_location()?);
    tracing::info!(path = %store.path().display(), "using settings file");

    let mut bus: EventBus<Session, SessionError> = EventBus::new();
    let answers = spawn_input_reader(bus.sender())?;
    let mut desktop = ConsoleDesktop::stdout(answers);

    let mut settings = store.load()?;
    if settings.first_run {
        desktop.show_about();
        settings.first_run = false;
        store.save(&settings)?;
    }

    let credentials = Arc::new(SettingsCredentials::new(store.clone()));
    let backends = BackendRegistry::new(credentials);
    let mut session = Session::new(store, backends, bus.sender(), Box::new(desktop), open_clipboard());
    Session::bind_handlers(&mut bus);

    bus.run(&mut session, Session::should_quit);
    tracing::info!("bye");
    Ok(())
}
