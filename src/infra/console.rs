//! Line-oriented terminal front-end.
//!
//! A single reader thread owns stdin. Lines starting with `:` become bus
//! events; everything else is forwarded to whichever prompt is waiting.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use crossterm::style::Stylize;
use lk_base::config::UI;
use lk_base::constants::COMMAND_PREFIX;

use super::desktop::{Desktop, MenuView, PromptRequest, SettingsView, Status};
use crate::core::bus::{BusSender, Event, EventName, Payload, UnknownEvent};
use crate::core::replies::ReplyWindow;

/// Parse a command line (without the leading `:`) into an event.
pub fn parse_command(command: &str) -> Result<Event, UnknownEvent> {
    let command = command.trim();
    let (head, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let rest = rest.trim();

    let name = match head {
        "o" => EventName::OneOff,
        "c" => EventName::Clipboard,
        "m" => EventName::Menu,
        "x" => EventName::Cancel,
        "p" => EventName::Peek,
        "w" => EventName::CycleReplies,
        "d" => EventName::CloseLast,
        "b" => EventName::ChangeBackend,
        "n" => EventName::ChangeModel,
        "s" => EventName::Settings,
        "a" => EventName::About,
        "q" => EventName::Quit,
        "close" if !rest.is_empty() => {
            return Ok(Event::new(EventName::ReplyClosed, Payload::Reply { id: rest.to_string() }));
        }
        other => other.parse()?,
    };

    let payload = match name {
        EventName::ReplyClosed if !rest.is_empty() => Payload::Reply { id: rest.to_string() },
        _ if !rest.is_empty() => Payload::Text(rest.to_string()),
        _ => Payload::None,
    };
    Ok(Event::new(name, payload))
}

/// Route one input line. Returns false once nobody is listening any more.
fn route_line(line: &str, bus: &BusSender, prompts: &Sender<String>) -> bool {
    match line.strip_prefix(COMMAND_PREFIX) {
        Some(command) => match parse_command(command) {
            Ok(event) => bus.send_event(event),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring console command");
                true
            }
        },
        None => prompts.send(line.to_string()).is_ok(),
    }
}

/// Spawn the stdin reader. End of input sends `quit`.
pub fn spawn_input_reader(bus: BusSender) -> io::Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new().name("stdin-reader".into()).spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "stdin read failed");
                    break;
                }
            };
            if !route_line(line.trim_end(), &bus, &tx) {
                return;
            }
        }
        tracing::info!("input closed");
        bus.send(EventName::Quit, Payload::None);
    })?;
    Ok(rx)
}

/// Prints to `out` and reads prompt answers forwarded by the input reader.
pub struct ConsoleDesktop<W: Write> {
    out: W,
    answers: Receiver<String>,
}

impl ConsoleDesktop<io::Stdout> {
    pub fn stdout(answers: Receiver<String>) -> Self {
        Self::new(io::stdout(), answers)
    }
}

impl<W: Write> ConsoleDesktop<W> {
    pub fn new(out: W, answers: Receiver<String>) -> Self {
        Self { out, answers }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_block(&mut self, title: &str, lines: &[String], alert: bool) -> io::Result<()> {
        writeln!(self.out)?;
        if alert {
            writeln!(self.out, "{}", title.bold().red())?;
        } else {
            writeln!(self.out, "{}", title.bold().cyan())?;
        }
        for line in lines {
            writeln!(self.out, "  {}", line)?;
        }
        self.out.flush()
    }

    fn block(&mut self, title: &str, lines: &[String]) {
        if let Err(e) = self.write_block(title, lines, false) {
            tracing::error!(error = %e, "console write failed");
        }
    }

    fn reply_block(&mut self, window: &ReplyWindow) {
        let title = format!("{} [{}] {}", UI.reply.title, window.id, window.created_at.format("%H:%M:%S"));
        let lines: Vec<String> = window.body().lines().map(str::to_string).collect();
        self.block(&title, &lines);
    }
}

impl<W: Write> Desktop for ConsoleDesktop<W> {
    fn prompt(&mut self, request: &PromptRequest) -> Option<String> {
        // Drop anything typed before the prompt appeared.
        while self.answers.try_recv().is_ok() {}

        let lines: Vec<String> = request.message.lines().map(str::to_string).collect();
        self.block(&request.title, &lines);
        if let Err(e) = write!(self.out, "{} ", ">".green()).and_then(|_| self.out.flush()) {
            tracing::error!(error = %e, "console write failed");
        }

        let answer = self.answers.recv().ok()?;
        let answer = answer.trim();
        if answer.is_empty() { None } else { Some(answer.to_string()) }
    }

    fn notify(&mut self, status: &Status) {
        let lines: Vec<String> = status.message().lines().map(str::to_string).collect();
        let alert = matches!(status, Status::Error(_) | Status::Failed(_));
        if let Err(e) = self.write_block(status.title(), &lines, alert) {
            tracing::error!(error = %e, "console write failed");
        }
    }

    fn show_reply(&mut self, window: &ReplyWindow) {
        self.reply_block(window);
    }

    fn raise_reply(&mut self, window: &ReplyWindow) {
        self.reply_block(window);
    }

    fn close_reply(&mut self, id: &str) {
        if let Err(e) = writeln!(self.out, "{}", format!("closed reply {}", id).dark_grey()) {
            tracing::error!(error = %e, "console write failed");
        }
    }

    fn show_menu(&mut self, menu: &MenuView) {
        self.block(&UI.menu.title, &menu.lines());
    }

    fn show_settings(&mut self, view: &SettingsView) {
        self.block(&UI.settings.title, &view.lines());
    }

    fn show_about(&mut self) {
        let lines: Vec<String> = UI.about.text.lines().map(str::to_string).collect();
        self.block(&UI.about.title, &lines);
    }
}
