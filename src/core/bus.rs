//! Named-event bus: send from any thread, handle on the control thread.
//!
//! `send` only enqueues onto an mpsc channel. The control loop owns the
//! receiving end and the handler table, so handlers always run on that one
//! thread, one at a time, in per-sender send order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, Sender};

/// Closed set of event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    OneOff,
    Clipboard,
    Menu,
    Cancel,
    Peek,
    Settings,
    About,
    Quit,
    OneOffFinished,
    ClipboardFinished,
    Failed,
    CloseLast,
    ReplyClosed,
    CycleReplies,
    ChangeBackend,
    ChangeModel,
}

impl EventName {
    pub const ALL: [EventName; 16] = [
        EventName::OneOff,
        EventName::Clipboard,
        EventName::Menu,
        EventName::Cancel,
        EventName::Peek,
        EventName::Settings,
        EventName::About,
        EventName::Quit,
        EventName::OneOffFinished,
        EventName::ClipboardFinished,
        EventName::Failed,
        EventName::CloseLast,
        EventName::ReplyClosed,
        EventName::CycleReplies,
        EventName::ChangeBackend,
        EventName::ChangeModel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::OneOff => "one_off",
            EventName::Clipboard => "clipboard",
            EventName::Menu => "menu",
            EventName::Cancel => "cancel",
            EventName::Peek => "peek",
            EventName::Settings => "settings",
            EventName::About => "about",
            EventName::Quit => "quit",
            EventName::OneOffFinished => "one_off_finished",
            EventName::ClipboardFinished => "clipboard_finished",
            EventName::Failed => "failed",
            EventName::CloseLast => "close_last",
            EventName::ReplyClosed => "reply_closed",
            EventName::CycleReplies => "cycle_replies",
            EventName::ChangeBackend => "change_backend",
            EventName::ChangeModel => "change_model",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEvent(pub String);

impl fmt::Display for UnknownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event: {}", self.0)
    }
}

impl std::error::Error for UnknownEvent {}

impl FromStr for EventName {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|e| e.as_str() == s).ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

/// Optional event data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Payload {
    #[default]
    None,
    Text(String),
    Reply { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: EventName,
    pub payload: Payload,
}

impl Event {
    pub fn new(name: EventName, payload: Payload) -> Self {
        Self { name, payload }
    }
}

/// Sending half; cheap to clone and safe to move to any thread.
#[derive(Clone)]
pub struct BusSender {
    tx: Sender<Event>,
}

impl BusSender {
    /// Enqueue an event. Returns false once the control loop is gone.
    pub fn send(&self, name: EventName, payload: Payload) -> bool {
        self.send_event(Event::new(name, payload))
    }

    pub fn send_event(&self, event: Event) -> bool {
        let name = event.name;
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(event = %name, "event bus closed, dropping event");
                false
            }
        }
    }
}

pub type Handler<C, E> = Box<dyn FnMut(&mut C, Payload) -> Result<(), E>>;

/// Receiving half plus handler table; lives on the control thread.
pub struct EventBus<C, E> {
    sender: BusSender,
    rx: Receiver<Event>,
    handlers: HashMap<EventName, Handler<C, E>>,
}

impl<C, E: fmt::Display> EventBus<C, E> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { sender: BusSender { tx }, rx, handlers: HashMap::new() }
    }

    pub fn sender(&self) -> BusSender {
        self.sender.clone()
    }

    pub fn send(&self, name: EventName, payload: Payload) -> bool {
        self.sender.send(name, payload)
    }

    /// Register the handler for `name`; a later bind replaces an earlier one.
    pub fn bind<F>(&mut self, name: EventName, handler: F)
    where
        F: FnMut(&mut C, Payload) -> Result<(), E> + 'static,
    {
        if self.handlers.insert(name, Box::new(handler)).is_some() {
            tracing::debug!(event = %name, "handler replaced");
        }
    }

    fn dispatch(&mut self, ctx: &mut C, event: Event) {
        let Some(handler) = self.handlers.get_mut(&event.name) else {
            tracing::warn!(event = %event.name, "no handler bound, dropping event");
            return;
        };
        tracing::debug!(event = %event.name, "dispatching");
        if let Err(e) = handler(ctx, event.payload) {
            tracing::error!(event = %event.name, error = %e, "handler failed");
        }
    }

    /// Block for the next event and dispatch it.
    pub fn dispatch_next(&mut self, ctx: &mut C) {
        // The bus holds its own sender, so recv only fails if that is gone too.
        if let Ok(event) = self.rx.recv() {
            self.dispatch(ctx, event);
        }
    }

    /// Dispatch everything already queued without blocking. Returns the count.
    pub fn dispatch_pending(&mut self, ctx: &mut C) -> usize {
        let mut count = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.dispatch(ctx, event);
            count += 1;
        }
        count
    }

    /// Control loop: dispatch until `done` holds after a handler ran.
    pub fn run(&mut self, ctx: &mut C, done: impl Fn(&C) -> bool) {
        while !done(ctx) {
            self.dispatch_next(ctx);
        }
    }
}

impl<C, E: fmt::Display> Default for EventBus<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[derive(Default)]
    struct Log {
        seen: Vec<(EventName, Payload)>,
        threads: Vec<thread::ThreadId>,
        quit: bool,
    }

    fn recording_bus(names: &[EventName]) -> EventBus<Log, String> {
        let mut bus = EventBus::new();
        for &name in names {
            bus.bind(name, move |log: &mut Log, payload| {
                log.seen.push((name, payload));
                log.threads.push(thread::current().id());
                Ok(())
            });
        }
        bus
    }

    #[test]
    fn names_round_trip() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>().unwrap(), name);
        }
        assert!("bogus".parse::<EventName>().is_err());
    }

    #[test]
    fn handlers_run_on_dispatching_thread() {
        let mut bus = recording_bus(&[EventName::OneOffFinished]);
        let sender = bus.sender();
        thread::spawn(move || {
            sender.send(EventName::OneOffFinished, Payload::Text("done".into()));
        })
        .join()
        .unwrap();

        let mut log = Log::default();
        assert_eq!(bus.dispatch_pending(&mut log), 1);
        assert_eq!(log.seen, vec![(EventName::OneOffFinished, Payload::Text("done".into()))]);
        assert_eq!(log.threads, vec![thread::current().id()]);
    }

    #[test]
    fn per_thread_order_preserved() {
        let mut bus = recording_bus(&[EventName::Failed]);
        let sender = bus.sender();
        let producer = thread::spawn(move || {
            for i in 0..200 {
                sender.send(EventName::Failed, Payload::Text(i.to_string()));
            }
        });
        producer.join().unwrap();

        let mut log = Log::default();
        bus.dispatch_pending(&mut log);
        let received: Vec<String> = log
            .seen
            .into_iter()
            .map(|(_, p)| match p {
                Payload::Text(t) => t,
                other => panic!("unexpected payload {:?}", other),
            })
            .collect();
        let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn concurrent_senders_each_delivered_once() {
        let mut bus = recording_bus(&[EventName::Peek, EventName::Cancel]);
        let handles: Vec<_> = [EventName::Peek, EventName::Cancel]
            .into_iter()
            .map(|name| {
                let sender = bus.sender();
                thread::spawn(move || {
                    for _ in 0..50 {
                        sender.send(name, Payload::None);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut log = Log::default();
        assert_eq!(bus.dispatch_pending(&mut log), 100);
        assert_eq!(log.seen.iter().filter(|(n, _)| *n == EventName::Peek).count(), 50);
        assert_eq!(log.seen.iter().filter(|(n, _)| *n == EventName::Cancel).count(), 50);
    }

    #[test]
    fn last_bind_wins() {
        let mut bus: EventBus<Vec<&'static str>, String> = EventBus::new();
        bus.bind(EventName::Menu, |v, _| {
            v.push("first");
            Ok(())
        });
        bus.bind(EventName::Menu, |v, _| {
            v.push("second");
            Ok(())
        });
        bus.send(EventName::Menu, Payload::None);

        let mut seen = Vec::new();
        bus.dispatch_pending(&mut seen);
        assert_eq!(seen, vec!["second"]);
    }

    #[test]
    fn unbound_and_failing_handlers_do_not_stop_dispatch() {
        let mut bus = recording_bus(&[EventName::Peek]);
        bus.bind(EventName::Cancel, |_, _| Err("boom".to_string()));
        bus.send(EventName::About, Payload::None);
        bus.send(EventName::Cancel, Payload::None);
        bus.send(EventName::Peek, Payload::None);

        let mut log = Log::default();
        assert_eq!(bus.dispatch_pending(&mut log), 3);
        assert_eq!(log.seen, vec![(EventName::Peek, Payload::None)]);
    }

    #[test]
    fn run_stops_when_context_says_done() {
        let mut bus: EventBus<Log, String> = EventBus::new();
        bus.bind(EventName::Quit, |log, _| {
            log.quit = true;
            Ok(())
        });
        bus.bind(EventName::Peek, |log, p| {
            log.seen.push((EventName::Peek, p));
            Ok(())
        });
        bus.send(EventName::Peek, Payload::None);
        bus.send(EventName::Quit, Payload::None);
        bus.send(EventName::Peek, Payload::None);

        let mut log = Log::default();
        bus.run(&mut log, |l| l.quit);
        assert_eq!(log.seen.len(), 1);
        assert_eq!(bus.dispatch_pending(&mut log), 1);
    }
}
