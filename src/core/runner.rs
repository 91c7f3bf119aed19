use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use super::bus::{BusSender, EventName, Payload};
use crate::llms::LlmError;

/// Runs at most one background job at a time and reports back over the bus.
pub struct Runner {
    active: Arc<AtomicBool>,
    bus: BusSender,
}

impl Runner {
    pub fn new(bus: BusSender) -> Self {
        Self { active: Arc::new(AtomicBool::new(false)), bus }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Spawn `work` on the worker thread unless one is already active.
    ///
    /// On return the worker publishes `completion` with the work's payload, or
    /// `failed` with a description if it errored or panicked. The active
    /// marker is cleared before either event is sent.
    pub fn start<F>(&self, work: F, completion: EventName) -> bool
    where
        F: FnOnce() -> Result<Payload, LlmError> + Send + 'static,
    {
        if self.active.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            tracing::debug!(event = %completion, "runner busy, start rejected");
            return false;
        }

        let active = self.active.clone();
        let bus = self.bus.clone();
        let spawned = thread::Builder::new().name("query-worker".into()).spawn(move || {
            let (name, payload) = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(Ok(payload)) => (completion, payload),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "worker failed");
                    (EventName::Failed, Payload::Text(e.to_string()))
                }
                Err(panic) => {
                    let msg = format!("worker panicked: {}", panic_message(panic.as_ref()));
                    tracing::error!("{}", msg);
                    (EventName::Failed, Payload::Text(msg))
                }
            };
            active.store(false, Ordering::Release);
            bus.send(name, payload);
        });

        match spawned {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn worker thread");
                self.active.store(false, Ordering::Release);
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
