//! One user-initiated request and its accumulated answer.
//!
//! `run()` drives the stream on the worker thread while the control thread
//! reads progress through `peek`, `byte_count` and `duration`. Progress sits
//! behind a mutex; the cancel flag is a shared atomic so it can be flipped
//! without touching that lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::llms::{LlmError, ResponseStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryPhase {
    #[default]
    Created,
    Running,
    Finished,
    Cancelled,
    /// Stream reported an error
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Finished(String),
    Cancelled,
}

/// Shared cancellation flag. Cancelling is idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct Progress {
    phase: QueryPhase,
    buffer: Vec<String>,
    bytes: usize,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

pub struct Query {
    backend: String,
    model: String,
    stream: Mutex<Option<Box<dyn ResponseStream>>>,
    progress: Mutex<Progress>,
    cancel: CancelHandle,
}

impl Query {
    pub fn new(backend: &str, model: &str, stream: Box<dyn ResponseStream>) -> Self {
        Self::with_cancel_handle(backend, model, stream, CancelHandle::default())
    }

    /// Build around an existing cancel flag, e.g. one already handed to the stream's owner.
    pub fn with_cancel_handle(
        backend: &str,
        model: &str,
        stream: Box<dyn ResponseStream>,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            backend: backend.to_string(),
            model: model.to_string(),
            stream: Mutex::new(Some(stream)),
            progress: Mutex::new(Progress::default()),
            cancel,
        }
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn settle(&self, phase: QueryPhase) {
        let mut progress = self.progress();
        progress.phase = phase;
        progress.finished_at = Some(Instant::now());
    }

    /// Pull fragments until the stream ends or cancellation is observed.
    ///
    /// Blocking; meant for the worker thread. The cancel flag is checked after
    /// each fragment is buffered, so at most one more fragment is read after
    /// `cancel()`.
    pub fn run(&self) -> Result<QueryOutcome, LlmError> {
        let mut stream = self.stream.lock().unwrap_or_else(|e| e.into_inner()).take().ok_or(LlmError::StreamConsumed)?;

        {
            let mut progress = self.progress();
            progress.phase = QueryPhase::Running;
            progress.started_at = Some(Instant::now());
        }
        tracing::info!(backend = %self.backend, model = %self.model, "query running");

        if self.cancel.is_cancelled() {
            stream.close();
            self.settle(QueryPhase::Cancelled);
            return Ok(QueryOutcome::Cancelled);
        }

        while let Some(fragment) = stream.next() {
            let fragment = match fragment {
                Ok(f) => f,
                Err(e) => {
                    stream.close();
                    self.settle(QueryPhase::Failed);
                    return Err(e);
                }
            };

            {
                let mut progress = self.progress();
                progress.bytes += fragment.len();
                progress.buffer.push(fragment);
            }

            if self.cancel.is_cancelled() {
                stream.close();
                self.settle(QueryPhase::Cancelled);
                tracing::info!(bytes = self.byte_count(), "query cancelled");
                return Ok(QueryOutcome::Cancelled);
            }
        }

        let reply = {
            let mut progress = self.progress();
            progress.phase = QueryPhase::Finished;
            progress.finished_at = Some(Instant::now());
            progress.buffer.concat()
        };
        tracing::info!(bytes = reply.len(), duration = ?self.duration(), "query finished");
        Ok(QueryOutcome::Finished(reply))
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn phase(&self) -> QueryPhase {
        self.progress().phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase() == QueryPhase::Finished
    }

    /// Time since start, frozen once the run ends. Zero before `run()`.
    pub fn duration(&self) -> Duration {
        let progress = self.progress();
        match progress.started_at {
            None => Duration::ZERO,
            Some(start) => progress.finished_at.unwrap_or_else(Instant::now).saturating_duration_since(start),
        }
    }

    /// Bytes buffered so far.
    pub fn byte_count(&self) -> usize {
        self.progress().bytes
    }

    /// Everything buffered so far.
    pub fn peek(&self) -> String {
        self.progress().buffer.concat()
    }

    /// Full answer; `NotFinished` until the stream drained normally.
    pub fn reply(&self) -> Result<String, LlmError> {
        let progress = self.progress();
        if progress.phase != QueryPhase::Finished {
            return Err(LlmError::NotFinished);
        }
        Ok(progress.buffer.concat())
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;

    use super::*;
    use crate::llms::ollama::OllamaBackend;
    use crate::llms::openai_compat::OpenAiCompatBackend;
    use crate::llms::{Backend, BackendId};

    /// Scripted stream for tests: fixed fragments, counts `close()` calls,
    /// optionally fires a cancel handle when a given fragment is yielded.
    pub(crate) struct FakeStream {
        fragments: std::vec::IntoIter<Result<String, LlmError>>,
        pub closes: Arc<AtomicUsize>,
        cancel_after: Option<(usize, CancelHandle)>,
        yielded: usize,
        closed: bool,
    }

    impl FakeStream {
        pub(crate) fn new(fragments: &[&str]) -> Self {
            Self::from_results(fragments.iter().map(|f| Ok(f.to_string())).collect())
        }

        pub(crate) fn from_results(fragments: Vec<Result<String, LlmError>>) -> Self {
            Self {
                fragments: fragments.into_iter(),
                closes: Arc::new(AtomicUsize::new(0)),
                cancel_after: None,
                yielded: 0,
                closed: false,
            }
        }

        pub(crate) fn cancel_after(mut self, count: usize, handle: CancelHandle) -> Self {
            self.cancel_after = Some((count, handle));
            self
        }
    }

    impl Iterator for FakeStream {
        type Item = Result<String, LlmError>;

        fn next(&mut self) -> Option<Self::Item> {
            if self.closed {
                return None;
            }
            let item = self.fragments.next()?;
            self.yielded += 1;
            if let Some((count, handle)) = &self.cancel_after
                && *count == self.yielded
            {
                handle.cancel();
            }
            Some(item)
        }
    }

    impl ResponseStream for FakeStream {
        fn close(&mut self) {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Stream fed fragment-by-fragment from a channel.
    struct ChannelStream(mpsc::Receiver<String>);

    impl Iterator for ChannelStream {
        type Item = Result<String, LlmError>;

        fn next(&mut self) -> Option<Self::Item> {
            self.0.recv().ok().map(Ok)
        }
    }

    impl ResponseStream for ChannelStream {
        fn close(&mut self) {}
    }

    fn query(stream: impl ResponseStream + 'static) -> Query {
        Query::new("ollama", "llama3", Box::new(stream))
    }

    #[test]
    fn reply_is_concatenation_in_order() {
        let q = query(FakeStream::new(&["The ", "quick ", "fox"]));
        assert_eq!(q.phase(), QueryPhase::Created);
        assert_eq!(q.run().unwrap(), QueryOutcome::Finished("The quick fox".into()));
        assert!(q.is_finished());
        assert_eq!(q.reply().unwrap(), "The quick fox");
        assert_eq!(q.peek(), "The quick fox");
        assert_eq!(q.byte_count(), 13);
    }

    #[test]
    fn peek_tracks_each_prefix_mid_stream() {
        let (tx, rx) = mpsc::channel();
        let q = Arc::new(query(ChannelStream(rx)));
        let worker = q.clone();
        let handle = thread::spawn(move || worker.run());

        let fragments = ["a", "bc", "def"];
        let mut expected = String::new();
        for f in fragments {
            tx.send(f.to_string()).unwrap();
            expected.push_str(f);
            while q.peek() != expected {
                thread::yield_now();
            }
            assert_eq!(q.byte_count(), expected.len());
            assert!(matches!(q.reply(), Err(LlmError::NotFinished)));
        }
        drop(tx);

        assert_eq!(handle.join().unwrap().unwrap(), QueryOutcome::Finished("abcdef".into()));
        assert_eq!(q.reply().unwrap(), "abcdef");
    }

    #[test]
    fn cancel_observed_after_current_fragment() {
        let handle = CancelHandle::default();
        let stream = FakeStream::new(&["a", "b", "c"]).cancel_after(1, handle.clone());
        let closes = stream.closes.clone();
        let q = Query::with_cancel_handle("ollama", "llama3", Box::new(stream), handle);

        assert_eq!(q.run().unwrap(), QueryOutcome::Cancelled);
        assert!(!q.is_finished());
        assert!(q.is_cancelled());
        assert_eq!(q.phase(), QueryPhase::Cancelled);
        assert_eq!(q.peek(), "a");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(matches!(q.reply(), Err(LlmError::NotFinished)));
    }

    #[test]
    fn cancel_before_run_reads_nothing() {
        let stream = FakeStream::new(&["a", "b"]);
        let closes = stream.closes.clone();
        let q = query(stream);
        q.cancel();
        q.cancel();

        assert_eq!(q.run().unwrap(), QueryOutcome::Cancelled);
        assert_eq!(q.peek(), "");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stream_error_fails_run_and_keeps_prefix() {
        let stream = FakeStream::from_results(vec![Ok("par".into()), Err(LlmError::StreamRead("reset".into()))]);
        let closes = stream.closes.clone();
        let q = query(stream);

        assert!(matches!(q.run(), Err(LlmError::StreamRead(_))));
        assert_eq!(q.phase(), QueryPhase::Failed);
        assert_eq!(q.peek(), "par");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(matches!(q.reply(), Err(LlmError::NotFinished)));
    }

    #[test]
    fn second_run_is_rejected() {
        let q = query(FakeStream::new(&["a"]));
        q.run().unwrap();
        assert!(matches!(q.run(), Err(LlmError::StreamConsumed)));
        assert_eq!(q.reply().unwrap(), "a");
    }

    #[test]
    fn duration_zero_before_start_and_frozen_after() {
        let q = query(FakeStream::new(&["a"]));
        assert_eq!(q.duration(), Duration::ZERO);
        q.run().unwrap();
        let first = q.duration();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(q.duration(), first);
    }

    #[test]
    fn reply_before_finish_fails_for_every_backend() {
        use lk_base::credentials::SettingsCredentials;
        use lk_base::settings::{MemorySettings, Settings};

        const UNREACHABLE: &str = "http://127.0.0.1:9";

        let mut settings = Settings::default();
        settings.backend_keys.insert("openai".into(), "k".into());
        settings.backend_keys.insert("xai".into(), "k".into());
        let creds: Arc<dyn lk_base::credentials::CredentialStore> =
            Arc::new(SettingsCredentials::settings_only(Arc::new(MemorySettings::new(settings))));

        let backends = [
            Backend::Ollama(OllamaBackend::with_host(UNREACHABLE)),
            Backend::OpenAiCompatible(OpenAiCompatBackend::new(BackendId::OpenAi, UNREACHABLE, "m", creds.clone())),
            Backend::OpenAiCompatible(OpenAiCompatBackend::new(BackendId::Xai, UNREACHABLE, "m", creds)),
        ];

        for backend in backends {
            let stream = backend.query("m", "hi").unwrap();
            let q = Query::new(backend.name(), "m", stream);
            assert!(matches!(q.reply(), Err(LlmError::NotFinished)), "{}", backend.name());
            q.cancel();
            assert_eq!(q.run().unwrap(), QueryOutcome::Cancelled);
            assert!(matches!(q.reply(), Err(LlmError::NotFinished)), "{}", backend.name());
        }
    }
}
