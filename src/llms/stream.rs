//! Lazy line-oriented response streams.
//!
//! Both wire formats (Ollama NDJSON, OpenAI-compatible SSE) are one event per
//! line, so a single reader drives them; each backend supplies the per-line
//! parser. The HTTP request itself is deferred until the first pull.

use std::io::BufRead;

use super::error::LlmError;

/// A lazy, finite, non-restartable sequence of answer fragments.
///
/// Fragments are non-empty and their concatenation is the full answer.
/// After `close()` the stream yields nothing and releases its connection.
pub trait ResponseStream: Iterator<Item = Result<String, LlmError>> + Send {
    fn close(&mut self);
}

/// Result of parsing one wire line.
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    Fragment(String),
    /// Keep-alive, empty delta, metadata
    Skip,
    /// Provider signalled end of answer
    Done,
}

pub type LineParser = fn(&str) -> Result<Parsed, LlmError>;

/// Deferred request: runs on the first pull, on whatever thread pulls.
pub type Opener<R> = Box<dyn FnOnce() -> Result<R, LlmError> + Send>;

enum Source<R> {
    Pending(Opener<R>),
    Open(R),
    Closed,
}

pub struct LineStream<R: BufRead + Send> {
    source: Source<R>,
    parse: LineParser,
}

impl<R: BufRead + Send> LineStream<R> {
    pub fn lazy(open: Opener<R>, parse: LineParser) -> Self {
        Self { source: Source::Pending(open), parse }
    }

    /// Stream over an already-open reader.
    pub fn opened(reader: R, parse: LineParser) -> Self {
        Self { source: Source::Open(reader), parse }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.source, Source::Closed)
    }
}

impl<R: BufRead + Send> Iterator for LineStream<R> {
    type Item = Result<String, LlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.source, Source::Pending(_))
            && let Source::Pending(open) = std::mem::replace(&mut self.source, Source::Closed)
        {
            match open() {
                Ok(reader) => self.source = Source::Open(reader),
                Err(e) => return Some(Err(e)),
            }
        }

        loop {
            let Source::Open(reader) = &mut self.source else {
                return None;
            };

            let mut line = String::new();
            let step = match reader.read_line(&mut line) {
                Ok(0) => Ok(Parsed::Done),
                Ok(_) => (self.parse)(line.trim_end()),
                Err(e) => Err(LlmError::StreamRead(e.to_string())),
            };

            match step {
                Ok(Parsed::Fragment(text)) if !text.is_empty() => return Some(Ok(text)),
                Ok(Parsed::Fragment(_)) | Ok(Parsed::Skip) => continue,
                Ok(Parsed::Done) => {
                    self.source = Source::Closed;
                    return None;
                }
                Err(e) => {
                    self.source = Source::Closed;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<R: BufRead + Send> ResponseStream for LineStream<R> {
    fn close(&mut self) {
        // Dropping the reader drops the HTTP response and its connection.
        self.source = Source::Closed;
    }
}
