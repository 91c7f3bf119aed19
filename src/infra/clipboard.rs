use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("Failed to initialize clipboard: {0}")]
    Init(String),
    #[error("Failed to set clipboard text: {0}")]
    Write(String),
    #[error("Failed to read clipboard text: {0}")]
    Read(String),
}

/// Text clipboard used by handlers to deliver answers and read prompt context.
pub trait Clipboard {
    fn copy(&mut self, text: &str) -> Result<(), ClipboardError>;
    fn paste(&mut self) -> Result<String, ClipboardError>;
}

/// OS clipboard via arboard.
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, ClipboardError> {
        let inner = arboard::Clipboard::new().map_err(|e| ClipboardError::Init(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl Clipboard for SystemClipboard {
    fn copy(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.inner.set_text(text).map_err(|e| {
            tracing::error!(error = %e, "clipboard write failed");
            ClipboardError::Write(e.to_string())
        })
    }

    fn paste(&mut self) -> Result<String, ClipboardError> {
        self.inner.get_text().map_err(|e| {
            tracing::error!(error = %e, "clipboard read failed");
            ClipboardError::Read(e.to_string())
        })
    }
}

/// Process-local clipboard for headless sessions and tests. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    contents: Arc<Mutex<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        Self { contents: Arc::new(Mutex::new(text.to_string())) }
    }

    pub fn contents(&self) -> String {
        self.contents.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn copy(&mut self, text: &str) -> Result<(), ClipboardError> {
        *self.contents.lock().unwrap_or_else(|e| e.into_inner()) = text.to_string();
        Ok(())
    }

    fn paste(&mut self) -> Result<String, ClipboardError> {
        Ok(self.contents())
    }
}

/// System clipboard if one is reachable, otherwise an in-memory stand-in.
pub fn open_clipboard() -> Box<dyn Clipboard> {
    match SystemClipboard::new() {
        Ok(clipboard) => Box::new(clipboard),
        Err(e) => {
            tracing::warn!(error = %e, "no system clipboard, answers stay in memory");
            Box::new(MemoryClipboard::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_clipboard_shares_contents_between_clones() {
        let mut a = MemoryClipboard::with_text("before");
        let b = a.clone();
        assert_eq!(a.paste().unwrap(), "before");
        a.copy("after").unwrap();
        assert_eq!(b.contents(), "after");
    }
}
