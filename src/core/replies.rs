//! Open reply windows, oldest first.

use std::time::Duration;

use chrono::{DateTime, Local};
use lk_base::config::{UI, fill};
use lk_base::constants::REPLY_WRAP_COLUMNS;
use unicode_width::UnicodeWidthStr;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyWindow {
    pub id: String,
    pub text: String,
    /// How long the producing query ran
    pub duration: Duration,
    pub created_at: DateTime<Local>,
    pub closed: bool,
}

impl ReplyWindow {
    pub fn new(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            duration,
            created_at: Local::now(),
            closed: false,
        }
    }

    /// Text as shown to the user: timing header, then the wrapped answer.
    pub fn body(&self) -> String {
        let secs = format!("{:.1}", self.duration.as_secs_f64());
        let header = fill(&UI.reply.header, &[("duration", secs.as_str())]);
        format!("{}\n\n{}", header, wrap_text(&self.text, REPLY_WRAP_COLUMNS))
    }
}

/// Word-wrap each line to `max_width` display columns, keeping existing line
/// breaks. A wrapped line's leading whitespace is repeated on its continuations.
pub fn wrap_text(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return text.to_string();
    }

    let mut out: Vec<String> = Vec::new();
    for line in text.split('\n') {
        if line.width() <= max_width {
            out.push(line.to_string());
            continue;
        }

        let body = line.trim_start();
        let lead = &line[..line.len() - body.len()];
        // An indent that leaves no room for text is dropped on continuations.
        let indent = if lead.width() < max_width / 2 { lead } else { "" };
        let indent_width = indent.width();

        let mut current = lead.to_string();
        let mut current_width = lead.width();
        let mut empty = true;
        for word in body.split_whitespace() {
            let word_width = word.width();
            if empty {
                current.push_str(word);
                current_width += word_width;
                empty = false;
            } else if current_width + 1 + word_width <= max_width {
                current.push(' ');
                current.push_str(word);
                current_width += 1 + word_width;
            } else {
                out.push(std::mem::replace(&mut current, format!("{}{}", indent, word)));
                current_width = indent_width + word_width;
            }
        }
        out.push(current);
    }
    out.join("\n")
}

/// Ordered set of open replies plus the one currently displayed.
///
/// Ids are unique and `display` is always `None` or the id of a member.
#[derive(Debug, Default)]
pub struct ReplyRegistry {
    windows: Vec<ReplyWindow>,
    display: Option<String>,
}

impl ReplyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add at the end; the new window becomes the displayed one.
    pub fn append(&mut self, window: ReplyWindow) {
        if self.windows.iter().any(|w| w.id == window.id) {
            tracing::warn!(id = %window.id, "reply window already registered");
            return;
        }
        self.display = Some(window.id.clone());
        self.windows.push(window);
    }

    /// Remove the most recently opened window, whichever one is displayed.
    pub fn close_last(&mut self) -> Option<ReplyWindow> {
        let mut window = self.windows.pop()?;
        window.closed = true;
        self.display = self.tail_id();
        Some(window)
    }

    /// Remove the window with `id`. Returns `None` if it is already gone.
    pub fn close_by_id(&mut self, id: &str) -> Option<ReplyWindow> {
        let idx = self.windows.iter().position(|w| w.id == id)?;
        let mut window = self.windows.remove(idx);
        window.closed = true;
        if self.display.as_deref() == Some(id) {
            self.display = self.tail_id();
        }
        Some(window)
    }

    /// Move display one window back, wrapping from the first to the last.
    pub fn cycle(&mut self) -> Option<&ReplyWindow> {
        let current = self.display.as_deref()?;
        let idx = self.windows.iter().position(|w| w.id == current)?;
        let prev = if idx == 0 { self.windows.len() - 1 } else { idx - 1 };
        let window = &self.windows[prev];
        self.display = Some(window.id.clone());
        Some(window)
    }

    pub fn display(&self) -> Option<&ReplyWindow> {
        let id = self.display.as_deref()?;
        self.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&ReplyWindow> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.windows.iter().map(|w| w.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn tail_id(&self) -> Option<String> {
        self.windows.last().map(|w| w.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(id: &str) -> ReplyWindow {
        ReplyWindow { id: id.to_string(), ..ReplyWindow::new(format!("text of {}", id), Duration::from_millis(1500)) }
    }

    fn registry(ids: &[&str]) -> ReplyRegistry {
        let mut registry = ReplyRegistry::new();
        for id in ids {
            registry.append(window(id));
        }
        registry
    }

    fn display_id(registry: &ReplyRegistry) -> Option<&str> {
        registry.display().map(|w| w.id.as_str())
    }

    #[test]
    fn append_displays_newest() {
        let registry = registry(&["w1", "w2"]);
        assert_eq!(registry.ids(), vec!["w1", "w2"]);
        assert_eq!(display_id(&registry), Some("w2"));
    }

    #[test]
    fn duplicate_id_ignored() {
        let mut registry = registry(&["w1"]);
        registry.append(window("w1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cycle_walks_backwards_and_wraps() {
        let mut registry = registry(&["w1", "w2", "w3"]);
        assert_eq!(registry.cycle().map(|w| w.id.clone()).as_deref(), Some("w2"));
        assert_eq!(registry.cycle().map(|w| w.id.clone()).as_deref(), Some("w1"));
        assert_eq!(registry.cycle().map(|w| w.id.clone()).as_deref(), Some("w3"));
        assert_eq!(display_id(&registry), Some("w3"));
    }

    #[test]
    fn cycle_empty_is_noop() {
        let mut registry = ReplyRegistry::new();
        assert!(registry.cycle().is_none());
        assert!(registry.display().is_none());
    }

    #[test]
    fn close_by_id_removes_once() {
        let mut registry = registry(&["w1", "w2", "w3"]);
        let closed = registry.close_by_id("w2").unwrap();
        assert!(closed.closed);
        assert_eq!(registry.ids(), vec!["w1", "w3"]);
        assert!(registry.close_by_id("w2").is_none());
        assert_eq!(registry.ids(), vec!["w1", "w3"]);
        assert_eq!(display_id(&registry), Some("w3"));
    }

    #[test]
    fn close_by_id_of_displayed_moves_display_to_tail() {
        let mut registry = registry(&["w1", "w2", "w3"]);
        registry.cycle();
        assert_eq!(display_id(&registry), Some("w2"));
        registry.close_by_id("w2");
        assert_eq!(display_id(&registry), Some("w3"));

        registry.close_by_id("w3");
        registry.close_by_id("w1");
        assert!(registry.is_empty());
        assert!(registry.display().is_none());
    }

    #[test]
    fn close_last_removes_newest_not_displayed() {
        let mut registry = registry(&["w1", "w2", "w3"]);
        registry.cycle();
        let closed = registry.close_last().unwrap();
        assert_eq!(closed.id, "w3");
        assert!(closed.closed);
        assert_eq!(display_id(&registry), Some("w2"));

        registry.close_last();
        registry.close_last();
        assert!(registry.close_last().is_none());
        assert!(registry.display().is_none());
    }

    #[test]
    fn new_windows_get_unique_ids() {
        let a = ReplyWindow::new("a", Duration::ZERO);
        let b = ReplyWindow::new("a", Duration::ZERO);
        assert_ne!(a.id, b.id);
        assert!(!a.closed);
    }

    #[test]
    fn body_has_timing_header() {
        let body = ReplyWindow::new("The answer", Duration::from_millis(2340)).body();
        assert!(body.starts_with("This query took 2.3s."));
        assert!(body.ends_with("\n\nThe answer"));
    }

    #[test]
    fn wrap_keeps_short_lines_and_breaks_long_ones() {
        assert_eq!(wrap_text("one\n\ntwo", 10), "one\n\ntwo");
        assert_eq!(wrap_text("aaa bbb ccc", 7), "aaa bbb\nccc");
        assert_eq!(wrap_text("abcdefghijk", 5), "abcdefghijk");
    }

    #[test]
    fn wrap_keeps_indentation() {
        let code = "fn main() {\n        let total = first + second + third;\n}";
        assert_eq!(
            wrap_text(code, 30),
            "fn main() {\n        let total = first +\n        second + third;\n}"
        );
        assert_eq!(wrap_text("\tone two three", 10), "\tone two\n\tthree");
    }
}
