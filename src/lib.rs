//! llmkey: one-off prompts to a language model from anywhere, answer on the clipboard.
//!
//! The core is a small engine: a registry of streaming backends, a query state
//! machine, a single-worker runner and a cross-thread event bus feeding one
//! control thread that owns the session and its reply windows.

pub mod core;
pub mod infra;
pub mod llms;
