pub mod clipboard;
pub mod console;
pub mod desktop;

pub use clipboard::{Clipboard, ClipboardError};
pub use desktop::{Desktop, MenuView, ModelList, PromptRequest, SettingsView, Status};
