// =============================================================================
// BACKENDS
// =============================================================================

/// Default Ollama host when `OLLAMA_HOST` is not set
pub const OLLAMA_DEFAULT_HOST: &str = "http://localhost:11434";

/// Environment variable overriding the Ollama host
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

/// OpenAI API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used for OpenAI when none is configured
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Environment variable holding a fallback OpenAI key
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

/// xAI API base URL (OpenAI-compatible)
pub const XAI_BASE_URL: &str = "https://api.x.ai/v1";

/// Model used for xAI when none is configured
pub const XAI_DEFAULT_MODEL: &str = "grok-base";

/// Environment variable holding a fallback xAI key
pub const XAI_KEY_ENV: &str = "XAI_API_KEY";

// =============================================================================
// STORAGE
// =============================================================================

/// Directory name under the platform config dir
pub const APP_DIR: &str = "llmkey";

/// Settings file name inside [`APP_DIR`]
pub const SETTINGS_FILE: &str = "config.json";

// =============================================================================
// UI
// =============================================================================

/// Column at which reply text is wrapped
pub const REPLY_WRAP_COLUMNS: usize = 120;

/// Prefix marking a console line as a command rather than prompt text
pub const COMMAND_PREFIX: char = ':';
