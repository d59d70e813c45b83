/// Constants module to avoid magic numbers in the codebase

// Remote API
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const GEMINI_API_KEY_HEADER: &str = "x-goog-api-key";

// Timeouts
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 120;

// Server
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 3030;

// Configuration
pub const APP_NAME: &str = "gemini-chat";
pub const LOCAL_CONFIG_DIR: &str = ".gemini-chat";
pub const ENV_PREFIX: &str = "GEMINI_CHAT_";

// Default model selection
pub const DEFAULT_MODEL_ID: &str = "gemini-2.0-flash";

/// Built-in catalog used when the configuration does not provide one.
/// Entries are (key, id, display name).
pub const DEFAULT_MODELS: &[(&str, &str, &str)] = &[
    ("1", "gemini-2.0-flash", "Gemini 2.0 Flash"),
    ("2", "gemini-2.0-flash-lite", "Gemini 2.0 Flash Lite"),
    ("3", "gemini-1.5-pro", "Gemini 1.5 Pro"),
    ("4", "gemini-1.5-flash", "Gemini 1.5 Flash"),
    ("5", "gemini-2.5-pro-preview-05-06", "Gemini 2.5 Pro (Preview)"),
    ("6", "gemini-2.5-flash-preview-05-20", "Gemini 2.5 Flash (Preview)"),
    ("7", "gemini-3-pro-preview", "Gemini 3 Pro (Preview)"),
];
