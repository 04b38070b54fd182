//! Utility modules for error handling, configuration, and sanitization

pub mod config;
pub mod error;
pub mod sanitize;

// Re-export for convenience
pub use config::{Settings, SettingsStore};
pub use error::VidloaderError;
pub use sanitize::{is_safe_path, sanitize_filename, strip_control_sequences, validate_url};
