//! # Snare Utilities
//!
//! Helpers shared by the snare binaries, chiefly logging setup on top of
//! `tracing-subscriber`.

pub mod logging;

pub use logging::{default_log_file, init_logging, LogFormat, LogLevel, LoggingConfig, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
