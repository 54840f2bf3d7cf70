//! Telemetry and structured logging components for ChatITP.
//!
//! Handles log redaction, console and JSON file output, and conversation event logging.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{ConversationEvent, EventLogEntry, EventLogger};
pub use logger::{init_logger, LoggerGuard};
pub use redact::redact_sensitive_data;
