//! # Core Runtime
//!
//! Shared runtime plumbing for the download core: the event bus the other
//! crates publish their typed result streams through, and the logging
//! bootstrap the host calls once at startup.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
pub use events::{CoreEvent, DownloadEvent, EventBus, EventSeverity, EventStream, SessionEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};
