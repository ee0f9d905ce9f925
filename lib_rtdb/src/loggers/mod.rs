//! Console and file log sink for binaries embedding the engine.

pub mod setup;

pub use setup::{cleanup_old_logs, parse_level, setup_logging};
