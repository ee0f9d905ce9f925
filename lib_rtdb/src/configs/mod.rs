//! # Configuration
//!
//! Library-side settings. The server binary layers its own CLI/file config on
//! top and hands the relevant subset down as [`ServerOptions`].

/// Session and connection settings plus JSON file loading.
pub mod options;

pub use options::{load_json_file, ServerOptions, DEFAULT_SERVER_NAME};
