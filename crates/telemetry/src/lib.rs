//! Logging setup shared by the workspace binaries.

pub mod logging;

pub use logging::{init_structured_logging, LogConfig, LogFormat};
