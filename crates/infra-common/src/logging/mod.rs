/*!
Logging

Standardized `tracing` setup for the callwatch tools. Diagnostics always go to
stderr so they never interleave with the observer's own stdout output.
*/

pub mod setup;

pub use setup::{log_welcome, parse_log_level, setup_logging, LoggingConfig, LoggingSection};
