//! Common infrastructure for the callwatch tools
//!
//! Shared plumbing that every callwatch crate leans on:
//!
//! - [`logging`] - `tracing-subscriber` setup with env-filter support
//! - [`config`] - loading TOML configuration files into serde types
//! - [`errors`] - the common error type used by the plumbing above

pub mod config;
pub mod errors;
pub mod logging;

pub use errors::{Error, Result};
