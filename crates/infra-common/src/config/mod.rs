/*!
Configuration

Loading helpers for TOML configuration files. Each tool defines its own serde
types; this module only knows how to find, read and parse them.
*/

pub mod loader;

pub use loader::{load_toml, load_toml_str, ConfigLoader};
