/*!
Error Handling

Standardized error types shared by the callwatch infrastructure crates.
*/

pub mod types;

pub use types::{Error, Result};
