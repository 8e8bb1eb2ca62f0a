//! Error types for the observer core

use thiserror::Error;

/// Result type for observer operations
pub type ObserverResult<T> = Result<T, ObserverError>;

/// Errors that can occur while observing calls
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObserverError {
    /// A bus read or subscription failed
    #[error("Bus error during {operation} on {object}: {message}")]
    Bus {
        object: String,
        operation: String,
        message: String,
    },

    /// Preparing a content or stream failed
    #[error("Failed to prepare {object}: {message}")]
    Prepare { object: String, message: String },

    /// The dispatch transaction could not be completed
    #[error("Dispatch error: {message}")]
    Dispatch { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The notification loop has gone away
    #[error("Notification channel closed")]
    NotificationChannelClosed,
}

impl ObserverError {
    /// Create a bus error
    pub fn bus(
        object: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Bus {
            object: object.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a prepare error
    pub fn prepare(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Prepare {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create a dispatch error
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<callwatch_infra_common::Error> for ObserverError {
    fn from(error: callwatch_infra_common::Error) -> Self {
        Self::config(error.to_string())
    }
}
