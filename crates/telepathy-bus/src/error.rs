//! Error types for the Telepathy bus layer

use callwatch_observer_core::{ObjectRef, ObserverError};
use thiserror::Error;

/// Result type for bus operations
pub type TelepathyResult<T> = Result<T, TelepathyError>;

/// Errors raised while talking to the bus
#[derive(Debug, Error)]
pub enum TelepathyError {
    /// Transport or protocol error from zbus
    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),

    /// A remote method call returned an error
    #[error("D-Bus call failed: {0}")]
    Call(#[from] zbus::fdo::Error),

    /// A bus name or interface name was malformed
    #[error("Invalid name: {0}")]
    Name(#[from] zbus::names::Error),

    /// A value could not be converted
    #[error("Invalid value: {0}")]
    Variant(#[from] zbus::zvariant::Error),

    /// The connection path does not belong to a Telepathy connection
    #[error("Not a Telepathy connection path: {0}")]
    ConnectionPath(String),

    /// The observer loop went away before answering a dispatch
    #[error("Observer is no longer running")]
    ObserverGone,
}

impl TelepathyError {
    /// Attach the object and operation that failed
    pub fn at(self, object: &ObjectRef, operation: &str) -> ObserverError {
        ObserverError::bus(object.path.as_str(), operation, self.to_string())
    }
}

impl From<TelepathyError> for ObserverError {
    fn from(error: TelepathyError) -> Self {
        ObserverError::bus("", "bus", error.to_string())
    }
}

/// Convert any bus-level failure into an [`ObserverError`] with context
pub(crate) trait BusResultExt<T> {
    fn on(self, object: &ObjectRef, operation: &str) -> Result<T, ObserverError>;
}

impl<T, E> BusResultExt<T> for Result<T, E>
where
    E: Into<TelepathyError>,
{
    fn on(self, object: &ObjectRef, operation: &str) -> Result<T, ObserverError> {
        self.map_err(|e| e.into().at(object, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_kept() {
        let object = ObjectRef::new("org.example.CM", "/chan");
        let error = TelepathyError::ConnectionPath("/bogus".to_string()).at(&object, "Contents");
        assert_eq!(
            error.to_string(),
            "Bus error during Contents on /chan: Not a Telepathy connection path: /bogus"
        );
    }
}
