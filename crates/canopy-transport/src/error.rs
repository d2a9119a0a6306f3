//! Adapter construction errors.

use thiserror::Error;

/// Errors raised while building an adapter.
///
/// Runtime failures are reported through the `canopy-core` error types
/// (`BusError`, `SinkError`) instead.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A configuration value is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The underlying client could not be built.
    #[error("Client setup failed: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = TransportError::InvalidConfig("empty database name".into());
        assert_eq!(err.to_string(), "Invalid configuration: empty database name");
    }
}
