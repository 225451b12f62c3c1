//! Error types for the record supplier

use thiserror::Error;

use crate::client::KinesisClientError;

/// Main error type surfaced by the supplier's public operations.
#[derive(Debug, Error)]
pub enum SupplierError {
    /// The supplier has been closed; only a second `close` is allowed.
    #[error("record supplier has already been closed")]
    AlreadyClosed,

    /// A seek was requested for a partition that is not in the assignment.
    #[error("partition [{0}] has not been assigned")]
    PartitionNotAssigned(String),

    /// Kinesis iterators are opaque; there is no current-position read.
    #[error("reading the current position is not supported for Kinesis")]
    PositionNotSupported,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("kinesis client error: {0}")]
    Client(#[from] KinesisClientError),
}

/// Result type for supplier operations
pub type Result<T> = std::result::Result<T, SupplierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SupplierError::PartitionNotAssigned("stream/shard-7".to_string());
        assert!(err.to_string().contains("stream/shard-7"));

        let err = SupplierError::Config("buffer_size must be greater than zero".to_string());
        assert!(err.to_string().contains("buffer_size"));
    }

    #[test]
    fn test_client_error_conversion() {
        let client_err = KinesisClientError::ThroughputExceeded;
        let err: SupplierError = client_err.into();
        assert!(matches!(err, SupplierError::Client(_)));
    }
}
