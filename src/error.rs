//! Load generator error types with process exit code mapping.
//!
//! [`LoadgenError`] is the central error type for every tool. Each variant
//! maps to a process exit code through [`LoadgenError::exit_code`].

/// Error enum shared by all load generator tools.
///
/// # Exit Codes
///
/// | Code | Category                                     |
/// |------|----------------------------------------------|
/// | 0    | Normal completion (not an error)             |
/// | 1    | Connection, client, database or I/O failure  |
/// | 2    | Invalid command line argument                |
#[derive(Debug, thiserror::Error)]
pub enum LoadgenError {
    /// A command line or environment value could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The broker or database refused or dropped the connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The MQTT client rejected a request.
    #[error("mqtt client error: {0}")]
    Client(String),

    /// The event loop stopped before a publish was acknowledged.
    #[error("acknowledgement channel closed after {acked} of {expected} publishes")]
    AckChannelClosed {
        /// Publishes acknowledged before the channel closed.
        acked: u64,
        /// Publishes the caller was waiting for.
        expected: u64,
    },

    /// Error propagated from the PostgreSQL driver.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive storage failure.
    #[error("archive error: {0}")]
    Archive(#[from] std::io::Error),
}

impl LoadgenError {
    /// Returns the process exit code for this variant.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidArgument(_) => 2,
            Self::Connection(_)
            | Self::Client(_)
            | Self::AckChannelClosed { .. }
            | Self::Database(_)
            | Self::Json(_)
            | Self::Archive(_) => 1,
        }
    }

    /// Returns `true` if this error means no session could be established.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<rumqttc::ClientError> for LoadgenError {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::Client(err.to_string())
    }
}

impl From<rumqttc::v5::ClientError> for LoadgenError {
    fn from(err: rumqttc::v5::ClientError) -> Self {
        Self::Client(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_exits_with_two() {
        let err = LoadgenError::InvalidArgument("qos 7".to_string());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn connection_failure_exits_with_one() {
        let err = LoadgenError::Connection("refused".to_string());
        assert_eq!(err.exit_code(), 1);
        assert!(err.is_connection_failure());
    }

    #[test]
    fn ack_channel_closed_reports_progress() {
        let err = LoadgenError::AckChannelClosed {
            acked: 3,
            expected: 4,
        };
        assert_eq!(
            err.to_string(),
            "acknowledgement channel closed after 3 of 4 publishes"
        );
        assert!(!err.is_connection_failure());
    }

    #[test]
    fn io_error_converts_to_archive() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = LoadgenError::from(io);
        assert!(matches!(err, LoadgenError::Archive(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
