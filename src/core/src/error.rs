use thiserror::Error;

/// Broad classification of a [`NodeError`].
///
/// The HTTP layer maps these to status codes; the core only guarantees the
/// distinction is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed settings or service name (user-caused).
    Validation,
    /// A workflow of the same family is already in flight.
    Conflict,
    /// The container runtime or the node API failed.
    UpstreamUnavailable,
    /// The device is not in a state that allows the operation.
    Precondition,
    /// Unretried failure (corrupt credential store, I/O, serialization).
    Fatal,
}

/// Device manager error types
#[derive(Error, Debug)]
pub enum NodeError {
    /// Settings payload or service name rejected
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another workflow is already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The device is not ready for the requested operation
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Container runtime command failed
    #[error("Container runtime error: {operation} - {message}")]
    Runtime { operation: String, message: String },

    /// Remote node API call failed
    #[error("Node API error: {endpoint} {} - {message}", status_label(.status))]
    NodeApi {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// Credential store is unreadable or corrupt
    #[error("Credential error: {0}")]
    Credential(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl NodeError {
    /// Build a runtime error for a named compose/docker operation.
    pub fn runtime(operation: impl Into<String>, message: impl Into<String>) -> Self {
        NodeError::Runtime {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::Validation(_) => ErrorKind::Validation,
            NodeError::Conflict(_) => ErrorKind::Conflict,
            NodeError::Precondition(_) => ErrorKind::Precondition,
            NodeError::Runtime { .. } | NodeError::NodeApi { .. } => {
                ErrorKind::UpstreamUnavailable
            }
            NodeError::Credential(_)
            | NodeError::IoError(_)
            | NodeError::SerializationError(_)
            | NodeError::ConfigError(_)
            | NodeError::Other(_) => ErrorKind::Fatal,
        }
    }

    /// HTTP status returned by the node API, if this error came from it.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            NodeError::NodeApi { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "unreachable".to_string(),
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::SerializationError(err.to_string())
    }
}

/// Result type alias for device manager operations
pub type Result<T> = std::result::Result<T, NodeError>;
