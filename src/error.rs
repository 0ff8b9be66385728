use thiserror::Error;

/// Result type for receiver operations
pub type Result<T> = std::result::Result<T, AvrError>;

/// Errors that can occur when talking to a receiver
#[derive(Error, Debug)]
pub enum AvrError {
    /// A numeric command argument fell outside the protocol's range
    #[error("{what} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        what: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    /// A numeric command argument is not on the protocol's step grid
    #[error("{what} {value} is not a multiple of {step}")]
    InvalidStep {
        what: &'static str,
        value: i32,
        step: i32,
    },

    /// Input key is not in the input table
    #[error("Unknown input: {0}")]
    UnknownInput(String),

    /// Surround mode key is not in the surround mode table
    #[error("Unknown surround mode: {0}")]
    UnknownSurroundMode(String),

    /// Channel token is not in the channel table
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// A received line could not be interpreted
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Transport was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connect attempt timed out
    #[error("Connect timeout")]
    Timeout,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration or static table
    #[error("Configuration error: {0}")]
    Config(String),
}
