//! Error types for the parallax window library.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding of a mailbox message failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A mailbox message did not match its schema
    #[error("Malformed message in {slot}: {reason}")]
    MalformedMessage {
        /// Slot the message was read from
        slot: String,
        /// What was wrong with it
        reason: String,
    },

    /// Corner geometry cannot produce an invertible correction
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Webcam could not deliver frames
    #[error("Capture error: {0}")]
    Capture(String),

    /// Scene render backend failed
    #[error("Render error: {0}")]
    Render(String),

    /// Filter initialization or processing error
    #[error("Filter error: {0}")]
    FilterError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
