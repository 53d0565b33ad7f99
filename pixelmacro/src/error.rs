use thiserror::Error;

/// Errors that can occur while recording, storing, or replaying a macro
#[derive(Error, Debug)]
pub enum MacroError {
    /// Failed to initialize an input listener or screen source
    #[error("Failed to initialize: {0}")]
    InitializationError(String),

    /// Screen or pixel capture failed on both the primary and fallback sources
    #[error("Screen capture failed: {0}")]
    CaptureError(String),

    /// The external input actuator rejected a move/click/key call
    #[error("Input actuator failed: {0}")]
    ActuatorError(String),

    /// An operation was requested in a state that does not allow it,
    /// e.g. starting a recording while playback is active
    #[error("Invalid state: {0}")]
    StateError(String),

    /// Failed to save or load a macro
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Failed to serialize or deserialize events
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Encoding or decoding a template image failed
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
}

/// Result type for macro operations
pub type Result<T> = std::result::Result<T, MacroError>;
