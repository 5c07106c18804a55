//! Error types for voxlink.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxlinkError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Transport errors
    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // Playback errors
    #[error("Playback failed: {message}")]
    Playback { message: String },

    // Session lifecycle errors
    #[error("A live session is already active")]
    AlreadyActive,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxlinkError>;
