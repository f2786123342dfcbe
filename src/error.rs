//! Error types for the call relay engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors (fatal, never retried)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing endpoint: {0}")]
    MissingEndpoint(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to read config file: {0}")]
    File(String),

    #[error("Failed to parse config file: {0}")]
    Parse(String),
}

/// Transport errors on the audio-stream connection (retried up to the budget)
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Connection closed by remote")]
    ClosedByRemote,
}

/// Audio device and playback-route errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Output route already held by another session")]
    RouteInUse,
}

/// Per-buffer resampling errors (the buffer is dropped, the session continues)
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Converter initialization failed: {0}")]
    Init(String),

    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// Control-endpoint errors (surfaced to the caller, session unaffected)
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Transfer not available: no control URL for this call")]
    NotAvailable,

    #[error("Transfer rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Transfer request failed: {0}")]
    Transport(String),
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
