//! Error types for the host crate.

use crate::loader::LoadError;
use thiserror::Error;

/// Host error type
#[derive(Error, Debug)]
pub enum HostError {
    /// Artifact could not be read or compiled
    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    /// Linking or instantiation failed
    #[error("instantiation failed: {0}")]
    Instantiate(String),

    /// Guest does not export something the host requires
    #[error("guest missing required export `{0}`")]
    MissingExport(&'static str),

    /// Guest memory access error
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Presentation backend error
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Loop was stepped after it stopped
    #[error("driving loop already stopped")]
    Stopped,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Guest memory access error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("guest range {offset:#x}+{len} outside memory of {size} bytes")]
    OutOfBounds { offset: u32, len: usize, size: usize },

    #[error("unterminated string at {offset:#x}")]
    Unterminated { offset: u32 },
}

/// Presentation backend error.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("invalid frame {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    #[error("audio device unavailable: {0}")]
    Audio(String),

    #[error("host command rejected: {0}")]
    CommandDenied(String),

    #[error("host command exited with {0}")]
    CommandFailed(std::process::ExitStatus),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal condition raised by the guest through `wasm_fail`.
///
/// Raised as the host-function error so wasmtime unwinds the guest; the
/// driving loop downcasts to it to avoid alerting the user a second time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("guest fatal: {message}")]
pub struct GuestFatal {
    pub message: String,
}

/// Result type alias for host operations
pub type Result<T> = std::result::Result<T, HostError>;
