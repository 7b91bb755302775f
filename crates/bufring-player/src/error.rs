//! Error types for the player library.
//!
//! Every error here is raised at a boundary (source load, device open, pool setup) and is
//! fatal for the session. Nothing in the steady-state refill path returns one of these.

use std::path::PathBuf;

use thiserror::Error;

use crate::format::AudioFormat;

/// Failures while opening or validating a sample source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The container file is missing or unreadable.
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the source failed part way through.
    #[error("failed to read source: {0}")]
    Read(#[source] std::io::Error),

    /// The container header is not a plain RIFF/WAVE PCM header.
    #[error("invalid WAV file format: {0}")]
    FormatValidation(String),

    /// The source would have nothing to play.
    #[error("source has no PCM payload")]
    EmptyPayload,
}

/// Failures reported by an output device.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No output device (or no device configuration) accepts the requested format.
    #[error("no output device available for {format}: {reason}")]
    Unavailable { format: AudioFormat, reason: String },

    /// The backend failed after a device was selected.
    #[error("output stream error: {0}")]
    Stream(String),
}

/// Misuse of the buffer pool.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    #[error("buffer pool needs at least one buffer of at least one byte")]
    EmptyPool,

    #[error("buffer {0} is out of range")]
    OutOfRange(usize),

    #[error("buffer {0} is on loan to the device")]
    OnLoan(usize),

    #[error("buffer {0} returned twice")]
    AlreadyHome(usize),

    #[error("buffer {index} returned with {len} bytes, pool buffers hold {expected}")]
    Foreign { index: usize, len: usize, expected: usize },

    #[error("{0} buffer(s) still on loan; release refused")]
    Outstanding(usize),
}

/// Top-level error for a playback session.
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("invalid playback configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
