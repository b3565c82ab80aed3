//! Error types for spidev operations

use core::fmt;
use thiserror::Error;

/// Parameter negotiated with the kernel during open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Mode,
    BitsPerWord,
    MaxSpeedHz,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Mode => write!(f, "mode"),
            Param::BitsPerWord => write!(f, "bits per word"),
            Param::MaxSpeedHz => write!(f, "max speed hz"),
        }
    }
}

/// Which half of a set-then-get negotiation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Set,
    Get,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Set => write!(f, "set"),
            Phase::Get => write!(f, "get"),
        }
    }
}

/// Errors raised by the spidev device handle
#[derive(Debug, Error)]
pub enum Error {
    /// Device node could not be opened
    #[error("can't open device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A parameter negotiation failed during open; the descriptor has
    /// already been released and no handle exists
    #[error("can't {phase} spi {param}: {source}")]
    Config {
        param: Param,
        phase: Phase,
        #[source]
        source: std::io::Error,
    },

    /// Operation requires an open handle
    #[error("device is not open")]
    NotOpen,

    /// The kernel transfer call failed outright
    #[error("can't send spi message: {0}")]
    Transfer(#[source] std::io::Error),

    /// The kernel reported fewer bytes than requested; no partial-completion
    /// semantics are exposed, so this is a failure
    #[error("short spi transfer: {transferred} of {len} bytes")]
    TransferIncomplete { len: usize, transferred: usize },

    /// Requested transfer length exceeds a supplied buffer
    #[error("transfer length {len} exceeds buffer capacity {capacity}")]
    BufferTooSmall { len: usize, capacity: usize },
}

/// Result type for spidev operations
pub type Result<T> = std::result::Result<T, Error>;
