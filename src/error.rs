//! Crate-level error types.

use crate::driver::{DmdType, DriverError, SequenceId};

/// Crate-level error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The device driver rejected an operation or ran out of sequence memory.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// The session at this index holds no device resources.
    #[error("device {index} is not initialized")]
    NotInitialized { index: usize },

    /// A device index outside the registry's slot table.
    #[error("device index {index} out of range (capacity {capacity})")]
    IndexOutOfRange { index: usize, capacity: usize },

    /// A sequence id that is not tracked by the owning session's pool.
    #[error("unknown sequence id {0}")]
    UnknownSequence(SequenceId),

    /// The device reported a panel type this crate has no resolution for.
    #[error("unsupported DMD type: {0:?}")]
    UnsupportedDmdType(DmdType),

    /// A caller-provided value outside the accepted domain
    /// (frame rate, repeat count, buffer shape).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an [`Error::InvalidConfig`] from a message.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Error>;
