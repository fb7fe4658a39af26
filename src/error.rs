use std::collections::TryReserveError;
use thiserror::Error;

/// Errors produced by the model, generator and filter.
#[derive(Debug, Error)]
pub enum Error {
    /// A buffer or matrix could not grow. Fatal to the call.
    #[error("allocation failed: {0}")]
    Allocation(&'static str),

    /// A distribution does not sum to one, or a loop can never be left.
    #[error("invalid model: {0}")]
    ModelInvalid(String),

    /// The scaled filter accumulator saturated; the score must be recomputed at higher precision.
    #[error("filter score overflowed the 16-bit range")]
    Overflow,

    /// The state machine reached a branch that can't exist.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    /// A trace that is not a valid path through the state machine.
    #[error("invalid trace: {0}")]
    InvalidTrace(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn model_invalid(message: impl Into<String>) -> Self {
        Self::ModelInvalid(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptState(message.into())
    }

    pub fn invalid_trace(message: impl Into<String>) -> Self {
        Self::InvalidTrace(message.into())
    }

    /// Overflow is not a failure of the input: callers treat it as an infinitely good score.
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow)
    }
}

/// Grow `buf` by `additional` elements, reporting a failed reservation as an allocation error.
pub(crate) fn reserve<T>(buf: &mut Vec<T>, additional: usize, what: &'static str) -> Result<()> {
    buf.try_reserve(additional)
        .map_err(|_: TryReserveError| Error::Allocation(what))
}
