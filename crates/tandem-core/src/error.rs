//! Error types for engine control operations.
//!
//! These surface only on the control side. The audio path never
//! produces an error value: internal overflow (full queue, full
//! tracking table) degrades to documented pass-through/drop behavior
//! and is reported through aggregate counters instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Reference(#[from] tandem_midi::Error),

    #[error("operation rejected while transport is playing")]
    TransportBusy,

    #[error("no reference is loaded")]
    NoReference,

    #[error("invalid state blob: {0}")]
    InvalidState(String),

    #[error("a reference load is already in progress")]
    LoadInProgress,
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidState(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
