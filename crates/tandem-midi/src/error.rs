//! Error types for reference file loading and parsing.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("unable to read file: {0}")]
    Unreadable(String),

    #[error("invalid MIDI data: {0}")]
    MalformedMidi(String),

    #[error("reference contains no paired note-on/note-off events")]
    NoNoteData,
}

impl From<midly::Error> for Error {
    fn from(e: midly::Error) -> Self {
        Error::MalformedMidi(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
