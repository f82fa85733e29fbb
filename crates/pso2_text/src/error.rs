//! Error types that can be emitted from this library
//!

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`std::string::FromUtf8Error`]
    #[error(transparent)]
    UTF8Error(#[from] std::string::FromUtf8Error),

    /// Transparent wrapper for [`pso2_archive::error::Error`], raised by the chunk layer
    #[error(transparent)]
    #[diagnostic(transparent)]
    ChunkError(#[from] pso2_archive::error::Error),

    /// invalid text header: {0}
    #[error("invalid text header: {0}")]
    #[diagnostic(code(pso2_text::invalid_header))]
    InvalidHeader(String),

    /// entry {index} spans {delta} bytes, which is not a whole number of words
    #[error("entry {index} spans {delta} bytes, which is not a whole number of words")]
    MisalignedOffset {
        /// Index of the entry
        index: usize,
        /// Distance between its offset and the next one
        delta: i64,
    },

    /// string at pool offset {offset:#x} has no terminator
    #[error("string at pool offset {offset:#x} has no terminator")]
    UnterminatedString {
        /// Offset of the string inside the string pool
        offset: u64,
    },

    /// pair {0} does not exist
    #[error("pair {0} does not exist")]
    PairNotFound(usize),

    /// text table is too large to be written
    #[error("text table is too large to be written")]
    TooLarge,
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
