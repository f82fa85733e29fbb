//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::tag::Tag;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// file is an invalid {format} archive: {reason}
    #[error("file is an invalid {format} archive: {reason}")]
    #[diagnostic(code(pso2_archive::invalid_archive))]
    InvalidArchive {
        /// Archive format being parsed
        format: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// expected a {expected} chunk but found {found}
    #[error("expected a {expected} chunk but found {found}")]
    UnexpectedTag {
        /// Tag the caller asked for
        expected: Tag,
        /// Tag present in the stream
        found: Tag,
    },

    /// malformed chunk at offset {offset:#x}
    #[error("malformed chunk at offset {offset:#x}")]
    MalformedChunk {
        /// Offset of the chunk inside the parsed buffer
        offset: usize,
    },

    /// invalid model: {0}
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// group {group} checksum {stored:#010x} does not match its data ({computed:#010x})
    #[error("group {group} checksum {stored:#010x} does not match its data ({computed:#010x})")]
    ChecksumMismatch {
        /// Index of the group
        group: usize,
        /// Checksum stored in the group table
        stored: u32,
        /// Checksum of the bytes actually present
        computed: u32,
    },

    /// name `{name}` does not fit in {limit} bytes
    #[error("name `{name}` does not fit in {limit} bytes")]
    NameTooLong {
        /// The offending name
        name: String,
        /// Space available for it, including the terminator
        limit: usize,
    },

    /// replacement provided {actual} bytes but {expected} were declared
    #[error("replacement provided {actual} bytes but {expected} were declared")]
    ShortReplacement {
        /// Declared size
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

impl Error {
    pub(crate) fn invalid(format: &'static str, reason: impl Into<String>) -> Error {
        Error::InvalidArchive {
            format,
            reason: reason.into(),
        }
    }
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by name {0}
    #[error("by name {0}")]
    Name(String),

    /// at index {index} of group {group}
    #[error("at index {index} of group {group}")]
    Entry {
        /// Group of the entry
        group: usize,
        /// Index of the entry inside its group
        index: usize,
    },
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
