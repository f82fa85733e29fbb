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

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// RSA failure: {0}
    #[error("RSA failure: {0}")]
    #[diagnostic(code(pso2_net::rsa))]
    Rsa(#[from] rsa::Error),

    /// packet declares {size:#x} bytes
    #[error("packet declares {size:#x} bytes")]
    #[diagnostic(
        code(pso2_net::invalid_size),
        help("the stream is probably out of sync with its cipher")
    )]
    InvalidSize {
        /// Size from the packet header
        size: u32,
    },

    /// packet type {packet_type:#x} does not fit the header format
    #[error("packet type {packet_type:#x} does not fit the header format")]
    TypeOutOfRange {
        /// Type of the packet
        packet_type: u32,
    },

    /// the header format cannot carry flags {flags:#x}
    #[error("the header format cannot carry flags {flags:#x}")]
    UnsupportedFlags {
        /// Flags of the packet
        flags: u16,
    },

    /// expected a key of {expected} bytes, found {found}
    #[error("expected a key of {expected} bytes, found {found}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Provided length
        found: usize,
    },

    /// no {0} found
    #[error("no {0} found")]
    #[diagnostic(code(pso2_net::key_not_found))]
    KeyNotFound(&'static str),

    /// invalid {label} block: {reason}
    #[error("invalid {label} block: {reason}")]
    InvalidKey {
        /// PEM label of the block
        label: String,
        /// Parser message
        reason: String,
    },

    /// {0} has no destination
    #[error("{0} has no destination")]
    NoDestination(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
