//! This library handles reading and rewriting the containers used by *Phantasy Star Online 2*: **AFP** and
//! **ICE** archives, generic tag chunks and **VTBF** models.
//!
//! # AFP Archive Format
//!
//! An AFP file is a flat list of entries preceded by a 16 byte header. All integers are little endian.
//!
//! | Offset (bytes) | Field      | Description                                  |
//! |----------------|------------|----------------------------------------------|
//! | 0x0000         | Magic      | 4 bytes: `afp\0`                             |
//! | 0x0004         | Entries    | 4 bytes: Number of entries                   |
//! | 0x0008         | Reserved   | 4 bytes: Always zero                         |
//! | 0x000C         | Version    | 4 bytes: Always one                          |
//!
//! The first entry starts right after the header. Each entry starts with a `0x30` byte record:
//!
//! | Offset (bytes) | Field       | Description                                           |
//! |----------------|-------------|-------------------------------------------------------|
//! | 0x0000         | Name        | 32 bytes: NUL padded file name                        |
//! | 0x0020         | Data Size   | 4 bytes: Size of the entry's data                     |
//! | 0x0024         | Data Offset | 4 bytes: Offset of the data from the record start     |
//! | 0x0028         | Data End    | 4 bytes: Offset of the next record from the record    |
//! | 0x002C         | Type        | 4 bytes: NUL padded file type                         |
//!
//! # ICE Archive Format
//!
//! An ICE file groups its entries in blocks which may be PRS compressed.
//!
//! | Offset (bytes) | Field        | Description                                       |
//! |----------------|--------------|---------------------------------------------------|
//! | 0x0000         | Magic        | 4 bytes: `ICE\0`                                  |
//! | 0x0004         | Reserved     | 4 bytes: Always zero                              |
//! | 0x0008         | Version      | 4 bytes: Always three                             |
//! | 0x000C         | Header Size  | 4 bytes: Always `0x20`                            |
//! | 0x0010         | Groups       | 4 bytes: Number of groups                         |
//! | 0x0014         | Flags        | 4 bytes: Always zero                              |
//! | 0x0018         | Archive Size | 4 bytes: Size of the whole archive                |
//! | 0x001C         | Reserved     | 4 bytes: Always zero                              |
//!
//! A table of `0x10` byte group records follows: uncompressed size, stored size (zero when the group is
//! stored raw), number of files and the CRC-32 of the stored bytes. Group data comes next, each group padded
//! to 16 bytes. Inside a decoded group every file has a `0x20` byte header (type, entry size, data size,
//! header size, name length) followed by the NUL terminated name, padded to 16 bytes, and the data.
//!
//! # Tag Chunks
//!
//! See [`tag`].
//!
//! # VTBF Models
//!
//! See [`model`].
//!

pub mod afp;
pub mod compression;
pub mod error;
pub mod ice;
pub mod model;
pub mod tag;

use std::io::Read;

pub use afp::{AfpArchive, AfpWriter};
pub use compression::CompressionMethod;
pub use ice::{IceArchive, IceWriter};
pub use model::Model;

use crate::error::{Error, Result};

/// A pending change to an archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// Drop the entry when the archive is written
    Remove,
    /// Substitute the entry's data
    Data(Vec<u8>),
}

/// Strip the NUL padding of a fixed size field.
pub fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// NUL pad `value` into a fixed size field.
pub(crate) fn fixed<const N: usize>(value: &str) -> Result<[u8; N]> {
    let bytes = value.as_bytes();
    if bytes.len() > N {
        return Err(Error::NameTooLong {
            name: value.to_owned(),
            limit: N,
        });
    }

    let mut field = [0u8; N];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

pub(crate) fn read_replacement(reader: impl Read, size: u64) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader.take(size).read_to_end(&mut data)?;
    if data.len() as u64 != size {
        return Err(Error::ShortReplacement {
            expected: size,
            actual: data.len() as u64,
        });
    }
    Ok(data)
}

/// Turns a magic mismatch into an invalid archive error.
pub(crate) fn header_error(format: &'static str) -> impl Fn(binrw::Error) -> Error {
    move |error| match error {
        binrw::Error::BadMagic { pos, .. } => Error::invalid(format, format!("bad magic at {pos:#x}")),
        error => Error::from(error),
    }
}
