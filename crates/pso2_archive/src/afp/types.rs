//! Base types for structure of AFP file.

use binrw::{BinRead, BinWrite};

use crate::error::{Error, Result};

/// Size of an [`AfpHeader`]
pub const AFP_HEADER_SIZE: u64 = 0x10;

/// Size of an [`AfpRecord`]
pub const AFP_RECORD_SIZE: u64 = 0x30;

/// AFP file header
///
/// Starts with the magic "afp\0". All data is stored in little endian format.
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(magic = b"afp\0", little)]
pub struct AfpHeader {
    /// Number of entries in the archive
    pub entries: u32,

    /// Always zero
    pub reserved: u32,

    /// Always one
    pub version: u32,
}

impl Default for AfpHeader {
    fn default() -> Self {
        Self {
            entries: 0,
            reserved: 0,
            version: 1,
        }
    }
}

impl AfpHeader {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.reserved != 0 {
            return Err(Error::invalid(
                "afp",
                format!("reserved header field is {:#x}", self.reserved),
            ));
        }
        if self.version != 1 {
            return Err(Error::invalid(
                "afp",
                format!("unknown header version {:#x}", self.version),
            ));
        }
        Ok(())
    }
}

/// AFP entry record
///
/// Precedes the data of every entry.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct AfpRecord {
    /// NUL padded file name
    pub name: [u8; 0x20],

    /// Size of the entry's data
    pub data_size: u32,

    /// Offset of the data from the start of this record
    pub data_offset: u32,

    /// Offset of the next record from the start of this record
    pub data_end: u32,

    /// NUL padded file type
    pub kind: [u8; 4],
}
