//! Base types for structure of ICE file.

use binrw::{BinRead, BinWrite};

use pso2_io::align;

use crate::compression::CompressionMethod;
use crate::error::{Error, Result};

/// Size of an [`IceHeader`]
pub const ICE_HEADER_SIZE: u64 = 0x20;

/// Size of an [`IceGroupRecord`]
pub const ICE_GROUP_RECORD_SIZE: u64 = 0x10;

/// Size of an [`IceFileHeader`], without the name that follows it
pub const ICE_FILE_HEADER_SIZE: u64 = 0x20;

/// ICE file header
///
/// Starts with the magic "ICE\0". All data is stored in little endian format.
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(magic = b"ICE\0", little)]
pub struct IceHeader {
    /// Always zero
    pub reserved: u32,

    /// Always three
    pub version: u32,

    /// Always `0x20`
    pub header_size: u32,

    /// Number of groups in the archive
    pub groups: u32,

    /// Always zero
    pub flags: u32,

    /// Size of the whole archive, padding included
    pub archive_size: u32,

    /// Always zero
    pub reserved2: u32,
}

impl Default for IceHeader {
    fn default() -> Self {
        Self {
            reserved: 0,
            version: 3,
            header_size: ICE_HEADER_SIZE as u32,
            groups: 0,
            flags: 0,
            archive_size: ICE_HEADER_SIZE as u32,
            reserved2: 0,
        }
    }
}

impl IceHeader {
    pub(crate) fn validate(&self) -> Result<()> {
        let expected = IceHeader {
            groups: self.groups,
            archive_size: self.archive_size,
            ..Default::default()
        };
        if *self != expected {
            return Err(Error::invalid(
                "ice",
                format!("unsupported header {self:x?}"),
            ));
        }
        Ok(())
    }

    /// Offset of the first group's data
    pub fn data_start(&self) -> u64 {
        ICE_HEADER_SIZE + ICE_GROUP_RECORD_SIZE * self.groups as u64
    }
}

/// ICE group record
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct IceGroupRecord {
    /// Size of the group once decoded
    pub uncompressed_size: u32,

    /// Size of the PRS stream, zero when the group is stored raw
    pub stored_size: u32,

    /// Number of files in the group
    pub files: u32,

    /// A [`crc::CRC_32_ISO_HDLC`] checksum of the stored bytes
    pub checksum: u32,
}

impl IceGroupRecord {
    /// How the group is stored
    pub fn compression(&self) -> CompressionMethod {
        match self.stored_size {
            0 => CompressionMethod::None,
            _ => CompressionMethod::Prs,
        }
    }

    /// Number of bytes the group occupies in the archive, without padding
    pub fn stored_len(&self) -> u64 {
        match self.compression() {
            CompressionMethod::None => self.uncompressed_size as u64,
            CompressionMethod::Prs => self.stored_size as u64,
        }
    }

    /// Number of bytes the group occupies in the archive, with padding
    pub fn padded_len(&self) -> u64 {
        align(self.stored_len(), 16)
    }
}

/// Header of a file inside a decoded group
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct IceFileHeader {
    /// NUL padded file type
    pub kind: [u8; 4],

    /// Offset of the next file from the start of this header
    pub entry_size: u32,

    /// Size of the file's data
    pub data_size: u32,

    /// Offset of the data from the start of this header
    pub header_size: u32,

    /// Length of the name, terminator included
    pub name_length: u32,

    /// Always zero
    pub reserved: [u8; 0xC],
}

impl IceFileHeader {
    /// Header for a file named with `name_length` bytes (without terminator) carrying `data_size` bytes.
    pub fn for_file(kind: [u8; 4], name_length: usize, data_size: usize) -> Result<IceFileHeader> {
        let name_length = name_length as u64 + 1;
        let header_size = ICE_FILE_HEADER_SIZE + align(name_length, 16);
        let entry_size = align(header_size + data_size as u64, 16);

        let entry_size = u32::try_from(entry_size)
            .map_err(|_| Error::CustomError(format!("ICE file of {data_size} bytes is too large")))?;

        Ok(IceFileHeader {
            kind,
            entry_size,
            data_size: data_size as u32,
            header_size: header_size as u32,
            name_length: name_length as u32,
            reserved: [0; 0xC],
        })
    }

    pub(crate) fn validate(&self, group: usize, index: usize) -> Result<()> {
        let header_size = self.header_size as u64;
        if self.name_length == 0
            || header_size < ICE_FILE_HEADER_SIZE + self.name_length as u64
            || (self.entry_size as u64) < header_size + self.data_size as u64
        {
            return Err(Error::invalid(
                "ice",
                format!("file {index} of group {group} has an inconsistent header {self:x?}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::{BinRead, BinWrite};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fixed;

    #[test]
    fn read_header() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x49, 0x43, 0x45, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x03, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]);

        let header = IceHeader::read(&mut input)?;
        assert_eq!(header.groups, 2);
        assert_eq!(header.archive_size, 0x80);
        assert_eq!(header.data_start(), 0x40);
        header.validate()?;

        let header = IceHeader {
            version: 4,
            ..header
        };
        assert!(header.validate().is_err());

        Ok(())
    }

    #[test]
    fn group_storage() {
        let raw = IceGroupRecord {
            uncompressed_size: 0x31,
            ..Default::default()
        };
        assert_eq!(raw.compression(), CompressionMethod::None);
        assert_eq!(raw.stored_len(), 0x31);
        assert_eq!(raw.padded_len(), 0x40);

        let compressed = IceGroupRecord {
            uncompressed_size: 0x31,
            stored_size: 0x12,
            ..Default::default()
        };
        assert_eq!(compressed.compression(), CompressionMethod::Prs);
        assert_eq!(compressed.padded_len(), 0x20);
    }

    #[test]
    fn file_header_sizes() -> Result<()> {
        let header = IceFileHeader::for_file(fixed("txt")?, "hello.txt".len(), 5)?;
        assert_eq!(header.name_length, 10);
        assert_eq!(header.header_size, 0x30);
        assert_eq!(header.entry_size, 0x40);
        header.validate(0, 0)?;

        let mut output = Cursor::new(Vec::new());
        header.write(&mut output)?;
        assert_eq!(output.get_ref().len(), 0x20);
        assert_eq!(&output.get_ref()[..4], b"txt\0");

        let header = IceFileHeader::for_file(fixed("bin")?, 15, 0x10)?;
        assert_eq!(header.header_size, 0x30);
        assert_eq!(header.entry_size, 0x40);

        let broken = IceFileHeader {
            entry_size: 0x20,
            ..header
        };
        assert!(broken.validate(0, 0).is_err());

        Ok(())
    }
}
