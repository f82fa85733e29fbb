//! Block storage and decompression handling.

use std::io::{self, Cursor, Read, Seek};

use pso2_io::Section;
use pso2_prs::PrsReader;
use tracing::instrument;

/// Identifies how a block of an archive is stored
///
/// ICE groups pick their method when written through [`crate::ice::IceWriter::start_group`]; the rewrite of a
/// modified archive chooses through [`crate::ice::IceWriterOptions`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Stores the data as it is
    #[default]
    None,

    /// Compress the data using PRS
    Prs,
}

/// A readable view of one block of an archive.
pub enum BlockReader<'a, R: Read + Seek> {
    /// Bytes stored as they are in the source
    Raw(Section<'a, R>),
    /// PRS stream in the source, decompressed while reading
    Compressed(Box<PrsReader<Section<'a, R>>>),
    /// Bytes held in memory, such as a pending replacement
    Memory(Cursor<&'a [u8]>),
}

impl<'a, R: Read + Seek> BlockReader<'a, R> {
    /// Open the block stored in `stored` bytes at `start`, which decodes to `size` bytes.
    #[instrument(skip(reader))]
    pub fn new(
        reader: &'a mut R,
        start: u64,
        stored: u64,
        size: u64,
        compression: CompressionMethod,
    ) -> io::Result<Self> {
        let section = Section::new(reader, start, stored)?;
        Ok(match compression {
            CompressionMethod::None => BlockReader::Raw(section),
            CompressionMethod::Prs => BlockReader::Compressed(Box::new(PrsReader::new(section, size))),
        })
    }

    /// View bytes that are already in memory.
    pub fn memory(data: &'a [u8]) -> Self {
        BlockReader::Memory(Cursor::new(data))
    }
}

impl<R: Read + Seek> Read for BlockReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BlockReader::Raw(r) => r.read(buf),
            BlockReader::Compressed(r) => r.read(buf),
            BlockReader::Memory(r) => r.read(buf),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        match self {
            BlockReader::Raw(r) => r.read_exact(buf),
            BlockReader::Compressed(r) => r.read_exact(buf),
            BlockReader::Memory(r) => r.read_exact(buf),
        }
    }
}

impl<R: Read + Seek> Seek for BlockReader<'_, R> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        match self {
            BlockReader::Raw(r) => r.seek(pos),
            BlockReader::Compressed(r) => r.seek(pos),
            BlockReader::Memory(r) => r.seek(pos),
        }
    }
}
