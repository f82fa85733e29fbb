//! Types for reading ICE archives
//!

use binrw::BinRead;
use indexmap::IndexMap;
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    io::{self, Read, Seek, SeekFrom},
};
use tracing::{debug, instrument, warn};

use pso2_io::Section;

use crate::{
    compression::{BlockReader, CompressionMethod},
    error::{Error, FileNotFoundError, Result},
    header_error, read_replacement, trim_nul, Replacement,
};

use super::types::{IceFileHeader, IceGroupRecord, IceHeader, ICE_GROUP_RECORD_SIZE, ICE_HEADER_SIZE};

pub(crate) const CHECKSUM: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Locates a file inside an ICE archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IceFileHandle {
    /// Group holding the file
    pub group: usize,
    /// Position of the file inside its group
    pub index: usize,
}

impl fmt::Display for IceFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.index)
    }
}

/// A struct for reading an entry from an ICE file
pub struct IceFile<'a, R: Read + Seek> {
    data: &'a IceEntryData,
    handle: IceFileHandle,
    replaced: bool,
    reader: io::Take<BlockReader<'a, R>>,
}

impl<R: Read + Seek> Debug for IceFile<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IceFile({}, {:#?})", self.handle, self.data)
    }
}

/// Methods for retrieving information on ICE file entries
impl<R: Read + Seek> IceFile<'_, R> {
    /// Get the name of the file
    ///
    /// # Warnings
    ///
    /// It is dangerous to use this name directly when extracting an archive. It may contain an absolute path
    /// or break out of the current directory (`../runtime`).
    pub fn name(&self) -> &str {
        &self.data.file_name
    }

    /// Get the name of the file, in the raw (internal) byte representation.
    pub fn name_raw(&self) -> &[u8] {
        &self.data.file_name_raw
    }

    /// Get the four character type of the file
    pub fn kind(&self) -> &str {
        &self.data.kind
    }

    /// Where the file lives in the archive
    pub fn handle(&self) -> IceFileHandle {
        self.handle
    }

    /// Get the size of the file, in bytes. Reflects a pending replacement.
    pub fn size(&self) -> u64 {
        match self.reader.get_ref() {
            BlockReader::Memory(cursor) if self.replaced => cursor.get_ref().len() as u64,
            _ => self.data.size(),
        }
    }

    /// Whether the data comes from a pending replacement rather than the archive
    pub fn is_replaced(&self) -> bool {
        self.replaced
    }
}

impl<R: Read + Seek> Read for IceFile<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Structure representing a file inside an ICE group.
#[derive(Debug, Clone, Default)]
pub struct IceEntryData {
    /// Name of the file
    pub file_name: Box<str>,
    /// Raw file name. To be used when file_name was incorrectly decoded.
    pub file_name_raw: Box<[u8]>,
    /// Type of the file
    pub kind: Box<str>,
    /// The file header exactly as stored
    pub header: IceFileHeader,
    /// Offset of the file header inside the decoded group
    pub entry_start: u64,
}

impl IceEntryData {
    /// Size of the data
    pub fn size(&self) -> u64 {
        self.header.data_size as u64
    }

    /// Offset of the data inside the decoded group
    pub fn data_start(&self) -> u64 {
        self.entry_start + self.header.header_size as u64
    }

    /// Span of the file inside the decoded group, header and padding included
    pub fn entry_size(&self) -> u64 {
        self.header.entry_size as u64
    }
}

/// Structure representing a group of an ICE archive.
#[derive(Debug, Clone, Default)]
pub struct IceGroupData {
    /// The group record exactly as stored
    pub record: IceGroupRecord,
    /// Offset of the stored bytes in the archive
    pub stored_start: u64,
    /// Files of the group, in order
    pub files: Vec<IceEntryData>,
    names: IndexMap<Box<str>, usize>,
}

impl IceGroupData {
    /// How the group is stored
    pub fn compression(&self) -> CompressionMethod {
        self.record.compression()
    }

    /// Size of the decoded group
    pub fn size(&self) -> u64 {
        self.record.uncompressed_size as u64
    }

    fn open<'a, R: Read + Seek>(&self, reader: &'a mut R) -> io::Result<BlockReader<'a, R>> {
        BlockReader::new(
            reader,
            self.stored_start,
            self.record.stored_len(),
            self.size(),
            self.compression(),
        )
    }
}

/// ICE archive reader
///
/// The archive has to start at offset zero of the reader. Files are addressed by group and position through
/// [`IceFileHandle`]; names are only unique inside a group.
///
/// ```no_run
/// use std::io::prelude::*;
///
/// fn list_ice_contents(reader: impl Read + Seek) -> pso2_archive::error::Result<()> {
///     let mut ice = pso2_archive::IceArchive::new(reader)?;
///
///     let handles = ice.files().map(|(handle, _)| handle).collect::<Vec<_>>();
///     for handle in handles {
///         let mut file = ice.by_index(handle)?;
///         println!("{}: {} ({} bytes)", handle, file.name(), file.size());
///         std::io::copy(&mut file, &mut std::io::sink())?;
///     }
///
///     Ok(())
/// }
/// ```
pub struct IceArchive<R> {
    pub(crate) reader: R,
    pub(crate) header: IceHeader,
    pub(crate) groups: Vec<IceGroupData>,
    pub(crate) replacements: HashMap<IceFileHandle, Replacement>,
}

impl<R> IceArchive<R> {
    /// Number of files in all groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }

    /// Whether the archive contains no files
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The header as it was read
    pub fn header(&self) -> &IceHeader {
        &self.header
    }

    /// Number of groups
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of files in a group, if it exists
    pub fn group_len(&self, group: usize) -> Option<usize> {
        self.groups.get(group).map(|g| g.files.len())
    }

    /// Metadata of every group
    pub fn groups(&self) -> impl Iterator<Item = &IceGroupData> {
        self.groups.iter()
    }

    /// Every file of every group, in archive order
    pub fn files(&self) -> impl Iterator<Item = (IceFileHandle, &IceEntryData)> {
        self.groups.iter().enumerate().flat_map(|(group, data)| {
            data.files
                .iter()
                .enumerate()
                .map(move |(index, file)| (IceFileHandle { group, index }, file))
        })
    }

    /// Get the handle of the first file of `group` with the given name.
    pub fn find(&self, group: usize, name: &str) -> Option<IceFileHandle> {
        let index = *self.groups.get(group)?.names.get(name)?;
        Some(IceFileHandle { group, index })
    }

    /// Get the handle of the first file with the given name, searching every group in order.
    pub fn find_any(&self, name: &str) -> Option<IceFileHandle> {
        (0..self.groups.len()).find_map(|group| self.find(group, name))
    }

    /// Get the metadata of a file.
    pub fn entry(&self, handle: IceFileHandle) -> Result<&IceEntryData> {
        self.groups
            .get(handle.group)
            .and_then(|g| g.files.get(handle.index))
            .ok_or(Error::FileNotFound(FileNotFoundError::Entry {
                group: handle.group,
                index: handle.index,
            }))
    }

    /// The pending change to a file, if any
    pub fn replacement(&self, handle: IceFileHandle) -> Option<&Replacement> {
        self.replacements.get(&handle)
    }

    /// Whether any file has been replaced or removed since the archive was opened
    pub fn is_dirty(&self) -> bool {
        !self.replacements.is_empty()
    }

    pub(crate) fn is_group_dirty(&self, group: usize) -> bool {
        self.replacements.keys().any(|handle| handle.group == group)
    }

    /// Replace the data of a file, or remove it with `None`.
    ///
    /// The change only affects [`IceArchive::by_index`] and the next [`IceArchive::write`].
    pub fn replace(&mut self, handle: IceFileHandle, data: Option<Vec<u8>>) -> Result<()> {
        self.entry(handle)?;

        let replacement = match data {
            Some(data) => Replacement::Data(data),
            None => Replacement::Remove,
        };
        debug!(%handle, ?replacement, "replacing file");
        self.replacements.insert(handle, replacement);
        Ok(())
    }

    /// Replace the data of a file with exactly `size` bytes taken from `reader`.
    pub fn replace_with_reader(
        &mut self,
        handle: IceFileHandle,
        reader: impl Read,
        size: u64,
    ) -> Result<()> {
        let data = read_replacement(reader, size)?;
        self.replace(handle, Some(data))
    }

    /// Forget every pending replacement.
    pub fn clear_replacements(&mut self) {
        self.replacements.clear();
    }

    /// Unwrap and return the inner reader object
    ///
    /// The position of the reader is undefined.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn stored_checksum<R: Read + Seek>(reader: &mut R, start: u64, len: u64) -> io::Result<u32> {
    let mut section = Section::new(reader, start, len)?;
    let mut digest = CHECKSUM.digest();
    let mut buffer = [0u8; 0x4000];
    loop {
        let read = section.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        digest.update(&buffer[..read]);
    }
    if section.remaining() != 0 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(digest.finalize())
}

fn read_group_files<R: Read + Seek>(
    reader: &mut R,
    group: usize,
    data: &mut IceGroupData,
) -> Result<()> {
    let mut block = data.open(reader)?;
    let mut position = 0;

    for index in 0..data.record.files as usize {
        block.seek(SeekFrom::Start(position))?;
        let header = IceFileHeader::read(&mut block)?;
        header.validate(group, index)?;

        let end = position + header.entry_size as u64;
        if end > data.size() {
            return Err(Error::invalid(
                "ice",
                format!("file {index} of group {group} ends past the group ({end:#x} > {:#x})", data.size()),
            ));
        }

        let mut name = Vec::new();
        (&mut block).take(header.name_length as u64).read_to_end(&mut name)?;
        if name.len() != header.name_length as usize {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        let name_raw = trim_nul(&name);

        let file = IceEntryData {
            file_name: String::from_utf8_lossy(name_raw).into(),
            file_name_raw: name_raw.into(),
            kind: String::from_utf8_lossy(trim_nul(&header.kind)).into(),
            header,
            entry_start: position,
        };
        debug!(group, index, name = %file.file_name, size = file.size(), "found file");

        position = end;

        data.names.entry(file.file_name.clone()).or_insert(index);
        data.files.push(file);
    }

    if position != data.size() {
        warn!(group, position, size = data.size(), "group has trailing bytes");
    }

    Ok(())
}

impl<R: Read + Seek> IceArchive<R> {
    /// Read an ICE archive, verifying every group and collecting the files it contains.
    #[instrument(skip(reader), err)]
    pub fn new(mut reader: R) -> Result<IceArchive<R>> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let header = IceHeader::read(&mut reader).map_err(header_error("ice"))?;
        header.validate()?;

        let table_end = ICE_HEADER_SIZE + ICE_GROUP_RECORD_SIZE * header.groups as u64;
        if table_end > stream_len {
            return Err(Error::invalid(
                "ice",
                format!("{} groups need {table_end:#x} bytes but the archive has {stream_len:#x}", header.groups),
            ));
        }

        let records = (0..header.groups)
            .map(|_| IceGroupRecord::read(&mut reader))
            .collect::<binrw::BinResult<Vec<_>>>()?;

        let mut groups = Vec::with_capacity(records.len());
        let mut offset = ICE_HEADER_SIZE + ICE_GROUP_RECORD_SIZE * records.len() as u64;

        for (group, record) in records.into_iter().enumerate() {
            let computed = stored_checksum(&mut reader, offset, record.stored_len())?;
            if computed != record.checksum {
                return Err(Error::ChecksumMismatch {
                    group,
                    stored: record.checksum,
                    computed,
                });
            }

            let mut data = IceGroupData {
                record,
                stored_start: offset,
                ..Default::default()
            };
            read_group_files(&mut reader, group, &mut data)?;
            debug!(group, files = data.files.len(), compression = ?data.compression(), "read group");

            offset += record.padded_len();
            groups.push(data);
        }

        if offset != header.archive_size as u64 {
            return Err(Error::invalid(
                "ice",
                format!("header declares {:#x} bytes but the groups end at {offset:#x}", header.archive_size),
            ));
        }

        Ok(IceArchive {
            reader,
            header,
            groups,
            replacements: HashMap::new(),
        })
    }

    /// Search for a file of a group by name
    pub fn by_name(&mut self, group: usize, name: &str) -> Result<IceFile<'_, R>> {
        let Some(handle) = self.find(group, name) else {
            return Err(Error::FileNotFound(FileNotFoundError::Name(
                name.to_owned(),
            )));
        };
        self.by_index(handle)
    }

    /// Get a contained file
    pub fn by_index(&mut self, handle: IceFileHandle) -> Result<IceFile<'_, R>> {
        let missing = || {
            Error::FileNotFound(FileNotFoundError::Entry {
                group: handle.group,
                index: handle.index,
            })
        };
        let group = self.groups.get(handle.group).ok_or_else(missing)?;
        let data = group.files.get(handle.index).ok_or_else(missing)?;

        if let Some(Replacement::Data(bytes)) = self.replacements.get(&handle) {
            return Ok(IceFile {
                data,
                handle,
                replaced: true,
                reader: BlockReader::memory(bytes).take(bytes.len() as u64),
            });
        }

        let mut block = group.open(&mut self.reader)?;
        block.seek(SeekFrom::Start(data.data_start()))?;
        Ok(IceFile {
            data,
            handle,
            replaced: false,
            reader: block.take(data.size()),
        })
    }

    /// Decode a whole group.
    pub fn group_bytes(&mut self, group: usize) -> Result<Vec<u8>> {
        let data = self.groups.get(group).ok_or(Error::FileNotFound(FileNotFoundError::Index(group)))?;
        let mut bytes = Vec::new();
        data.open(&mut self.reader)?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Read the stored (possibly compressed) bytes of a group.
    pub fn stored_bytes(&mut self, group: usize) -> Result<Vec<u8>> {
        let data = self.groups.get(group).ok_or(Error::FileNotFound(FileNotFoundError::Index(group)))?;
        let mut bytes = Vec::new();
        Section::new(&mut self.reader, data.stored_start, data.record.stored_len())?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
