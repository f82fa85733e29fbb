//! Types for reading AFP archives
//!

use binrw::BinRead;
use indexmap::IndexMap;
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    io::{Read, Seek, SeekFrom},
};
use tracing::{debug, instrument};

use crate::{
    compression::{BlockReader, CompressionMethod},
    error::{Error, FileNotFoundError, Result},
    header_error, read_replacement, trim_nul, Replacement,
};

use super::types::{AfpHeader, AfpRecord, AFP_HEADER_SIZE, AFP_RECORD_SIZE};

/// A struct for reading an entry from an AFP file
pub struct AfpFile<'a, R: Read + Seek> {
    data: &'a AfpEntryData,
    replaced: bool,
    reader: BlockReader<'a, R>,
}

impl<R: Read + Seek> Debug for AfpFile<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AfpFile({:#?})", self.data)
    }
}

/// Methods for retrieving information on AFP file entries
impl<R: Read + Seek> AfpFile<'_, R> {
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

    /// Get the size of the file, in bytes. Reflects a pending replacement.
    pub fn size(&self) -> u64 {
        match &self.reader {
            BlockReader::Memory(cursor) if self.replaced => cursor.get_ref().len() as u64,
            _ => self.data.size(),
        }
    }

    /// Whether the data comes from a pending replacement rather than the archive
    pub fn is_replaced(&self) -> bool {
        self.replaced
    }

    /// Get the starting offset of the file's data in the archive
    pub fn data_start(&self) -> u64 {
        self.data.data_start()
    }
}

impl<R: Read + Seek> Read for AfpFile<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Structure representing an AFP file entry.
#[derive(Debug, Clone, Default)]
pub struct AfpEntryData {
    /// Name of the file
    pub file_name: Box<str>,
    /// Raw file name. To be used when file_name was incorrectly decoded.
    pub file_name_raw: Box<[u8]>,
    /// Type of the file
    pub kind: Box<str>,
    /// The record exactly as stored
    pub record: AfpRecord,
    /// Specifies where the record of the file starts
    pub header_start: u64,
}

impl AfpEntryData {
    /// Size of the data
    pub fn size(&self) -> u64 {
        self.record.data_size as u64
    }

    /// Specifies where the data of the file starts
    pub fn data_start(&self) -> u64 {
        self.header_start + self.record.data_offset as u64
    }

    /// Total span of the entry, record and padding included
    pub fn entry_size(&self) -> u64 {
        self.record.data_end as u64
    }
}

/// AFP archive reader
///
/// The archive has to start at offset zero of the reader.
///
/// ```no_run
/// use std::io::prelude::*;
///
/// fn list_afp_contents(reader: impl Read + Seek) -> pso2_archive::error::Result<()> {
///     let mut afp = pso2_archive::AfpArchive::new(reader)?;
///
///     for i in 0..afp.len() {
///         let mut file = afp.by_index(i)?;
///         println!("Filename: {} ({})", file.name(), file.kind());
///         std::io::copy(&mut file, &mut std::io::stdout())?;
///     }
///
///     Ok(())
/// }
/// ```
pub struct AfpArchive<R> {
    pub(crate) reader: R,
    pub(crate) header: AfpHeader,
    pub(crate) files: Vec<AfpEntryData>,
    pub(crate) names: IndexMap<Box<str>, usize>,
    pub(crate) replacements: HashMap<usize, Replacement>,
}

impl<R> AfpArchive<R> {
    /// Number of entries contained in this AFP.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether this AFP archive contains no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The header as it was read
    pub fn header(&self) -> &AfpHeader {
        &self.header
    }

    /// Metadata of every entry, in archive order
    pub fn files(&self) -> impl Iterator<Item = &AfpEntryData> {
        self.files.iter()
    }

    /// Returns an iterator over all the file names in this archive.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.file_name.as_ref())
    }

    /// Get the index of the first entry with the given name, if it's present.
    #[inline(always)]
    pub fn index_for_name(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// Get the name of a file entry, if it's present.
    #[inline(always)]
    pub fn name_for_index(&self, index: usize) -> Option<&str> {
        self.files.get(index).map(|f| f.file_name.as_ref())
    }

    /// The pending change to an entry, if any
    pub fn replacement(&self, index: usize) -> Option<&Replacement> {
        self.replacements.get(&index)
    }

    /// Whether any entry has been replaced or removed since the archive was opened
    pub fn is_dirty(&self) -> bool {
        !self.replacements.is_empty()
    }

    /// Replace the data of an entry, or remove it with `None`.
    ///
    /// The change only affects [`AfpArchive::by_index`] and the next [`AfpArchive::write`].
    pub fn replace(&mut self, index: usize, data: Option<Vec<u8>>) -> Result<()> {
        if index >= self.files.len() {
            return Err(Error::FileNotFound(FileNotFoundError::Index(index)));
        }

        let replacement = match data {
            Some(data) => Replacement::Data(data),
            None => Replacement::Remove,
        };
        debug!(index, ?replacement, "replacing entry");
        self.replacements.insert(index, replacement);
        Ok(())
    }

    /// Replace the data of an entry with exactly `size` bytes taken from `reader`.
    pub fn replace_with_reader(
        &mut self,
        index: usize,
        reader: impl Read,
        size: u64,
    ) -> Result<()> {
        let data = read_replacement(reader, size)?;
        self.replace(index, Some(data))
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

impl<R: Read + Seek> AfpArchive<R> {
    /// Read an AFP archive collecting the entries it contains.
    #[instrument(skip(reader), err)]
    pub fn new(mut reader: R) -> Result<AfpArchive<R>> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let header = AfpHeader::read(&mut reader).map_err(header_error("afp"))?;
        header.validate()?;

        // Every record needs its own bytes, so a count the stream cannot hold is rejected before allocating.
        let records_end = AFP_HEADER_SIZE + header.entries as u64 * AFP_RECORD_SIZE;
        if records_end > stream_len {
            return Err(Error::invalid(
                "afp",
                format!(
                    "{} entries need {records_end:#x} bytes but the archive has {stream_len:#x}",
                    header.entries
                ),
            ));
        }

        let mut files = Vec::with_capacity(header.entries as usize);
        let mut names = IndexMap::with_capacity(header.entries as usize);

        let mut offset = AFP_HEADER_SIZE;
        for index in 0..header.entries as usize {
            reader.seek(SeekFrom::Start(offset))?;
            let record = AfpRecord::read(&mut reader)?;

            if (record.data_offset as u64) < AFP_RECORD_SIZE || (record.data_end as u64) < AFP_RECORD_SIZE {
                return Err(Error::invalid(
                    "afp",
                    format!(
                        "entry {index} places its data at {:#x} and its end at {:#x}, inside its own record",
                        record.data_offset, record.data_end
                    ),
                ));
            }

            let name_raw = trim_nul(&record.name);
            let file = AfpEntryData {
                file_name: String::from_utf8_lossy(name_raw).into(),
                file_name_raw: name_raw.into(),
                kind: String::from_utf8_lossy(trim_nul(&record.kind)).into(),
                record,
                header_start: offset,
            };
            debug!(index, name = %file.file_name, size = file.size(), "found entry");

            names.entry(file.file_name.clone()).or_insert(index);
            offset += file.entry_size();
            files.push(file);
        }

        Ok(AfpArchive {
            reader,
            header,
            files,
            names,
            replacements: HashMap::new(),
        })
    }

    /// Search for a file entry by name
    pub fn by_name(&mut self, name: &str) -> Result<AfpFile<'_, R>> {
        let Some(index) = self.index_for_name(name) else {
            return Err(Error::FileNotFound(FileNotFoundError::Name(
                name.to_owned(),
            )));
        };
        self.by_index(index)
    }

    /// Get a contained file by index
    pub fn by_index(&mut self, file_number: usize) -> Result<AfpFile<'_, R>> {
        let data = self
            .files
            .get(file_number)
            .ok_or(Error::FileNotFound(FileNotFoundError::Index(file_number)))?;

        if let Some(Replacement::Data(bytes)) = self.replacements.get(&file_number) {
            return Ok(AfpFile {
                data,
                replaced: true,
                reader: BlockReader::memory(bytes),
            });
        }

        Ok(AfpFile {
            data,
            replaced: false,
            reader: BlockReader::new(
                &mut self.reader,
                data.data_start(),
                data.size(),
                data.size(),
                CompressionMethod::None,
            )?,
        })
    }
}
