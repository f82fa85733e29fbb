//! Types for writing AFP archives
//!

use binrw::{io::NoSeek, BinWrite};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::{debug, instrument, Level};

use pso2_io::{align, write_zeros};

use crate::error::{Error, Result};
use crate::{fixed, Replacement};

use super::read::AfpArchive;
use super::types::{AfpHeader, AfpRecord, AFP_RECORD_SIZE};

struct PendingEntry {
    name: [u8; 0x20],
    kind: [u8; 4],
    data: Vec<u8>,
}

/// AFP archive generator
///
/// The archive is assembled in memory and written out by [`AfpWriter::finish`].
///
/// ```
/// # fn doit() -> pso2_archive::error::Result<()>
/// # {
/// use std::io::Write;
/// use pso2_archive::AfpWriter;
///
/// let mut afp = AfpWriter::new(Vec::new());
///
/// afp.start_entry("hello_world.txt", "txt")?;
/// afp.write_all(b"Hello, World!")?;
///
/// let bytes = afp.finish()?;
/// assert_eq!(&bytes[..4], b"afp\0");
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct AfpWriter<W: Write> {
    inner: W,
    body: Vec<u8>,
    entries: u32,
    current: Option<PendingEntry>,
}

impl<W: Write> AfpWriter<W> {
    /// Initializes the archive.
    ///
    /// Before writing to this object, the [`AfpWriter::start_entry`] function should be called.
    pub fn new(inner: W) -> AfpWriter<W> {
        AfpWriter {
            inner,
            body: Vec::new(),
            entries: 0,
            current: None,
        }
    }

    /// Returns true if an entry is currently open for writing.
    pub const fn is_writing_entry(&self) -> bool {
        self.current.is_some()
    }

    /// Number of entries started so far
    pub fn entries(&self) -> u32 {
        self.entries
    }

    /// Start a new entry. Names hold up to 31 bytes and types up to 4.
    #[instrument(skip(self), err)]
    pub fn start_entry(&mut self, name: &str, kind: &str) -> Result<()> {
        // The name field always keeps a terminator
        if name.len() >= 0x20 {
            return Err(Error::NameTooLong {
                name: name.to_owned(),
                limit: 0x20,
            });
        }
        let name = fixed(name)?;
        let kind = fixed(kind)?;
        self.start_entry_fields(name, kind)
    }

    pub(crate) fn start_entry_fields(&mut self, name: [u8; 0x20], kind: [u8; 4]) -> Result<()> {
        self.finish_entry()?;
        self.entries += 1;
        self.current = Some(PendingEntry {
            name,
            kind,
            data: Vec::new(),
        });
        Ok(())
    }

    /// Append an entry exactly as it was stored in another archive, record included.
    pub fn raw_entry(&mut self, entry: &[u8]) -> Result<()> {
        self.finish_entry()?;
        self.entries += 1;
        self.body.extend_from_slice(entry);
        Ok(())
    }

    fn finish_entry(&mut self) -> Result<()> {
        let Some(entry) = self.current.take() else {
            return Ok(());
        };

        let end = align(AFP_RECORD_SIZE + entry.data.len() as u64, 16);
        let data_end = u32::try_from(end)
            .map_err(|_| Error::CustomError(format!("AFP entry of {} bytes is too large", entry.data.len())))?;

        let record = AfpRecord {
            name: entry.name,
            data_size: entry.data.len() as u32,
            data_offset: AFP_RECORD_SIZE as u32,
            data_end,
            kind: entry.kind,
        };
        record.write(&mut NoSeek::new(&mut self.body))?;
        self.body.extend_from_slice(&entry.data);
        write_zeros(&mut self.body, end - AFP_RECORD_SIZE - entry.data.len() as u64)?;

        Ok(())
    }

    /// Finish the last entry and write the archive to the inner writer.
    #[instrument(skip(self), err)]
    pub fn finish(mut self) -> Result<W> {
        self.finish_entry()?;

        let header = AfpHeader {
            entries: self.entries,
            ..Default::default()
        };
        header.write(&mut NoSeek::new(&mut self.inner))?;
        self.inner.write_all(&self.body)?;
        self.inner.flush()?;

        Ok(self.inner)
    }
}

impl<W: Write> Write for AfpWriter<W> {
    #[instrument(skip_all, err, ret(level = Level::TRACE), fields(size = buf.len()))]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.current.as_mut() {
            Some(entry) => {
                entry.data.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "No entry has been started",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<R: Read + Seek> AfpArchive<R> {
    /// Write the archive with every pending replacement applied.
    ///
    /// Untouched entries are copied byte for byte; a truncated final entry is copied as far as it goes.
    #[instrument(skip(self, sink), err)]
    pub fn write<W: Write>(&mut self, sink: W) -> Result<W> {
        let mut writer = AfpWriter::new(sink);
        let count = self.files.len();

        for (index, file) in self.files.iter().enumerate() {
            match self.replacements.get(&index) {
                Some(Replacement::Remove) => {
                    debug!(index, name = %file.file_name, "removing entry");
                }
                Some(Replacement::Data(data)) => {
                    debug!(index, name = %file.file_name, size = data.len(), "replacing entry");
                    writer.start_entry_fields(file.record.name, file.record.kind)?;
                    writer.write_all(data)?;
                }
                None => {
                    self.reader.seek(SeekFrom::Start(file.header_start))?;
                    let mut raw = Vec::with_capacity(file.entry_size() as usize);
                    (&mut self.reader)
                        .take(file.entry_size())
                        .read_to_end(&mut raw)?;

                    if (raw.len() as u64) < file.entry_size() && index + 1 != count {
                        return Err(Error::invalid(
                            "afp",
                            format!("entry {index} ends past the end of the archive"),
                        ));
                    }
                    writer.raw_entry(&raw)?;
                }
            }
        }

        writer.finish()
    }
}
