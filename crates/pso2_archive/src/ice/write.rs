//! Types for writing ICE archives
//!

use binrw::{io::NoSeek, BinWrite};
use bon::Builder;
use std::io::{self, Read, Seek, Write};
use tracing::{debug, instrument, Level};

use pso2_io::{padding, write_zeros};

use crate::compression::CompressionMethod;
use crate::error::{Error, Result};
use crate::{fixed, Replacement};

use super::read::{IceArchive, CHECKSUM};
use super::types::{IceFileHeader, IceGroupRecord, IceHeader};

/// Options for how a modified ICE archive should be written
#[derive(Debug, Clone, Copy, Default, Builder)]
pub struct IceWriterOptions {
    /// PRS compress the groups that had to be rebuilt. Untouched groups keep their stored bytes.
    #[builder(default)]
    pub compress_modified: bool,
}

struct PendingFile {
    name: Vec<u8>,
    kind: [u8; 4],
    data: Vec<u8>,
}

struct PendingGroup {
    compression: CompressionMethod,
    body: Vec<u8>,
    files: u32,
}

/// ICE archive generator
///
/// ```
/// # fn doit() -> pso2_archive::error::Result<()>
/// # {
/// use std::io::Write;
/// use pso2_archive::{CompressionMethod, IceWriter};
///
/// let mut ice = IceWriter::new(Vec::new());
///
/// ice.start_group(CompressionMethod::Prs)?;
/// ice.start_file("hello_world.txt", "txt")?;
/// ice.write_all(b"Hello, World!")?;
///
/// let bytes = ice.finish()?;
/// assert_eq!(&bytes[..4], b"ICE\0");
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct IceWriter<W: Write> {
    inner: W,
    groups: Vec<(IceGroupRecord, Vec<u8>)>,
    current_group: Option<PendingGroup>,
    current_file: Option<PendingFile>,
}

impl<W: Write> IceWriter<W> {
    /// Initializes the archive.
    ///
    /// Files go into the group opened by the last call to [`IceWriter::start_group`].
    pub fn new(inner: W) -> IceWriter<W> {
        IceWriter {
            inner,
            groups: Vec::new(),
            current_group: None,
            current_file: None,
        }
    }

    /// Returns true if a file is currently open for writing.
    pub const fn is_writing_file(&self) -> bool {
        self.current_file.is_some()
    }

    /// Start a new group stored with the requested compression.
    #[instrument(skip(self), err)]
    pub fn start_group(&mut self, compression: CompressionMethod) -> Result<()> {
        self.finish_group()?;
        self.current_group = Some(PendingGroup {
            compression,
            body: Vec::new(),
            files: 0,
        });
        Ok(())
    }

    /// Append a group exactly as it was stored in another archive.
    pub fn raw_group(&mut self, record: IceGroupRecord, stored: Vec<u8>) -> Result<()> {
        self.finish_group()?;
        if stored.len() as u64 != record.stored_len() {
            return Err(Error::CustomError(format!(
                "group stores {} bytes but its record declares {}",
                stored.len(),
                record.stored_len()
            )));
        }
        self.groups.push((record, stored));
        Ok(())
    }

    /// Start a new file in the current group. Types hold up to 4 bytes.
    #[instrument(skip(self), err)]
    pub fn start_file(&mut self, name: &str, kind: &str) -> Result<()> {
        self.start_file_fields(name.as_bytes(), fixed(kind)?)
    }

    pub(crate) fn start_file_fields(&mut self, name: &[u8], kind: [u8; 4]) -> Result<()> {
        self.finish_file()?;
        let group = self.group()?;
        group.files += 1;
        self.current_file = Some(PendingFile {
            name: name.to_vec(),
            kind,
            data: Vec::new(),
        });
        Ok(())
    }

    /// Append a file exactly as it was laid out in a decoded group, header included.
    pub fn raw_file(&mut self, entry: &[u8]) -> Result<()> {
        self.finish_file()?;
        let group = self.group()?;
        group.files += 1;
        group.body.extend_from_slice(entry);
        Ok(())
    }

    fn group(&mut self) -> Result<&mut PendingGroup> {
        self.current_group
            .as_mut()
            .ok_or_else(|| Error::CustomError("no group has been started".into()))
    }

    fn finish_file(&mut self) -> Result<()> {
        let Some(file) = self.current_file.take() else {
            return Ok(());
        };

        let header = IceFileHeader::for_file(file.kind, file.name.len(), file.data.len())?;
        let group = self.group()?;
        let body = &mut group.body;

        header.write(&mut NoSeek::new(&mut *body))?;
        body.extend_from_slice(&file.name);
        write_zeros(body, header.header_size as u64 - 0x20 - file.name.len() as u64)?;
        body.extend_from_slice(&file.data);
        write_zeros(
            body,
            (header.entry_size - header.header_size - header.data_size) as u64,
        )?;

        Ok(())
    }

    fn finish_group(&mut self) -> Result<()> {
        self.finish_file()?;
        let Some(group) = self.current_group.take() else {
            return Ok(());
        };

        let uncompressed_size = u32::try_from(group.body.len())
            .map_err(|_| Error::CustomError(format!("ICE group of {} bytes is too large", group.body.len())))?;

        let (stored_size, stored) = match group.compression {
            CompressionMethod::None => (0, group.body),
            CompressionMethod::Prs => {
                let stored = pso2_prs::compress(&group.body)?;
                (stored.len() as u32, stored)
            }
        };

        let record = IceGroupRecord {
            uncompressed_size,
            stored_size,
            files: group.files,
            checksum: CHECKSUM.checksum(&stored),
        };
        debug!(?record, "finished group");
        self.groups.push((record, stored));

        Ok(())
    }

    /// Finish the last group and write the archive to the inner writer.
    #[instrument(skip(self), err)]
    pub fn finish(mut self) -> Result<W> {
        self.finish_group()?;

        let mut header = IceHeader {
            groups: self.groups.len() as u32,
            ..Default::default()
        };
        let archive_size = header.data_start()
            + self
                .groups
                .iter()
                .map(|(record, _)| record.padded_len())
                .sum::<u64>();
        header.archive_size = u32::try_from(archive_size)
            .map_err(|_| Error::CustomError(format!("ICE archive of {archive_size} bytes is too large")))?;

        let mut output = NoSeek::new(&mut self.inner);
        header.write(&mut output)?;
        for (record, _) in &self.groups {
            record.write(&mut output)?;
        }
        for (_, stored) in &self.groups {
            output.write_all(stored)?;
            write_zeros(&mut output, padding(stored.len() as u64, 16))?;
        }
        self.inner.flush()?;

        Ok(self.inner)
    }
}

impl<W: Write> Write for IceWriter<W> {
    #[instrument(skip_all, err, ret(level = Level::TRACE), fields(size = buf.len()))]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.current_file.as_mut() {
            Some(file) => {
                file.data.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "No file has been started",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<R: Read + Seek> IceArchive<R> {
    /// Write the archive with every pending replacement applied.
    ///
    /// Groups without replacements are copied as stored. The others are rebuilt, copying their untouched files
    /// byte for byte.
    #[instrument(skip(self, sink), err)]
    pub fn write<W: Write>(&mut self, sink: W, options: IceWriterOptions) -> Result<W> {
        let mut writer = IceWriter::new(sink);

        for group in 0..self.groups.len() {
            if !self.is_group_dirty(group) {
                let stored = self.stored_bytes(group)?;
                writer.raw_group(self.groups[group].record, stored)?;
                continue;
            }

            let decoded = self.group_bytes(group)?;
            let compression = match options.compress_modified {
                true => CompressionMethod::Prs,
                false => CompressionMethod::None,
            };
            debug!(group, ?compression, "rebuilding group");
            writer.start_group(compression)?;

            for (index, file) in self.groups[group].files.iter().enumerate() {
                let handle = super::IceFileHandle { group, index };
                match self.replacements.get(&handle) {
                    Some(Replacement::Remove) => {
                        debug!(%handle, name = %file.file_name, "removing file");
                    }
                    Some(Replacement::Data(data)) => {
                        debug!(%handle, name = %file.file_name, size = data.len(), "replacing file");
                        writer.start_file_fields(&file.file_name_raw, file.header.kind)?;
                        writer.write_all(data)?;
                    }
                    None => {
                        let start = file.entry_start as usize;
                        let end = start + file.entry_size() as usize;
                        let raw = decoded.get(start..end).ok_or_else(|| {
                            Error::invalid("ice", format!("file {handle} ends past its group"))
                        })?;
                        writer.raw_file(raw)?;
                    }
                }
            }
        }

        writer.finish()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::io::{Cursor, Read, Write};

    use pretty_assertions::{assert_eq, assert_str_eq};
    use tracing_test::traced_test;

    use super::IceWriterOptions;
    use crate::error::{Error, Result};
    use crate::ice::IceFileHandle;
    use crate::{CompressionMethod, IceArchive, IceWriter};

    #[rustfmt::skip]
    pub(crate) const ONE_FILE: [u8; 0x70] = [
        // Header
        0x49, 0x43, 0x45, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x03, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00,
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x70, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        // Group record
        0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x01, 0x00, 0x00, 0x00, 0x01, 0xA1, 0x8E, 0x4C,
        // File header
        b't', b'x', b't', 0x00, 0x40, 0x00, 0x00, 0x00,
        0x05, 0x00, 0x00, 0x00, 0x30, 0x00, 0x00, 0x00,
        0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        // Name
        b'a', b'.', b't', b'x', b't', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        // Data
        b'h', b'e', b'l', b'l', b'o', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ];

    #[traced_test]
    #[test]
    fn ice_empty_write() -> Result<()> {
        #[rustfmt::skip]
        let expected = vec![
            0x49, 0x43, 0x45, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x03, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let result = IceWriter::new(Vec::new()).finish()?;
        assert_eq!(result, expected);
        Ok(())
    }

    #[traced_test]
    #[test]
    fn ice_uncompressed_write() -> Result<()> {
        let mut writer = IceWriter::new(Vec::new());
        writer.start_group(CompressionMethod::None)?;
        writer.start_file("a.txt", "txt")?;
        writer.write_all(b"hello")?;

        let result = writer.finish()?;
        assert_str_eq!(format!("{:02X?}", result), format!("{:02X?}", ONE_FILE));
        Ok(())
    }

    #[test]
    fn ice_file_without_group() {
        let mut writer = IceWriter::new(Vec::new());
        assert!(writer.start_file("a.txt", "txt").is_err());
        assert!(writer.write_all(b"data").is_err());
    }

    #[traced_test]
    #[test]
    fn ice_read_fixture() -> Result<()> {
        let mut archive = IceArchive::new(Cursor::new(ONE_FILE))?;
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.group_count(), 1);
        assert_eq!(archive.group_len(0), Some(1));
        assert_eq!(archive.group_len(1), None);

        let mut data = Vec::new();
        let mut file = archive.by_name(0, "a.txt")?;
        assert_eq!(file.kind(), "txt");
        assert_eq!(file.handle(), IceFileHandle { group: 0, index: 0 });
        file.read_to_end(&mut data)?;
        assert_eq!(data, b"hello");

        assert!(archive.by_name(0, "b.txt").is_err());
        assert!(archive.by_index(IceFileHandle { group: 1, index: 0 }).is_err());

        Ok(())
    }

    #[test]
    fn ice_reject_corruption() {
        let mut corrupted = ONE_FILE;
        corrupted[0x6A] = b'H';
        assert!(matches!(
            IceArchive::new(Cursor::new(corrupted)),
            Err(Error::ChecksumMismatch { group: 0, .. })
        ));

        let mut resized = ONE_FILE;
        resized[0x18] = 0x80;
        assert!(matches!(
            IceArchive::new(Cursor::new(resized)),
            Err(Error::InvalidArchive { .. })
        ));

        assert!(IceArchive::new(Cursor::new(&ONE_FILE[..0x50])).is_err());
    }

    #[traced_test]
    #[test]
    fn ice_reject_sizes_past_the_archive() {
        let mut groups = ONE_FILE;
        groups[0x10..0x14].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            IceArchive::new(Cursor::new(groups)),
            Err(Error::InvalidArchive { format: "ice", .. })
        ));

        // A consistent file header whose name alone is far larger than its group
        let mut named = ONE_FILE;
        named[0x34..0x38].copy_from_slice(&0x7FFF_0030u32.to_le_bytes());
        named[0x3C..0x40].copy_from_slice(&0x7FFF_0020u32.to_le_bytes());
        named[0x40..0x44].copy_from_slice(&0x7FFF_0000u32.to_le_bytes());
        let checksum = crate::ice::read::CHECKSUM.checksum(&named[0x30..]);
        named[0x2C..0x30].copy_from_slice(&checksum.to_le_bytes());
        assert!(matches!(
            IceArchive::new(Cursor::new(named)),
            Err(Error::InvalidArchive { format: "ice", .. })
        ));
    }

    fn sample() -> Result<Vec<u8>> {
        let mut writer = IceWriter::new(Vec::new());

        writer.start_group(CompressionMethod::Prs)?;
        writer.start_file("first.txt", "txt")?;
        writer.write_all(&b"abcdefgh".repeat(40))?;
        writer.start_file("second.bin", "bin")?;
        writer.write_all(&[0x55; 0x33])?;

        writer.start_group(CompressionMethod::None)?;
        writer.start_file("first.txt", "txt")?;
        writer.write_all(b"other group")?;

        writer.finish()
    }

    #[traced_test]
    #[test]
    fn ice_round_trip_compressed() -> Result<()> {
        let bytes = sample()?;
        let mut archive = IceArchive::new(Cursor::new(bytes.clone()))?;
        assert_eq!(archive.len(), 3);
        assert_eq!(archive.groups().next().map(|g| g.compression()), Some(CompressionMethod::Prs));

        let mut data = Vec::new();
        archive.by_name(0, "second.bin")?.read_to_end(&mut data)?;
        assert_eq!(data, vec![0x55; 0x33]);

        data.clear();
        archive.by_name(1, "first.txt")?.read_to_end(&mut data)?;
        assert_eq!(data, b"other group");

        let rewritten = archive.write(Vec::new(), IceWriterOptions::default())?;
        assert_eq!(rewritten, bytes);

        Ok(())
    }

    #[traced_test]
    #[test]
    fn ice_rewrite_with_replacements() -> Result<()> {
        let mut archive = IceArchive::new(Cursor::new(sample()?))?;
        let first = archive.find(0, "first.txt").ok_or(Error::CustomError("missing".into()))?;
        let second = archive.find(0, "second.bin").ok_or(Error::CustomError("missing".into()))?;
        archive.replace(first, None)?;
        archive.replace(second, Some(b"replaced".to_vec()))?;
        assert!(archive.is_dirty());

        let options = IceWriterOptions::builder().compress_modified(true).build();
        let rewritten = archive.write(Vec::new(), options)?;

        let mut archive = IceArchive::new(Cursor::new(rewritten))?;
        assert_eq!(archive.group_len(0), Some(1));
        assert_eq!(archive.groups().next().map(|g| g.compression()), Some(CompressionMethod::Prs));

        let mut data = Vec::new();
        let mut file = archive.by_index(IceFileHandle { group: 0, index: 0 })?;
        assert_eq!(file.name(), "second.bin");
        assert_eq!(file.kind(), "bin");
        file.read_to_end(&mut data)?;
        assert_eq!(data, b"replaced");

        data.clear();
        archive.by_name(1, "first.txt")?.read_to_end(&mut data)?;
        assert_eq!(data, b"other group");

        Ok(())
    }

    #[test]
    fn ice_rewrite_uncompressed_group() -> Result<()> {
        let mut archive = IceArchive::new(Cursor::new(ONE_FILE))?;
        archive.replace(IceFileHandle { group: 0, index: 0 }, Some(b"HELLO".to_vec()))?;

        let rewritten = archive.write(Vec::new(), IceWriterOptions::default())?;
        assert_eq!(rewritten.len(), ONE_FILE.len());
        assert_eq!(&rewritten[0x60..0x65], b"HELLO");
        assert_ne!(&rewritten[0x2C..0x30], &ONE_FILE[0x2C..0x30]);

        Ok(())
    }
}
