//! Types for reading text tables
//!

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use tracing::{debug, instrument, trace};
use widestring::{U16Str, U16String};

use pso2_archive::error::Error as ChunkError;
use pso2_archive::tag::{read_tag, Tag, TagChunk, TAG_HEADER_SIZE};
use pso2_io::{align, ReadAt, Section};

use crate::error::{Error, Result};
use crate::types::{TextEntry, TextPair, TextValue, Translation};

/// Header chunk
pub const NIFL: Tag = Tag::new(b"NIFL");
/// Value and string pool chunk
pub const REL0: Tag = Tag::new(b"REL0");
/// Offset table chunk
pub const NOF0: Tag = Tag::new(b"NOF0");
/// Optional end marker
pub const NEND: Tag = Tag::new(b"NEND");

/// First word of an entry opening pair mode
pub const PAIR_START: u32 = 0xFFFF_FFFF;
/// First word of an entry closing pair mode
pub const PAIR_END: u32 = 0x14;

/// The value table is read into memory below this size
const VALUE_BUFFER_THRESHOLD: u64 = 0x800000;
/// The string pool is read into memory below this size
const STRING_BUFFER_THRESHOLD: u64 = 0x80000;

/// Every table ends with a two word entry that the offset table does not describe
pub(crate) const LAST_ENTRY_SIZE: u32 = 8;

struct NiflHeader {
    magic: u32,
    rel0_offset: u32,
    #[allow(dead_code)]
    rel0_size: u32,
    nof0_offset: u32,
    #[allow(dead_code)]
    nof0_size: u32,
}

impl NiflHeader {
    fn read<R: Read>(reader: &mut R) -> io::Result<NiflHeader> {
        Ok(NiflHeader {
            magic: reader.read_u32::<LittleEndian>()?,
            rel0_offset: reader.read_u32::<LittleEndian>()?,
            rel0_size: reader.read_u32::<LittleEndian>()?,
            nof0_offset: reader.read_u32::<LittleEndian>()?,
            nof0_size: reader.read_u32::<LittleEndian>()?,
        })
    }
}

/// A window on part of the REL0 chunk, buffered when small enough
enum Rel0View<'a, R: Read + Seek> {
    Memory(Cursor<Vec<u8>>),
    Stream(Section<'a, R>),
}

impl<'a, R: Read + Seek> Rel0View<'a, R> {
    fn new(reader: &'a mut R, start: u64, len: u64, threshold: u64) -> io::Result<Self> {
        let mut section = Section::new(reader, start, len)?;
        if len >= threshold {
            return Ok(Rel0View::Stream(section));
        }

        let mut buffer = Vec::with_capacity(len as usize);
        section.read_to_end(&mut buffer)?;
        Ok(Rel0View::Memory(Cursor::new(buffer)))
    }
}

impl<R: Read + Seek> Read for Rel0View<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Rel0View::Memory(r) => r.read(buf),
            Rel0View::Stream(r) => r.read(buf),
        }
    }
}

impl<R: Read + Seek> Seek for Rel0View<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Rel0View::Memory(r) => r.seek(pos),
            Rel0View::Stream(r) => r.seek(pos),
        }
    }
}

/// Decode a NUL terminated string of `unit` byte characters at `offset`.
fn read_units<V: Read + Seek>(view: &mut V, offset: u64, unit: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut chunk = [0u8; 64];
    let mut position = offset;

    loop {
        let read = view.read_at(position, &mut chunk)?;
        if read < unit {
            return Err(Error::UnterminatedString { offset });
        }

        let usable = read - read % unit;
        for character in chunk[..usable].chunks_exact(unit) {
            if character.iter().all(|&b| b == 0) {
                return Ok(bytes);
            }
            bytes.extend_from_slice(character);
        }
        position += usable as u64;
    }
}

fn read_identifier<V: Read + Seek>(view: &mut V, offset: u64) -> Result<String> {
    Ok(String::from_utf8(read_units(view, offset, 1)?)?)
}

fn read_string<V: Read + Seek>(view: &mut V, offset: u64) -> Result<U16String> {
    let units = read_units(view, offset, 2)?
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect::<Vec<_>>();
    Ok(U16String::from_vec(units))
}

/// Read the offset table and turn it into entry sizes, in bytes.
fn read_sizes<R: Read>(reader: &mut R, size: u32) -> Result<Vec<u32>> {
    let count = reader.read_u32::<LittleEndian>()?;
    if (count as u64 + 2) * 4 > size as u64 {
        return Err(Error::InvalidHeader(format!(
            "NOF0 declares {count} offsets but holds {size} bytes"
        )));
    }

    let mut sizes = Vec::new();
    let mut offset = reader.read_u32::<LittleEndian>()?;
    for index in 0..count as usize {
        let end = reader.read_u32::<LittleEndian>()?;
        let delta = end as i64 - offset as i64;
        if delta < 0 || delta % 4 != 0 {
            return Err(Error::MisalignedOffset { index, delta });
        }
        sizes.push(delta as u32);
        offset = end;
    }
    sizes.push(LAST_ENTRY_SIZE);

    Ok(sizes)
}

/// Whether an `NEND` chunk sits at `offset`.
fn read_nend<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<bool> {
    reader.seek(SeekFrom::Start(offset))?;
    let chunk = match read_tag(reader) {
        Ok(chunk) => chunk,
        Err(ChunkError::IOError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    match chunk {
        TagChunk { tag, .. } if tag == NEND => Ok(true),
        TagChunk { tag, size: 0, .. } if tag.is_empty() => Ok(false),
        TagChunk { tag, .. } => Err(ChunkError::UnexpectedTag {
            expected: NEND,
            found: tag,
        }
        .into()),
    }
}

/// A parsed text table
///
/// Entries keep their stored words; the ones referring to the string pool carry the decoded string. Pairs link an
/// identifier entry to the string entry that follows it while pair mode is open.
///
/// ```no_run
/// use std::io::prelude::*;
///
/// fn list_pairs(reader: impl Read + Seek) -> pso2_text::error::Result<()> {
///     let text = pso2_text::TextFile::new(reader)?;
///
///     for i in 0..text.pairs().len() {
///         println!("{}: {}", text.pair_identifier(i)?, text.pair_string(i)?.display());
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextFile {
    pub(crate) entries: Vec<TextEntry>,
    pub(crate) pairs: Vec<TextPair>,
    pub(crate) has_nend: bool,
}

impl TextFile {
    /// Parse a text table starting at the reader's current position.
    #[instrument(skip(reader), err)]
    pub fn new<R: Read + Seek>(mut reader: R) -> Result<TextFile> {
        let origin = reader.stream_position()?;

        let nifl = read_tag(&mut reader)?.expect(NIFL)?;
        let header = NiflHeader::read(&mut nifl.section(&mut reader)?)?;
        if header.magic != 1 {
            return Err(Error::InvalidHeader(format!(
                "NIFL starts with {:#x} instead of 1",
                header.magic
            )));
        }

        reader.seek(SeekFrom::Start(origin + header.rel0_offset as u64))?;
        let rel0 = read_tag(&mut reader)?.expect(REL0)?;

        reader.seek(SeekFrom::Start(origin + header.nof0_offset as u64))?;
        let nof0 = read_tag(&mut reader)?.expect(NOF0)?;
        let sizes = read_sizes(&mut nof0.section(&mut reader)?, nof0.size)?;

        let has_nend = read_nend(
            &mut reader,
            nof0.offset + align(TAG_HEADER_SIZE + nof0.size as u64, 16),
        )?;
        debug!(entries = sizes.len(), has_nend, "read text layout");

        reader.seek(SeekFrom::Start(rel0.data_start()))?;
        let pool_start = reader.read_u32::<LittleEndian>()?;
        if pool_start < 8 || pool_start > rel0.size {
            return Err(Error::InvalidHeader(format!(
                "REL0 places its strings at {pool_start:#x} in {:#x} bytes",
                rel0.size
            )));
        }

        let values = {
            let mut view = Rel0View::new(
                &mut reader,
                rel0.data_start() + 8,
                pool_start as u64 - 8,
                VALUE_BUFFER_THRESHOLD,
            )?;
            sizes
                .iter()
                .map(|size| {
                    (0..size / 4)
                        .map(|_| view.read_u32::<LittleEndian>())
                        .collect::<io::Result<Vec<_>>>()
                })
                .collect::<io::Result<Vec<_>>>()?
        };

        let mut strings = Rel0View::new(
            &mut reader,
            rel0.data_start() + pool_start as u64,
            (rel0.size - pool_start) as u64,
            STRING_BUFFER_THRESHOLD,
        )?;
        let (entries, pairs) = resolve(values, pool_start, &mut strings)?;

        Ok(TextFile {
            entries,
            pairs,
            has_nend,
        })
    }

    /// Build a table from entries, linking each string to the identifier before it while pair mode is open.
    pub fn from_entries(entries: Vec<TextEntry>, has_nend: bool) -> TextFile {
        let mut pairs = Vec::new();
        let mut pair_mode = false;
        let mut pending = None;

        for (index, entry) in entries.iter().enumerate() {
            match entry.value.first() {
                Some(&PAIR_START) => pair_mode = true,
                Some(&PAIR_END) => {
                    pair_mode = false;
                    pending = None;
                }
                _ => {}
            }

            match (&entry.text, pending) {
                (TextValue::String(_), Some(identifier)) => {
                    pairs.push(TextPair::new(identifier, index));
                    pending = None;
                }
                (TextValue::Identifier(_), None) if pair_mode => pending = Some(index),
                _ => {}
            }
        }

        TextFile {
            entries,
            pairs,
            has_nend,
        }
    }

    /// Entries of the table, in order
    pub fn entries(&self) -> &[TextEntry] {
        &self.entries
    }

    /// Pairs of the table, in order
    pub fn pairs(&self) -> &[TextPair] {
        &self.pairs
    }

    /// Whether the table ends with an `NEND` chunk
    pub fn has_nend(&self) -> bool {
        self.has_nend
    }

    fn pair(&self, index: usize) -> Result<TextPair> {
        self.pairs
            .get(index)
            .copied()
            .ok_or(Error::PairNotFound(index))
    }

    /// Identifier of a pair
    pub fn pair_identifier(&self, index: usize) -> Result<&str> {
        let pair = self.pair(index)?;
        match &self.entries[pair.identifier].text {
            TextValue::Identifier(identifier) => Ok(identifier),
            _ => Err(Error::PairNotFound(index)),
        }
    }

    /// String of a pair
    pub fn pair_string(&self, index: usize) -> Result<&U16Str> {
        let pair = self.pair(index)?;
        match &self.entries[pair.string].text {
            TextValue::String(string) => Ok(string),
            _ => Err(Error::PairNotFound(index)),
        }
    }

    /// Change the string of a pair. Takes effect on the next [`TextFile::write`].
    pub fn set_pair_string(&mut self, index: usize, value: &str) -> Result<()> {
        self.set_pair_string_utf16(index, U16String::from_str(value))
    }

    /// Change the string of a pair, keeping the given code units as they are.
    pub fn set_pair_string_utf16(&mut self, index: usize, value: U16String) -> Result<()> {
        let pair = self.pair(index)?;
        trace!(index, value = %value.display(), "setting pair string");
        self.entries[pair.string].text = TextValue::String(value);
        Ok(())
    }

    /// Pairs numbered the way a translation database tells repeated identifiers apart.
    pub fn translations(&self) -> Result<Vec<Translation>> {
        let mut collisions = std::collections::HashMap::<&str, usize>::new();
        (0..self.pairs.len())
            .map(|index| {
                let identifier = self.pair_identifier(index)?;
                let collision = collisions.entry(identifier).or_default();
                let translation = Translation::new(
                    identifier.to_owned(),
                    *collision,
                    self.pair_string(index)?.to_string_lossy(),
                );
                *collision += 1;
                Ok(translation)
            })
            .collect()
    }

    /// Replace the strings of the pairs matching `translations` by identifier and collision.
    ///
    /// Returns how many pairs changed.
    pub fn apply_translations(&mut self, translations: &[Translation]) -> Result<usize> {
        let current = self.translations()?;
        let mut changed = 0;

        for (index, pair) in current.iter().enumerate() {
            let Some(translation) = translations
                .iter()
                .find(|t| t.identifier == pair.identifier && t.collision == pair.collision)
            else {
                continue;
            };

            if translation.string != pair.string {
                self.set_pair_string(index, &translation.string)?;
                changed += 1;
            }
        }

        debug!(changed, "applied translations");
        Ok(changed)
    }
}

/// Decode the string references and group entries into pairs.
fn resolve<V: Read + Seek>(
    values: Vec<Vec<u32>>,
    pool_start: u32,
    strings: &mut V,
) -> Result<(Vec<TextEntry>, Vec<TextPair>)> {
    let pool_origin = pool_start as u64 + 8;
    let pool_len = strings.seek(SeekFrom::End(0))?;

    let mut entries = Vec::with_capacity(values.len());
    let mut pairs = Vec::new();
    let mut pair_mode = false;
    let mut pending: Option<usize> = None;

    for (index, value) in values.into_iter().enumerate() {
        match value.first() {
            Some(&PAIR_START) => pair_mode = true,
            Some(&PAIR_END) => {
                pair_mode = false;
                pending = None;
            }
            _ => {}
        }

        let reference = match value.as_slice() {
            [word] if *word != PAIR_START => (*word as u64)
                .checked_sub(pool_origin)
                .filter(|offset| *offset < pool_len),
            _ => None,
        };

        let text = match (reference, pending) {
            (None, _) => TextValue::None,
            (Some(offset), Some(identifier)) => {
                pairs.push(TextPair::new(identifier, index));
                pending = None;
                TextValue::String(read_string(strings, offset)?)
            }
            (Some(offset), None) => {
                if pair_mode {
                    pending = Some(index);
                }
                TextValue::Identifier(read_identifier(strings, offset)?)
            }
        };

        entries.push(TextEntry { value, text });
    }

    Ok((entries, pairs))
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn offsets_become_sizes() -> Result<()> {
        #[rustfmt::skip]
        let input = [
            0x02, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
            0x14, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x00, 0x00,
        ];
        assert_eq!(read_sizes(&mut Cursor::new(input), 16)?, vec![4, 12, 8]);

        let mut misaligned = input;
        misaligned[8] = 0x15;
        assert!(matches!(
            read_sizes(&mut Cursor::new(misaligned), 16),
            Err(Error::MisalignedOffset { index: 0, delta: 5 })
        ));

        assert!(read_sizes(&mut Cursor::new(input), 12).is_err());
        Ok(())
    }

    #[test]
    fn strings_need_terminators() -> Result<()> {
        let mut pool = Cursor::new(b"abc\0d\0e\0\0\0xyz".to_vec());
        assert_eq!(read_identifier(&mut pool, 0)?, "abc");
        assert_eq!(read_string(&mut pool, 4)?, U16String::from_str("de"));
        assert!(matches!(
            read_identifier(&mut pool, 10),
            Err(Error::UnterminatedString { offset: 10 })
        ));
        Ok(())
    }

    #[test]
    fn nend_detection() -> Result<()> {
        assert!(read_nend(&mut Cursor::new(b"NEND\x08\0\0\0\0\0\0\0\0\0\0\0".to_vec()), 0)?);
        assert!(!read_nend(&mut Cursor::new(Vec::new()), 0)?);
        assert!(!read_nend(&mut Cursor::new(vec![0u8; 16]), 0)?);
        assert!(read_nend(&mut Cursor::new(b"JUNK\0\0\0\0".to_vec()), 0).is_err());
        Ok(())
    }
}
