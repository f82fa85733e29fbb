//! Generic tag chunks
//!
//! A chunk is a 4 byte tag, a little endian `u32` payload size and the payload itself. Chunks follow each
//! other without padding; formats built on top of them add their own alignment.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use core::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::{instrument, trace};
use winnow::binary::le_u32;
use winnow::combinator::{repeat, seq};
use winnow::prelude::*;
use winnow::error::{ContextError, ErrMode};
use winnow::token::take;

use pso2_io::Section;

use crate::error::{Error, Result};

/// Outcome of the in-memory chunk parsers
pub(crate) type ParseResult<T> = std::result::Result<T, ErrMode<ContextError>>;

/// Size of a chunk header
pub const TAG_HEADER_SIZE: u64 = 8;

/// A four character chunk tag
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    /// Build a tag from its four bytes.
    pub const fn new(tag: &[u8; 4]) -> Tag {
        Tag(*tag)
    }

    /// Raw bytes of the tag
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Whether all four bytes are zero, as found in padding.
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 4]
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in self.0.iter().take_while(|&&b| b != 0) {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

impl From<[u8; 4]> for Tag {
    fn from(value: [u8; 4]) -> Self {
        Tag(value)
    }
}

/// A chunk located in a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagChunk {
    /// Tag of the chunk
    pub tag: Tag,
    /// Payload size
    pub size: u32,
    /// Offset of the chunk header in the stream
    pub offset: u64,
}

impl TagChunk {
    /// Offset of the payload in the stream
    pub fn data_start(&self) -> u64 {
        self.offset + TAG_HEADER_SIZE
    }

    /// Offset just past the payload
    pub fn end(&self) -> u64 {
        self.data_start() + self.size as u64
    }

    /// A view of the payload.
    pub fn section<'a, R: Read + Seek + ?Sized>(&self, reader: &'a mut R) -> io::Result<Section<'a, R>> {
        Section::new(reader, self.data_start(), self.size as u64)
    }

    /// Fail unless this chunk carries `expected`.
    pub fn expect(self, expected: Tag) -> Result<TagChunk> {
        if self.tag != expected {
            return Err(Error::UnexpectedTag {
                expected,
                found: self.tag,
            });
        }
        Ok(self)
    }
}

/// Read a chunk header at the current position and skip over its payload.
#[instrument(skip(reader), err)]
pub fn read_tag<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<TagChunk> {
    let offset = reader.stream_position()?;

    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag)?;
    let size = reader.read_u32::<LittleEndian>()?;
    reader.seek(SeekFrom::Current(size as i64))?;

    let chunk = TagChunk {
        tag: Tag(tag),
        size,
        offset,
    };
    trace!(tag = %chunk.tag, size, offset, "read chunk");
    Ok(chunk)
}

/// Write a complete chunk.
pub fn write_tag<W: Write + ?Sized>(writer: &mut W, tag: Tag, data: &[u8]) -> Result<()> {
    let size = u32::try_from(data.len())
        .map_err(|_| Error::CustomError(format!("{tag} chunk of {} bytes is too large", data.len())))?;
    writer.write_all(tag.as_bytes())?;
    writer.write_u32::<LittleEndian>(size)?;
    writer.write_all(data)?;
    Ok(())
}

/// Iterates over consecutive chunks of a stream.
///
/// Iteration ends cleanly when the stream ends on a chunk boundary.
///
/// ```no_run
/// use std::fs::File;
/// use pso2_archive::tag::TagFile;
///
/// fn list_chunks(file: File) -> pso2_archive::error::Result<()> {
///     for chunk in TagFile::new(file) {
///         let chunk = chunk?;
///         println!("{} ({} bytes)", chunk.tag, chunk.size);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct TagFile<R> {
    reader: R,
    done: bool,
}

impl<R: Read + Seek> TagFile<R> {
    /// Iterate over chunks starting at the reader's current position.
    pub fn new(reader: R) -> TagFile<R> {
        TagFile {
            reader,
            done: false,
        }
    }

    /// Unwrap and return the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn at_end(&mut self) -> io::Result<bool> {
        let position = self.reader.stream_position()?;
        let mut probe = [0u8; 1];
        let read = self.reader.read(&mut probe)?;
        self.reader.seek(SeekFrom::Start(position))?;
        Ok(read == 0)
    }
}

impl<R: Read + Seek> Iterator for TagFile<R> {
    type Item = Result<TagChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = match self.at_end() {
            Ok(true) => {
                self.done = true;
                return None;
            }
            Ok(false) => read_tag(&mut self.reader),
            Err(e) => Err(e.into()),
        };

        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

/// A chunk borrowed from an in-memory buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Tag of the chunk
    pub tag: Tag,
    /// Payload size
    pub size: u32,
    /// Payload
    pub data: &'a [u8],
}

pub(crate) fn parse_tag(input: &mut &[u8]) -> ParseResult<Tag> {
    take(4usize)
        .try_map(|bytes: &[u8]| <[u8; 4]>::try_from(bytes))
        .map(Tag)
        .parse_next(input)
}

fn parse_chunk<'s>(input: &mut &'s [u8]) -> ParseResult<Chunk<'s>> {
    seq!(Chunk {
        tag: parse_tag,
        size: le_u32,
        data: take(size),
    })
    .parse_next(input)
}

impl<'a> Chunk<'a> {
    /// Parse the chunk at the start of `data`, returning it and whatever follows it.
    pub fn parse(data: &'a [u8]) -> Result<(Chunk<'a>, &'a [u8])> {
        let mut input = data;
        let chunk = parse_chunk(&mut input).map_err(|_| Error::MalformedChunk { offset: 0 })?;
        Ok((chunk, input))
    }
}

/// Split a buffer into the chunks it is made of.
pub fn chunks(data: &[u8]) -> Result<Vec<Chunk<'_>>> {
    let parsed: Vec<Chunk<'_>> = repeat(0.., parse_chunk)
        .parse(data)
        .map_err(|e| Error::MalformedChunk { offset: e.offset() })?;
    Ok(parsed)
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;

    #[rustfmt::skip]
    const INPUT: [u8; 22] = [
        b'O', b'N', b'E', b' ', 0x02, 0x00, 0x00, 0x00, 0xAA, 0xBB,
        b'T', b'W', b'O', 0x00, 0x04, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04,
    ];

    #[traced_test]
    #[test]
    fn read_consecutive_tags() -> Result<()> {
        let mut reader = Cursor::new(INPUT);

        let first = read_tag(&mut reader)?;
        assert_eq!(first.tag, Tag::new(b"ONE "));
        assert_eq!(first.size, 2);
        assert_eq!(first.data_start(), 8);
        assert_eq!(reader.position(), 10);

        let second = read_tag(&mut reader)?.expect(Tag::new(b"TWO\0"))?;
        assert_eq!(second.offset, 10);
        assert_eq!(second.tag.to_string(), "TWO");

        let mut data = Vec::new();
        second.section(&mut reader)?.read_to_end(&mut data)?;
        assert_eq!(data, vec![1, 2, 3, 4]);

        Ok(())
    }

    #[test]
    fn expect_reports_mismatch() -> Result<()> {
        let chunk = read_tag(&mut Cursor::new(INPUT))?;
        let err = chunk.expect(Tag::new(b"NIFL")).unwrap_err();
        assert!(matches!(err, Error::UnexpectedTag { .. }));
        Ok(())
    }

    #[traced_test]
    #[test]
    fn iterate_tag_file() -> Result<()> {
        let tags = TagFile::new(Cursor::new(INPUT))
            .map(|chunk| chunk.map(|c| c.tag))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(tags, vec![Tag::new(b"ONE "), Tag::new(b"TWO\0")]);

        let mut truncated = TagFile::new(Cursor::new(&INPUT[..13]));
        assert!(truncated.next().is_some_and(|c| c.is_ok()));
        assert!(truncated.next().is_some_and(|c| c.is_err()));
        assert!(truncated.next().is_none());

        Ok(())
    }

    #[test]
    fn write_then_split() -> Result<()> {
        let mut out = Vec::new();
        write_tag(&mut out, Tag::new(b"ONE "), &[0xAA, 0xBB])?;
        write_tag(&mut out, Tag::new(b"TWO\0"), &[1, 2, 3, 4])?;
        assert_eq!(out, INPUT.to_vec());

        let parsed = chunks(&out)?;
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].data, &[1, 2, 3, 4]);

        let (first, rest) = Chunk::parse(&out)?;
        assert_eq!(first.data, &[0xAA, 0xBB]);
        assert_eq!(rest.len(), 12);

        assert!(chunks(&out[..20]).is_err());

        Ok(())
    }

    #[test]
    fn tag_display_escapes() {
        assert_eq!(Tag::new(b"NIFL").to_string(), "NIFL");
        assert_eq!(Tag::new(b"ab\x01\0").to_string(), "ab\\x01");
        assert!(Tag::default().is_empty());
    }
}
