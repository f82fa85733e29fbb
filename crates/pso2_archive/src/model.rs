//! VTBF models
//!
//! A model is a 16 byte header followed by tag chunks whose payload starts with a four character subtype.
//!
//! | Offset (bytes) | Field       | Description                     |
//! |----------------|-------------|---------------------------------|
//! | 0x0000         | Magic       | 4 bytes: `VTBF`                 |
//! | 0x0004         | Header Size | 4 bytes: Always `0x10`          |
//! | 0x0008         | Type        | 4 bytes: Model type             |
//! | 0x000C         | Unknown     | 4 bytes: Always `0x4c000001`    |
//!
//! Each chunk is a tag, a size covering the subtype and the data, the subtype and the data. Only the split into
//! chunks is understood; the payloads are kept as they are.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use tracing::{instrument, trace};
use winnow::binary::le_u32;
use winnow::combinator::seq;
use winnow::prelude::*;
use winnow::token::{literal, take};

use crate::error::{Error, Result};
use crate::tag::{parse_tag, ParseResult, Tag};

/// Magic of a VTBF model
pub const MODEL_MAGIC: Tag = Tag::new(b"VTBF");

/// Size of the model header
pub const MODEL_HEADER_SIZE: u32 = 0x10;

/// Constant found at the end of every model header
pub const MODEL_HEADER_UNKNOWN: u32 = 0x4c000001;

/// Known chunk subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChunkKind {
    /// Bone data
    Node,
    /// More bone data
    Nodo,
    /// Vertex layout
    Vset,
    /// Anything else, kept as it is
    Opaque(Tag),
}

impl From<Tag> for ModelChunkKind {
    fn from(subtype: Tag) -> Self {
        match subtype.as_bytes() {
            b"NODE" => ModelChunkKind::Node,
            b"NODO" => ModelChunkKind::Nodo,
            b"VSET" => ModelChunkKind::Vset,
            _ => ModelChunkKind::Opaque(subtype),
        }
    }
}

/// A chunk of a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChunk<'a> {
    /// Tag of the chunk
    pub tag: Tag,
    /// Subtype of the chunk
    pub subtype: Tag,
    /// What the subtype is known as
    pub kind: ModelChunkKind,
    /// Payload following the subtype
    pub data: &'a [u8],
    /// Offset of the chunk in the model
    pub offset: usize,
}

/// A VTBF model borrowed from a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model<'a> {
    /// Model type from the header
    pub kind: Tag,
    /// Chunks in file order
    pub chunks: Vec<ModelChunk<'a>>,
}

struct RawHeader {
    header_size: u32,
    kind: Tag,
    unknown: u32,
}

fn parse_header(input: &mut &[u8]) -> ParseResult<RawHeader> {
    seq!(RawHeader {
        _: literal(b"VTBF"),
        header_size: le_u32,
        kind: parse_tag,
        unknown: le_u32,
    })
    .parse_next(input)
}

fn parse_chunk_header(input: &mut &[u8]) -> ParseResult<(Tag, u32, Tag)> {
    (parse_tag, le_u32, parse_tag).parse_next(input)
}

impl<'a> Model<'a> {
    /// Split a model into its chunks.
    #[instrument(skip_all, err)]
    pub fn parse(data: &'a [u8]) -> Result<Model<'a>> {
        let mut input = data;

        let header = parse_header(&mut input).map_err(|_| Error::InvalidModel("not a VTBF file".into()))?;
        if header.header_size != MODEL_HEADER_SIZE {
            return Err(Error::InvalidModel(format!(
                "header size is {:#x} instead of {MODEL_HEADER_SIZE:#x}",
                header.header_size
            )));
        }
        if header.unknown != MODEL_HEADER_UNKNOWN {
            return Err(Error::InvalidModel(format!(
                "header ends with {:#x} instead of {MODEL_HEADER_UNKNOWN:#x}",
                header.unknown
            )));
        }

        let mut chunks = Vec::new();
        while !input.is_empty() {
            let offset = data.len() - input.len();
            let (tag, size, subtype) = parse_chunk_header(&mut input)
                .map_err(|_| Error::InvalidModel(format!("truncated chunk header at {offset:#x}")))?;

            let Some(length) = size.checked_sub(4) else {
                return Err(Error::InvalidModel(format!(
                    "chunk {tag} at {offset:#x} is {size} bytes, too small for its subtype"
                )));
            };
            let payload: &[u8] = take(length as usize)
                .parse_next(&mut input)
                .map_err(|_: winnow::error::ErrMode<winnow::error::ContextError>| {
                    Error::InvalidModel(format!("chunk {tag} at {offset:#x} runs past the end of the model"))
                })?;

            trace!(%tag, %subtype, size, offset, "model chunk");
            chunks.push(ModelChunk {
                tag,
                subtype,
                kind: subtype.into(),
                data: payload,
                offset,
            });
        }

        Ok(Model {
            kind: header.kind,
            chunks,
        })
    }

    /// Serialize the model.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(MODEL_MAGIC.as_bytes())?;
        writer.write_u32::<LittleEndian>(MODEL_HEADER_SIZE)?;
        writer.write_all(self.kind.as_bytes())?;
        writer.write_u32::<LittleEndian>(MODEL_HEADER_UNKNOWN)?;

        for chunk in &self.chunks {
            let size = u32::try_from(chunk.data.len() + 4)
                .map_err(|_| Error::InvalidModel(format!("chunk {} is too large", chunk.tag)))?;
            writer.write_all(chunk.tag.as_bytes())?;
            writer.write_u32::<LittleEndian>(size)?;
            writer.write_all(chunk.subtype.as_bytes())?;
            writer.write_all(chunk.data)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;

    #[rustfmt::skip]
    const MODEL: [u8; 0x37] = [
        // Header
        b'V', b'T', b'B', b'F', 0x10, 0x00, 0x00, 0x00,
        b'A', b'Q', b'G', b'F', 0x01, 0x00, 0x00, 0x4C,
        // Chunk
        b'v', b't', b'c', b'0', 0x06, 0x00, 0x00, 0x00,
        b'V', b'S', b'E', b'T', 0x01, 0x02,
        // Chunk
        b'v', b't', b'c', b'0', 0x04, 0x00, 0x00, 0x00,
        b'N', b'O', b'D', b'E',
        // Chunk
        b'v', b't', b'c', b'0', 0x05, 0x00, 0x00, 0x00,
        b'Z', b'Z', b'Z', b'Z', 0xFF,
    ];

    #[traced_test]
    #[test]
    fn parse_model_chunks() -> Result<()> {
        let model = Model::parse(&MODEL)?;
        assert_eq!(model.kind, Tag::new(b"AQGF"));
        assert_eq!(
            model.chunks.iter().map(|c| c.kind).collect::<Vec<_>>(),
            vec![
                ModelChunkKind::Vset,
                ModelChunkKind::Node,
                ModelChunkKind::Opaque(Tag::new(b"ZZZZ"))
            ]
        );
        assert_eq!(model.chunks[0].data, &[1, 2]);
        assert_eq!(model.chunks[1].data, &[] as &[u8]);
        assert_eq!(model.chunks[2].offset, 0x2A);

        let mut out = Vec::new();
        model.write(&mut out)?;
        assert_eq!(out, MODEL.to_vec());

        Ok(())
    }

    #[test]
    fn reject_bad_headers() {
        let mut bad_magic = MODEL;
        bad_magic[0] = b'X';
        assert!(matches!(Model::parse(&bad_magic), Err(Error::InvalidModel(_))));

        let mut bad_size = MODEL;
        bad_size[4] = 0x20;
        assert!(Model::parse(&bad_size).is_err());

        let mut bad_unknown = MODEL;
        bad_unknown[0xF] = 0x4D;
        assert!(Model::parse(&bad_unknown).is_err());
    }

    #[test]
    fn reject_bad_chunks() {
        let mut small = MODEL;
        small[0x14] = 0x03;
        assert!(matches!(Model::parse(&small), Err(Error::InvalidModel(_))));

        assert!(Model::parse(&MODEL[..0x2B]).is_err());
        assert!(Model::parse(&MODEL[..0x36]).is_err());
        assert!(Model::parse(&MODEL[..0x20]).is_err());
        assert!(Model::parse(&MODEL[..0x10]).is_ok_and(|m| m.chunks.is_empty()));
    }
}
