//! Serializing text tables
//!

use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::HashMap;
use std::io::Write;
use tracing::{debug, instrument};

use pso2_archive::tag::write_tag;
use pso2_io::{align, padding, write_zeros};

use crate::error::{Error, Result};
use crate::read::{TextFile, LAST_ENTRY_SIZE, NEND, NIFL, NOF0, REL0};
use crate::types::TextValue;

/// Size of the NIFL chunk, header included
const NIFL_CHUNK_SIZE: u32 = 0x20;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Role {
    Identifier,
    String,
}

/// The string pool as it will be stored, with identical strings of the same role stored once
#[derive(Default)]
struct StringPool {
    data: Vec<u8>,
    offsets: HashMap<(Role, Vec<u8>), u32>,
}

impl StringPool {
    fn insert(&mut self, text: &TextValue) -> Result<Option<u32>> {
        let (role, mut encoded) = match text {
            TextValue::None => return Ok(None),
            TextValue::Identifier(identifier) => (Role::Identifier, identifier.as_bytes().to_vec()),
            TextValue::String(string) => (
                Role::String,
                string
                    .as_slice()
                    .iter()
                    .flat_map(|unit| unit.to_le_bytes())
                    .collect(),
            ),
        };

        if let Some(offset) = self.offsets.get(&(role, encoded.clone())) {
            return Ok(Some(*offset));
        }

        let offset = u32::try_from(self.data.len()).map_err(|_| Error::TooLarge)?;
        self.offsets.insert((role, encoded.clone()), offset);

        encoded.extend_from_slice(match role {
            Role::Identifier => &[0],
            Role::String => &[0, 0],
        });
        self.data.extend_from_slice(&encoded);
        write_zeros(&mut self.data, padding(encoded.len() as u64, 4))?;

        Ok(Some(offset))
    }
}

fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::TooLarge)
}

impl TextFile {
    /// Serialize the table, recomputing the string pool, every size and the offset table.
    #[instrument(skip_all, err)]
    pub fn write<W: Write>(&self, mut writer: W) -> Result<W> {
        let Some(last) = self.entries.len().checked_sub(1) else {
            return Err(Error::InvalidHeader("a text table needs at least one entry".into()));
        };
        if self.entries[last].value.len() * 4 != LAST_ENTRY_SIZE as usize {
            return Err(Error::InvalidHeader(format!(
                "the last entry must hold {LAST_ENTRY_SIZE} bytes"
            )));
        }
        if let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.text.is_text() && entry.value.is_empty())
        {
            return Err(Error::InvalidHeader(format!(
                "entry {index} refers to a string but holds no words"
            )));
        }

        let entry_size = to_u32(
            self.entries
                .iter()
                .map(|entry| entry.value.len() as u64 * 4)
                .sum(),
        )?;

        let mut pool = StringPool::default();
        let mut values = Vec::with_capacity(entry_size as usize / 4);
        for entry in &self.entries {
            let reference = pool.insert(&entry.text)?;
            for (position, word) in entry.value.iter().enumerate() {
                values.push(match reference {
                    Some(offset) if position == 0 => to_u32(offset as u64 + entry_size as u64 + 0x10)?,
                    _ => *word,
                });
            }
        }

        let rel0_size = entry_size as u64 + pool.data.len() as u64 + 0x10;
        let rel0_rounded = to_u32(align(rel0_size, 16))?;
        let nof0_size = (self.entries.len() as u64 + 1) * 4 + 8;
        let nof0_rounded = to_u32(align(nof0_size, 16))?;
        debug!(entry_size, strings = pool.data.len(), rel0_size, nof0_size, "writing text table");

        let mut output = Vec::with_capacity((NIFL_CHUNK_SIZE + rel0_rounded + nof0_rounded) as usize + 0x10);

        let mut nifl = Vec::with_capacity(0x18);
        for word in [
            1,
            NIFL_CHUNK_SIZE,
            rel0_rounded,
            NIFL_CHUNK_SIZE + rel0_rounded,
            nof0_rounded,
            0,
        ] {
            nifl.write_u32::<LittleEndian>(word)?;
        }
        write_tag(&mut output, NIFL, &nifl)?;

        let mut rel0 = Vec::with_capacity(rel0_size as usize);
        rel0.write_u32::<LittleEndian>(entry_size + 8)?;
        rel0.write_u32::<LittleEndian>(0)?;
        for word in &values {
            rel0.write_u32::<LittleEndian>(*word)?;
        }
        rel0.extend_from_slice(&pool.data);
        write_tag(&mut output, REL0, &rel0)?;
        write_zeros(&mut output, rel0_rounded as u64 - rel0_size)?;

        let mut nof0 = Vec::with_capacity(nof0_size as usize);
        nof0.write_u32::<LittleEndian>(last as u32)?;
        let mut offset = 0x10u32;
        for entry in &self.entries {
            nof0.write_u32::<LittleEndian>(offset)?;
            offset += entry.value.len() as u32 * 4;
        }
        write_tag(&mut output, NOF0, &nof0)?;
        write_zeros(&mut output, nof0_rounded as u64 - nof0_size)?;

        if self.has_nend {
            write_tag(&mut output, NEND, &[0; 8])?;
        }

        writer.write_all(&output)?;
        writer.flush()?;
        Ok(writer)
    }
}
