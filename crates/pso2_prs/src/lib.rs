//! This library decodes and encodes the **PRS** compression used throughout *Phantasy Star Online 2* assets.
//!
//! # PRS Format Documentation
//!
//! PRS is a byte oriented LZ77 variant. A compressed stream interleaves *control bytes* with the literal
//! bytes and copy parameters they describe. Back-references address the already **decompressed** output,
//! never the compressed input.
//!
//! ## Control bits
//!
//! Control bytes are consumed least significant bit first. A new control byte is read from the stream
//! whenever the previous one has handed out all eight of its bits, so control bytes appear in the stream
//! at exactly the point where the decoder first needs one of their bits.
//!
//! ## Tokens
//!
//! | Control bits | Token      | Stream bytes          | Meaning                                              |
//! |--------------|------------|-----------------------|------------------------------------------------------|
//! | `1`          | Literal    | `b`                   | emit `b`                                             |
//! | `0 1`        | Long copy  | `lsb msb [n]`         | 13 bit offset, 3 bit length, optional length byte    |
//! | `0 0 h l`    | Short copy | `o`                   | 8 bit offset, length `(h << 1 \| l) + 2`              |
//!
//! ### Long copy
//!
//! The two bytes form a little endian field `f = msb << 8 | lsb`:
//!
//! - `f == 0` marks the **end of the stream**.
//! - The offset is `f >> 3` sign extended from 13 bits, so it always lies in `-0x2000..=-1`.
//! - If `f & 7` is zero a further byte `n` follows and the length is `n + 10`, otherwise the length is
//!   `(f & 7) + 2`.
//!
//! ### Short copy
//!
//! Two more control bits, most significant first, give a length of 2 to 5. The following byte is the offset,
//! sign extended from 8 bits.
//!
//! ### Copies
//!
//! Copies run byte by byte from `output position + offset`, so a copy may read bytes it has just written
//! (an offset of `-1` repeats the previous byte `length` times).
//!
//! ## Stream size
//!
//! A PRS stream does not carry its decompressed size; containers store it next to the stream. If the stream
//! ends before that many bytes were produced, [`PrsReader`] zero fills the remainder instead of failing.
//!
//! [`PrsWriter`] only emits literals. Its output is valid PRS that any decoder accepts, it just doesn't
//! compress anything.

pub mod read;
pub mod write;

use std::io::{self, Read, Write};

pub use read::PrsReader;
pub use write::PrsWriter;

/// Furthest distance a back-reference can reach into the decompressed output.
pub const MAX_OFFSET: usize = 0x2000;

/// Longest single copy a stream can describe.
pub const MAX_COPY: usize = 0xff + 10;

/// Decompress a whole PRS stream that is expected to produce `size` bytes.
pub fn decompress(data: &[u8], size: usize) -> io::Result<Vec<u8>> {
    let mut output = Vec::with_capacity(size);
    PrsReader::new(data, size as u64).read_to_end(&mut output)?;
    Ok(output)
}

/// Encode `data` as a literal-only PRS stream.
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut writer = PrsWriter::new(Vec::with_capacity(data.len() + data.len() / 8 + 3));
    writer.write_all(data)?;
    writer.finish()
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::{compress, decompress};

    #[traced_test]
    #[test]
    fn round_trip() -> std::io::Result<()> {
        let inputs: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"a".to_vec(),
            b"abcdefgh".to_vec(),
            b"abcdefghi".to_vec(),
            (0..=255u8).cycle().take(0x1_2345).collect(),
        ];

        for input in inputs {
            let compressed = compress(&input)?;
            assert_eq!(decompress(&compressed, input.len())?, input);
        }

        Ok(())
    }
}
