//! Literal-only PRS encoding
//!

use std::io::{self, Write};
use tracing::{instrument, Level};

/// Encodes everything written to it as PRS literals.
///
/// There is no match finder: every input byte costs one control bit plus the byte itself, so output is about
/// 12.5% larger than the input. The stream is only complete once [`PrsWriter::finish`] has written the
/// end marker; dropping the writer loses the last partial control block.
///
/// ```
/// use std::io::Write;
/// use pso2_prs::PrsWriter;
///
/// let mut writer = PrsWriter::new(Vec::new());
/// writer.write_all(b"hi")?;
/// assert_eq!(writer.finish()?, vec![0x0b, b'h', b'i', 0x00, 0x00]);
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct PrsWriter<W: Write> {
    inner: W,
    /// Control byte followed by the bytes of the tokens it describes
    block: Vec<u8>,
    bits: u8,
    total_in: u64,
}

impl<W: Write> PrsWriter<W> {
    /// Start a new stream on `inner`.
    pub fn new(inner: W) -> PrsWriter<W> {
        PrsWriter {
            inner,
            block: Vec::with_capacity(1 + 8 * 2),
            bits: 0,
            total_in: 0,
        }
    }

    /// Number of uncompressed bytes accepted so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    fn push_bit(&mut self, bit: bool) -> io::Result<()> {
        if self.bits == 8 {
            self.flush_block()?;
        }
        if self.block.is_empty() {
            self.block.push(0);
        }
        if bit {
            self.block[0] |= 1 << self.bits;
        }
        self.bits += 1;
        Ok(())
    }

    fn flush_block(&mut self) -> io::Result<()> {
        self.inner.write_all(&self.block)?;
        self.block.clear();
        self.bits = 0;
        Ok(())
    }

    /// Write the end of stream marker and return the inner writer.
    #[instrument(skip(self), fields(total_in = self.total_in), err)]
    pub fn finish(mut self) -> io::Result<W> {
        self.push_bit(false)?;
        self.push_bit(true)?;
        self.block.extend_from_slice(&[0, 0]);
        self.flush_block()?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for PrsWriter<W> {
    #[instrument(skip_all, err, ret(level = Level::TRACE), fields(size = buf.len()))]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.push_bit(true)?;
            self.block.push(byte);
        }
        self.total_in += buf.len() as u64;
        Ok(buf.len())
    }

    /// Flushes the inner writer. A partially filled control block stays buffered until its control byte is
    /// complete.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_str_eq;
    use std::io::Write;
    use tracing_test::traced_test;

    use super::PrsWriter;

    fn encode(input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut writer = PrsWriter::new(Vec::new());
        writer.write_all(input)?;
        assert_eq!(writer.total_in(), input.len() as u64);
        writer.finish()
    }

    #[traced_test]
    #[test]
    fn empty_stream() -> std::io::Result<()> {
        assert_str_eq!(
            format!("{:02X?}", encode(&[])?),
            format!("{:02X?}", [0x02, 0x00, 0x00])
        );
        Ok(())
    }

    #[traced_test]
    #[test]
    fn full_control_byte() -> std::io::Result<()> {
        #[rustfmt::skip]
        let expected = [
            0xFF, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
            0x02, 0x00, 0x00,
        ];

        assert_str_eq!(
            format!("{:02X?}", encode(b"abcdefgh")?),
            format!("{:02X?}", expected)
        );
        Ok(())
    }

    #[traced_test]
    #[test]
    fn end_marker_shares_control_byte() -> std::io::Result<()> {
        #[rustfmt::skip]
        let expected = [
            0x7F, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67,
            0x01, 0x00, 0x00,
        ];

        // The end marker's first bit is the eighth bit of the first control byte
        assert_str_eq!(
            format!("{:02X?}", encode(b"abcdefg")?),
            format!("{:02X?}", expected)
        );
        Ok(())
    }
}
