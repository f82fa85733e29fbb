//! Streaming PRS decompression
//!

use byteorder::ReadBytesExt;
use std::fmt::{self, Debug};
use std::io::{self, Read, Seek, SeekFrom};
use tracing::{debug, instrument, trace};

use crate::MAX_OFFSET;

const WINDOW_SIZE: usize = 0x10000;
const COMPACT_THRESHOLD: usize = WINDOW_SIZE - 0x400;

/// Decompresses a PRS stream as it is read.
///
/// The reader produces exactly the declared number of bytes: it stops there even if the stream goes on, and
/// zero fills the remainder if the stream ends early.
///
/// Decompressed output is kept in a 64 KiB window. Once the window fills up everything but the last
/// [`MAX_OFFSET`] bytes is dropped, which is all any back-reference can reach.
///
/// ```
/// use std::io::Read;
/// use pso2_prs::PrsReader;
///
/// // "hi" stored as two literals followed by the end marker
/// let stream = [0x0b, b'h', b'i', 0x00, 0x00];
///
/// let mut text = String::new();
/// PrsReader::new(&stream[..], 2).read_to_string(&mut text)?;
/// assert_eq!(text, "hi");
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct PrsReader<R> {
    inner: R,
    size: u64,
    position: u64,
    compressed_read: u64,

    window: Box<[u8]>,
    filled: usize,
    consumed: usize,

    control: u8,
    control_bits: u8,
    finished: bool,
}

impl<R> Debug for PrsReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PrsReader")
            .field("size", &self.size)
            .field("position", &self.position)
            .field("compressed_read", &self.compressed_read)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<R: Read> PrsReader<R> {
    /// Decode the stream starting at the reader's current position into `size` bytes.
    pub fn new(inner: R, size: u64) -> PrsReader<R> {
        PrsReader {
            inner,
            size,
            position: 0,
            compressed_read: 0,
            window: vec![0u8; WINDOW_SIZE].into_boxed_slice(),
            filled: 0,
            consumed: 0,
            control: 0,
            control_bits: 0,
            finished: false,
        }
    }

    /// Declared size of the decompressed data.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of compressed bytes consumed so far.
    pub fn compressed_read(&self) -> u64 {
        self.compressed_read
    }

    /// Unwrap and return the inner reader.
    ///
    /// The reader is left wherever decoding stopped, which may be short of the end marker.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        match self.inner.read_u8() {
            Ok(byte) => {
                self.compressed_read += 1;
                Ok(Some(byte))
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn next_bit(&mut self) -> io::Result<Option<bool>> {
        if self.control_bits == 0 {
            let Some(byte) = self.next_byte()? else {
                return Ok(None);
            };
            self.control = byte;
            self.control_bits = 8;
        }

        let bit = self.control & 1 != 0;
        self.control >>= 1;
        self.control_bits -= 1;
        Ok(Some(bit))
    }

    fn push(&mut self, byte: u8) {
        self.window[self.filled] = byte;
        self.filled += 1;
    }

    fn copy(&mut self, offset: i32, length: usize) -> io::Result<()> {
        let distance = offset.unsigned_abs() as usize;
        if distance > self.filled {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "back-reference {offset} reaches before the start of the stream at {}",
                    self.position + (self.filled - self.consumed) as u64
                ),
            ));
        }

        let source = self.filled - distance;
        for i in 0..length {
            let byte = self.window[source + i];
            self.push(byte);
        }

        Ok(())
    }

    /// Decode a single token into the window, returning false once the stream is over.
    fn step(&mut self) -> io::Result<bool> {
        let Some(literal) = self.next_bit()? else {
            return Ok(false);
        };

        if literal {
            return match self.next_byte()? {
                Some(byte) => {
                    self.push(byte);
                    Ok(true)
                }
                None => Ok(false),
            };
        }

        let Some(long) = self.next_bit()? else {
            return Ok(false);
        };

        let (offset, length) = if long {
            let (Some(lsb), Some(msb)) = (self.next_byte()?, self.next_byte()?) else {
                return Ok(false);
            };

            let field = u16::from_le_bytes([lsb, msb]);
            if field == 0 {
                trace!(position = self.position, "end of stream marker");
                return Ok(false);
            }

            let offset = i32::from(field >> 3) | !0x1fff;
            let length = match field & 7 {
                0 => match self.next_byte()? {
                    Some(extra) => usize::from(extra) + 10,
                    None => return Ok(false),
                },
                n => usize::from(n) + 2,
            };
            (offset, length)
        } else {
            let (Some(high), Some(low)) = (self.next_bit()?, self.next_bit()?) else {
                return Ok(false);
            };
            let Some(byte) = self.next_byte()? else {
                return Ok(false);
            };

            let offset = i32::from(byte) | !0xff;
            let length = (usize::from(high) << 1 | usize::from(low)) + 2;
            (offset, length)
        };

        self.copy(offset, length)?;
        Ok(true)
    }

    /// Refill the window once everything decoded so far has been handed out.
    fn fill(&mut self) -> io::Result<bool> {
        debug_assert_eq!(self.consumed, self.filled);

        if self.filled > COMPACT_THRESHOLD {
            let discard = self.filled - MAX_OFFSET;
            self.window.copy_within(discard..self.filled, 0);
            self.filled = MAX_OFFSET;
            self.consumed -= discard;
        }

        self.step()
    }
}

impl<R: Read> Read for PrsReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = (self.size - self.position).min(buf.len() as u64) as usize;

        let mut written = 0;
        while written < want {
            if self.consumed == self.filled {
                if self.finished {
                    buf[written..want].fill(0);
                    written = want;
                    break;
                }

                if !self.fill()? {
                    self.finished = true;
                    let missing = self.size - self.position - written as u64;
                    if missing > 0 {
                        debug!(missing, "stream ended early, zero filling");
                    }
                }
                continue;
            }

            let take = (self.filled - self.consumed).min(want - written);
            buf[written..written + take]
                .copy_from_slice(&self.window[self.consumed..self.consumed + take]);
            self.consumed += take;
            written += take;
        }

        self.position += written as u64;
        Ok(written)
    }
}

impl<R: Read + Seek> PrsReader<R> {
    #[instrument(skip(self), err)]
    fn rewind(&mut self) -> io::Result<()> {
        let origin = self.inner.stream_position()? - self.compressed_read;
        self.inner.seek(SeekFrom::Start(origin))?;

        self.position = 0;
        self.compressed_read = 0;
        self.filled = 0;
        self.consumed = 0;
        self.control = 0;
        self.control_bits = 0;
        self.finished = false;
        Ok(())
    }
}

/// Seeking backwards restarts decompression from the beginning of the stream and decodes forward to the
/// target. Positions past the declared size are clamped to it.
impl<R: Read + Seek> Seek for PrsReader<R> {
    #[instrument(skip(self), err)]
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
            SeekFrom::End(offset) => self.size.checked_add_signed(offset),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid seek position"))?
        .min(self.size);

        if target < self.position {
            self.rewind()?;
        }

        let skip = target - self.position;
        io::copy(&mut self.by_ref().take(skip), &mut io::sink())?;
        Ok(self.position)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}
