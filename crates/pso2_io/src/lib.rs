//! Small I/O building blocks shared by the format crates.
//!
//! Every parser in the workspace works against a [`Read`] + [`Seek`] source and hands out views into it
//! instead of copying bytes around:
//!
//! - [`Section`] is a bounded window over a borrowed source. It is itself seekable, so sections nest.
//! - [`ForwardSeeker`] gives a forward-only source (a pipe, a decompressor) a [`Seek`] implementation that
//!   skips ahead by discarding bytes.
//! - [`ReadAt`] provides positional reads on top of any seekable source.
//!
//! The alignment helpers are used by every writer in the workspace, since all of the formats pad their
//! structures to 4 or 16 byte boundaries.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::trace;

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two.
pub const fn align(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Number of bytes needed to pad `value` to the next multiple of `alignment`.
pub const fn padding(value: u64, alignment: u64) -> u64 {
    align(value, alignment) - value
}

/// Write `count` zero bytes.
pub fn write_zeros<W: Write + ?Sized>(writer: &mut W, count: u64) -> io::Result<()> {
    io::copy(&mut io::repeat(0).take(count), writer)?;
    Ok(())
}

fn resolve(position: u64, len: Option<u64>, pos: SeekFrom) -> io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(offset) => position.checked_add_signed(offset),
        SeekFrom::End(offset) => match len {
            Some(len) => len.checked_add_signed(offset),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "stream length is unknown",
                ))
            }
        },
    };

    target.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative or overflowing position",
        )
    })
}

/// A bounded view of `len` bytes starting at `start` in a borrowed source.
///
/// Positions reported by the section are relative to `start`. Reads stop at the end of the view even if the
/// underlying source continues.
///
/// ```
/// use std::io::{Cursor, Read};
/// use pso2_io::Section;
///
/// let mut source = Cursor::new(b"headerpayloadtrailer".to_vec());
/// let mut section = Section::new(&mut source, 6, 7)?;
///
/// let mut payload = String::new();
/// section.read_to_string(&mut payload)?;
/// assert_eq!(payload, "payload");
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct Section<'a, R: ?Sized> {
    inner: &'a mut R,
    start: u64,
    len: u64,
    position: u64,
}

impl<'a, R: Read + Seek + ?Sized> Section<'a, R> {
    /// Create a view and position the source at its start.
    pub fn new(inner: &'a mut R, start: u64, len: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(start))?;
        trace!(start, len, "opened section");
        Ok(Section {
            inner,
            start,
            len,
            position: 0,
        })
    }

    /// Offset of the view in the underlying source.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Length of the view in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the view covers no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current position relative to the start of the view.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left before the end of the view.
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }

    /// Give the source back. Its position is undefined.
    pub fn into_inner(self) -> &'a mut R {
        self.inner
    }
}

impl<R: Read + Seek + ?Sized> Read for Section<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let max = self.remaining().min(buf.len() as u64) as usize;
        if max == 0 {
            return Ok(0);
        }

        let read = self.inner.read(&mut buf[..max])?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek + ?Sized> Seek for Section<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = resolve(self.position, Some(self.len), pos)?;
        self.inner.seek(SeekFrom::Start(self.start + target))?;
        self.position = target;
        Ok(target)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

/// Adds forward seeking to a source that can only be read sequentially.
///
/// Seeking ahead reads and discards the skipped bytes. Seeking backwards, or relative to the end, fails
/// with [`io::ErrorKind::Unsupported`].
#[derive(Debug)]
pub struct ForwardSeeker<R> {
    inner: R,
    position: u64,
}

impl<R: Read> ForwardSeeker<R> {
    /// Wrap a reader, treating its current position as offset zero.
    pub fn new(inner: R) -> Self {
        ForwardSeeker { inner, position: 0 }
    }

    /// Unwrap and return the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ForwardSeeker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: Read> Seek for ForwardSeeker<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = resolve(self.position, None, pos)?;
        if target < self.position {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot seek backwards in a forward-only stream",
            ));
        }

        let skip = target - self.position;
        let skipped = io::copy(&mut self.inner.by_ref().take(skip), &mut io::sink())?;
        self.position += skipped;
        if skipped != skip {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        Ok(self.position)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

/// Positional reads over a seekable source.
///
/// Unlike the `pread` family these move the cursor of the underlying source.
pub trait ReadAt {
    /// Read into `buf` starting at `offset`, returning how many bytes were read.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Fill `buf` completely starting at `offset`.
    fn read_exact_at(&mut self, offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        let mut offset = offset;
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    offset += n as u64;
                    buf = &mut buf[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<R: Read + Seek + ?Sized> ReadAt for R {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        self.read(buf)
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, Cursor, Read, Seek, SeekFrom};

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align(0, 16), 0);
        assert_eq!(align(1, 16), 16);
        assert_eq!(align(16, 16), 16);
        assert_eq!(align(0x31, 0x10), 0x40);
        assert_eq!(padding(5, 4), 3);
        assert_eq!(padding(8, 4), 0);
    }

    #[traced_test]
    #[test]
    fn section_is_bounded() -> io::Result<()> {
        let mut source = Cursor::new((0u8..32).collect::<Vec<_>>());
        let mut section = Section::new(&mut source, 4, 8)?;

        let mut buffer = Vec::new();
        section.read_to_end(&mut buffer)?;
        assert_eq!(buffer, vec![4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(section.remaining(), 0);

        Ok(())
    }

    #[test]
    fn section_seeks_relative_to_start() -> io::Result<()> {
        let mut source = Cursor::new((0u8..32).collect::<Vec<_>>());
        let mut section = Section::new(&mut source, 10, 10)?;

        assert_eq!(section.seek(SeekFrom::End(-2))?, 8);
        let mut buffer = [0u8; 4];
        assert_eq!(section.read(&mut buffer)?, 2);
        assert_eq!(&buffer[..2], &[18, 19]);

        assert_eq!(section.seek(SeekFrom::Start(1))?, 1);
        assert_eq!(section.seek(SeekFrom::Current(2))?, 3);
        section.read_exact(&mut buffer[..1])?;
        assert_eq!(buffer[0], 13);

        assert!(section.seek(SeekFrom::Current(-20)).is_err());

        Ok(())
    }

    #[traced_test]
    #[test]
    fn sections_nest() -> io::Result<()> {
        let mut source = Cursor::new((0u8..64).collect::<Vec<_>>());
        let mut outer = Section::new(&mut source, 16, 32)?;
        let mut inner = Section::new(&mut outer, 8, 4)?;

        let mut buffer = Vec::new();
        inner.read_to_end(&mut buffer)?;
        assert_eq!(buffer, vec![24, 25, 26, 27]);

        Ok(())
    }

    #[test]
    fn forward_seeker_skips() -> io::Result<()> {
        let data = (0u8..16).collect::<Vec<_>>();
        let mut seeker = ForwardSeeker::new(&data[..]);

        assert_eq!(seeker.seek(SeekFrom::Start(4))?, 4);
        let mut buffer = [0u8; 2];
        seeker.read_exact(&mut buffer)?;
        assert_eq!(buffer, [4, 5]);

        assert_eq!(seeker.seek(SeekFrom::Current(3))?, 9);
        seeker.read_exact(&mut buffer)?;
        assert_eq!(buffer, [9, 10]);

        let err = seeker.seek(SeekFrom::Start(0)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        let err = seeker.seek(SeekFrom::Start(100)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        Ok(())
    }

    #[test]
    fn read_at_positions() -> io::Result<()> {
        let mut source = Cursor::new(b"0123456789".to_vec());

        let mut buffer = [0u8; 3];
        source.read_exact_at(7, &mut buffer)?;
        assert_eq!(&buffer, b"789");

        source.read_exact_at(2, &mut buffer)?;
        assert_eq!(&buffer, b"234");

        assert!(source.read_exact_at(9, &mut buffer).is_err());

        Ok(())
    }
}
