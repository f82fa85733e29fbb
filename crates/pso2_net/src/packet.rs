//! Packet framing
//!

use byteorder::{ByteOrder, LittleEndian};
use derive_more::derive::Display;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::cipher::CipherSlot;
use crate::error::{Error, Result};

/// Size of a packet header, in both formats
pub const HEADER_SIZE: usize = 8;

/// Largest packet accepted from the wire, header included
pub const MAX_PACKET_SIZE: u32 = 0x0400_0000;

/// Flag set by the server on packets it has already processed
pub const FLAG_PROCESSED: u16 = 4;

/// Layout of the 8 byte packet header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum HeaderFormat {
    /// `{size: u32, type: u16, flags: u16}`
    #[display("legacy")]
    Legacy,

    /// `{size: u32, type: u32}`
    #[default]
    #[display("revised")]
    Revised,
}

impl HeaderFormat {
    /// Header for `packet`
    pub fn encode(&self, packet: &Packet) -> Result<[u8; HEADER_SIZE]> {
        let size = u32::try_from(HEADER_SIZE + packet.data.len())
            .ok()
            .filter(|size| *size <= MAX_PACKET_SIZE)
            .ok_or(Error::InvalidSize { size: u32::MAX })?;

        let mut header = [0; HEADER_SIZE];
        LittleEndian::write_u32(&mut header[..4], size);
        match self {
            HeaderFormat::Legacy => {
                let packet_type = u16::try_from(packet.packet_type).map_err(|_| Error::TypeOutOfRange {
                    packet_type: packet.packet_type,
                })?;
                LittleEndian::write_u16(&mut header[4..6], packet_type);
                LittleEndian::write_u16(&mut header[6..], packet.flags);
            }
            HeaderFormat::Revised => {
                if packet.flags != 0 {
                    return Err(Error::UnsupportedFlags { flags: packet.flags });
                }
                LittleEndian::write_u32(&mut header[4..], packet.packet_type);
            }
        }
        Ok(header)
    }

    /// Declared size, type and flags of a plaintext header
    pub fn decode(&self, header: &[u8; HEADER_SIZE]) -> Result<(u32, u32, u16)> {
        let size = LittleEndian::read_u32(&header[..4]);
        if size < HEADER_SIZE as u32 || size > MAX_PACKET_SIZE {
            return Err(Error::InvalidSize { size });
        }

        Ok(match self {
            HeaderFormat::Legacy => (
                size,
                LittleEndian::read_u16(&header[4..6]) as u32,
                LittleEndian::read_u16(&header[6..]),
            ),
            HeaderFormat::Revised => (size, LittleEndian::read_u32(&header[4..]), 0),
        })
    }
}

/// A packet without its header
#[derive(Clone, Debug, Default, PartialEq, Eq, Display)]
#[display("[packet {packet_type:#06x} ({flags:#06x}) size: {:#010x}]", data.len())]
pub struct Packet {
    /// Type of the packet
    pub packet_type: u32,

    /// Flags, only carried by the legacy header
    pub flags: u16,

    /// Payload
    pub data: Vec<u8>,
}

impl Packet {
    /// A packet without flags
    pub fn new(packet_type: u32, data: Vec<u8>) -> Self {
        Packet {
            packet_type,
            flags: 0,
            data,
        }
    }

    /// Replace the flags, which only the legacy header can carry.
    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }
}

/// Read one packet, decrypting it with `cipher` if a keystream is installed.
pub async fn read_packet<R: AsyncRead + Unpin>(
    reader: &mut R,
    format: HeaderFormat,
    cipher: &CipherSlot,
) -> Result<Packet> {
    let mut header = [0; HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    cipher.apply(&mut header);

    let (size, packet_type, flags) = format.decode(&header)?;

    let mut data = vec![0; size as usize - HEADER_SIZE];
    reader.read_exact(&mut data).await?;
    cipher.apply(&mut data);

    let packet = Packet {
        packet_type,
        flags,
        data,
    };
    trace!(%packet, "read packet");
    Ok(packet)
}

/// Write one packet, encrypting header and payload as one buffer if a keystream is installed.
pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    format: HeaderFormat,
    cipher: &CipherSlot,
    packet: &Packet,
) -> Result<()> {
    trace!(%packet, "writing packet");

    let mut buffer = Vec::with_capacity(HEADER_SIZE + packet.data.len());
    buffer.extend_from_slice(&format.encode(packet)?);
    buffer.extend_from_slice(&packet.data);
    cipher.apply(&mut buffer);

    writer.write_all(&buffer).await?;
    writer.flush().await?;
    Ok(())
}
