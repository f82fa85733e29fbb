//! Payloads of the packets the proxy looks into
//!

use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddrV4};

use binrw::{BinRead, BinWrite};

use crate::error::Result;
use crate::packet::Packet;

mod block;
mod cipher;
mod room;
mod ship;
mod string;

pub use block::{Block, BlockResponse, Blocks};
pub use cipher::CipherPacket;
pub use room::Room;
pub use ship::{Ship, ShipEntry, SHIP_COUNT, SHIP_HOSTNAMES};
pub use string::{decode_fixed_string, encode_fixed_string, encode_variable_string};

pub const TYPE_CIPHER: u32 = 0x0b11;
pub const TYPE_SHIP: u32 = 0x0004_3d11;
pub const TYPE_BLOCK: u32 = 0x2c11;
pub const TYPE_BLOCKS: u32 = 0x6511;
pub const TYPE_BLOCKS2: u32 = 0x1011;
pub const TYPE_BLOCK_RESPONSE: u32 = 0x1311;
pub const TYPE_ROOM: u32 = 0x1711;
pub const TYPE_ROOM_TEAM: u32 = 0x4f11;

/// A fixed layout payload
///
/// Bytes past the end of the layout are left alone by [`Payload::rewrite`].
pub trait Payload: Sized
where
    Self: for<'a> BinRead<Args<'a> = ()> + binrw::meta::ReadEndian,
    Self: for<'a> BinWrite<Args<'a> = ()> + binrw::meta::WriteEndian,
{
    /// Type the payload is normally sent with
    const PACKET_TYPE: u32;

    /// Parse the payload of `packet`, returning it and the number of bytes it covered.
    fn parse(packet: &Packet) -> Result<(Self, usize)> {
        let mut cursor = Cursor::new(packet.data.as_slice());
        let payload = Self::read_args(&mut cursor, ())?;
        Ok((payload, cursor.position() as usize))
    }

    fn from_packet(packet: &Packet) -> Result<Self> {
        Ok(Self::parse(packet)?.0)
    }

    /// A new packet of [`Payload::PACKET_TYPE`] carrying this payload
    fn to_packet(&self) -> Result<Packet> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_args(&mut cursor, ())?;
        Ok(Packet::new(Self::PACKET_TYPE, cursor.into_inner()))
    }

    /// Parse `packet`, change the payload with `edit` and serialize it back, keeping type, flags and trailing bytes.
    fn rewrite<T>(packet: &Packet, edit: impl FnOnce(&mut Self) -> T) -> Result<(Packet, T)> {
        let (mut payload, covered) = Self::parse(packet)?;
        let output = edit(&mut payload);

        let mut cursor = Cursor::new(Vec::with_capacity(packet.data.len()));
        payload.write_args(&mut cursor, ())?;
        let mut data = cursor.into_inner();
        data.extend_from_slice(&packet.data[covered..]);

        Ok((
            Packet {
                packet_type: packet.packet_type,
                flags: packet.flags,
                data,
            },
            output,
        ))
    }
}

/// A payload pointing the client at another server
pub trait Redirect: Payload {
    /// Point every endpoint of the payload at `address`, returning the endpoints it held before.
    fn redirect(&mut self, address: Ipv4Addr) -> Vec<SocketAddrV4>;
}
