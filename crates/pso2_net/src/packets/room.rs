use std::net::{Ipv4Addr, SocketAddrV4};

use binrw::{BinRead, BinWrite};

use super::{Payload, Redirect, TYPE_ROOM};

/// Room server assignment
///
/// Team rooms use the same layout under [`super::TYPE_ROOM_TEAM`].
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct Room {
    pub unknown: [u32; 6],
    pub address: [u8; 4],
    pub unknown2: u32,
    pub port: u16,
    pub unknown3: [u8; 6],
}

impl Room {
    pub fn endpoint(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.address), self.port)
    }
}

impl Payload for Room {
    const PACKET_TYPE: u32 = TYPE_ROOM;
}

impl Redirect for Room {
    fn redirect(&mut self, address: Ipv4Addr) -> Vec<SocketAddrV4> {
        let endpoint = self.endpoint();
        self.address = address.octets();
        vec![endpoint]
    }
}
