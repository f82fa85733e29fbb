use std::net::{Ipv4Addr, SocketAddrV4};

use binrw::{binrw, BinRead, BinWrite};

use super::string::{decode_fixed_string, encode_fixed_string};
use super::{Payload, Redirect, TYPE_BLOCK, TYPE_BLOCKS, TYPE_BLOCK_RESPONSE};

/// A block server
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct Block {
    pub unknown: [u32; 7],
    pub name: [u16; 0x20],
    pub address: [u8; 4],
    pub port: u16,
    pub unknown2: [u8; 0x26],
}

impl Block {
    pub fn name(&self) -> String {
        decode_fixed_string(&self.name)
    }

    pub fn set_name(&mut self, value: &str) {
        encode_fixed_string(value, &mut self.name);
    }

    pub fn endpoint(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.address), self.port)
    }
}

impl Payload for Block {
    const PACKET_TYPE: u32 = TYPE_BLOCK;
}

impl Redirect for Block {
    fn redirect(&mut self, address: Ipv4Addr) -> Vec<SocketAddrV4> {
        let endpoint = self.endpoint();
        self.address = address.octets();
        vec![endpoint]
    }
}

/// List of block servers
///
/// Sent both as [`TYPE_BLOCKS`] and [`super::TYPE_BLOCKS2`].
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct Blocks {
    #[bw(try_calc(u32::try_from(entries.len())))]
    count: u32,

    #[br(count = count)]
    pub entries: Vec<Block>,
}

impl Blocks {
    pub fn new(entries: Vec<Block>) -> Self {
        Blocks { entries }
    }
}

impl Payload for Blocks {
    const PACKET_TYPE: u32 = TYPE_BLOCKS;
}

impl Redirect for Blocks {
    fn redirect(&mut self, address: Ipv4Addr) -> Vec<SocketAddrV4> {
        self.entries
            .iter_mut()
            .flat_map(|block| block.redirect(address))
            .collect()
    }
}

/// Answer to a block switch, naming the block server to connect to
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct BlockResponse {
    pub unknown: [u8; 0x0C],
    pub address: [u8; 4],
    pub port: u16,
    pub unknown2: [u8; 0x0A],
}

impl Payload for BlockResponse {
    const PACKET_TYPE: u32 = TYPE_BLOCK_RESPONSE;
}

impl Redirect for BlockResponse {
    fn redirect(&mut self, address: Ipv4Addr) -> Vec<SocketAddrV4> {
        let endpoint = SocketAddrV4::new(Ipv4Addr::from(self.address), self.port);
        self.address = address.octets();
        vec![endpoint]
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::Result;
    use crate::packet::Packet;
    use crate::packets::TYPE_BLOCKS2;

    pub(crate) fn block(index: u8) -> Block {
        let mut block = Block {
            unknown: [0; 7],
            name: [0; 0x20],
            address: [10, 1, 0, index],
            port: 12000 + index as u16,
            unknown2: [0xEE; 0x26],
        };
        block.set_name(&format!("B-{index:03}"));
        block
    }

    #[test]
    fn block_list_keeps_its_type() -> Result<()> {
        let blocks = Blocks::new(vec![block(1), block(2)]);
        let mut packet = blocks.to_packet()?;
        assert_eq!(packet.data.len(), 4 + 2 * 0x88);
        assert_eq!(packet.data[..4], [2, 0, 0, 0]);

        packet.packet_type = TYPE_BLOCKS2;
        let (rewritten, endpoints) =
            Blocks::rewrite(&packet, |blocks| blocks.redirect(Ipv4Addr::LOCALHOST))?;

        assert_eq!(rewritten.packet_type, TYPE_BLOCKS2);
        assert_eq!(
            endpoints,
            vec![
                "10.1.0.1:12001".parse::<SocketAddrV4>().unwrap(),
                "10.1.0.2:12002".parse::<SocketAddrV4>().unwrap()
            ]
        );

        let parsed = Blocks::from_packet(&rewritten)?;
        assert_eq!(parsed.entries[1].name(), "B-002");
        assert_eq!(parsed.entries[1].endpoint(), "127.0.0.1:12002".parse::<SocketAddrV4>().unwrap());
        Ok(())
    }

    #[test]
    fn rewrite_keeps_trailing_bytes() -> Result<()> {
        let mut data = vec![0x11; 0x0C];
        data.extend_from_slice(&[1, 2, 3, 4]);
        data.extend_from_slice(&12345u16.to_le_bytes());
        data.extend_from_slice(&[0x22; 0x0A]);
        data.extend_from_slice(b"extra");
        let packet = Packet::new(TYPE_BLOCK_RESPONSE, data).with_flags(4);

        let (rewritten, endpoints) =
            BlockResponse::rewrite(&packet, |response| response.redirect(Ipv4Addr::new(5, 6, 7, 8)))?;

        assert_eq!(endpoints, vec!["1.2.3.4:12345".parse::<SocketAddrV4>().unwrap()]);
        assert_eq!(rewritten.flags, 4);
        assert_eq!(rewritten.data.len(), packet.data.len());
        assert_eq!(rewritten.data[0x0C..0x10], [5, 6, 7, 8]);
        assert_eq!(&rewritten.data[0x1C..], b"extra");
        Ok(())
    }
}
