use std::net::{Ipv4Addr, SocketAddrV4};

use binrw::{BinRead, BinWrite};

use super::string::{decode_fixed_string, encode_fixed_string};
use super::{Payload, Redirect, TYPE_SHIP};

/// Number of ships in a ship list
pub const SHIP_COUNT: usize = 10;

/// Hosts of the ship servers, by ship
pub const SHIP_HOSTNAMES: [&str; SHIP_COUNT] = [
    "gs001.pso2gs.net",
    "gs016.pso2gs.net",
    "gs031.pso2gs.net",
    "gs046.pso2gs.net",
    "gs061.pso2gs.net",
    "gs076.pso2gs.net",
    "gs091.pso2gs.net",
    "gs106.pso2gs.net",
    "gs121.pso2gs.net",
    "gs136.pso2gs.net",
];

#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct ShipEntry {
    pub unknown: u32,
    pub number: u32,
    pub name: [u16; 0x10],
    pub address: [u8; 4],
    pub zero: u32,
    pub unknown2: u32,
}

impl ShipEntry {
    pub fn name(&self) -> String {
        decode_fixed_string(&self.name)
    }

    pub fn set_name(&mut self, value: &str) {
        encode_fixed_string(value, &mut self.name);
    }

    pub fn address(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.address)
    }

    pub fn set_address(&mut self, address: Ipv4Addr) {
        self.address = address.octets();
    }

    /// Port of the ship's block server list
    pub fn port(&self) -> u16 {
        12000 + (self.number % 10000) as u16
    }
}

/// List of ships sent by the ship server
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct Ship {
    pub entries: [ShipEntry; SHIP_COUNT],
    pub unknown: [u32; 3],
}

impl Payload for Ship {
    const PACKET_TYPE: u32 = TYPE_SHIP;
}

impl Redirect for Ship {
    fn redirect(&mut self, address: Ipv4Addr) -> Vec<SocketAddrV4> {
        self.entries
            .iter_mut()
            .map(|entry| {
                let endpoint = SocketAddrV4::new(entry.address(), entry.port());
                entry.set_address(address);
                endpoint
            })
            .collect()
    }
}
