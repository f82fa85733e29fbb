//! This library speaks the *Phantasy Star Online 2* packet protocol and relays it through a rewriting proxy.
//!
//! # Packet Protocol Documentation
//!
//! Every packet starts with an 8 byte little-endian header. Two layouts exist, see [`packet::HeaderFormat`]:
//!
//! | Offset (bytes) | Legacy          | Revised         |
//! |----------------|-----------------|-----------------|
//! | 0x0000         | Size, u32       | Size, u32       |
//! | 0x0004         | Type, u16       | Type, u32       |
//! | 0x0006         | Flags, u16      |                 |
//!
//! The size includes the header and is bounded by [`packet::MAX_PACKET_SIZE`].
//!
//! ## Session Cipher
//!
//! A session opens with a [`packets::CipherPacket`] holding a 32 byte secret encrypted with RSA PKCS#1 v1.5, its
//! ciphertext bytes reversed. The second half of the secret keys RC4 for every byte that follows, headers
//! included, with one keystream per direction.
//!
//! ## Proxy
//!
//! A [`proxy::Proxy`] pairs every accepted client with a fresh upstream connection. Packets are offered to a
//! [`route::PacketRoute`] first; the handlers in [`handlers`] re-encrypt the session secret for the real server
//! and point ship, block and room addresses back at the proxy.
//!

pub mod cipher;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod packet;
pub mod packets;
pub mod proxy;
pub mod route;

pub use connection::Connection;
pub use packet::{HeaderFormat, Packet};
pub use proxy::{Proxy, Relay, RelayRoute};
pub use route::{Ignore, PacketHandler, PacketRoute};
