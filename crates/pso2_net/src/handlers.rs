//! Packet handlers for ciphers, dumps and the proxy
//!

use std::marker::PhantomData;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::AsyncWriteExt;
use rsa::{RsaPrivateKey, RsaPublicKey};
use smol::fs::OpenOptions;
use tracing::{debug, trace, warn};

use crate::cipher::rc4_key;
use crate::connection::Connection;
use crate::error::Result;
use crate::packet::{Packet, HEADER_SIZE};
use crate::packets::{Block, BlockResponse, Blocks, CipherPacket, Payload, Redirect, Room, Ship};
use crate::proxy::Relay;
use crate::route::PacketHandler;

/// Receives the true endpoints found in packets the proxy rewrote
pub trait EndpointListener: Send + Sync {
    fn endpoint_announced(&self, endpoint: SocketAddrV4);
}

impl<F: Fn(SocketAddrV4) + Send + Sync> EndpointListener for F {
    fn endpoint_announced(&self, endpoint: SocketAddrV4) {
        self(endpoint)
    }
}

/// Enables RC4 on the connection a cipher packet arrived on
pub struct CipherHandler {
    private_key: Arc<RsaPrivateKey>,
}

impl CipherHandler {
    /// Decrypt secrets with `private_key`.
    pub fn new(private_key: Arc<RsaPrivateKey>) -> Self {
        CipherHandler { private_key }
    }
}

impl<C: AsRef<Connection> + Sync> PacketHandler<C> for CipherHandler {
    fn handle<'a>(&'a self, context: &'a C, packet: &'a Packet) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let connection = context.as_ref();
            debug!(%connection, "cipher packet, enabling encryption");

            let key = CipherPacket::from_packet(packet)?.rc4_key(&self.private_key)?;
            connection.set_cipher(Some(&key))?;
            Ok(true)
        })
    }
}

/// Appends every packet to `<directory>/<host>-<local port>-<remote port>.dump`
///
/// Records are `{size: u32, type: u32, flags: u16, data}`. Never consumes; failing to open the file is only a
/// warning.
pub struct DumpHandler {
    directory: PathBuf,
}

impl DumpHandler {
    /// Dump into `directory`, which must already exist.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        DumpHandler {
            directory: directory.into(),
        }
    }

    /// Dump file of `connection`
    pub fn path(&self, connection: &Connection) -> PathBuf {
        let local = connection.local_addr();
        let peer = connection.peer_addr();
        self.directory
            .join(format!("{}-{}-{}.dump", peer.ip(), local.port(), peer.port()))
    }

    /// A dump record for `packet`
    pub fn record(packet: &Packet) -> Vec<u8> {
        let mut record = Vec::with_capacity(HEADER_SIZE + 2 + packet.data.len());
        record.extend_from_slice(&((HEADER_SIZE + packet.data.len()) as u32).to_le_bytes());
        record.extend_from_slice(&packet.packet_type.to_le_bytes());
        record.extend_from_slice(&packet.flags.to_le_bytes());
        record.extend_from_slice(&packet.data);
        record
    }
}

impl<C: AsRef<Connection> + Sync> PacketHandler<C> for DumpHandler {
    fn handle<'a>(&'a self, context: &'a C, packet: &'a Packet) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let connection = context.as_ref();
            let path = self.path(connection);

            let mut file = match OpenOptions::new().create(true).append(true).open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!(%connection, path = %path.display(), error = %e, "cannot open dump file");
                    return Ok(false);
                }
            };
            file.write_all(&DumpHandler::record(packet)).await?;
            file.flush().await?;
            Ok(false)
        })
    }
}

/// Forwards packets to the other end of the pair untouched
pub struct FallbackHandler;

impl PacketHandler<Relay> for FallbackHandler {
    fn handle<'a>(&'a self, relay: &'a Relay, packet: &'a Packet) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            trace!(connection = %relay.connection(), %packet, "forwarding");
            relay.destination()?.write_packet(packet).await?;
            Ok(true)
        })
    }
}

/// Points the addresses of a [`Redirect`] payload at the proxy before forwarding it, announcing the true endpoints
pub struct RedirectHandler<T> {
    address: Ipv4Addr,
    listener: Arc<dyn EndpointListener>,
    payload: PhantomData<fn() -> T>,
}

impl<T> RedirectHandler<T> {
    /// Advertise `address` in place of the true endpoints, which go to `listener`.
    pub fn new(address: Ipv4Addr, listener: Arc<dyn EndpointListener>) -> Self {
        RedirectHandler {
            address,
            listener,
            payload: PhantomData,
        }
    }
}

impl<T: Redirect> PacketHandler<Relay> for RedirectHandler<T> {
    fn handle<'a>(&'a self, relay: &'a Relay, packet: &'a Packet) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            debug!(connection = %relay.connection(), %packet, "rewriting addresses");

            let (rewritten, endpoints) = T::rewrite(packet, |payload| payload.redirect(self.address))?;
            for endpoint in endpoints {
                self.listener.endpoint_announced(endpoint);
            }

            relay.destination()?.write_packet(&rewritten).await?;
            Ok(true)
        })
    }
}

pub type ShipHandler = RedirectHandler<Ship>;
pub type BlocksHandler = RedirectHandler<Blocks>;
pub type BlockHandler = RedirectHandler<Block>;
pub type BlockResponseHandler = RedirectHandler<BlockResponse>;
pub type RoomHandler = RedirectHandler<Room>;

/// Re-encrypts the session secret for the upstream server, then switches the upstream leg to RC4
///
/// Meant to run after an [`crate::route::Ignore`]d [`CipherHandler`] that rekeys the client leg.
pub struct ProxyCipherHandler {
    private_key: Arc<RsaPrivateKey>,
    public_key: Arc<RsaPublicKey>,
}

impl ProxyCipherHandler {
    /// Decrypt secrets with `private_key` and encrypt them again for `public_key`.
    pub fn new(private_key: Arc<RsaPrivateKey>, public_key: Arc<RsaPublicKey>) -> Self {
        ProxyCipherHandler {
            private_key,
            public_key,
        }
    }
}

impl PacketHandler<Relay> for ProxyCipherHandler {
    fn handle<'a>(&'a self, relay: &'a Relay, packet: &'a Packet) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            debug!(connection = %relay.connection(), "cipher packet, re-encrypting");

            let (rewritten, key) = CipherPacket::rewrite(packet, |cipher| -> Result<Vec<u8>> {
                let secret = cipher.secret(&self.private_key)?;
                let key = rc4_key(&secret)?.to_vec();
                cipher.set_secret(&secret, &self.public_key)?;
                Ok(key)
            })?;
            let key = key?;

            let destination = relay.destination()?;
            destination.write_packet(&rewritten).await?;
            destination.set_cipher(Some(&key))?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn dump_records() {
        let packet = Packet::new(0x2c11, vec![0xAB, 0xCD]).with_flags(4);

        #[rustfmt::skip]
        let expected = [
            0x0A, 0x00, 0x00, 0x00,
            0x11, 0x2C, 0x00, 0x00,
            0x04, 0x00,
            0xAB, 0xCD,
        ];
        assert_eq!(DumpHandler::record(&packet), expected);
    }
}
