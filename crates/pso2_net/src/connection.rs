//! A framed, optionally encrypted TCP connection
//!

use std::fmt;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use smol::lock::Mutex;
use smol::net::{AsyncToSocketAddrs, TcpStream};
use tracing::{debug, warn};

use crate::cipher::CipherSlot;
use crate::error::Result;
use crate::packet::{read_packet, write_packet, HeaderFormat, Packet};
use crate::route::PacketRoute;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Both directions of a TCP connection speaking the packet protocol
///
/// Reading is meant to happen from one task at a time. Writes may come from any task and are serialized, so the
/// outbound keystream always matches the byte order on the wire.
pub struct Connection {
    id: u64,
    stream: TcpStream,
    format: HeaderFormat,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    inbound: CipherSlot,
    outbound: CipherSlot,
    write_lock: Mutex<()>,
}

impl Connection {
    /// Wrap an established stream, in plaintext until a cipher is set.
    pub fn new(stream: TcpStream, format: HeaderFormat) -> Result<Self> {
        Ok(Connection {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            local_addr: stream.local_addr()?,
            peer_addr: stream.peer_addr()?,
            stream,
            format,
            inbound: CipherSlot::new(),
            outbound: CipherSlot::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Dial `addr`.
    pub async fn connect<A: AsyncToSocketAddrs>(addr: A, format: HeaderFormat) -> Result<Self> {
        Connection::new(TcpStream::connect(addr).await?, format)
    }

    /// Process-unique identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Header layout used in both directions
    pub fn format(&self) -> HeaderFormat {
        self.format
    }

    /// Our end of the socket
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The remote end of the socket
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Seed both directions with independent RC4 keystreams from `key`, or go back to plaintext with `None`.
    pub fn set_cipher(&self, key: Option<&[u8]>) -> Result<()> {
        debug!(connection = %self, enabled = key.is_some(), "switching cipher");
        self.inbound.set(key)?;
        self.outbound.set(key)
    }

    /// Whether a cipher is set
    pub fn is_encrypted(&self) -> bool {
        self.inbound.is_active()
    }

    /// Read the next packet, decrypting it when a cipher is set.
    pub async fn read_packet(&self) -> Result<Packet> {
        let mut stream = self.stream.clone();
        read_packet(&mut stream, self.format, &self.inbound).await
    }

    /// Write `packet` in one piece, encrypting it when a cipher is set.
    ///
    /// Concurrent writers wait for each other.
    pub async fn write_packet(&self, packet: &Packet) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut stream = self.stream.clone();
        write_packet(&mut stream, self.format, &self.outbound, packet).await
    }

    /// Read packets and dispatch them with `self` as context until the connection fails.
    ///
    /// Packets nobody consumed are logged and dropped.
    pub async fn route_packets(&self, route: &PacketRoute<Connection>) -> Result<()> {
        loop {
            let packet = self.read_packet().await?;
            if !route.dispatch(self, &packet).await? {
                warn!(connection = %self, %packet, "packet ignored");
            }
        }
    }

    /// Shut both directions down, waking up any pending read.
    pub fn close(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(connection = %self, error = %e, "shutdown failed");
        }
    }
}

impl AsRef<Connection> for Connection {
    fn as_ref(&self) -> &Connection {
        self
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} -> {}", self.id, self.local_addr, self.peer_addr)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use smol::net::TcpListener;
    use tracing_test::traced_test;

    use super::*;

    async fn pair() -> Result<(Connection, Connection)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let client = TcpStream::connect(listener.local_addr()?).await?;
        let (server, _) = listener.accept().await?;
        Ok((
            Connection::new(client, HeaderFormat::Revised)?,
            Connection::new(server, HeaderFormat::Revised)?,
        ))
    }

    #[traced_test]
    #[test]
    fn packets_cross_the_socket() -> Result<()> {
        smol::block_on(async {
            let (client, server) = pair().await?;
            assert_eq!(client.local_addr(), server.peer_addr());

            let hello = Packet::new(0x0311, b"hello".to_vec());
            client.write_packet(&hello).await?;
            assert_eq!(server.read_packet().await?, hello);

            let key = [0x5Au8; 0x10];
            client.set_cipher(Some(&key))?;
            server.set_cipher(Some(&key))?;
            assert!(server.is_encrypted());

            let first = Packet::new(0x0311, vec![1; 0x20]);
            let second = Packet::new(0x2c11, vec![2; 3]);
            client.write_packet(&first).await?;
            client.write_packet(&second).await?;
            server.write_packet(&second).await?;
            assert_eq!(server.read_packet().await?, first);
            assert_eq!(server.read_packet().await?, second);
            assert_eq!(client.read_packet().await?, second);

            client.close();
            assert!(server.read_packet().await.is_err());
            Ok(())
        })
    }
}
