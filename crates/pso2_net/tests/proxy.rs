use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use pretty_assertions::assert_eq;
use rsa::RsaPrivateKey;
use smol::net::TcpListener;
use tracing_test::traced_test;

use pso2_net::error::Result;
use pso2_net::handlers::{CipherHandler, DumpHandler, EndpointListener, FallbackHandler, ProxyCipherHandler, ShipHandler};
use pso2_net::packets::{CipherPacket, Payload, Ship, ShipEntry, SHIP_COUNT, TYPE_CIPHER, TYPE_SHIP};
use pso2_net::route::{PRIORITY_HIGH, PRIORITY_LOW, PRIORITY_NORMAL};
use pso2_net::{Connection, HeaderFormat, Ignore, Packet, PacketHandler, PacketRoute, Proxy, RelayRoute};

const TYPE_PING: u32 = 0x0311;
const TYPE_ASK_SHIPS: u32 = 0x1111;

fn ships() -> Ship {
    let entries = std::array::from_fn(|i| {
        let mut entry = ShipEntry {
            unknown: 0x12,
            number: 10000 + i as u32 * 100 + 99,
            name: [0; 0x10],
            address: [10, 0, 0, i as u8 + 1],
            zero: 0,
            unknown2: 1,
        };
        entry.set_name(&format!("Ship{:02}", i + 1));
        entry
    });
    Ship {
        entries,
        unknown: [0; 3],
    }
}

/// Upstream behaviour: answers pings with themselves and ship requests with the ship list
struct Upstream;

impl PacketHandler<Connection> for Upstream {
    fn handle<'a>(&'a self, connection: &'a Connection, packet: &'a Packet) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            match packet.packet_type {
                TYPE_PING => connection.write_packet(packet).await?,
                TYPE_ASK_SHIPS => connection.write_packet(&ships().to_packet()?).await?,
                _ => return Ok(false),
            }
            Ok(true)
        })
    }
}

async fn upstream(listener: TcpListener, key: Arc<RsaPrivateKey>, dumps: std::path::PathBuf) -> Result<()> {
    let (stream, _) = listener.accept().await?;
    let connection = Connection::new(stream, HeaderFormat::Revised)?;

    let mut route = PacketRoute::new();
    route
        .route_mask(u32::MAX, PRIORITY_HIGH, DumpHandler::new(dumps))
        .route(TYPE_CIPHER, PRIORITY_NORMAL, CipherHandler::new(key))
        .route_mask(u32::MAX, PRIORITY_NORMAL, Upstream);
    connection.route_packets(&route).await
}

#[traced_test]
#[test]
fn proxy_rekeys_and_redirects() -> Result<()> {
    smol::block_on(async {
        let mut rng = rand::thread_rng();
        let proxy_key = Arc::new(RsaPrivateKey::new(&mut rng, 1024)?);
        let server_key = Arc::new(RsaPrivateKey::new(&mut rng, 1024)?);

        let dumps = std::env::temp_dir().join(format!("pso2_net-proxy-{}", std::process::id()));
        std::fs::create_dir_all(&dumps)?;

        let upstream_listener = TcpListener::bind("127.0.0.1:0").await?;
        let upstream_addr = upstream_listener.local_addr()?;
        let upstream_task = smol::spawn(upstream(upstream_listener, server_key.clone(), dumps.clone()));

        let announced = Arc::new(Mutex::new(Vec::new()));
        let sink = announced.clone();
        let endpoints: Arc<dyn EndpointListener> = Arc::new(move |endpoint: SocketAddrV4| {
            sink.lock().unwrap().push(endpoint);
        });

        let mut client_route = RelayRoute::new();
        client_route
            .route(TYPE_CIPHER, PRIORITY_HIGH, Ignore(CipherHandler::new(proxy_key.clone())))
            .route(
                TYPE_CIPHER,
                PRIORITY_NORMAL,
                ProxyCipherHandler::new(proxy_key.clone(), Arc::new(server_key.to_public_key())),
            );
        let mut server_route = RelayRoute::new();
        server_route
            .route(TYPE_SHIP, PRIORITY_NORMAL, ShipHandler::new(Ipv4Addr::LOCALHOST, endpoints))
            .route_mask(u32::MAX, PRIORITY_LOW, FallbackHandler);

        let proxy = Proxy::new("127.0.0.1:0", upstream_addr.to_string(), HeaderFormat::Revised);
        let listener = proxy.listen().await?;
        let proxy_addr = listener.local_addr()?;
        smol::spawn(proxy.clone().start(listener, Arc::new(client_route), Arc::new(server_route))).detach();

        let client = Connection::connect(proxy_addr, HeaderFormat::Revised).await?;
        let secret: Vec<u8> = (0..0x20).collect();
        client
            .write_packet(&CipherPacket::new(&secret, &proxy_key.to_public_key())?.to_packet()?)
            .await?;
        client.set_cipher(Some(&secret[0x10..]))?;

        // Nothing on the client route takes pings, so they are forwarded as they are
        let ping = Packet::new(TYPE_PING, b"are you there".to_vec());
        client.write_packet(&ping).await?;
        assert_eq!(client.read_packet().await?, ping);
        assert_eq!(proxy.active_connections(), 2);

        client.write_packet(&Packet::new(TYPE_ASK_SHIPS, Vec::new())).await?;
        let ship = Ship::from_packet(&client.read_packet().await?)?;
        for entry in &ship.entries {
            assert_eq!(entry.address(), Ipv4Addr::LOCALHOST);
        }
        assert_eq!(ship.entries[2].name(), "Ship03");

        let expected: Vec<SocketAddrV4> = (0..SHIP_COUNT)
            .map(|i| SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, i as u8 + 1), 12000 + i as u16 * 100 + 99))
            .collect();
        assert_eq!(*announced.lock().unwrap(), expected);

        client.close();
        assert!(upstream_task.await.is_err());

        let dump = std::fs::read_dir(&dumps)?.next().unwrap()?.path();
        let records = std::fs::read(&dump)?;
        assert_eq!(records[..4], 0x10Cu32.to_le_bytes());
        assert_eq!(records[4..8], TYPE_CIPHER.to_le_bytes());
        std::fs::remove_dir_all(&dumps)?;
        Ok(())
    })
}

#[traced_test]
#[test]
fn upstream_failure_closes_the_client() -> Result<()> {
    smol::block_on(async {
        // Bind and drop to find a port nobody listens on
        let unused = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;

        let proxy = Proxy::new("127.0.0.1:0", unused.to_string(), HeaderFormat::Revised);
        let listener = proxy.listen().await?;
        let proxy_addr = listener.local_addr()?;
        smol::spawn(proxy.clone().start(listener, Arc::new(RelayRoute::new()), Arc::new(RelayRoute::new()))).detach();

        let client = Connection::connect(proxy_addr, HeaderFormat::Revised).await?;
        assert!(client.read_packet().await.is_err());
        assert_eq!(proxy.active_connections(), 0);
        Ok(())
    })
}
