//! Relaying connections to an upstream server
//!

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use smol::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::packet::HeaderFormat;
use crate::route::PacketRoute;

/// What handlers of a proxied connection get to see: the connection the packet came from and the proxy that knows
/// its partner
#[derive(Clone)]
pub struct Relay {
    proxy: Arc<Proxy>,
    connection: Arc<Connection>,
}

impl Relay {
    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The other end of the pair
    pub fn destination(&self) -> Result<Arc<Connection>> {
        self.proxy
            .destination(&self.connection)
            .ok_or_else(|| Error::NoDestination(self.connection.to_string()))
    }
}

impl AsRef<Connection> for Relay {
    fn as_ref(&self) -> &Connection {
        &self.connection
    }
}

/// Route of one direction of a proxied pair
pub type RelayRoute = PacketRoute<Relay>;

/// Accepts connections on one endpoint and pairs each of them with a fresh connection to an upstream endpoint
pub struct Proxy {
    listen_endpoint: String,
    upstream_endpoint: String,
    format: HeaderFormat,
    pairs: Mutex<HashMap<u64, Arc<Connection>>>,
}

impl Proxy {
    pub fn new(listen_endpoint: impl Into<String>, upstream_endpoint: impl Into<String>, format: HeaderFormat) -> Arc<Self> {
        Arc::new(Proxy {
            listen_endpoint: listen_endpoint.into(),
            upstream_endpoint: upstream_endpoint.into(),
            format,
            pairs: Mutex::new(HashMap::new()),
        })
    }

    pub fn listen_endpoint(&self) -> &str {
        &self.listen_endpoint
    }

    pub fn upstream_endpoint(&self) -> &str {
        &self.upstream_endpoint
    }

    pub async fn listen(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(self.listen_endpoint.as_str()).await?)
    }

    /// The partner of `connection`, while their pair is relaying
    pub fn destination(&self, connection: &Connection) -> Option<Arc<Connection>> {
        self.pairs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&connection.id())
            .cloned()
    }

    /// Number of connections currently relaying, both sides counted
    pub fn active_connections(&self) -> usize {
        self.pairs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Accept connections forever, relaying each on its own task.
    ///
    /// `client_route` sees the packets sent by accepted clients, `server_route` the ones coming back from upstream.
    #[instrument(skip_all, fields(proxy = %self))]
    pub async fn start(
        self: Arc<Self>,
        listener: TcpListener,
        client_route: Arc<RelayRoute>,
        server_route: Arc<RelayRoute>,
    ) -> Result<()> {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "listener failed");
                    return Err(e.into());
                }
            };
            info!(%peer, "new connection");

            let proxy = self.clone();
            let client_route = client_route.clone();
            let server_route = server_route.clone();
            smol::spawn(async move { proxy.serve(stream, client_route, server_route).await }).detach();
        }
    }

    async fn serve(self: Arc<Self>, stream: TcpStream, client_route: Arc<RelayRoute>, server_route: Arc<RelayRoute>) {
        let client = match Connection::new(stream, self.format) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!(proxy = %self, error = %e, "accepted connection unusable");
                return;
            }
        };

        let server = match Connection::connect(self.upstream_endpoint.as_str(), self.format).await {
            Ok(server) => Arc::new(server),
            Err(e) => {
                error!(proxy = %self, %client, error = %e, "upstream connection failed");
                client.close();
                return;
            }
        };

        if let Err(e) = self.relay(client, client_route, server, server_route).await {
            debug!(proxy = %self, error = %e, "relay ended");
        }
    }

    /// Pump packets both ways between `client` and `server` until either side fails, then close both.
    ///
    /// Returns the error that ended the relay.
    pub async fn relay(
        self: &Arc<Self>,
        client: Arc<Connection>,
        client_route: Arc<RelayRoute>,
        server: Arc<Connection>,
        server_route: Arc<RelayRoute>,
    ) -> Result<()> {
        info!(proxy = %self, %client, %server, "relaying");
        {
            let mut pairs = self.pairs.lock().unwrap_or_else(PoisonError::into_inner);
            pairs.insert(client.id(), server.clone());
            pairs.insert(server.id(), client.clone());
        }

        let spawn_pump = |connection: &Arc<Connection>, partner: &Arc<Connection>, route: Arc<RelayRoute>| {
            let relay = Relay {
                proxy: self.clone(),
                connection: connection.clone(),
            };
            let partner = partner.clone();
            smol::spawn(async move {
                let result = pump(&relay, &route).await;
                relay.connection.close();
                partner.close();
                result
            })
        };

        let upward = spawn_pump(&client, &server, client_route);
        let downward = spawn_pump(&server, &client, server_route);
        let (upward, downward) = futures::join!(upward, downward);

        {
            let mut pairs = self.pairs.lock().unwrap_or_else(PoisonError::into_inner);
            pairs.remove(&client.id());
            pairs.remove(&server.id());
        }

        let result = upward.and(downward);
        info!(proxy = %self, %client, "relay closed");
        result
    }
}

/// Dispatch every packet read from the relay's connection, forwarding the ones nobody consumed.
async fn pump(relay: &Relay, route: &RelayRoute) -> Result<()> {
    loop {
        let packet = relay.connection.read_packet().await?;
        if !route.dispatch(relay, &packet).await? {
            warn!(connection = %relay.connection, %packet, "unhandled packet, forwarding");
            relay.destination()?.write_packet(&packet).await?;
        }
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.listen_endpoint, self.upstream_endpoint)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("listen_endpoint", &self.listen_endpoint)
            .field("upstream_endpoint", &self.upstream_endpoint)
            .field("format", &self.format)
            .field("active_connections", &self.active_connections())
            .finish()
    }
}
