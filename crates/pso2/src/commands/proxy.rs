use std::{net::Ipv4Addr, net::SocketAddrV4, path::PathBuf, sync::Arc};

use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use pso2_net::cipher::{load_private_key, load_public_key};
use pso2_net::handlers::{
    BlockHandler, BlockResponseHandler, BlocksHandler, CipherHandler, DumpHandler, EndpointListener, FallbackHandler,
    ProxyCipherHandler, ShipHandler,
};
use pso2_net::packets::{
    SHIP_COUNT, SHIP_HOSTNAMES, TYPE_BLOCK, TYPE_BLOCKS, TYPE_BLOCKS2, TYPE_BLOCK_RESPONSE, TYPE_CIPHER, TYPE_SHIP,
};
use pso2_net::route::{PRIORITY_HIGH, PRIORITY_LOW, PRIORITY_NORMAL};
use pso2_net::{HeaderFormat, Ignore, Proxy, RelayRoute};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::info;

/// First port of every ship
const BASE_PORT: u16 = 12000;
/// Ports reserved for each ship
const SHIP_PORTS: u16 = 100;

#[derive(Args)]
pub struct ProxyArgs {
    /// Private key the client encrypts its session secret for
    #[arg(long, value_name = "PEM")]
    private_key: PathBuf,

    /// Public key of the real servers
    #[arg(long, value_name = "PEM")]
    public_key: PathBuf,

    /// Address advertised to the client in place of the real servers
    #[arg(short, long, default_value_t = Ipv4Addr::LOCALHOST)]
    address: Ipv4Addr,

    /// Append every packet to files in this directory
    #[arg(short, long, value_name = "DIR")]
    dump: Option<PathBuf>,

    /// Header layout spoken by the servers
    #[arg(long, value_enum, default_value_t = Format::Revised)]
    format: Format,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
enum Format {
    Legacy,
    Revised,
}

impl From<Format> for HeaderFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Legacy => HeaderFormat::Legacy,
            Format::Revised => HeaderFormat::Revised,
        }
    }
}

fn read_key(path: &PathBuf) -> Result<String> {
    std::fs::read_to_string(path)
        .into_diagnostic()
        .context(format!("path: {}", path.display()))
}

struct LogEndpoints;

impl EndpointListener for LogEndpoints {
    fn endpoint_announced(&self, endpoint: SocketAddrV4) {
        info!(%endpoint, "endpoint announced");
    }
}

/// Handlers shared by every proxy
struct Routes {
    address: Ipv4Addr,
    private_key: Arc<RsaPrivateKey>,
    public_key: Arc<RsaPublicKey>,
    dump: Option<PathBuf>,
    endpoints: Arc<dyn EndpointListener>,
}

impl Routes {
    /// Forward everything, dumping it first if asked to
    fn fallback(&self) -> RelayRoute {
        let mut route = RelayRoute::new();
        route.route_mask(u32::MAX, PRIORITY_LOW, FallbackHandler);
        if let Some(dump) = &self.dump {
            route.route_mask(u32::MAX, PRIORITY_HIGH, Ignore(DumpHandler::new(dump)));
        }
        route
    }

    fn ship(&self) -> RelayRoute {
        let mut route = self.fallback();
        route.route(TYPE_SHIP, PRIORITY_NORMAL, ShipHandler::new(self.address, self.endpoints.clone()));
        route
    }

    fn block(&self) -> RelayRoute {
        let mut route = self.fallback();
        route.route(TYPE_BLOCK, PRIORITY_NORMAL, BlockHandler::new(self.address, self.endpoints.clone()));
        route
    }

    /// Packets from the client of a block server: rekey both legs on the cipher packet
    fn block_client(&self) -> RelayRoute {
        let mut route = self.fallback();
        route
            .route(TYPE_CIPHER, PRIORITY_HIGH, Ignore(CipherHandler::new(self.private_key.clone())))
            .route(
                TYPE_CIPHER,
                PRIORITY_NORMAL,
                ProxyCipherHandler::new(self.private_key.clone(), self.public_key.clone()),
            );
        route
    }

    /// Packets from a block server: keep block lists pointing at the proxies
    fn block_server(&self) -> RelayRoute {
        let mut route = self.fallback();
        for packet_type in [TYPE_BLOCKS, TYPE_BLOCKS2] {
            route.route(packet_type, PRIORITY_NORMAL, BlocksHandler::new(self.address, self.endpoints.clone()));
        }
        route.route(
            TYPE_BLOCK_RESPONSE,
            PRIORITY_NORMAL,
            BlockResponseHandler::new(self.address, self.endpoints.clone()),
        );
        route
    }
}

impl ProxyArgs {
    pub fn handle(&self) -> Result<()> {
        info!("loading private key");
        let private_key = load_private_key(&read_key(&self.private_key)?)
            .context(format!("reading {}", self.private_key.display()))?;
        info!("loading public key");
        let public_key = load_public_key(&read_key(&self.public_key)?)
            .context(format!("reading {}", self.public_key.display()))?;

        if let Some(dump) = &self.dump {
            std::fs::create_dir_all(dump)
                .into_diagnostic()
                .context(format!("creating {}", dump.display()))?;
        }

        let routes = Routes {
            address: self.address,
            private_key: Arc::new(private_key),
            public_key: Arc::new(public_key),
            dump: self.dump.clone(),
            endpoints: Arc::new(LogEndpoints),
        };
        let format = HeaderFormat::from(self.format);

        info!("starting proxy servers on {}", self.address);
        let mut tasks = Vec::new();
        let mut start = |port: u16, client: RelayRoute, server: RelayRoute| -> Result<()> {
            let host = SHIP_HOSTNAMES[usize::from((port - BASE_PORT) / SHIP_PORTS)];
            let proxy = Proxy::new(format!("0.0.0.0:{port}"), format!("{host}:{port}"), format);
            let listener = smol::block_on(proxy.listen()).context(format!("listening for {proxy}"))?;
            tasks.push(smol::spawn(proxy.start(listener, Arc::new(client), Arc::new(server))));
            Ok(())
        };

        for ship in 0..SHIP_COUNT as u16 {
            let block_port = BASE_PORT + SHIP_PORTS * ship;

            start(block_port + SHIP_PORTS - 1, routes.fallback(), routes.ship())?;
            start(block_port, routes.fallback(), routes.block())?;
            for block in 1..SHIP_PORTS - 1 {
                start(block_port + block, routes.block_client(), routes.block_server())?;
            }
        }
        info!("{} proxies listening", tasks.len());

        smol::block_on(async {
            for task in tasks {
                task.await?;
            }
            Ok(())
        })
    }
}
