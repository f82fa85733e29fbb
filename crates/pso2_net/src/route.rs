//! Priority ordered packet dispatch
//!

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use tracing::trace;

use crate::error::Result;
use crate::packet::Packet;

/// Priority of handlers that only run when nothing else took the packet
pub const PRIORITY_LOW: i32 = -100;
/// Default priority
pub const PRIORITY_NORMAL: i32 = 0;
/// Priority of handlers that must see the packet first
pub const PRIORITY_HIGH: i32 = 100;

/// Something reacting to packets arriving on a connection
///
/// `C` is whatever the dispatcher hands over alongside the packet, usually the connection it came from. Returning
/// `true` consumes the packet and stops the dispatch.
pub trait PacketHandler<C>: Send + Sync {
    fn handle<'a>(&'a self, context: &'a C, packet: &'a Packet) -> BoxFuture<'a, Result<bool>>;
}

impl<C, F> PacketHandler<C> for F
where
    F: Fn(&C, &Packet) -> Result<bool> + Send + Sync,
{
    fn handle<'a>(&'a self, context: &'a C, packet: &'a Packet) -> BoxFuture<'a, Result<bool>> {
        Box::pin(future::ready(self(context, packet)))
    }
}

/// Runs a handler for its side effects, never consuming the packet
pub struct Ignore<H>(pub H);

impl<C, H: PacketHandler<C>> PacketHandler<C> for Ignore<H> {
    fn handle<'a>(&'a self, context: &'a C, packet: &'a Packet) -> BoxFuture<'a, Result<bool>> {
        let inner = self.0.handle(context, packet);
        Box::pin(async move {
            inner.await?;
            Ok(false)
        })
    }
}

struct Binding<C> {
    priority: i32,
    sequence: usize,
    handler: Arc<dyn PacketHandler<C>>,
}

/// A table of handlers bound to exact packet types or to type masks
pub struct PacketRoute<C> {
    exact: HashMap<u32, Vec<Binding<C>>>,
    masks: Vec<(u32, Binding<C>)>,
    registered: usize,
}

impl<C> Default for PacketRoute<C> {
    fn default() -> Self {
        PacketRoute {
            exact: HashMap::new(),
            masks: Vec::new(),
            registered: 0,
        }
    }
}

impl<C> fmt::Debug for PacketRoute<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketRoute")
            .field("types", &self.exact.keys().collect::<Vec<_>>())
            .field("masks", &self.masks.iter().map(|(mask, _)| mask).collect::<Vec<_>>())
            .finish()
    }
}

impl<C> PacketRoute<C> {
    pub fn new() -> Self {
        Self::default()
    }

    fn binding(&mut self, priority: i32, handler: impl PacketHandler<C> + 'static) -> Binding<C> {
        self.registered += 1;
        Binding {
            priority,
            sequence: self.registered,
            handler: Arc::new(handler),
        }
    }

    /// Bind `handler` to packets of exactly `packet_type`.
    pub fn route(&mut self, packet_type: u32, priority: i32, handler: impl PacketHandler<C> + 'static) -> &mut Self {
        let binding = self.binding(priority, handler);
        self.exact.entry(packet_type).or_default().push(binding);
        self
    }

    /// Bind `handler` to every packet whose type shares a bit with `mask`.
    pub fn route_mask(&mut self, mask: u32, priority: i32, handler: impl PacketHandler<C> + 'static) -> &mut Self {
        let binding = self.binding(priority, handler);
        self.masks.push((mask, binding));
        self
    }

    /// Offer `packet` to the matching handlers, highest priority first and in registration order within a priority,
    /// until one consumes it. Returns whether one did.
    pub async fn dispatch(&self, context: &C, packet: &Packet) -> Result<bool> {
        let mut candidates: Vec<&Binding<C>> = self
            .masks
            .iter()
            .filter(|(mask, _)| mask & packet.packet_type != 0)
            .map(|(_, binding)| binding)
            .chain(self.exact.get(&packet.packet_type).into_iter().flatten())
            .collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));

        for binding in candidates {
            if binding.handler.handle(context, packet).await? {
                trace!(%packet, priority = binding.priority, "packet consumed");
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;
    use crate::error::Error;

    type Log = Mutex<Vec<&'static str>>;

    fn record(name: &'static str, consume: bool) -> impl Fn(&Log, &Packet) -> Result<bool> + Send + Sync {
        move |log, _| {
            log.lock().unwrap().push(name);
            Ok(consume)
        }
    }

    fn logged(log: &Log) -> Vec<&'static str> {
        log.lock().unwrap().clone()
    }

    #[traced_test]
    #[test]
    fn highest_priority_first_until_consumed() -> Result<()> {
        let mut route = PacketRoute::new();
        route
            .route_mask(u32::MAX, PRIORITY_LOW, record("fallback", true))
            .route(0x2c11, PRIORITY_NORMAL, record("block", true))
            .route_mask(u32::MAX, PRIORITY_HIGH, Ignore(record("dump", true)))
            .route(0x2c11, PRIORITY_HIGH, record("cipher", false));

        smol::block_on(async {
            let log = Log::default();
            assert!(route.dispatch(&log, &Packet::new(0x2c11, vec![])).await?);
            assert_eq!(logged(&log), vec!["dump", "cipher", "block"]);

            let log = Log::default();
            assert!(route.dispatch(&log, &Packet::new(0x1311, vec![])).await?);
            assert_eq!(logged(&log), vec!["dump", "fallback"]);
            Ok(())
        })
    }

    #[traced_test]
    #[test]
    fn masks_need_a_common_bit() -> Result<()> {
        let mut route = PacketRoute::new();
        route
            .route_mask(0xFF00, PRIORITY_NORMAL, record("high byte", false))
            .route_mask(0x00FF, PRIORITY_NORMAL, record("low byte", false))
            .route(0x0011, PRIORITY_NORMAL, record("exact", false));

        smol::block_on(async {
            let log = Log::default();
            let packet = Packet::new(0x0011, vec![1, 2, 3]);
            assert!(!route.dispatch(&log, &packet).await?);
            assert_eq!(logged(&log), vec!["low byte", "exact"]);
            assert_eq!(packet.data, vec![1, 2, 3]);

            let log = Log::default();
            assert!(!route.dispatch(&log, &Packet::new(0, vec![])).await?);
            assert!(logged(&log).is_empty());
            Ok(())
        })
    }

    #[test]
    fn errors_stop_the_dispatch() {
        let mut route = PacketRoute::new();
        route
            .route(1, PRIORITY_HIGH, |_: &Log, _: &Packet| -> Result<bool> {
                Err(Error::KeyNotFound("test key"))
            })
            .route(1, PRIORITY_NORMAL, record("never", true));

        let log = Log::default();
        let result = smol::block_on(route.dispatch(&log, &Packet::new(1, vec![])));
        assert!(matches!(result, Err(Error::KeyNotFound(_))));
        assert!(logged(&log).is_empty());
    }
}
