//! Fan-out of simulation output to connected peers
//!
//! The router owns one outbound and one inbound [`Mailbox`] per connection.
//! The simulation publishes [`Memo`]s, each carrying a [`Recipient`] filter;
//! the router delivers the update into the outbound mailbox of every
//! connection the filter admits. It also remembers the spawn event of every
//! networked entity that is currently alive, so a connection that joins late
//! is primed with the full set of live entities before its first regular
//! update.
//!
//! All mailbox and spawn-memory mutation happens under one lock, so a
//! connect or disconnect racing a publish observes either none or all of it.

use crate::mailbox::Mailbox;
use crate::network::{NetworkId, NetworkUpdate, SpawnType};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Identifier of one peer connection. Issuers never reuse one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which connections a memo is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    To(ConnectionId),
    EveryoneBut(ConnectionId),
    Everyone,
}

impl Recipient {
    pub fn includes(&self, id: ConnectionId) -> bool {
        match *self {
            Recipient::To(target) => target == id,
            Recipient::EveryoneBut(excluded) => excluded != id,
            Recipient::Everyone => true,
        }
    }
}

/// An update addressed to a set of connections.
#[derive(Debug, Clone, PartialEq)]
pub struct Memo {
    pub recipient: Recipient,
    pub update: NetworkUpdate,
}

impl Memo {
    pub fn new(recipient: Recipient, update: NetworkUpdate) -> Self {
        Self { recipient, update }
    }
}

/// Transport-side view of one registered connection.
///
/// The writer task drains `outbound`; the reader task hands decoded updates
/// to [`Connection::submit`].
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub outbound: Arc<Mailbox>,
    inbound: Arc<Mailbox>,
}

impl Connection {
    /// Queues an update received from the peer for the next simulation step.
    pub fn submit(&self, update: NetworkUpdate) {
        self.inbound.send(update);
    }
}

#[derive(Debug)]
struct Peer {
    outbound: Arc<Mailbox>,
    inbound: Arc<Mailbox>,
}

#[derive(Debug, Default)]
struct RouterState {
    peers: BTreeMap<ConnectionId, Peer>,
    spawn_memory: HashMap<NetworkId, SpawnType>,
    departed: Vec<ConnectionId>,
}

#[derive(Debug, Default)]
pub struct MemoRouter {
    state: Mutex<RouterState>,
}

impl MemoRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` and primes its outbound mailbox with every live spawn.
    ///
    /// Panics if `id` is already registered.
    pub fn connect(&self, id: ConnectionId) -> Connection {
        let mut state = self.state.lock();
        if state.peers.contains_key(&id) {
            panic!("connection {} registered twice", id);
        }

        let outbound = Arc::new(Mailbox::new());
        let inbound = Arc::new(Mailbox::new());

        let mut priming = NetworkUpdate::new();
        priming.spawn_events = state.spawn_memory.clone();
        if !priming.is_empty() {
            outbound.send(priming);
        }

        state.peers.insert(
            id,
            Peer {
                outbound: Arc::clone(&outbound),
                inbound: Arc::clone(&inbound),
            },
        );
        info!(
            "Connection {} registered ({} live entities primed)",
            id,
            state.spawn_memory.len()
        );

        Connection {
            id,
            outbound,
            inbound,
        }
    }

    /// Unregisters `id` and closes its mailboxes. Returns false if it was not
    /// registered.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let mut state = self.state.lock();
        match state.peers.remove(&id) {
            Some(peer) => {
                peer.outbound.close();
                peer.inbound.close();
                state.departed.push(id);
                info!("Connection {} unregistered", id);
                true
            }
            None => false,
        }
    }

    /// Delivers `memo` to every admitted connection and updates spawn memory.
    pub fn publish(&self, memo: Memo) {
        let Memo { recipient, update } = memo;
        if update.is_empty() {
            return;
        }

        let mut state = self.state.lock();

        for id in &update.destroy_events {
            state.spawn_memory.remove(id);
        }
        for (id, kind) in &update.spawn_events {
            state.spawn_memory.insert(*id, *kind);
        }

        let mut delivered = 0;
        for (id, peer) in &state.peers {
            if recipient.includes(*id) {
                peer.outbound.send(update.clone());
                delivered += 1;
            }
        }
        debug!("Published memo for {:?} to {} connections", recipient, delivered);
    }

    /// Drains every inbound mailbox without blocking, in connection id order.
    pub fn collect_inbound(&self) -> Vec<(ConnectionId, NetworkUpdate)> {
        let state = self.state.lock();
        state
            .peers
            .iter()
            .filter_map(|(id, peer)| peer.inbound.try_receive().map(|update| (*id, update)))
            .collect()
    }

    /// Connections that disconnected since the previous call.
    pub fn take_departed(&self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.state.lock().departed)
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.state.lock().peers.contains_key(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    /// Spawn events of every entity currently believed alive.
    pub fn live_spawns(&self) -> HashMap<NetworkId, SpawnType> {
        self.state.lock().spawn_memory.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Track;

    fn spawns(ids: &[u64]) -> NetworkUpdate {
        let mut update = NetworkUpdate::new();
        for id in ids {
            update.spawn(NetworkId(*id), SpawnType::Ship);
        }
        update
    }

    fn tracked(id: u64) -> NetworkUpdate {
        let mut update = NetworkUpdate::new();
        update.track(NetworkId(id), Track::default());
        update
    }

    #[test]
    fn test_recipient_filter() {
        let a = ConnectionId(1);
        let b = ConnectionId(2);

        assert!(Recipient::To(a).includes(a));
        assert!(!Recipient::To(a).includes(b));
        assert!(!Recipient::EveryoneBut(a).includes(a));
        assert!(Recipient::EveryoneBut(a).includes(b));
        assert!(Recipient::Everyone.includes(a));
    }

    #[test]
    fn test_publish_respects_recipients() {
        let router = MemoRouter::new();
        let a = router.connect(ConnectionId(1));
        let b = router.connect(ConnectionId(2));
        let c = router.connect(ConnectionId(3));

        router.publish(Memo::new(Recipient::EveryoneBut(a.id), tracked(1)));
        assert!(a.outbound.try_receive().is_none());
        assert_eq!(b.outbound.try_receive(), Some(tracked(1)));
        assert_eq!(c.outbound.try_receive(), Some(tracked(1)));

        router.publish(Memo::new(Recipient::To(b.id), tracked(2)));
        assert!(a.outbound.try_receive().is_none());
        assert_eq!(b.outbound.try_receive(), Some(tracked(2)));
        assert!(c.outbound.try_receive().is_none());

        router.publish(Memo::new(Recipient::Everyone, tracked(3)));
        assert_eq!(a.outbound.try_receive(), Some(tracked(3)));
        assert_eq!(b.outbound.try_receive(), Some(tracked(3)));
        assert_eq!(c.outbound.try_receive(), Some(tracked(3)));
    }

    #[test]
    fn test_late_join_is_primed_with_live_spawns() {
        let router = MemoRouter::new();
        router.publish(Memo::new(Recipient::Everyone, spawns(&[1, 2, 3])));

        let late = router.connect(ConnectionId(9));
        let priming = late.outbound.try_receive().unwrap();

        assert_eq!(priming.spawn_events, spawns(&[1, 2, 3]).spawn_events);
        assert!(priming.destroy_events.is_empty());
        assert!(priming.tracks.is_empty());
    }

    #[test]
    fn test_destroy_forgets_spawn() {
        let router = MemoRouter::new();
        router.publish(Memo::new(Recipient::Everyone, spawns(&[1, 2])));
        let mut destroy = NetworkUpdate::new();
        destroy.destroy(NetworkId(1));
        router.publish(Memo::new(Recipient::Everyone, destroy));

        let late = router.connect(ConnectionId(5));
        let priming = late.outbound.try_receive().unwrap();

        assert_eq!(priming.spawn_events, spawns(&[2]).spawn_events);
    }

    #[test]
    fn test_destroy_of_unknown_id_is_ignored() {
        let router = MemoRouter::new();
        let mut destroy = NetworkUpdate::new();
        destroy.destroy(NetworkId(77));
        router.publish(Memo::new(Recipient::Everyone, destroy));

        assert!(router.live_spawns().is_empty());
        let late = router.connect(ConnectionId(1));
        assert!(late.outbound.try_receive().is_none());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_double_connect_panics() {
        let router = MemoRouter::new();
        router.connect(ConnectionId(1));
        router.connect(ConnectionId(1));
    }

    #[test]
    fn test_disconnect_closes_mailboxes() {
        let router = MemoRouter::new();
        let a = router.connect(ConnectionId(1));

        assert!(router.disconnect(a.id));
        assert!(!router.disconnect(a.id));
        assert!(a.outbound.is_closed());

        router.publish(Memo::new(Recipient::Everyone, tracked(1)));
        a.submit(tracked(2));
        assert!(a.outbound.try_receive().is_none());
        assert!(router.collect_inbound().is_empty());
        assert_eq!(router.take_departed(), vec![a.id]);
        assert!(router.take_departed().is_empty());
    }

    #[test]
    fn test_collect_inbound_in_id_order() {
        let router = MemoRouter::new();
        let c = router.connect(ConnectionId(3));
        let a = router.connect(ConnectionId(1));
        let b = router.connect(ConnectionId(2));

        c.submit(tracked(3));
        a.submit(tracked(1));
        a.submit(tracked(11));

        let inbound = router.collect_inbound();
        assert_eq!(inbound.len(), 2);
        assert_eq!(inbound[0].0, a.id);
        assert_eq!(inbound[0].1, tracked(1).merged(tracked(11)));
        assert_eq!(inbound[1].0, c.id);
        assert!(router.collect_inbound().is_empty());
        assert!(router.is_connected(b.id));
    }
}
