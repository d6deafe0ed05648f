//! Admission and liveness bookkeeping for connected clients
//!
//! The client manager decides who may connect, issues each accepted client
//! its [`ConnectionId`], and notices clients that stopped sending. It knows
//! nothing about the simulation; the server turns removals into router
//! disconnects and game cleanup.

use log::info;
use shared::ConnectionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected client's transport metadata
#[derive(Debug)]
pub struct Client {
    pub id: ConnectionId,
    /// Peer address, reported when the client leaves
    pub addr: SocketAddr,
    /// Last time a frame arrived from this client
    pub last_seen: Instant,
    /// Frames received so far
    pub updates_received: u64,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            updates_received: 0,
        }
    }

    /// Records activity from this client.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.updates_received += 1;
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks every admitted client and enforces the capacity limit
///
/// Ids start at 1 and are never reused, so a late frame from a departed
/// client can never be attributed to a newcomer.
pub struct ClientManager {
    clients: HashMap<ConnectionId, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Admits a client connecting from `addr`.
    ///
    /// Returns `None` when the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = ConnectionId(self.next_client_id);
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Returns true if the client was still registered.
    pub fn remove_client(&mut self, client_id: ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!(
                "Client {} ({}) disconnected after {} updates",
                client.id, client.addr, client.updates_received
            );
            true
        } else {
            false
        }
    }

    pub fn touch(&mut self, client_id: ConnectionId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
    }

    pub fn get(&self, client_id: ConnectionId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Removes and returns every client silent for longer than `timeout`.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(*client_id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new(ConnectionId(1), test_addr());

        assert_eq!(client.id, ConnectionId(1));
        assert_eq!(client.addr, test_addr());
        assert_eq!(client.updates_received, 0);
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(ConnectionId(1), test_addr());
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));

        client.touch();
        assert!(!client.is_timed_out(Duration::from_secs(1)));
        assert_eq!(client.updates_received, 1);
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);

        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(client_id1, ConnectionId(1));
        assert_eq!(client_id2, ConnectionId(2));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(test_addr()).is_some());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut manager = ClientManager::new(1);

        let first = manager.add_client(test_addr()).unwrap();
        assert!(manager.remove_client(first));
        let second = manager.add_client(test_addr()).unwrap();

        assert!(second > first);
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new(2);

        assert!(!manager.remove_client(ConnectionId(999)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_check_timeouts_removes_silent_clients() {
        let mut manager = ClientManager::new(3);
        let silent = manager.add_client(test_addr()).unwrap();
        let active = manager.add_client(test_addr2()).unwrap();

        manager.clients.get_mut(&silent).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);
        manager.touch(active);

        let timed_out = manager.check_timeouts(Duration::from_secs(5));

        assert_eq!(timed_out, vec![silent]);
        assert!(manager.get(silent).is_none());
        assert_eq!(manager.get(active).map(|c| c.updates_received), Some(1));
    }
}
