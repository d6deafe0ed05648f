//! Server network layer: TCP sessions, admission and the tick loop

use crate::client_manager::ClientManager;
use log::{debug, error, info, warn};
use shared::game::MAX_STEP;
use shared::session::run_session;
use shared::{Game, Input, MemoRouter, Role};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};

pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

/// Dedicated server hosting one game instance
pub struct Server {
    listener: Arc<TcpListener>,
    router: Arc<MemoRouter>,
    clients: Arc<RwLock<ClientManager>>,
    game: Game,
    tick_duration: Duration,
    idle_timeout: Duration,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        idle_timeout: Duration,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener: Arc::new(listener),
            router: Arc::new(MemoRouter::new()),
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game: Game::new(Role::Server),
            tick_duration,
            idle_timeout,
        })
    }

    /// Address actually bound, useful when listening on port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn router(&self) -> Arc<MemoRouter> {
        Arc::clone(&self.router)
    }

    /// Spawns the task that admits new connections and runs their sessions
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let router = Arc::clone(&self.router);
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let admitted = clients.write().await.add_client(addr);
                        match admitted {
                            Some(id) => {
                                let connection = router.connect(id);
                                let router = Arc::clone(&router);
                                let clients = Arc::clone(&clients);
                                tokio::spawn(async move {
                                    serve_connection(stream, &connection).await;
                                    router.disconnect(connection.id);
                                    clients.write().await.remove_client(connection.id);
                                });
                            }
                            None => warn!("Rejecting {}: server full", addr),
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that disconnects clients which went silent
    fn spawn_timeout_checker(&self) {
        let router = Arc::clone(&self.router);
        let clients = Arc::clone(&self.clients);
        let idle_timeout = self.idle_timeout;

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;
                sweep_idle_clients(&clients, &router, idle_timeout).await;
            }
        });
    }

    /// Runs one simulation step and publishes its output
    async fn tick(&mut self, dt: f32) {
        for departed in self.router.take_departed() {
            self.game.drop_connection(departed);
        }

        let inbound = self.router.collect_inbound();
        if !inbound.is_empty() {
            let mut clients = self.clients.write().await;
            for (id, _) in &inbound {
                clients.touch(*id);
            }
        }

        let memos = self.game.step(dt, &Input::default(), inbound);
        for memo in memos {
            self.router.publish(memo);
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_acceptor();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server running at {:?} per tick", self.tick_duration);

        loop {
            tick_interval.tick().await;

            let now = Instant::now();
            let mut dt = (now - last_tick).as_secs_f32();
            last_tick = now;

            if dt > MAX_STEP {
                debug!("Large tick delta ({:.3}s), capping to {:.3}s", dt, MAX_STEP);
                dt = MAX_STEP;
            }

            self.tick(dt).await;
        }
    }
}

/// Disconnects every client silent for longer than `idle_timeout`; closing
/// its mailboxes ends the session. Returns how many were dropped.
async fn sweep_idle_clients(
    clients: &RwLock<ClientManager>,
    router: &MemoRouter,
    idle_timeout: Duration,
) -> usize {
    let timed_out = clients.write().await.check_timeouts(idle_timeout);
    for client_id in &timed_out {
        warn!("Client {} timed out", client_id);
        router.disconnect(*client_id);
    }
    timed_out.len()
}

async fn serve_connection(stream: TcpStream, connection: &shared::Connection) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", connection.id, e);
    }

    let (reader, writer) = stream.into_split();
    match run_session(reader, writer, connection).await {
        Ok(()) => info!("Session {} ended", connection.id),
        Err(e) => warn!("Session {} failed: {}", connection.id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::frame::{write_message, FrameReader};
    use shared::{NetworkId, NetworkUpdate, SpawnType};

    async fn test_server(max_clients: usize) -> Server {
        Server::new(
            "127.0.0.1:0",
            Duration::from_millis(10),
            max_clients,
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_tick_relays_spawn_between_clients() {
        let mut server = test_server(4).await;
        let router = server.router();
        let a = router.connect(shared::ConnectionId(1));
        let b = router.connect(shared::ConnectionId(2));

        let mut update = NetworkUpdate::new();
        update.spawn(NetworkId(10), SpawnType::Ship);
        a.submit(update);

        server.tick(0.01).await;

        assert!(a.outbound.try_receive().is_none());
        let relayed = b.outbound.try_receive().unwrap();
        assert!(relayed.spawn_events.contains_key(&NetworkId(10)));
    }

    #[tokio::test]
    async fn test_tick_destroys_departed_clients_entities() {
        let mut server = test_server(4).await;
        let router = server.router();
        let a = router.connect(shared::ConnectionId(1));
        let b = router.connect(shared::ConnectionId(2));

        let mut update = NetworkUpdate::new();
        update.spawn(NetworkId(10), SpawnType::Ship);
        a.submit(update);
        server.tick(0.01).await;
        b.outbound.try_receive();

        router.disconnect(a.id);
        server.tick(0.01).await;

        let destroyed = b.outbound.try_receive().unwrap();
        assert!(destroyed.destroy_events.contains(&NetworkId(10)));
        assert!(router.live_spawns().is_empty());
    }

    #[tokio::test]
    async fn test_idle_sweep_disconnects_and_closes_session() {
        let server = test_server(4).await;
        let addr = server.local_addr().unwrap();
        let router = server.router();
        server.spawn_acceptor();

        let silent = TcpStream::connect(addr).await.unwrap();
        for _ in 0..100 {
            if router.connection_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(router.connection_count(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let dropped = sweep_idle_clients(&server.clients, &router, Duration::ZERO).await;

        assert_eq!(dropped, 1);
        assert_eq!(router.connection_count(), 0);
        assert!(server.clients.read().await.is_empty());

        let mut frames = FrameReader::new(silent);
        let closed = tokio::time::timeout(
            Duration::from_secs(1),
            frames.read_message::<NetworkUpdate>(),
        )
        .await
        .unwrap();
        assert!(matches!(closed, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn test_idle_sweep_keeps_active_clients() {
        let server = test_server(4).await;
        let router = server.router();
        let id = server
            .clients
            .write()
            .await
            .add_client("127.0.0.1:9000".parse().unwrap())
            .unwrap();
        let _connection = router.connect(id);

        let dropped = sweep_idle_clients(&server.clients, &router, Duration::from_secs(60)).await;

        assert_eq!(dropped, 0);
        assert!(router.is_connected(id));
    }

    #[tokio::test]
    async fn test_full_server_rejects_connection() {
        let mut server = test_server(1).await;
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.run().await });

        let _first = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = TcpStream::connect(addr).await.unwrap();

        let mut frames = FrameReader::new(second);
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            frames.read_message::<NetworkUpdate>(),
        )
        .await
        .unwrap();
        assert!(matches!(result, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn test_tcp_client_sees_other_clients_ship() {
        let mut server = test_server(4).await;
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.run().await });

        let mut first = TcpStream::connect(addr).await.unwrap();
        let mut spawn = NetworkUpdate::new();
        spawn.spawn(NetworkId(77), SpawnType::Ship);
        write_message(&mut first, &spawn).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = TcpStream::connect(addr).await.unwrap();
        let mut frames = FrameReader::new(second);
        let priming: NetworkUpdate = tokio::time::timeout(Duration::from_secs(1), frames.read_message())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(priming.spawn_events.contains_key(&NetworkId(77)));
    }
}
