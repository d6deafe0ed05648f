//! Client network layer: one session to the server and the local tick loop

use crate::input::Autopilot;
use log::{debug, info, warn};
use shared::frame::FrameError;
use shared::game::MAX_STEP;
use shared::session::run_session;
use shared::{ConnectionId, Game, Input, MemoRouter, Role};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// The only peer a client talks to.
pub const SERVER: ConnectionId = ConnectionId(0);

/// How often the client logs what it sees
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

pub struct Client {
    router: Arc<MemoRouter>,
    /// Taken once the session has been joined
    session: Option<JoinHandle<Result<(), FrameError>>>,
    game: Game,
    autopilot: Autopilot,
    input: Input,
    tick_duration: Duration,
}

impl Client {
    /// Connects to `server_addr` and starts the session pumping frames.
    pub async fn connect(
        server_addr: &str,
        tick_duration: Duration,
        rendered: bool,
        autopilot: Autopilot,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", stream.peer_addr()?);

        let router = Arc::new(MemoRouter::new());
        let connection = router.connect(SERVER);

        let session = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let (reader, writer) = stream.into_split();
                let result = run_session(reader, writer, &connection).await;
                router.disconnect(SERVER);
                result
            })
        };

        Ok(Client {
            router,
            session: Some(session),
            game: Game::new(Role::Client { rendered }),
            autopilot,
            input: Input::default(),
            tick_duration,
        })
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Applies what the server sent, steps the game and queues the output
    fn tick(&mut self, elapsed: f32, dt: f32) {
        self.autopilot.apply(elapsed, &mut self.input);

        let inbound = self.router.collect_inbound();
        let memos = self.game.advance(dt, &mut self.input, inbound);
        for memo in memos {
            self.router.publish(memo);
        }
    }

    /// Runs the tick loop, for `duration` if given or until the server goes
    /// away. The connection stays open afterwards; see [`Client::shutdown`].
    pub async fn run(&mut self, duration: Option<Duration>) -> Result<(), ClientError> {
        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let started = Instant::now();
        let mut last_tick = started;
        let mut last_report = started;

        loop {
            tick_interval.tick().await;

            match self.session.take() {
                Some(session) if session.is_finished() => {
                    return match session.await? {
                        Ok(()) => Err("server closed the connection".into()),
                        Err(e) => Err(e.into()),
                    };
                }
                Some(session) => self.session = Some(session),
                None => return Err("not connected".into()),
            }

            let now = Instant::now();
            if duration.map_or(false, |limit| now - started >= limit) {
                break;
            }

            let dt = (now - last_tick).as_secs_f32();
            last_tick = now;
            if dt > MAX_STEP * 4.0 {
                debug!("Slow frame of {:.3}s", dt);
            }
            self.tick((now - started).as_secs_f32(), dt);

            if now - last_report >= REPORT_INTERVAL {
                last_report = now;
                info!(
                    "{} remote ships, {} entities",
                    self.game.remote_ship_count(),
                    self.game.store().entity_count()
                );
            }
        }

        Ok(())
    }

    /// Closes the connection and waits briefly for the session to flush.
    pub async fn shutdown(self) {
        self.router.disconnect(SERVER);
        let Some(mut session) = self.session else {
            return;
        };
        if tokio::time::timeout(Duration::from_secs(1), &mut session)
            .await
            .is_err()
        {
            warn!("Session did not shut down in time");
            session.abort();
        }
    }
}
