//! The simulation step shared by server and client
//!
//! Both ends run the same [`Game::step`]. A client owns exactly one ship,
//! which it transmits; every other ship is a remote copy driven by received
//! tracks and simulated locally between updates. The server owns nothing: it
//! applies what each connection sends, relays it to everyone else, and
//! destroys what a connection owned once it leaves.

use crate::components::{ComponentKind, Signature, Sprite};
use crate::math::Vec2;
use crate::network::{NetworkId, NetworkIdAllocator, NetworkUpdate, SpawnType, Track};
use crate::query::Query;
use crate::router::{ConnectionId, Memo, Recipient};
use crate::store::{Lookup, Store};
use log::{debug, info, warn};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::f32::consts::PI;

use ComponentKind as K;

/// Longest single simulation step; longer frames are split.
pub const MAX_STEP: f32 = 1.0 / 20.0;

pub const ROTATION_FOR_SPEED: f32 = 5.0;
pub const ROTATION_AGAINST_SPEED: f32 = 10.0;
pub const FORWARD_SPEED: f32 = 2.0;
pub const FIRE_COOLDOWN: f32 = 0.5;
pub const MISSILE_SPEED: f32 = 10.0;
pub const MISSILE_LIFETIME: f32 = 10.0;
pub const GRAVITY_STRENGTH: f32 = 200.0;

const STAR_DENSITY: f32 = 0.05;
const STAR_BOX_RADIUS: f32 = 200.0;
const SUN_PARTICLES_PER_STEP: usize = 10;

const SHIP_BODY: [ComponentKind; 9] = [
    K::Pos,
    K::Rot,
    K::Sprite,
    K::Spin,
    K::Momentum,
    K::ShipControl,
    K::Lookup,
    K::AffectedByGravity,
    K::NetworkId,
];

const TRANSMIT_TAGS: [ComponentKind; 5] = [
    K::TransmitPos,
    K::TransmitMomentum,
    K::TransmitRot,
    K::TransmitSpin,
    K::TransmitShipControl,
];

/// Extra components of the ship this client steers.
const LOCAL_SHIP: [ComponentKind; 6] = [
    K::KeepInCamera,
    K::TransmitPos,
    K::TransmitMomentum,
    K::TransmitRot,
    K::TransmitSpin,
    K::TransmitShipControl,
];

const RECEIVE_TAGS: [ComponentKind; 5] = [
    K::ReceivePos,
    K::ReceiveMomentum,
    K::ReceiveRot,
    K::ReceiveSpin,
    K::ReceiveShipControl,
];

const MISSILE: [ComponentKind; 8] = [
    K::Pos,
    K::Rot,
    K::Spin,
    K::Momentum,
    K::Sprite,
    K::AffectedByGravity,
    K::TimedDestroy,
    K::Missile,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    /// `rendered` clients also simulate scenery that only matters on screen.
    Client { rendered: bool },
}

impl Role {
    pub fn is_server(&self) -> bool {
        matches!(self, Role::Server)
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, Role::Client { rendered: true })
    }
}

/// Edge-tracked state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Keystate {
    /// Went down during this frame.
    pub press: bool,
    pub hold: bool,
    /// Went up during this frame.
    pub release: bool,
}

impl Keystate {
    pub fn down(&mut self) {
        if !self.hold {
            self.press = true;
            self.hold = true;
        }
    }

    pub fn up(&mut self) {
        if self.hold {
            self.release = true;
            self.hold = false;
        }
    }

    pub fn frame_end_reset(&mut self) {
        self.press = false;
        self.release = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Input {
    pub up: Keystate,
    pub down: Keystate,
    pub left: Keystate,
    pub right: Keystate,
    pub fire: Keystate,
}

impl Input {
    pub fn frame_end_reset(&mut self) {
        self.up.frame_end_reset();
        self.down.frame_end_reset();
        self.left.frame_end_reset();
        self.right.frame_end_reset();
        self.fire.frame_end_reset();
    }
}

/// A missile requested while the ship traversal still borrows the store.
struct Launch {
    pos: Vec2,
    rot: f32,
    spin: f32,
    momentum: Vec2,
}

pub struct Game {
    store: Store,
    role: Role,
    controlled_ship: Option<Lookup>,
    initialized: bool,
    network_index: HashMap<NetworkId, Lookup>,
    owners: HashMap<ConnectionId, HashSet<NetworkId>>,
    ids: NetworkIdAllocator,
    outbox: NetworkUpdate,
}

impl Game {
    pub fn new(role: Role) -> Self {
        Self::with_allocator(role, NetworkIdAllocator::new())
    }

    /// Uses `ids` to name the entities this game spawns.
    pub fn with_allocator(role: Role, ids: NetworkIdAllocator) -> Self {
        Self {
            store: Store::new(),
            role,
            controlled_ship: None,
            initialized: false,
            network_index: HashMap::new(),
            owners: HashMap::new(),
            ids,
            outbox: NetworkUpdate::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Handle of this client's own ship, while it is alive.
    pub fn controlled_ship(&self) -> Option<Lookup> {
        self.controlled_ship
            .filter(|handle| self.store.is_alive(*handle))
    }

    pub fn knows(&self, id: NetworkId) -> bool {
        self.network_index.contains_key(&id)
    }

    /// Ships driven by another peer.
    pub fn remote_ship_count(&self) -> usize {
        self.store.count_matching(
            Signature::EMPTY
                .with(K::ShipControl)
                .with(K::ReceivePos),
        )
    }

    /// Runs several steps so that none is longer than [`MAX_STEP`], then
    /// clears this frame's key edges.
    pub fn advance(
        &mut self,
        mut dt: f32,
        input: &mut Input,
        inbound: Vec<(ConnectionId, NetworkUpdate)>,
    ) -> Vec<Memo> {
        let mut memos = Vec::new();
        let mut inbound = inbound;

        while dt > MAX_STEP {
            memos.extend(self.step(MAX_STEP, input, std::mem::take(&mut inbound)));
            dt -= MAX_STEP;
        }
        memos.extend(self.step(dt, input, inbound));

        input.frame_end_reset();
        memos
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// Applies `inbound` first, in the order given, and returns what must be
    /// published as a result of this step.
    pub fn step(
        &mut self,
        dt: f32,
        input: &Input,
        inbound: Vec<(ConnectionId, NetworkUpdate)>,
    ) -> Vec<Memo> {
        let mut memos = Vec::new();

        for (origin, update) in inbound {
            let accepted = self.apply_inbound(origin, update);
            if self.role.is_server() && !accepted.is_empty() {
                memos.push(Memo::new(Recipient::EveryoneBut(origin), accepted));
            }
        }

        self.apply_controls(input);
        if !self.initialized {
            self.initialize();
        }
        if self.role.is_rendered() {
            self.emit_sun_particles();
        }

        self.count_down_timed_destroy(dt);
        self.steer_ships(dt);
        self.integrate_spin(dt);
        self.apply_gravity(dt);
        self.integrate_momentum(dt);
        self.delete_frame_end();
        self.collect_tracks();

        let outbox = std::mem::take(&mut self.outbox);
        if !outbox.is_empty() {
            memos.push(Memo::new(Recipient::Everyone, outbox));
        }
        memos
    }

    /// Destroys every entity `connection` spawned. The destroys go out with
    /// the next step.
    pub fn drop_connection(&mut self, connection: ConnectionId) {
        let Some(owned) = self.owners.remove(&connection) else {
            return;
        };

        info!(
            "Dropping {} entities owned by connection {}",
            owned.len(),
            connection
        );
        for id in owned {
            if let Some(handle) = self.network_index.remove(&id) {
                let mut q = self.store.query();
                if q.try_resolve(handle) {
                    q.remove();
                }
            }
            self.outbox.destroy(id);
        }
    }

    /// Only the owner of an entity may change it on the server.
    fn may_modify(&self, origin: ConnectionId, id: NetworkId) -> bool {
        match self.role {
            Role::Server => self
                .owners
                .get(&origin)
                .map_or(false, |owned| owned.contains(&id)),
            Role::Client { .. } => true,
        }
    }

    /// Applies one received update and returns the part of it that was accepted.
    fn apply_inbound(&mut self, origin: ConnectionId, update: NetworkUpdate) -> NetworkUpdate {
        let NetworkUpdate {
            spawn_events,
            destroy_events,
            tracks,
        } = update;
        let mut accepted = NetworkUpdate::new();

        for id in destroy_events {
            if !self.may_modify(origin, id) {
                warn!("Connection {} may not destroy {:?}", origin, id);
                continue;
            }
            if let Some(handle) = self.network_index.remove(&id) {
                let mut q = self.store.query();
                if q.try_resolve(handle) {
                    q.remove();
                }
            }
            if let Some(owned) = self.owners.get_mut(&origin) {
                owned.remove(&id);
            }
            accepted.destroy(id);
        }

        for (id, kind) in spawn_events {
            if self.network_index.contains_key(&id) {
                debug!("Ignoring spawn of {:?}, which already exists", id);
                continue;
            }
            let handle = match kind {
                SpawnType::Ship => spawn_ship(&mut self.store, &RECEIVE_TAGS, id),
            };
            self.network_index.insert(id, handle);
            if self.role.is_server() {
                self.owners.entry(origin).or_default().insert(id);
            }
            accepted.spawn(id, kind);
        }

        for (id, track) in tracks {
            if !self.may_modify(origin, id) {
                continue;
            }
            let Some(&handle) = self.network_index.get(&id) else {
                continue;
            };
            let mut q = self.store.query();
            if q.try_resolve(handle) {
                apply_track(&mut q, &track);
                accepted.track(id, track);
            }
        }

        accepted
    }

    fn apply_controls(&mut self, input: &Input) {
        let Some(handle) = self.controlled_ship else {
            return;
        };
        let mut q = self.store.query();
        if !q.try_resolve(handle) {
            return;
        }

        let control = q.ship_control();
        control.up = input.up.hold;
        control.down = input.down.hold;
        control.left = input.left.hold;
        control.right = input.right.hold;
        control.fire = input.fire.hold;
    }

    fn initialize(&mut self) {
        self.initialized = true;
        let Role::Client { rendered } = self.role else {
            return;
        };

        let id = self.ids.allocate();
        let handle = spawn_ship(&mut self.store, &LOCAL_SHIP, id);
        {
            let mut q = self.store.query();
            q.resolve(handle);
            *q.pos() = Vec2::new(20.0, 0.0);
            *q.momentum() = Vec2::new(0.0, 5.0);
        }
        self.controlled_ship = Some(handle);
        self.network_index.insert(id, handle);
        self.outbox.spawn(id, SpawnType::Ship);
        info!("Spawned controlled ship {:?}", id);

        if rendered {
            self.spawn_stars();
        }
    }

    fn spawn_stars(&mut self) {
        {
            let mut q = self.store.query();
            q.require(K::Pos).require(K::Sprite);
            q.spawn_matching();
            *q.sprite() = Sprite::Star;
        }

        let mut rng = rand::thread_rng();
        let mut q = self.store.query();
        q.require(K::Pos).require(K::PointRender);
        let count = (STAR_DENSITY * STAR_BOX_RADIUS * STAR_BOX_RADIUS) as usize;
        for _ in 0..count {
            q.spawn_matching();
            *q.pos() = Vec2::new(
                rng.gen::<f32>() * STAR_BOX_RADIUS * 2.0 - STAR_BOX_RADIUS,
                rng.gen::<f32>() * STAR_BOX_RADIUS * 2.0 - STAR_BOX_RADIUS,
            );
        }
    }

    fn emit_sun_particles(&mut self) {
        let mut rng = rand::thread_rng();
        let mut q = self.store.query();
        q.require(K::Pos)
            .require(K::PointRender)
            .require(K::Momentum)
            .require(K::TimedDestroy);

        for _ in 0..SUN_PARTICLES_PER_STEP {
            q.spawn_matching();
            let mut rad = rng.gen::<f32>() * 2.0 * PI;
            *q.pos() = Vec2::from_radians(rad);
            rad += rng.gen::<f32>() * 2.0 - 1.0;
            *q.momentum() = Vec2::from_radians(rad).scale(rng.gen::<f32>() * 5.0 + 1.0);
            *q.timed_destroy() = rng.gen::<f32>() * 2.0 + 1.0;
        }
    }

    fn count_down_timed_destroy(&mut self, dt: f32) {
        let mut q = self.store.query();
        q.require(K::TimedDestroy);
        while q.advance() {
            *q.timed_destroy() -= dt;
            if *q.timed_destroy() <= 0.0 {
                forget(&mut q, &mut self.network_index, &mut self.outbox);
                q.remove();
            }
        }
    }

    fn steer_ships(&mut self, dt: f32) {
        let mut launches = Vec::new();

        {
            let mut q = self.store.query();
            q.require(K::Pos)
                .require(K::Rot)
                .require(K::ShipControl)
                .require(K::Spin)
                .require(K::Momentum);

            while q.advance() {
                let control = *q.ship_control();
                let spin = *q.spin();

                let mut spin_desire = 0.0;
                if control.left {
                    spin_desire += 1.0;
                }
                if control.right {
                    spin_desire -= 1.0;
                }
                if !control.left && !control.right {
                    spin_desire += if spin < 0.0 { 0.1 } else { -0.1 };
                }

                // Stopping a spin is easier than starting one.
                if (spin_desire < 0.0) == (spin < 0.0) {
                    spin_desire *= ROTATION_FOR_SPEED;
                } else {
                    spin_desire *= ROTATION_AGAINST_SPEED;
                }
                *q.spin() += spin_desire * dt;

                if control.up {
                    let thrust = Vec2::from_radians(*q.rot()).scale(FORWARD_SPEED * dt);
                    *q.momentum() += thrust;
                }

                let fire = {
                    let control = q.ship_control();
                    control.fire_cooldown -= dt;
                    let ready = control.fire_cooldown <= 0.0 && control.fire;
                    if ready {
                        control.fire_cooldown = FIRE_COOLDOWN;
                    }
                    ready
                };

                if fire {
                    launches.push(Launch {
                        pos: *q.pos(),
                        rot: *q.rot(),
                        spin: *q.spin(),
                        momentum: *q.momentum(),
                    });
                }
            }
        }

        for launch in launches {
            debug!("Missile launched at {:.1} degrees", launch.rot.to_degrees());
            let mut q = self.store.query();
            for kind in MISSILE {
                q.require(kind);
            }
            q.spawn_matching();
            *q.sprite() = Sprite::Missile;
            *q.timed_destroy() = MISSILE_LIFETIME;
            *q.pos() = launch.pos;
            *q.rot() = launch.rot;
            *q.spin() = launch.spin;
            *q.momentum() = launch.momentum + Vec2::from_radians(launch.rot).scale(MISSILE_SPEED);
        }
    }

    fn integrate_spin(&mut self, dt: f32) {
        let mut q = self.store.query();
        q.require(K::Rot).require(K::Spin);
        while q.advance() {
            let spin = *q.spin();
            *q.rot() += spin * dt;
        }
    }

    /// Pulls everything affected by gravity toward the sun at the origin.
    fn apply_gravity(&mut self, dt: f32) {
        let mut q = self.store.query();
        q.require(K::Pos)
            .require(K::AffectedByGravity)
            .require(K::Momentum);
        while q.advance() {
            let pos = *q.pos();
            let length = pos.length();
            let length_cubed = length * length * length;
            if length_cubed <= f32::EPSILON {
                continue;
            }
            *q.momentum() += pos.scale(-GRAVITY_STRENGTH * dt / length_cubed);
        }
    }

    fn integrate_momentum(&mut self, dt: f32) {
        let mut q = self.store.query();
        q.require(K::Pos).require(K::Momentum);
        while q.advance() {
            let momentum = *q.momentum();
            *q.pos() += momentum.scale(dt);
        }
    }

    fn delete_frame_end(&mut self) {
        let mut q = self.store.query();
        q.require(K::FrameEndDelete);
        while q.advance() {
            forget(&mut q, &mut self.network_index, &mut self.outbox);
            q.remove();
        }
    }

    /// Snapshots every field this peer transmits.
    fn collect_tracks(&mut self) {
        let mut q = self.store.query();
        q.require(K::NetworkId);
        while q.advance() {
            let signature = q.signature();
            if !transmits(signature) {
                continue;
            }

            let track = Track {
                pos: field(signature, K::TransmitPos, q.get_pos().copied()),
                momentum: field(signature, K::TransmitMomentum, q.get_momentum().copied()),
                rot: field(signature, K::TransmitRot, q.get_rot().copied()),
                spin: field(signature, K::TransmitSpin, q.get_spin().copied()),
                ship_control: field(
                    signature,
                    K::TransmitShipControl,
                    q.get_ship_control().copied(),
                ),
            };
            let id = *q.network_id();
            self.outbox.track(id, track);
        }
    }
}

fn transmits(signature: Signature) -> bool {
    TRANSMIT_TAGS.iter().any(|tag| signature.contains(*tag))
}

fn field<T>(signature: Signature, tag: ComponentKind, value: Option<T>) -> Option<T> {
    value.filter(|_| signature.contains(tag))
}

/// Spawns a ship carrying `replication` tags and returns its handle.
fn spawn_ship(store: &mut Store, replication: &[ComponentKind], id: NetworkId) -> Lookup {
    let mut q = store.query();
    for kind in SHIP_BODY.iter().chain(replication) {
        q.require(*kind);
    }
    q.spawn_matching();
    *q.sprite() = Sprite::Ship;
    *q.network_id() = id;
    *q.lookup_component()
}

fn apply_track(q: &mut Query<'_>, track: &Track) {
    if let Some(pos) = track.pos.filter(|_| q.has(K::ReceivePos)) {
        *q.pos() = pos;
    }
    if let Some(momentum) = track.momentum.filter(|_| q.has(K::ReceiveMomentum)) {
        *q.momentum() = momentum;
    }
    if let Some(rot) = track.rot.filter(|_| q.has(K::ReceiveRot)) {
        *q.rot() = rot;
    }
    if let Some(spin) = track.spin.filter(|_| q.has(K::ReceiveSpin)) {
        *q.spin() = spin;
    }
    if let Some(control) = track.ship_control.filter(|_| q.has(K::ReceiveShipControl)) {
        *q.ship_control() = control;
    }
}

/// Unlinks the entity under the cursor from the network before removal and
/// announces the destroy if this peer owns it.
fn forget(q: &mut Query<'_>, index: &mut HashMap<NetworkId, Lookup>, outbox: &mut NetworkUpdate) {
    let signature = q.signature();
    if let Some(id) = q.get_network_id().copied() {
        index.remove(&id);
        if transmits(signature) {
            outbox.destroy(id);
        }
    }
}
