//! Component catalogue for the archetype store
//!
//! The set of component kinds is closed and known at compile time. Each kind
//! owns one bit of a [`Signature`]. Data components are stored as one dense
//! column per [`Bag`]; tag components only occupy their signature bit and are
//! used purely for query filtering.
//!
//! Adding a component means adding one line to the `component_catalogue!`
//! invocation at the bottom of this file. The macro generates the
//! [`ComponentKind`] enum, the bag columns and the typed cursor accessors on
//! [`Query`](crate::query::Query).

use crate::math::Vec2;
use crate::network::NetworkId;
use crate::query::Query;
use crate::store::Lookup;
use serde::{Deserialize, Serialize};

/// Sprite drawn for an entity by a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Sprite {
    #[default]
    Unset,
    Ship,
    Missile,
    Star,
}

/// Steering state of a ship, replicated so every peer simulates the same ship.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ShipControl {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
    /// Seconds until the ship may fire again.
    pub fire_cooldown: f32,
}

/// Fixed-width bitset over [`ComponentKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Signature(u64);

impl Signature {
    pub const EMPTY: Signature = Signature(0);

    pub const fn with(self, kind: ComponentKind) -> Self {
        Signature(self.0 | kind.bit())
    }

    pub fn insert(&mut self, kind: ComponentKind) {
        self.0 |= kind.bit();
    }

    pub const fn contains(self, kind: ComponentKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// True when every bit of `required` is also set in `self`.
    pub const fn is_superset_of(self, required: Signature) -> bool {
        self.0 & required.0 == required.0
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub fn kinds(self) -> impl Iterator<Item = ComponentKind> {
        ComponentKind::ALL
            .iter()
            .copied()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<ComponentKind> for Signature {
    fn from_iter<I: IntoIterator<Item = ComponentKind>>(iter: I) -> Self {
        iter.into_iter().fold(Signature::EMPTY, Signature::with)
    }
}

#[cold]
fn missing_component(kind: ComponentKind) -> ! {
    panic!("entity under cursor has no {:?} component", kind)
}

macro_rules! component_catalogue {
    (
        data {
            $( $kind:ident($ty:ty) => $field:ident, $get:ident; )*
        }
        tags {
            $( $tag:ident, )*
        }
    ) => {
        /// Every component kind, data components first.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum ComponentKind {
            $( $kind, )*
            $( $tag, )*
        }

        impl ComponentKind {
            pub const ALL: &'static [ComponentKind] = &[
                $( ComponentKind::$kind, )*
                $( ComponentKind::$tag, )*
            ];

            pub const fn bit(self) -> u64 {
                1 << (self as u8)
            }

            /// Tags occupy a signature bit but store no data.
            pub const fn is_tag(self) -> bool {
                !matches!(self, $( ComponentKind::$kind )|*)
            }
        }

        /// All entities sharing one exact signature, one dense column per
        /// data component in that signature.
        ///
        /// Every present column has exactly `len` elements.
        #[derive(Debug)]
        pub struct Bag {
            signature: Signature,
            len: usize,
            $( pub(crate) $field: Option<Vec<$ty>>, )*
        }

        impl Bag {
            pub(crate) fn new(signature: Signature) -> Self {
                Self {
                    signature,
                    len: 0,
                    $( $field: signature.contains(ComponentKind::$kind).then(Vec::new), )*
                }
            }

            pub fn signature(&self) -> Signature {
                self.signature
            }

            pub fn len(&self) -> usize {
                self.len
            }

            pub fn is_empty(&self) -> bool {
                self.len == 0
            }

            /// Appends a default-valued slot to every column.
            pub(crate) fn push_default(&mut self) -> usize {
                $(
                    if let Some(column) = self.$field.as_mut() {
                        column.push(<$ty>::default());
                    }
                )*
                self.len += 1;
                self.len - 1
            }

            /// Moves the last slot into `slot` in every column and shrinks by one.
            pub(crate) fn swap_remove(&mut self, slot: usize) {
                assert!(slot < self.len, "slot {} out of range for bag of {}", slot, self.len);
                $(
                    if let Some(column) = self.$field.as_mut() {
                        column.swap_remove(slot);
                    }
                )*
                self.len -= 1;
            }
        }

        impl Query<'_> {
            $(
                #[doc = concat!("The current entity's `", stringify!($kind), "`; panics if its bag lacks one.")]
                pub fn $field(&mut self) -> &mut $ty {
                    match self.$get() {
                        Some(value) => value,
                        None => missing_component(ComponentKind::$kind),
                    }
                }

                #[doc = concat!("The current entity's `", stringify!($kind), "`, if its bag has that column.")]
                pub fn $get(&mut self) -> Option<&mut $ty> {
                    let (bag, slot) = self.position();
                    self.store_mut().bag_mut(bag).$field.as_mut().map(|column| &mut column[slot])
                }
            )*
        }
    };
}

component_catalogue! {
    data {
        Pos(Vec2) => pos, get_pos;
        Momentum(Vec2) => momentum, get_momentum;
        Rot(f32) => rot, get_rot;
        Spin(f32) => spin, get_spin;
        Sprite(Sprite) => sprite, get_sprite;
        ShipControl(ShipControl) => ship_control, get_ship_control;
        TimedDestroy(f32) => timed_destroy, get_timed_destroy;
        NetworkId(NetworkId) => network_id, get_network_id;
        Lookup(Lookup) => lookup_component, get_lookup_component;
    }
    tags {
        KeepInCamera,
        AffectedByGravity,
        PointRender,
        Missile,
        FrameEndDelete,
        TransmitPos,
        ReceivePos,
        TransmitMomentum,
        ReceiveMomentum,
        TransmitRot,
        ReceiveRot,
        TransmitSpin,
        ReceiveSpin,
        TransmitShipControl,
        ReceiveShipControl,
    }
}

const _: () = assert!(ComponentKind::ALL.len() <= 64, "Signature holds at most 64 kinds");
