//! Cursor over every entity whose bag satisfies a requirement mask
//!
//! A query is built up with [`Query::require`] calls and then driven with
//! [`Query::advance`]:
//!
//! ```
//! use shared::components::ComponentKind;
//! use shared::store::Store;
//!
//! let mut store = Store::new();
//! let mut q = store.query();
//! q.require(ComponentKind::Rot).require(ComponentKind::Spin);
//! while q.advance() {
//!     let spin = *q.spin();
//!     *q.rot() += spin;
//! }
//! ```
//!
//! Bags are visited in creation order and slots in physical order. The
//! entity under the cursor may be removed mid-traversal; the next `advance`
//! then visits the entity that was swapped into its slot. Removing any other
//! entity of the same bag while the traversal is live is not supported.

use crate::components::{ComponentKind, Signature};
use crate::store::{Lookup, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Unstarted,
    At,
    /// The entity under the cursor was removed; revisit the same slot.
    Revisit,
    Exhausted,
}

pub struct Query<'a> {
    store: &'a mut Store,
    requirement: Signature,
    bag: usize,
    slot: usize,
    cursor: Cursor,
}

impl<'a> Query<'a> {
    pub(crate) fn new(store: &'a mut Store) -> Self {
        Self {
            store,
            requirement: Signature::EMPTY,
            bag: 0,
            slot: 0,
            cursor: Cursor::Unstarted,
        }
    }

    /// Adds `kind` to the requirement mask.
    pub fn require(&mut self, kind: ComponentKind) -> &mut Self {
        self.requirement.insert(kind);
        self
    }

    pub fn requirement(&self) -> Signature {
        self.requirement
    }

    /// Moves to the next matching entity. Returns false once exhausted.
    pub fn advance(&mut self) -> bool {
        match self.cursor {
            Cursor::Exhausted => return false,
            Cursor::Unstarted => {
                self.bag = 0;
                self.slot = 0;
            }
            Cursor::At => self.slot += 1,
            Cursor::Revisit => {}
        }

        while self.bag < self.store.bag_count() {
            let bag = self.store.bag(self.bag);
            if bag.signature().is_superset_of(self.requirement) && self.slot < bag.len() {
                self.cursor = Cursor::At;
                return true;
            }
            self.bag += 1;
            self.slot = 0;
        }

        self.cursor = Cursor::Exhausted;
        false
    }

    /// Creates an entity in the bag whose signature equals the requirement
    /// mask and positions the cursor on it.
    pub fn spawn_matching(&mut self) {
        let bag = self.store.create_bag(self.requirement);
        self.slot = self.store.insert(bag);
        self.bag = bag;
        self.cursor = Cursor::At;
    }

    /// Positions the cursor on the entity behind `handle`.
    ///
    /// Panics if the entity has been removed.
    pub fn resolve(&mut self, handle: Lookup) {
        if !self.try_resolve(handle) {
            panic!("resolved lookup handle {:?} of a removed entity", handle);
        }
    }

    /// Like [`Query::resolve`] but reports a removed entity instead of panicking.
    pub fn try_resolve(&mut self, handle: Lookup) -> bool {
        match self.store.locate(handle) {
            Some((bag, slot)) => {
                self.bag = bag;
                self.slot = slot;
                self.cursor = Cursor::At;
                true
            }
            None => false,
        }
    }

    /// Swap-removes the entity under the cursor.
    pub fn remove(&mut self) {
        let (bag, slot) = self.position();
        self.store.remove_at(bag, slot);
        self.cursor = Cursor::Revisit;
    }

    /// Signature of the bag under the cursor.
    pub fn signature(&self) -> Signature {
        let (bag, _) = self.position();
        self.store.bag(bag).signature()
    }

    pub fn has(&self, kind: ComponentKind) -> bool {
        self.signature().contains(kind)
    }

    /// Handle of the entity under the cursor, when it carries a Lookup component.
    pub fn lookup(&mut self) -> Option<Lookup> {
        self.get_lookup_component().copied()
    }

    pub(crate) fn position(&self) -> (usize, usize) {
        match self.cursor {
            Cursor::At => (self.bag, self.slot),
            _ => panic!("query cursor is not positioned on an entity"),
        }
    }

    pub(crate) fn store_mut(&mut self) -> &mut Store {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Sprite;
    use crate::math::Vec2;

    fn spawn(store: &mut Store, kinds: &[ComponentKind]) {
        let mut q = store.query();
        for kind in kinds {
            q.require(*kind);
        }
        q.spawn_matching();
    }

    #[test]
    fn test_visits_only_matching_bags() {
        let mut store = Store::new();
        spawn(&mut store, &[ComponentKind::Pos]);
        spawn(&mut store, &[ComponentKind::Pos, ComponentKind::Rot]);
        spawn(&mut store, &[ComponentKind::Rot]);
        spawn(&mut store, &[ComponentKind::Pos, ComponentKind::Rot, ComponentKind::Spin]);

        let mut q = store.query();
        q.require(ComponentKind::Pos).require(ComponentKind::Rot);
        let mut visited = 0;
        while q.advance() {
            assert!(q.has(ComponentKind::Pos));
            assert!(q.has(ComponentKind::Rot));
            visited += 1;
        }

        assert_eq!(visited, 2);
        assert!(!q.advance());
    }

    #[test]
    fn test_every_superset_entity_visited_once() {
        let mut store = Store::new();
        let layouts: [&[ComponentKind]; 4] = [
            &[ComponentKind::Pos, ComponentKind::Momentum],
            &[ComponentKind::Pos, ComponentKind::Momentum, ComponentKind::TimedDestroy],
            &[ComponentKind::Pos, ComponentKind::PointRender],
            &[ComponentKind::Momentum],
        ];
        let mut marker = 0.0;
        for layout in layouts {
            for _ in 0..5 {
                let mut q = store.query();
                for kind in layout {
                    q.require(*kind);
                }
                q.spawn_matching();
                marker += 1.0;
                if let Some(pos) = q.get_pos() {
                    *pos = Vec2::new(marker, 0.0);
                }
            }
        }

        let mut seen = Vec::new();
        let mut q = store.query();
        q.require(ComponentKind::Pos).require(ComponentKind::Momentum);
        while q.advance() {
            seen.push(q.pos().x);
        }

        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let expected: Vec<f32> = (1..=10).map(|v| v as f32).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_remove_during_traversal_revisits_slot() {
        let mut store = Store::new();
        for i in 0..6 {
            let mut q = store.query();
            q.require(ComponentKind::TimedDestroy);
            q.spawn_matching();
            *q.timed_destroy() = i as f32;
        }

        let mut q = store.query();
        q.require(ComponentKind::TimedDestroy);
        let mut visited = 0;
        while q.advance() {
            visited += 1;
            if *q.timed_destroy() < 3.0 {
                q.remove();
            }
        }

        assert_eq!(visited, 6);
        assert_eq!(store.entity_count(), 3);

        let mut q = store.query();
        q.require(ComponentKind::TimedDestroy);
        while q.advance() {
            assert!(*q.timed_destroy() >= 3.0);
        }
    }

    #[test]
    fn test_remove_everything() {
        let mut store = Store::new();
        for _ in 0..4 {
            spawn(&mut store, &[ComponentKind::FrameEndDelete, ComponentKind::Pos]);
        }
        spawn(&mut store, &[ComponentKind::Pos]);

        let mut q = store.query();
        q.require(ComponentKind::FrameEndDelete);
        while q.advance() {
            q.remove();
        }

        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn test_optional_accessors() {
        let mut store = Store::new();
        let mut q = store.query();
        q.require(ComponentKind::Pos).require(ComponentKind::Sprite);
        q.spawn_matching();

        *q.sprite() = Sprite::Star;
        assert!(q.get_rot().is_none());
        assert_eq!(q.get_sprite().copied(), Some(Sprite::Star));
        assert_eq!(*q.pos(), Vec2::ZERO);
    }

    #[test]
    #[should_panic(expected = "no Rot component")]
    fn test_required_accessor_panics_when_absent() {
        let mut store = Store::new();
        let mut q = store.query();
        q.require(ComponentKind::Pos);
        q.spawn_matching();
        q.rot();
    }

    #[test]
    fn test_spawn_matching_reuses_bag() {
        let mut store = Store::new();
        spawn(&mut store, &[ComponentKind::Pos, ComponentKind::Sprite]);
        spawn(&mut store, &[ComponentKind::Sprite, ComponentKind::Pos]);

        assert_eq!(store.bag_count(), 1);
        assert_eq!(store.bag(0).len(), 2);
    }

    #[test]
    fn test_resolve_lookup() {
        let mut store = Store::new();
        let mut handles = Vec::new();
        for i in 0..3 {
            let mut q = store.query();
            q.require(ComponentKind::Lookup).require(ComponentKind::Rot);
            q.spawn_matching();
            *q.rot() = i as f32;
            handles.push(q.lookup().unwrap());
        }

        {
            let mut q = store.query();
            q.resolve(handles[0]);
            q.remove();
        }

        let mut q = store.query();
        assert!(!q.try_resolve(handles[0]));
        q.resolve(handles[2]);
        assert_eq!(*q.rot(), 2.0);
        q.resolve(handles[1]);
        assert_eq!(*q.rot(), 1.0);
    }

    #[test]
    #[should_panic(expected = "removed entity")]
    fn test_resolve_removed_entity_panics() {
        let mut store = Store::new();
        let mut q = store.query();
        q.require(ComponentKind::Lookup);
        q.spawn_matching();
        let handle = q.lookup().unwrap();
        q.remove();
        q.resolve(handle);
    }

    #[test]
    #[should_panic(expected = "not positioned")]
    fn test_accessor_before_advance_panics() {
        let mut store = Store::new();
        let mut q = store.query();
        q.pos();
    }
}
