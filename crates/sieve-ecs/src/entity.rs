//! Entity identities and the allocation table.
//!
//! An [`Entity`] is a slot index plus the generation the slot had when the
//! identity was handed out. Freeing a slot bumps its generation, so every
//! handle to the previous occupant goes stale at once: it can no longer
//! reach the membership bitset or the storages of whoever reuses the slot.

use std::fmt;

/// Per-slot reuse counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(u32);

impl Generation {
    /// The generation of a never-used slot.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// The generation after one more free.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Slot index into the per-entity tables.
pub type EntityId = u32;

/// An opaque identity in the world. Carries no data of its own.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    id: EntityId,
    generation: Generation,
}

impl Entity {
    #[must_use]
    pub const fn new(id: EntityId, generation: Generation) -> Self {
        Self { id, generation }
    }

    /// Slot index, also the row of the entity's membership bitset.
    #[must_use]
    pub const fn id(self) -> EntityId {
        self.id
    }

    #[must_use]
    pub const fn generation(self) -> Generation {
        self.generation
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.id, self.generation.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id, self.generation.0)
    }
}

#[derive(Clone, Copy)]
struct Slot {
    generation: Generation,
    live: bool,
}

/// The allocation table: which identities currently exist.
///
/// Entities with no components exist only here. Freed slots are reused
/// last-in first-out, always under a fresh generation.
#[derive(Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free: Vec<EntityId>,
    live: u32,
}

impl EntityAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve room for `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Hand out an identity, reusing a freed slot when there is one.
    pub fn allocate(&mut self) -> Entity {
        self.live += 1;

        if let Some(id) = self.free.pop() {
            let slot = &mut self.slots[id as usize];
            slot.live = true;
            return Entity::new(id, slot.generation);
        }

        let id = self.slots.len() as EntityId;
        self.slots.push(Slot {
            generation: Generation::new(),
            live: true,
        });
        Entity::new(id, Generation::new())
    }

    /// Free `entity`'s slot. Stale or already freed handles are ignored
    /// and give `false`.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }

        let slot = &mut self.slots[entity.id() as usize];
        slot.generation = slot.generation.next();
        slot.live = false;
        self.free.push(entity.id());
        self.live -= 1;
        true
    }

    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.id() as usize)
            .is_some_and(|slot| slot.live && slot.generation == entity.generation())
    }

    /// Number of live identities.
    #[must_use]
    pub const fn alive_count(&self) -> u32 {
        self.live
    }
}
