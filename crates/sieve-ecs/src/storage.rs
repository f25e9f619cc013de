//! Component storage - one sparse set per component type.
//!
//! Each storage keeps its values densely packed next to a parallel
//! entity list, plus a sparse map from entity to dense slot. The dense
//! entity list is the per-type index queries iterate: insertion order,
//! except that removal moves the last entry into the vacated slot.

use std::any::Any;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::{
    component::Component,
    entity::{Entity, EntityId},
};

/// Boxed type-erased component value.
pub type BoxedComponent = Box<dyn Any + Send + Sync>;

/// Storage for all values of one component type.
pub struct ComponentStorage<T> {
    /// Entity -> dense slot.
    sparse: HashMap<EntityId, usize, FxBuildHasher>,
    /// Entities in dense order.
    entities: Vec<Entity>,
    /// Values in dense order, parallel to `entities`.
    values: Vec<T>,
}

impl<T> Default for ComponentStorage<T> {
    fn default() -> Self {
        Self {
            sparse: HashMap::default(),
            entities: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T: Component> ComponentStorage<T> {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, entity: Entity) -> Option<usize> {
        let &slot = self.sparse.get(&entity.id())?;
        (self.entities[slot] == entity).then_some(slot)
    }

    /// Insert or overwrite. Returns the previous value.
    pub fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        if let Some(slot) = self.slot(entity) {
            return Some(std::mem::replace(&mut self.values[slot], value));
        }
        self.sparse.insert(entity.id(), self.entities.len());
        self.entities.push(entity);
        self.values.push(value);
        None
    }

    /// Get a value.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.slot(entity).map(|slot| &self.values[slot])
    }

    /// Get a value mutably.
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot(entity).map(|slot| &mut self.values[slot])
    }

    /// Remove a value, swapping the last entry into its slot.
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.slot(entity)?;
        self.sparse.remove(&entity.id());

        let last = self.entities.len() - 1;
        if slot != last {
            let moved = self.entities[last];
            self.sparse.insert(moved.id(), slot);
        }
        self.entities.swap_remove(slot);
        Some(self.values.swap_remove(slot))
    }
}

/// Object-safe view of a `ComponentStorage<T>`.
///
/// The world keeps one of these per registered tag and only downcasts
/// when a typed value is needed.
pub trait ErasedStorage: Send + Sync {
    /// Number of stored values.
    fn len(&self) -> usize;

    /// True if no values are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check for a value without touching it.
    fn contains(&self, entity: Entity) -> bool;

    /// The dense entity list (the per-type index).
    fn entities(&self) -> &[Entity];

    /// Get a value as `&dyn Any`.
    fn get_any(&self, entity: Entity) -> Option<&(dyn Any + Send + Sync)>;

    /// Remove a value, boxed.
    fn remove_boxed(&mut self, entity: Entity) -> Option<BoxedComponent>;

    /// Insert a boxed value. Hands the box back if its type is wrong.
    fn insert_boxed(
        &mut self,
        entity: Entity,
        value: BoxedComponent,
    ) -> Result<Option<BoxedComponent>, BoxedComponent>;

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed mutable access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedStorage for ComponentStorage<T> {
    fn len(&self) -> usize {
        self.entities.len()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.slot(entity).is_some()
    }

    fn entities(&self) -> &[Entity] {
        &self.entities
    }

    fn get_any(&self, entity: Entity) -> Option<&(dyn Any + Send + Sync)> {
        self.get(entity).map(|v| v as &(dyn Any + Send + Sync))
    }

    fn remove_boxed(&mut self, entity: Entity) -> Option<BoxedComponent> {
        self.remove(entity).map(|v| Box::new(v) as BoxedComponent)
    }

    fn insert_boxed(
        &mut self,
        entity: Entity,
        value: BoxedComponent,
    ) -> Result<Option<BoxedComponent>, BoxedComponent> {
        let value = value.downcast::<T>()?;
        Ok(self
            .insert(entity, *value)
            .map(|old| Box::new(old) as BoxedComponent))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Downcast an erased storage to its concrete type.
pub(crate) fn typed<T: Component>(storage: &dyn ErasedStorage) -> Option<&ComponentStorage<T>> {
    storage.as_any().downcast_ref::<ComponentStorage<T>>()
}

/// Mutable variant of [`typed`].
pub(crate) fn typed_mut<T: Component>(
    storage: &mut dyn ErasedStorage,
) -> Option<&mut ComponentStorage<T>> {
    storage.as_any_mut().downcast_mut::<ComponentStorage<T>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Generation;

    fn entity(id: u32) -> Entity {
        Entity::new(id, Generation::new())
    }

    #[test]
    fn test_insert_get_overwrite() {
        let mut storage = ComponentStorage::<u32>::new();

        assert_eq!(storage.insert(entity(1), 10), None);
        assert_eq!(storage.insert(entity(1), 11), Some(10));
        assert_eq!(storage.get(entity(1)), Some(&11));
        assert_eq!(storage.get(entity(2)), None);
        assert_eq!(ErasedStorage::len(&storage), 1);
    }

    #[test]
    fn test_remove_swaps_last_into_slot() {
        let mut storage = ComponentStorage::<&'static str>::new();
        storage.insert(entity(0), "a");
        storage.insert(entity(1), "b");
        storage.insert(entity(2), "c");

        assert_eq!(storage.remove(entity(0)), Some("a"));
        assert_eq!(storage.remove(entity(0)), None);
        assert_eq!(storage.entities(), &[entity(2), entity(1)]);
        assert_eq!(storage.get(entity(2)), Some(&"c"));
        assert_eq!(storage.get(entity(1)), Some(&"b"));
    }

    #[test]
    fn test_stale_generation_misses() {
        let mut storage = ComponentStorage::<u8>::new();
        storage.insert(entity(4), 1);

        let recycled = Entity::new(4, Generation::new().next());
        assert!(!storage.contains(recycled));
        assert_eq!(storage.remove(recycled), None);
        assert!(storage.contains(entity(4)));
    }

    #[test]
    fn test_boxed_roundtrip_rejects_wrong_type() {
        let mut storage = ComponentStorage::<u16>::new();

        assert!(storage.insert_boxed(entity(0), Box::new(7u16)).is_ok());
        let rejected = storage.insert_boxed(entity(1), Box::new("nope"));
        assert!(rejected.is_err());
        assert!(!storage.contains(entity(1)));

        let boxed = storage.remove_boxed(entity(0)).unwrap();
        assert_eq!(boxed.downcast_ref::<u16>(), Some(&7));
    }

    #[test]
    fn test_typed_downcast() {
        let mut erased: Box<dyn ErasedStorage> = Box::new(ComponentStorage::<i64>::new());
        typed_mut::<i64>(erased.as_mut()).unwrap().insert(entity(3), -1);

        assert!(typed::<u8>(erased.as_ref()).is_none());
        assert_eq!(typed::<i64>(erased.as_ref()).unwrap().get(entity(3)), Some(&-1));
    }
}
