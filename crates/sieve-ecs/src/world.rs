//! World - the context object that owns all entities and components.
//!
//! The world holds the component registry, one sparse-set storage per
//! registered type, the membership bitset of every entity and a handle to
//! the filter cache. Every mutation updates storage and membership in the
//! same call, after all checks have passed, so a failing call never leaves
//! the two out of step.

use std::{any::Any, fmt, sync::Arc};

use sieve_dsl::Expr;
use smallvec::SmallVec;

use crate::{
    component::{Component, ComponentId, ComponentInfo, ComponentRegistry},
    entity::{Entity, EntityAllocator},
    error::{EcsError, EcsResult},
    filter::{CompiledFilter, DEFAULT_MAX_VARIABLES, FilterCache, FilterExpr, and_of, not_of, or_of},
    membership::ComponentSet,
    query::{Query, QueryData},
    storage::{BoxedComponent, ComponentStorage, ErasedStorage, typed, typed_mut},
};

// ============================================================================
// Configuration
// ============================================================================

/// World construction settings.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Entity slots to reserve up front.
    pub entity_capacity: usize,
    /// Most distinct components a filter may reference. Clamped to
    /// [`MAX_VARIABLES`](crate::filter::MAX_VARIABLES).
    pub max_filter_variables: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 0,
            max_filter_variables: DEFAULT_MAX_VARIABLES,
        }
    }
}

// ============================================================================
// World
// ============================================================================

/// The ECS world - container for all entities and components.
pub struct World {
    config: WorldConfig,
    /// Entity ID allocator.
    entities: EntityAllocator,
    /// Membership bitset per entity slot.
    membership: Vec<ComponentSet>,
    /// Component type registry.
    components: ComponentRegistry,
    /// One storage per registered component, indexed by tag.
    storages: Vec<Box<dyn ErasedStorage>>,
    filters: Arc<FilterCache>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create an empty world with its own filter cache.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        let filters = Arc::new(FilterCache::with_max_variables(config.max_filter_variables));
        Self::with_filter_cache(config, filters)
    }

    /// Create an empty world that compiles filters through a shared cache.
    ///
    /// The cache's own variable limit applies; `config.max_filter_variables`
    /// is ignored.
    #[must_use]
    pub fn with_filter_cache(config: WorldConfig, filters: Arc<FilterCache>) -> Self {
        Self {
            entities: EntityAllocator::with_capacity(config.entity_capacity),
            membership: Vec::with_capacity(config.entity_capacity),
            components: ComponentRegistry::new(),
            storages: Vec::new(),
            filters,
            config,
        }
    }

    /// Settings this world was built with.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The filter cache used by this world's queries.
    #[must_use]
    pub fn filter_cache(&self) -> &Arc<FilterCache> {
        &self.filters
    }

    // ==================== Component Registration ====================

    /// Register a component type under its short type name.
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentId> {
        let id = self.components.register::<T>()?;
        self.add_storage::<T>(id);
        Ok(id)
    }

    /// Register a component type under an explicit name, for use in
    /// filter strings.
    pub fn register_named<T: Component>(&mut self, name: &str) -> EcsResult<ComponentId> {
        let id = self.components.register_named::<T>(name)?;
        self.add_storage::<T>(id);
        Ok(id)
    }

    fn add_storage<T: Component>(&mut self, id: ComponentId) {
        debug_assert_eq!(id.index(), self.storages.len());
        self.storages.push(Box::new(ComponentStorage::<T>::new()));
        tracing::debug!(
            component = %self.name_of(id),
            id = %id,
            type_name = std::any::type_name::<T>(),
            "registered component"
        );
    }

    /// Get the component ID for a type, if registered.
    #[must_use]
    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.components.get_id::<T>()
    }

    /// Get the component ID registered under `name`.
    #[must_use]
    pub fn component_id_by_name(&self, name: &str) -> Option<ComponentId> {
        self.components.get_id_by_name(name)
    }

    /// Get component info by ID.
    #[must_use]
    pub fn component_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.components.get_info(id)
    }

    /// The component registry.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Registered name of `id`, or its raw form if unknown.
    #[must_use]
    pub fn name_of(&self, id: ComponentId) -> String {
        self.components
            .get_info(id)
            .map_or_else(|| id.to_string(), |info| info.name().to_owned())
    }

    // ==================== Entity Operations ====================

    /// Spawn a new entity with no components.
    pub fn spawn_empty(&mut self) -> Entity {
        let entity = self.entities.allocate();
        let slot = entity.id() as usize;
        if slot >= self.membership.len() {
            self.membership.resize_with(slot + 1, ComponentSet::new);
        }
        entity
    }

    /// Spawn a new entity with one component.
    ///
    /// Nothing is allocated if `T` is not registered.
    pub fn spawn<T: Component>(&mut self, component: T) -> EcsResult<Entity> {
        self.components.id_of::<T>()?;
        let entity = self.spawn_empty();
        self.insert(entity, component)?;
        Ok(entity)
    }

    /// Spawn an entity and attach components to it one by one.
    ///
    /// ```
    /// # use sieve_ecs::World;
    /// # struct Position(f32); struct Velocity(f32);
    /// let mut world = World::new();
    /// world.register::<Position>()?;
    /// world.register::<Velocity>()?;
    ///
    /// let entity = world.build_entity().with(Position(0.0))?.with(Velocity(1.0))?.id();
    /// assert!(world.has::<Velocity>(entity)?);
    /// # Ok::<(), sieve_ecs::EcsError>(())
    /// ```
    pub fn build_entity(&mut self) -> EntityBuilder<'_> {
        let entity = self.spawn_empty();
        EntityBuilder {
            world: self,
            entity,
        }
    }

    /// Despawn an entity, dropping all of its components.
    ///
    /// Returns `false` if the entity was already dead.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }

        let bits = std::mem::take(&mut self.membership[entity.id() as usize]);
        let removed: SmallVec<[BoxedComponent; 8]> = bits
            .iter()
            .filter_map(|id| self.storages.get_mut(id.index())?.remove_boxed(entity))
            .collect();
        self.entities.deallocate(entity);

        tracing::debug!(%entity, components = removed.len(), "despawned entity");

        // Values drop only once storage, membership and allocator agree.
        drop(removed);
        true
    }

    /// Check if an entity is alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> u32 {
        self.entities.alive_count()
    }

    fn ensure_alive(&self, entity: Entity) -> EcsResult<()> {
        if self.entities.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::DeadEntity(entity))
        }
    }

    /// Membership bitset of a live entity.
    #[must_use]
    pub fn membership(&self, entity: Entity) -> Option<&ComponentSet> {
        if self.entities.is_alive(entity) {
            self.membership.get(entity.id() as usize)
        } else {
            None
        }
    }

    // ==================== Component Operations ====================

    /// Insert or overwrite a component. Returns the previous value.
    pub fn insert<T: Component>(&mut self, entity: Entity, component: T) -> EcsResult<Option<T>> {
        let id = self.components.id_of::<T>()?;
        self.ensure_alive(entity)?;

        let storage = storage_mut::<T>(&mut self.storages, id)?;
        let previous = storage.insert(entity, component);
        self.membership[entity.id() as usize].insert(id);
        Ok(previous)
    }

    /// Remove a component and return it.
    ///
    /// Fails with [`EcsError::NotFound`] if the entity does not hold one.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> EcsResult<T> {
        let id = self.components.id_of::<T>()?;
        self.ensure_alive(entity)?;

        let storage = storage_mut::<T>(&mut self.storages, id)?;
        match storage.remove(entity) {
            Some(value) => {
                self.membership[entity.id() as usize].remove(id);
                Ok(value)
            }
            None => Err(self.not_found(entity, id)),
        }
    }

    /// Get a component.
    ///
    /// Fails with [`EcsError::NotFound`] if the entity does not hold one.
    pub fn get<T: Component>(&self, entity: Entity) -> EcsResult<&T> {
        let id = self.components.id_of::<T>()?;
        self.ensure_alive(entity)?;

        self.storage::<T>(id)?
            .get(entity)
            .ok_or_else(|| self.not_found(entity, id))
    }

    /// Get a component mutably.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        let id = self.components.id_of::<T>()?;
        self.ensure_alive(entity)?;

        if !self.membership[entity.id() as usize].contains(id) {
            return Err(self.not_found(entity, id));
        }
        storage_mut::<T>(&mut self.storages, id)?
            .get_mut(entity)
            .ok_or(EcsError::UnknownComponentId(id))
    }

    /// Get a component if the entity holds one. Unregistered types and
    /// dead entities also give `None`.
    #[must_use]
    pub fn get_optional<T: Component>(&self, entity: Entity) -> Option<&T> {
        let id = self.components.get_id::<T>()?;
        self.storage::<T>(id).ok()?.get(entity)
    }

    /// Check whether the entity holds a `T`.
    ///
    /// Answered from the membership bitset. Dead entities hold nothing.
    pub fn has<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        let id = self.components.id_of::<T>()?;
        self.has_id(entity, id)
    }

    /// Check whether the entity holds the component tagged `id`.
    pub fn has_id(&self, entity: Entity, id: ComponentId) -> EcsResult<bool> {
        self.components.check(id)?;
        Ok(self.membership(entity).is_some_and(|bits| bits.contains(id)))
    }

    /// Check whether the entity holds every listed component.
    pub fn has_all(&self, entity: Entity, ids: &[ComponentId]) -> EcsResult<bool> {
        for &id in ids {
            self.components.check(id)?;
        }
        Ok(self
            .membership(entity)
            .is_some_and(|bits| ids.iter().all(|&id| bits.contains(id))))
    }

    /// Every component of an entity as `(tag, value)`, in tag order.
    ///
    /// This is the enumeration a serializer walks; [`World::insert_boxed`]
    /// is its inverse.
    pub fn components_of(
        &self,
        entity: Entity,
    ) -> EcsResult<impl Iterator<Item = (ComponentId, &(dyn Any + Send + Sync))>> {
        self.ensure_alive(entity)?;
        let bits = &self.membership[entity.id() as usize];
        Ok(bits
            .iter()
            .filter_map(move |id| Some((id, self.storages.get(id.index())?.get_any(entity)?))))
    }

    /// Insert a type-erased component value. Returns the previous value.
    ///
    /// Fails with [`EcsError::TypeMismatch`] if `value` is not the type
    /// registered under `id`; the entity is left untouched.
    pub fn insert_boxed(
        &mut self,
        entity: Entity,
        id: ComponentId,
        value: BoxedComponent,
    ) -> EcsResult<Option<BoxedComponent>> {
        let info = self
            .components
            .get_info(id)
            .ok_or(EcsError::UnknownComponentId(id))?;
        self.ensure_alive(entity)?;

        let mismatch = || EcsError::TypeMismatch {
            component: info.name().to_owned(),
            expected: info.type_name(),
        };
        if !info.accepts(&*value) {
            return Err(mismatch());
        }

        let storage = self
            .storages
            .get_mut(id.index())
            .ok_or(EcsError::UnknownComponentId(id))?;
        let previous = storage.insert_boxed(entity, value).map_err(|_| mismatch())?;
        self.membership[entity.id() as usize].insert(id);
        Ok(previous)
    }

    /// Number of values stored for the component tagged `id`.
    pub fn storage_len(&self, id: ComponentId) -> EcsResult<usize> {
        self.storages
            .get(id.index())
            .map(|storage| storage.len())
            .ok_or(EcsError::UnknownComponentId(id))
    }

    fn storage<T: Component>(&self, id: ComponentId) -> EcsResult<&ComponentStorage<T>> {
        self.storages
            .get(id.index())
            .and_then(|storage| typed::<T>(storage.as_ref()))
            .ok_or(EcsError::UnknownComponent {
                name: std::any::type_name::<T>(),
            })
    }

    fn not_found(&self, entity: Entity, id: ComponentId) -> EcsError {
        EcsError::NotFound {
            entity,
            component: self.name_of(id),
        }
    }

    // ==================== Queries ====================

    /// Query for entities holding every component in `base`.
    ///
    /// An empty `base` is allowed but matches nothing.
    pub fn query(&self, base: &[ComponentId]) -> EcsResult<Query> {
        self.check_ids(base.iter().copied())?;
        Ok(Query::new(base.iter().copied()))
    }

    /// Fail on the first tag this world never handed out.
    pub(crate) fn check_ids(&self, ids: impl IntoIterator<Item = ComponentId>) -> EcsResult<()> {
        ids.into_iter().try_for_each(|id| self.components.check(id))
    }

    /// Query for entities holding every component in the tuple `Q`.
    ///
    /// ```
    /// # use sieve_ecs::World;
    /// # struct Position(f32); struct Velocity(f32);
    /// # let mut world = World::new();
    /// # world.register::<Position>()?;
    /// # world.register::<Velocity>()?;
    /// let moving = world.query_of::<(Position, Velocity)>()?;
    /// for (entity, (pos, vel)) in moving.iter_as::<(Position, Velocity)>(&world)? {
    ///     let _ = (entity, pos.0 + vel.0);
    /// }
    /// # Ok::<(), sieve_ecs::EcsError>(())
    /// ```
    pub fn query_of<Q: QueryData>(&self) -> EcsResult<Query> {
        let base = Q::component_ids(&self.components)?;
        Ok(Query::new(base))
    }

    /// Entities holding every component in `base`, in the order of the
    /// smallest of those storages.
    pub(crate) fn candidates(&self, base: &[ComponentId]) -> EcsResult<Vec<Entity>> {
        let mut storages: SmallVec<[&dyn ErasedStorage; 4]> = SmallVec::new();
        for &id in base {
            let storage = self
                .storages
                .get(id.index())
                .ok_or(EcsError::UnknownComponentId(id))?;
            storages.push(storage.as_ref());
        }
        storages.sort_by_key(|storage| storage.len());

        let Some((anchor, rest)) = storages.split_first() else {
            return Ok(Vec::new());
        };
        let candidates: Vec<Entity> = anchor
            .entities()
            .iter()
            .copied()
            .filter(|&entity| rest.iter().all(|storage| storage.contains(entity)))
            .collect();

        tracing::trace!(
            base = base.len(),
            anchor = anchor.len(),
            candidates = candidates.len(),
            "query candidates"
        );
        Ok(candidates)
    }

    /// Type-erased fetch by tag.
    pub(crate) fn get_any(
        &self,
        entity: Entity,
        id: ComponentId,
    ) -> Option<&(dyn Any + Send + Sync)> {
        self.storages.get(id.index())?.get_any(entity)
    }

    // ==================== Filters ====================

    /// Compile a filter through this world's cache.
    ///
    /// Fails with [`EcsError::UnknownComponentId`] if the filter mentions
    /// a tag this world never handed out.
    pub fn compile_filter(&self, expr: &FilterExpr) -> EcsResult<Arc<CompiledFilter>> {
        self.check_ids(expr.variables())?;
        self.filters.get_or_compile(expr)
    }

    /// Parse a filter string, resolving names against the registry.
    ///
    /// ```
    /// # use sieve_ecs::World;
    /// # struct Velocity; struct Frozen;
    /// # let mut world = World::new();
    /// # world.register::<Velocity>()?;
    /// # world.register::<Frozen>()?;
    /// let filter = world.parse_filter("Velocity & !Frozen")?;
    /// assert_eq!(world.describe(&filter), "Velocity & !Frozen");
    /// # Ok::<(), sieve_ecs::EcsError>(())
    /// ```
    pub fn parse_filter(&self, source: &str) -> EcsResult<FilterExpr> {
        let parsed = sieve_dsl::parse_filter(source)?;
        self.resolve(&parsed)
    }

    fn resolve(&self, expr: &Expr) -> EcsResult<FilterExpr> {
        Ok(match expr {
            Expr::Const(value) => FilterExpr::Const(*value),
            Expr::Component(name) => self
                .components
                .get_id_by_name(name)
                .ok_or_else(|| EcsError::UnknownComponentName(name.clone()))?
                .into(),
            Expr::Not(inner) => not_of(self.resolve(inner)?),
            Expr::And(terms) => and_of(
                terms
                    .iter()
                    .map(|term| self.resolve(term))
                    .collect::<EcsResult<SmallVec<[FilterExpr; 4]>>>()?,
            ),
            Expr::Or(terms) => or_of(
                terms
                    .iter()
                    .map(|term| self.resolve(term))
                    .collect::<EcsResult<SmallVec<[FilterExpr; 4]>>>()?,
            ),
        })
    }

    /// Render a filter with component names.
    #[must_use]
    pub fn describe(&self, expr: &FilterExpr) -> String {
        expr.display_with(|id| self.name_of(id)).to_string()
    }

    /// Render a compiled filter with component names.
    #[must_use]
    pub fn describe_compiled(&self, compiled: &CompiledFilter) -> String {
        compiled.display_with(|id| self.name_of(id)).to_string()
    }
}

fn storage_mut<T: Component>(
    storages: &mut [Box<dyn ErasedStorage>],
    id: ComponentId,
) -> EcsResult<&mut ComponentStorage<T>> {
    storages
        .get_mut(id.index())
        .and_then(|storage| typed_mut::<T>(storage.as_mut()))
        .ok_or(EcsError::UnknownComponent {
            name: std::any::type_name::<T>(),
        })
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.entity_count())
            .field("component_count", &self.components.len())
            .field("filter_cache", &self.filters)
            .finish()
    }
}

// ============================================================================
// EntityBuilder
// ============================================================================

/// Attaches components to a freshly spawned entity.
///
/// Each [`with`](EntityBuilder::with) is a separate insert: if one fails,
/// the entity stays alive with the components added so far.
pub struct EntityBuilder<'w> {
    world: &'w mut World,
    entity: Entity,
}

impl EntityBuilder<'_> {
    /// Attach a component.
    pub fn with<T: Component>(self, component: T) -> EcsResult<Self> {
        self.world.insert(self.entity, component)?;
        Ok(self)
    }

    /// The entity being built.
    #[must_use]
    pub fn id(&self) -> Entity {
        self.entity
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Frozen;

    fn world() -> World {
        let mut world = World::new();
        world.register::<Position>().unwrap();
        world.register::<Velocity>().unwrap();
        world.register::<Frozen>().unwrap();
        world
    }

    #[test]
    fn test_register_assigns_dense_ids() {
        let world = world();
        assert_eq!(world.component_id::<Position>(), Some(ComponentId::from_raw(0)));
        assert_eq!(world.component_id::<Frozen>(), Some(ComponentId::from_raw(2)));
        assert_eq!(world.component_id_by_name("Velocity"), Some(ComponentId::from_raw(1)));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut world = world();
        assert!(matches!(
            world.register::<Position>(),
            Err(EcsError::DuplicateRegistration { .. })
        ));
        assert!(matches!(
            world.register_named::<u8>("Frozen"),
            Err(EcsError::DuplicateName { .. })
        ));
        assert_eq!(world.components().len(), 3);
    }

    #[test]
    fn test_insert_get_remove() {
        let mut world = world();
        let e = world.spawn(Position { x: 1.0, y: 2.0 }).unwrap();

        assert_eq!(world.get::<Position>(e).unwrap(), &Position { x: 1.0, y: 2.0 });
        assert!(world.has::<Position>(e).unwrap());
        assert!(!world.has::<Velocity>(e).unwrap());

        let old = world.insert(e, Position { x: 5.0, y: 5.0 }).unwrap();
        assert_eq!(old, Some(Position { x: 1.0, y: 2.0 }));

        world.get_mut::<Position>(e).unwrap().x = 9.0;
        assert_eq!(world.get::<Position>(e).unwrap().x, 9.0);

        assert_eq!(world.remove::<Position>(e).unwrap().x, 9.0);
        assert!(!world.has::<Position>(e).unwrap());
        assert!(world.is_alive(e));
    }

    #[test]
    fn test_not_found() {
        let mut world = world();
        let e = world.spawn_empty();

        let err = world.get::<Velocity>(e).unwrap_err();
        assert!(matches!(&err, EcsError::NotFound { component, .. } if component == "Velocity"));
        assert!(matches!(world.remove::<Velocity>(e), Err(EcsError::NotFound { .. })));
        assert!(matches!(world.get_mut::<Velocity>(e), Err(EcsError::NotFound { .. })));
        assert_eq!(world.get_optional::<Velocity>(e), None);
    }

    #[test]
    fn test_unknown_component() {
        let mut world = world();
        let e = world.spawn_empty();

        assert!(matches!(world.insert(e, 7u64), Err(EcsError::UnknownComponent { .. })));
        assert!(matches!(world.spawn(7u64), Err(EcsError::UnknownComponent { .. })));
        assert!(matches!(world.has::<u64>(e), Err(EcsError::UnknownComponent { .. })));
        assert!(matches!(
            world.query(&[ComponentId::from_raw(42)]),
            Err(EcsError::UnknownComponentId(_))
        ));
        // the failed spawn allocated nothing
        assert_eq!(world.entity_count(), 1);
        assert!(world.membership(e).unwrap().is_empty());
    }

    #[test]
    fn test_membership_tracks_storage() {
        let mut world = world();
        let pos = world.component_id::<Position>().unwrap();
        let vel = world.component_id::<Velocity>().unwrap();

        let e = world
            .build_entity()
            .with(Position { x: 0.0, y: 0.0 })
            .unwrap()
            .with(Velocity { x: 1.0, y: 0.0 })
            .unwrap()
            .id();

        assert_eq!(world.membership(e).unwrap(), &ComponentSet::from_ids([pos, vel]));
        assert!(world.has_all(e, &[pos, vel]).unwrap());

        world.remove::<Position>(e).unwrap();
        assert_eq!(world.membership(e).unwrap(), &ComponentSet::from_ids([vel]));
        assert!(!world.has_all(e, &[pos, vel]).unwrap());
        assert_eq!(world.storage_len(pos).unwrap(), 0);
    }

    #[test]
    fn test_despawn_clears_everything() {
        let mut world = world();
        let pos = world.component_id::<Position>().unwrap();
        let e = world
            .build_entity()
            .with(Position { x: 0.0, y: 0.0 })
            .unwrap()
            .with(Frozen)
            .unwrap()
            .id();

        assert!(world.despawn(e));
        assert!(!world.despawn(e));
        assert!(!world.is_alive(e));
        assert!(world.membership(e).is_none());
        assert_eq!(world.storage_len(pos).unwrap(), 0);
        assert!(matches!(world.get::<Position>(e), Err(EcsError::DeadEntity(_))));
        assert!(matches!(world.insert(e, Frozen), Err(EcsError::DeadEntity(_))));

        // the recycled slot starts with an empty bitset
        let again = world.spawn_empty();
        assert_eq!(again.id(), e.id());
        assert!(world.membership(again).unwrap().is_empty());
        assert!(!world.has::<Position>(again).unwrap());
    }

    #[test]
    fn test_components_of_and_insert_boxed() {
        let mut source = world();
        let e = source
            .build_entity()
            .with(Velocity { x: 3.0, y: 4.0 })
            .unwrap()
            .with(Position { x: 1.0, y: 2.0 })
            .unwrap()
            .id();

        let ids: Vec<ComponentId> = source.components_of(e).unwrap().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![ComponentId::from_raw(0), ComponentId::from_raw(1)]);

        // copy into another world through the erased interface
        let mut target = world();
        let copy = target.spawn_empty();
        for (id, value) in source.components_of(e).unwrap() {
            let boxed: BoxedComponent = if let Some(p) = value.downcast_ref::<Position>() {
                Box::new(*p)
            } else if let Some(v) = value.downcast_ref::<Velocity>() {
                Box::new(*v)
            } else {
                unreachable!()
            };
            assert!(target.insert_boxed(copy, id, boxed).unwrap().is_none());
        }
        assert_eq!(target.get::<Velocity>(copy).unwrap(), &Velocity { x: 3.0, y: 4.0 });
        assert_eq!(target.membership(copy), source.membership(e));
    }

    #[test]
    fn test_insert_boxed_type_mismatch() {
        let mut world = world();
        let pos = world.component_id::<Position>().unwrap();
        let e = world.spawn_empty();

        let err = world.insert_boxed(e, pos, Box::new(Frozen)).unwrap_err();
        assert!(matches!(
            &err,
            EcsError::TypeMismatch { component, .. } if component == "Position"
        ));
        assert!(!world.has_id(e, pos).unwrap());
    }

    #[test]
    fn test_parse_and_describe() {
        let world = world();
        let filter = world.parse_filter("(Velocity | Position) & !Frozen").unwrap();
        assert_eq!(world.describe(&filter), "(Velocity | Position) & !Frozen");

        let compiled = world.compile_filter(&filter).unwrap();
        assert_eq!(
            world.describe_compiled(&compiled),
            "(Position & !Frozen) | (Velocity & !Frozen)"
        );

        assert!(matches!(
            world.parse_filter("Velocity & Ghost"),
            Err(EcsError::UnknownComponentName(name)) if name == "Ghost"
        ));
        assert!(matches!(world.parse_filter("Velocity &"), Err(EcsError::Parse(_))));
    }

    #[test]
    fn test_compile_filter_rejects_foreign_ids() {
        let world = world();
        let foreign = FilterExpr::Has(ComponentId::from_raw(99));
        assert!(matches!(
            world.compile_filter(&foreign),
            Err(EcsError::UnknownComponentId(_))
        ));
    }

    #[test]
    fn test_shared_filter_cache() {
        let cache = Arc::new(FilterCache::new());
        let mut a = World::with_filter_cache(WorldConfig::default(), Arc::clone(&cache));
        let mut b = World::with_filter_cache(WorldConfig::default(), Arc::clone(&cache));
        a.register::<Position>().unwrap();
        b.register::<Position>().unwrap();

        let expr = !FilterExpr::Has(ComponentId::from_raw(0));
        let first = a.compile_filter(&expr).unwrap();
        let second = b.compile_filter(&expr).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_candidates_smallest_first() {
        let mut world = world();
        let pos = world.component_id::<Position>().unwrap();
        let frozen = world.component_id::<Frozen>().unwrap();

        let mut expected = Vec::new();
        for i in 0..10 {
            let e = world.spawn(Position { x: i as f32, y: 0.0 }).unwrap();
            if i % 3 == 0 {
                world.insert(e, Frozen).unwrap();
                expected.push(e);
            }
        }

        // anchored on the Frozen storage, so its insertion order wins
        assert_eq!(world.candidates(&[pos, frozen]).unwrap(), expected);
        assert!(world.candidates(&[]).unwrap().is_empty());
        assert!(matches!(
            world.candidates(&[pos, ComponentId::from_raw(40)]),
            Err(EcsError::UnknownComponentId(_))
        ));
    }

    #[test]
    fn test_stale_handle_does_not_reach_new_occupant() {
        let mut world = world();
        let pos = world.component_id::<Position>().unwrap();

        let old = world.spawn(Position { x: 1.0, y: 1.0 }).unwrap();
        assert!(world.despawn(old));
        let reused = world.spawn(Position { x: 2.0, y: 2.0 }).unwrap();
        assert_eq!(reused.id(), old.id());

        assert!(world.membership(old).is_none());
        assert!(matches!(world.get::<Position>(old), Err(EcsError::DeadEntity(_))));
        assert!(!world.despawn(old));
        assert!(world.has_id(reused, pos).unwrap());
        assert_eq!(world.get::<Position>(reused).unwrap(), &Position { x: 2.0, y: 2.0 });
    }
}
