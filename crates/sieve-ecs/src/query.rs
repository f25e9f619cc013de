//! Query engine.
//!
//! A [`Query`] names a base set of components every result must hold and
//! an optional [`FilterExpr`] over component presence. Queries are plain
//! values: [`Query::filter`] returns a new query and leaves the old one
//! alone.
//!
//! # Basic Usage
//!
//! ```
//! # use sieve_ecs::World;
//! # struct Position(f32); struct Velocity(f32); struct Frozen;
//! let mut world = World::new();
//! let pos = world.register::<Position>()?;
//! let vel = world.register::<Velocity>()?;
//! let frozen = world.register::<Frozen>()?;
//!
//! let e = world.build_entity().with(Position(0.0))?.with(Velocity(1.0))?.id();
//! world.build_entity().with(Position(0.0))?.with(Velocity(1.0))?.with(Frozen)?;
//!
//! let moving = world.query(&[pos])?.filter(vel & !frozen);
//! let hits: Vec<_> = moving.iter(&world)?.map(|row| row.entity()).collect();
//! assert_eq!(hits, vec![e]);
//! # Ok::<(), sieve_ecs::EcsError>(())
//! ```
//!
//! # Execution
//!
//! Every execution starts by intersecting the storages of the base
//! components, smallest first, into a candidate list. That list is a
//! snapshot: entities gaining the base components later are not picked
//! up by the running iteration. Each candidate is then checked live when
//! it is visited. It must still hold every base component and its
//! membership bitset must satisfy the compiled filter; otherwise it is
//! skipped. Results are never memoized, only the compiled filter is.
//!
//! [`QueryIter`] borrows the world for its whole run. To mutate the world
//! between steps, drive a [`QueryCursor`] instead.

use std::{
    any::Any,
    fmt,
    marker::PhantomData,
    sync::{Arc, OnceLock},
};

use smallvec::SmallVec;

use crate::{
    World,
    component::{Component, ComponentId, ComponentRegistry},
    entity::Entity,
    error::EcsResult,
    filter::{CompiledFilter, FilterExpr},
};

// ============================================================================
// Query
// ============================================================================

/// A base component set plus an optional filter, not yet bound to a
/// compiled filter.
///
/// The compiled filter is looked up on first use and remembered, so
/// repeated executions skip the cache.
#[derive(Clone)]
pub struct Query {
    base: SmallVec<[ComponentId; 4]>,
    filter: Option<FilterExpr>,
    compiled: OnceLock<Arc<CompiledFilter>>,
}

impl Query {
    pub(crate) fn new(base: impl IntoIterator<Item = ComponentId>) -> Self {
        Self {
            base: base.into_iter().collect(),
            filter: None,
            compiled: OnceLock::new(),
        }
    }

    /// Components every result must hold, in request order.
    #[must_use]
    pub fn base(&self) -> &[ComponentId] {
        &self.base
    }

    /// The attached filter, if any.
    #[must_use]
    pub fn filter_expr(&self) -> Option<&FilterExpr> {
        self.filter.as_ref()
    }

    /// Return a new query that also requires `expr`.
    ///
    /// A second call combines with the first: `q.filter(a).filter(b)` is
    /// `q.filter(a & b)`.
    #[must_use]
    pub fn filter(&self, expr: impl Into<FilterExpr>) -> Self {
        let expr = expr.into();
        let filter = match &self.filter {
            Some(existing) => existing.clone() & expr,
            None => expr,
        };
        Self {
            base: self.base.clone(),
            filter: Some(filter),
            compiled: OnceLock::new(),
        }
    }

    /// Compile the filter now.
    ///
    /// Compiling twice hands back the same `Arc<CompiledFilter>`. The
    /// remembered filter is reused for any world, but the query's tags are
    /// checked against `world` every time.
    ///
    /// # Errors
    ///
    /// [`EcsError::FilterTooComplex`](crate::EcsError::FilterTooComplex)
    /// if the filter has too many variables, and
    /// [`EcsError::UnknownComponentId`](crate::EcsError::UnknownComponentId)
    /// if the base or the filter mentions a tag `world` never handed out.
    pub fn compile(&self, world: &World) -> EcsResult<CompiledQuery> {
        world.check_ids(self.base.iter().copied())?;
        let filter = match &self.filter {
            None => None,
            Some(expr) => Some(match self.compiled.get() {
                Some(compiled) => {
                    world.check_ids(compiled.variables().iter().copied())?;
                    Arc::clone(compiled)
                }
                None => {
                    let compiled = world.compile_filter(expr)?;
                    Arc::clone(self.compiled.get_or_init(|| compiled))
                }
            }),
        };
        Ok(CompiledQuery {
            base: self.base.clone(),
            filter,
        })
    }

    /// Run the query, compiling first if needed.
    pub fn iter<'w>(&self, world: &'w World) -> EcsResult<QueryIter<'w>> {
        self.compile(world)?.iter(world)
    }

    /// Run the query with typed rows.
    pub fn iter_as<'w, Q: QueryData>(&self, world: &'w World) -> EcsResult<TypedQueryIter<'w, Q>> {
        self.compile(world)?.iter_as::<Q>(world)
    }

    /// Take a candidate snapshot for stepping with mutation in between.
    pub fn cursor(&self, world: &World) -> EcsResult<QueryCursor> {
        self.compile(world)?.cursor(world)
    }

    /// Execute a closure for each matching entity.
    pub fn each<F>(&self, world: &World, f: F) -> EcsResult<()>
    where
        F: FnMut(QueryRow<'_>),
    {
        self.iter(world)?.for_each(f);
        Ok(())
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("base", &self.base)
            .field("filter", &self.filter)
            .field("compiled", &self.compiled.get().is_some())
            .finish()
    }
}

// ============================================================================
// CompiledQuery
// ============================================================================

/// A query whose filter is already compiled. Cheap to clone.
#[derive(Clone)]
pub struct CompiledQuery {
    base: SmallVec<[ComponentId; 4]>,
    filter: Option<Arc<CompiledFilter>>,
}

impl CompiledQuery {
    /// Components every result must hold.
    #[must_use]
    pub fn base(&self) -> &[ComponentId] {
        &self.base
    }

    /// The compiled filter, if the query has one.
    #[must_use]
    pub fn filter(&self) -> Option<&Arc<CompiledFilter>> {
        self.filter.as_ref()
    }

    /// Take a candidate snapshot.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponentId`](crate::EcsError::UnknownComponentId)
    /// if `world` lacks a tag of the base or the filter, which happens
    /// when the query was compiled against another world.
    pub fn cursor(&self, world: &World) -> EcsResult<QueryCursor> {
        if let Some(filter) = &self.filter {
            world.check_ids(filter.variables().iter().copied())?;
        }
        Ok(QueryCursor {
            candidates: world.candidates(&self.base)?,
            position: 0,
            base: self.base.clone(),
            filter: self.filter.clone(),
        })
    }

    /// Run the query.
    pub fn iter<'w>(&self, world: &'w World) -> EcsResult<QueryIter<'w>> {
        Ok(QueryIter {
            world,
            cursor: self.cursor(world)?,
        })
    }

    /// Run the query with typed rows `(Entity, (&A, &B, ..))`.
    ///
    /// Candidates lacking any component of `Q` are skipped.
    pub fn iter_as<'w, Q: QueryData>(&self, world: &'w World) -> EcsResult<TypedQueryIter<'w, Q>> {
        Ok(TypedQueryIter {
            world,
            cursor: self.cursor(world)?,
            marker: PhantomData,
        })
    }

    /// Execute a closure for each matching entity.
    pub fn each<F>(&self, world: &World, f: F) -> EcsResult<()>
    where
        F: FnMut(QueryRow<'_>),
    {
        self.iter(world)?.for_each(f);
        Ok(())
    }
}

impl fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("base", &self.base)
            .field("filter", &self.filter)
            .finish()
    }
}

// ============================================================================
// QueryCursor - Owned Snapshot
// ============================================================================

/// A query execution that does not borrow the world between steps.
///
/// ```
/// # use sieve_ecs::World;
/// # struct Health(i32);
/// let mut world = World::new();
/// let health = world.register::<Health>()?;
/// let a = world.spawn(Health(0))?;
/// let b = world.spawn(Health(5))?;
///
/// let mut cursor = world.query(&[health])?.cursor(&world)?;
/// while let Some(entity) = cursor.next_match(&world) {
///     if world.get::<Health>(entity)?.0 <= 0 {
///         world.despawn(entity);
///     }
/// }
/// assert!(!world.is_alive(a));
/// assert!(world.is_alive(b));
/// # Ok::<(), sieve_ecs::EcsError>(())
/// ```
#[derive(Clone)]
pub struct QueryCursor {
    base: SmallVec<[ComponentId; 4]>,
    filter: Option<Arc<CompiledFilter>>,
    candidates: Vec<Entity>,
    position: usize,
}

impl QueryCursor {
    /// The snapshot taken when the cursor was created.
    #[must_use]
    pub fn candidates(&self) -> &[Entity] {
        &self.candidates
    }

    /// Candidates not yet visited.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.candidates.len() - self.position
    }

    /// Advance to the next candidate that still matches in `world`.
    pub fn next_match(&mut self, world: &World) -> Option<Entity> {
        while let Some(&entity) = self.candidates.get(self.position) {
            self.position += 1;
            if self.accepts(world, entity) {
                return Some(entity);
            }
        }
        None
    }

    fn accepts(&self, world: &World, entity: Entity) -> bool {
        let Some(bits) = world.membership(entity) else {
            return false;
        };
        self.base.iter().all(|&id| bits.contains(id))
            && self.filter.as_ref().is_none_or(|filter| filter.matches(bits))
    }
}

impl fmt::Debug for QueryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCursor")
            .field("candidates", &self.candidates.len())
            .field("position", &self.position)
            .finish()
    }
}

// ============================================================================
// QueryIter - Iterator Over Query Results
// ============================================================================

/// Iterator over query results.
pub struct QueryIter<'w> {
    world: &'w World,
    cursor: QueryCursor,
}

impl QueryIter<'_> {
    /// The candidate snapshot this iteration walks.
    #[must_use]
    pub fn candidates(&self) -> &[Entity] {
        self.cursor.candidates()
    }
}

impl<'w> Iterator for QueryIter<'w> {
    type Item = QueryRow<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entity = self.cursor.next_match(self.world)?;
            let values: Option<SmallVec<[&'w (dyn Any + Send + Sync); 4]>> = self
                .cursor
                .base
                .iter()
                .map(|&id| self.world.get_any(entity, id))
                .collect();

            if let Some(values) = values {
                return Some(QueryRow {
                    world: self.world,
                    entity,
                    values,
                });
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.cursor.remaining()))
    }
}

// ============================================================================
// QueryRow - Single Row Access
// ============================================================================

/// A single row from a query result.
///
/// Holds the values of the base components, in the order the query
/// listed them.
pub struct QueryRow<'w> {
    world: &'w World,
    entity: Entity,
    values: SmallVec<[&'w (dyn Any + Send + Sync); 4]>,
}

impl<'w> QueryRow<'w> {
    /// Get the entity for this row.
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Base component values, in query order.
    #[must_use]
    pub fn values(&self) -> &[&'w (dyn Any + Send + Sync)] {
        &self.values
    }

    /// The `index`-th base component value, downcast to `T`.
    #[must_use]
    pub fn value<T: Component>(&self, index: usize) -> Option<&'w T> {
        let value: &'w (dyn Any + Send + Sync) = *self.values.get(index)?;
        value.downcast_ref::<T>()
    }

    /// Any component of the entity, base or not.
    #[must_use]
    pub fn get<T: Component>(&self) -> Option<&'w T> {
        self.world.get_optional::<T>(self.entity)
    }

    /// Check if entity has a component.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`](crate::EcsError::UnknownComponent)
    /// if `T` was never registered.
    pub fn has<T: Component>(&self) -> EcsResult<bool> {
        self.world.has::<T>(self.entity)
    }

    /// Get the world reference.
    #[must_use]
    pub fn world(&self) -> &'w World {
        self.world
    }
}

impl fmt::Debug for QueryRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRow")
            .field("entity", &self.entity)
            .field("values", &self.values.len())
            .finish()
    }
}

// ============================================================================
// Typed Rows
// ============================================================================

/// Tuples of component types that can be fetched as a row.
///
/// Implemented for tuples of one to six [`Component`] types.
pub trait QueryData {
    /// The row yielded per entity: a tuple of shared references.
    type Item<'w>;

    /// Tags of the tuple's components, in tuple order.
    fn component_ids(registry: &ComponentRegistry) -> EcsResult<SmallVec<[ComponentId; 4]>>;

    /// Fetch the row, or `None` if any component is missing.
    fn fetch<'w>(world: &'w World, entity: Entity) -> Option<Self::Item<'w>>;
}

macro_rules! impl_query_data {
    ($($name:ident),+) => {
        impl<$($name: Component),+> QueryData for ($($name,)+) {
            type Item<'w> = ($(&'w $name,)+);

            fn component_ids(
                registry: &ComponentRegistry,
            ) -> EcsResult<SmallVec<[ComponentId; 4]>> {
                Ok(smallvec::smallvec![$(registry.id_of::<$name>()?),+])
            }

            fn fetch<'w>(world: &'w World, entity: Entity) -> Option<Self::Item<'w>> {
                Some(($(world.get_optional::<$name>(entity)?,)+))
            }
        }
    };
}

impl_query_data!(A);
impl_query_data!(A, B);
impl_query_data!(A, B, C);
impl_query_data!(A, B, C, D);
impl_query_data!(A, B, C, D, E);
impl_query_data!(A, B, C, D, E, F);

/// Iterator over typed query results.
pub struct TypedQueryIter<'w, Q> {
    world: &'w World,
    cursor: QueryCursor,
    marker: PhantomData<fn() -> Q>,
}

impl<'w, Q: QueryData> Iterator for TypedQueryIter<'w, Q> {
    type Item = (Entity, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entity = self.cursor.next_match(self.world)?;
            if let Some(row) = Q::fetch(self.world, entity) {
                return Some((entity, row));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.cursor.remaining()))
    }
}

// ============================================================================
// Tests
// ============================================================================
