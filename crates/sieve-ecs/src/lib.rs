#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::float_cmp)]

//! Sieve ECS - an entity component store with boolean query filters
//!
//! Components live in one sparse-set storage per type. Every entity also
//! carries a membership bitset of the component tags it holds, so any
//! boolean predicate over component presence can be tested against that
//! bitset alone.
//!
//! # Key Concepts
//!
//! - **Entity**: An opaque generational identity
//! - **Component**: Data attached to entities (e.g., Position, Velocity)
//! - **ComponentId**: Dense tag handed out at registration, also the bit
//!   position in membership bitsets
//! - **FilterExpr**: Immutable boolean expression over component presence
//! - **CompiledFilter**: The expression minimized into a sum of products
//! - **Query**: Base components plus an optional filter
//!
//! # Example
//!
//! ```
//! use sieve_ecs::prelude::*;
//!
//! struct Position(f32, f32);
//! struct Velocity(f32, f32);
//! struct Frozen;
//!
//! let mut world = World::new();
//! let pos = world.register::<Position>()?;
//! let vel = world.register::<Velocity>()?;
//! let frozen = world.register::<Frozen>()?;
//!
//! let e1 = world.build_entity().with(Position(0.0, 0.0))?.with(Velocity(1.0, 0.0))?.id();
//! let e2 = world.build_entity().with(Position(0.0, 0.0))?.with(Frozen)?.id();
//!
//! // builder functions, operators or a filter string all give the same tree
//! let by_fn = and_of([has(vel), not_of(frozen)]);
//! let by_op = vel & !frozen;
//! let by_str = world.parse_filter("Velocity & !Frozen")?;
//! assert_eq!(by_fn, by_op);
//! assert_eq!(by_op, by_str);
//!
//! let query = world.query(&[pos])?.filter(by_op);
//! let hits: Vec<Entity> = query.iter(&world)?.map(|row| row.entity()).collect();
//! assert_eq!(hits, vec![e1]);
//! # let _ = e2;
//! # Ok::<(), sieve_ecs::EcsError>(())
//! ```

mod component;
mod entity;
mod error;
pub mod filter;
mod membership;
mod query;
mod storage;
mod world;

pub use component::{Component, ComponentId, ComponentInfo, ComponentRegistry, short_type_name};
pub use entity::{Entity, EntityAllocator, EntityId, Generation};
pub use error::{EcsError, EcsResult};
pub use filter::{
    CompiledFilter, FilterCache, FilterExpr, Product, and_of, compile_filter, has, not_of, or_of,
};
pub use membership::ComponentSet;
pub use query::{CompiledQuery, Query, QueryCursor, QueryData, QueryIter, QueryRow, TypedQueryIter};
pub use storage::{BoxedComponent, ComponentStorage, ErasedStorage};
pub use world::{EntityBuilder, World, WorldConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Component, ComponentId, EcsError, EcsResult, Entity, FilterExpr, Query, World, and_of,
        has, not_of, or_of,
    };
}
