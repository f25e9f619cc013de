//! Component type registration and metadata.
//!
//! Components are data types that can be attached to entities.
//! Each registered type gets a dense [`ComponentId`] in registration
//! order, which doubles as its bit position in membership bitsets.

use std::{
    any::{Any, TypeId},
    fmt,
};

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::error::{EcsError, EcsResult};

/// Marker trait for types that can be used as components.
pub trait Component: Send + Sync + 'static {}

// Blanket implementation for all suitable types
impl<T: Send + Sync + 'static> Component for T {}

/// Dense tag for a registered component type.
///
/// Tags start at 0 and are handed out contiguously, so they index
/// directly into storage tables and membership bitsets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Create a component ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// The tag as a table / bit index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Runtime information about a component type.
#[derive(Clone)]
pub struct ComponentInfo {
    /// Dense tag for this component type.
    id: ComponentId,
    /// Name used by the filter syntax and diagnostics.
    name: String,
    /// Full Rust type name.
    type_name: &'static str,
    /// Rust TypeId for type checking.
    type_id: TypeId,
}

impl ComponentInfo {
    /// Create component info for a concrete type.
    #[must_use]
    pub fn of<T: Component>(id: ComponentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    /// Get the component ID.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Get the registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the full Rust type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Check if this info is for the given type.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Check if a type-erased value has this component's type.
    #[must_use]
    pub fn accepts(&self, value: &dyn Any) -> bool {
        value.type_id() == self.type_id
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Last path segment of a type name, without generic arguments.
///
/// `my_game::physics::Velocity` becomes `Velocity`.
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Registry for component types.
///
/// Maps Rust types and names to dense `ComponentId`s. A type may be
/// registered at most once; tags are never reassigned.
#[derive(Default)]
pub struct ComponentRegistry {
    /// Map from TypeId to ComponentId.
    type_to_id: HashMap<TypeId, ComponentId, FxBuildHasher>,
    /// Map from registered name to ComponentId.
    name_to_id: HashMap<String, ComponentId>,
    /// Component info indexed by ComponentId.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under its short type name.
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentId> {
        self.register_named::<T>(short_type_name::<T>())
    }

    /// Register a component type under an explicit name.
    ///
    /// Fails with `DuplicateRegistration` if the type is already known and
    /// with `DuplicateName` if another type owns `name`. Neither failure
    /// changes the registry.
    pub fn register_named<T: Component>(&mut self, name: &str) -> EcsResult<ComponentId> {
        let type_id = TypeId::of::<T>();

        if self.type_to_id.contains_key(&type_id) {
            return Err(EcsError::DuplicateRegistration {
                name: std::any::type_name::<T>(),
            });
        }
        if self.name_to_id.contains_key(name) {
            return Err(EcsError::DuplicateName {
                name: name.to_owned(),
            });
        }

        let id = ComponentId(self.infos.len() as u32);
        self.type_to_id.insert(type_id, id);
        self.name_to_id.insert(name.to_owned(), id);
        self.infos.push(ComponentInfo::of::<T>(id, name));

        Ok(id)
    }

    /// Get the component ID for a type, if registered.
    #[must_use]
    pub fn get_id<T: Component>(&self) -> Option<ComponentId> {
        self.type_to_id.get(&TypeId::of::<T>()).copied()
    }

    /// Get the component ID for a type or fail with `UnknownComponent`.
    pub fn id_of<T: Component>(&self) -> EcsResult<ComponentId> {
        self.get_id::<T>().ok_or(EcsError::UnknownComponent {
            name: std::any::type_name::<T>(),
        })
    }

    /// Get the component ID registered under `name`.
    #[must_use]
    pub fn get_id_by_name(&self, name: &str) -> Option<ComponentId> {
        self.name_to_id.get(name).copied()
    }

    /// Get component info by ID.
    #[must_use]
    pub fn get_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Check that `id` was handed out by this registry.
    pub fn check(&self, id: ComponentId) -> EcsResult<()> {
        if id.index() < self.infos.len() {
            Ok(())
        } else {
            Err(EcsError::UnknownComponentId(id))
        }
    }

    /// Get the number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Iterate over all registered component infos in tag order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("count", &self.len())
            .field("components", &self.infos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;

    struct Velocity;

    mod other {
        pub struct Position;
    }

    #[test]
    fn test_component_registration() {
        let mut registry = ComponentRegistry::new();

        let pos_id = registry.register::<Position>().unwrap();
        let vel_id = registry.register::<Velocity>().unwrap();

        assert_ne!(pos_id, vel_id);
        assert_eq!(registry.get_id::<Position>(), Some(pos_id));
        assert_eq!(registry.get_id::<Velocity>(), Some(vel_id));
    }

    #[test]
    fn test_tags_are_dense_in_registration_order() {
        let mut registry = ComponentRegistry::new();

        let a = registry.register::<Velocity>().unwrap();
        let b = registry.register::<Position>().unwrap();

        assert_eq!(a.as_raw(), 0);
        assert_eq!(b.as_raw(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = ComponentRegistry::new();

        let id = registry.register::<Position>().unwrap();
        let err = registry.register::<Position>().unwrap_err();

        assert!(matches!(err, EcsError::DuplicateRegistration { .. }));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_id::<Position>(), Some(id));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut registry = ComponentRegistry::new();

        registry.register::<Position>().unwrap();
        let err = registry.register::<other::Position>().unwrap_err();
        assert!(matches!(err, EcsError::DuplicateName { .. }));
        assert!(registry.get_id::<other::Position>().is_none());

        let id = registry
            .register_named::<other::Position>("OtherPosition")
            .unwrap();
        assert_eq!(registry.get_id_by_name("OtherPosition"), Some(id));
    }

    #[test]
    fn test_component_info() {
        let mut registry = ComponentRegistry::new();

        let pos_id = registry.register::<Position>().unwrap();
        let info = registry.get_info(pos_id).unwrap();

        assert_eq!(info.name(), "Position");
        assert!(info.is::<Position>());
        assert!(!info.is::<Velocity>());
        assert!(info.accepts(&Position));
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = ComponentRegistry::new();

        assert!(matches!(
            registry.id_of::<Position>(),
            Err(EcsError::UnknownComponent { .. })
        ));
        assert!(matches!(
            registry.check(ComponentId::from_raw(3)),
            Err(EcsError::UnknownComponentId(_))
        ));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Position>(), "Position");
        assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
    }
}
