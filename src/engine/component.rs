//! # Pool Registry
//!
//! This module provides a global registry that assigns stable [`PoolId`]
//! values to Rust component, tag, and mask types and exposes type-erased
//! storage factories for world construction.
//!
//! ## Purpose
//! The registry decouples type information (`TypeId`, name, size, alignment,
//! pool kind) from runtime storage, enabling the world to hold heterogeneous
//! pools behind `dyn RawPool`.
//!
//! ## Design
//! - Types are registered once and assigned a compact `PoolId` in
//!   `[0, POOL_CAP)`.
//! - A per-type factory function is stored for constructing empty pools.
//! - The registry can be `freeze()`d to prevent further registrations after
//!   world setup; worlds are only constructible from a frozen registry.
//!
//! ## Invariants
//! - `PoolId` values are unique and stable for the lifetime of the process.
//! - A registered type has exactly one kind (component, tag, or mask) and a
//!   corresponding storage factory.
//! - When frozen, registration is disallowed.
//!
//! ## Concurrency
//! The registry is protected by `RwLock` for concurrent reads and serialized
//! writes. Factories are stored alongside descriptors and are set during
//! registration only.

use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    mem::{align_of, size_of},
    sync::{OnceLock, RwLock},
};

use log::debug;

use crate::engine::storage::{Component, Pool, RawPool, TagPool};
use crate::engine::types::{PoolId, POOL_CAP};

/// Storage role of a registered type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Data-carrying component; may appear in query component lists.
    Component,
    /// Presence-only tag; usable in filters.
    Tag,
    /// Presence-only mask; usable in filters, tracked as a distinct family.
    Mask,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Component => f.write_str("component"),
            PoolKind::Tag => f.write_str("tag"),
            PoolKind::Mask => f.write_str("mask"),
        }
    }
}

/// Factory function for constructing an empty type-erased pool.
pub type FactoryFn = fn() -> Box<dyn RawPool>;

/// Describes a registered pool type.
///
/// ## Purpose
/// Provides metadata about a registered type for debugging, validation, and
/// tooling.

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolDesc {
    /// Runtime identifier assigned to this type.
    pub pool_id: PoolId,

    /// Storage role of the type.
    pub kind: PoolKind,

    /// Rust type name for diagnostics.
    pub name: &'static str,

    /// Runtime `TypeId` of the type.
    pub type_id: TypeId,

    /// Size of the type in bytes (zero for tags/masks used as units).
    pub size: usize,

    /// Alignment of the type in bytes.
    pub align: usize,
}

impl std::fmt::Display for PoolDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PoolDesc {{ id: {}, kind: {}, name: {}, size: {}, align: {} }}",
            self.pool_id, self.kind, self.name, self.size, self.align
        )
    }
}

/// Global mapping between Rust types and compact `PoolId` values.
struct PoolRegistry {
    next_id: PoolId,
    by_type: HashMap<TypeId, PoolId>,
    by_id: Vec<Option<(PoolDesc, FactoryFn)>>,
    frozen: bool,
}

static REGISTRY: OnceLock<RwLock<PoolRegistry>> = OnceLock::new();

fn pool_registry() -> &'static RwLock<PoolRegistry> {
    REGISTRY.get_or_init(|| {
        RwLock::new(PoolRegistry {
            next_id: 0 as PoolId,
            by_type: HashMap::new(),
            by_id: vec![None; POOL_CAP],
            frozen: false,
        })
    })
}

impl PoolRegistry {
    /// Allocates a new `PoolId`.
    ///
    /// ## Panics
    /// Panics if `POOL_CAP` is exceeded.
    fn alloc_id(&mut self) -> PoolId {
        let pool_id = self.next_id;
        assert!((pool_id as usize) < POOL_CAP, "Exceeded configured pool capacity.");
        self.next_id = pool_id.wrapping_add(1);
        pool_id
    }

    fn register_with<T: 'static>(
        &mut self,
        kind: PoolKind,
        factory: FactoryFn,
    ) -> PoolId {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            let (desc, _) = self.by_id[existing as usize]
                .as_ref()
                .expect("registered id without descriptor");
            assert!(
                desc.kind == kind,
                "type {} already registered as {}, re-registered as {}",
                desc.name, desc.kind, kind
            );
            return existing;
        }

        assert!(!self.frozen, "Registry frozen");
        let id = self.alloc_id();
        let desc = PoolDesc {
            pool_id: id,
            kind,
            name: type_name::<T>(),
            type_id,
            size: size_of::<T>(),
            align: align_of::<T>(),
        };
        self.by_type.insert(type_id, id);
        self.by_id[id as usize] = Some((desc, factory));
        id
    }
}

fn new_component_pool<C: Component>() -> Box<dyn RawPool> {
    Box::new(Pool::<C>::default())
}

fn new_tag_pool<T: 'static + Send + Sync>() -> Box<dyn RawPool> {
    Box::new(TagPool::of::<T>(PoolKind::Tag))
}

fn new_mask_pool<T: 'static + Send + Sync>() -> Box<dyn RawPool> {
    Box::new(TagPool::of::<T>(PoolKind::Mask))
}

/// Registers data-carrying component type `C` and returns its [`PoolId`].
///
/// ## Behavior
/// - If `C` is already registered as a component, returns the existing id.
///
/// ## Panics
/// - Panics if the registry is frozen or `POOL_CAP` is exceeded.
/// - Panics if `C` was previously registered under a different kind.

pub fn register_component<C: Component>() -> PoolId {
    let registry = pool_registry();
    let mut registry = registry.write().unwrap();
    registry.register_with::<C>(PoolKind::Component, new_component_pool::<C>)
}

/// Registers presence-only tag type `T` and returns its [`PoolId`].
///
/// ## Panics
/// Same conditions as [`register_component`].
pub fn register_tag<T: 'static + Send + Sync>() -> PoolId {
    let registry = pool_registry();
    let mut registry = registry.write().unwrap();
    registry.register_with::<T>(PoolKind::Tag, new_tag_pool::<T>)
}

/// Registers presence-only mask type `T` and returns its [`PoolId`].
///
/// ## Panics
/// Same conditions as [`register_component`].
pub fn register_mask<T: 'static + Send + Sync>() -> PoolId {
    let registry = pool_registry();
    let mut registry = registry.write().unwrap();
    registry.register_with::<T>(PoolKind::Mask, new_mask_pool::<T>)
}

/// Freezes the global pool registry.
///
/// ## Purpose
/// Prevents any further registration, making pool ids and storage factories
/// stable so worlds can materialize one pool per registered id.
///
/// ## Panics
/// Panics if the registry lock is poisoned.

pub fn freeze_pools() {
    let registry = pool_registry();
    let mut registry = registry.write().unwrap();
    registry.frozen = true;
    debug!("pool registry frozen with {} registered types", registry.next_id);
}

/// Returns `true` if the registry has been frozen.
pub fn pools_frozen() -> bool {
    pool_registry().read().unwrap().frozen
}

/// Returns the registered [`PoolId`] for type `T`.
///
/// ## Panics
/// Panics if `T` is not registered — an unregistered type reaching a query
/// or filter is a programmer error, not a runtime condition.

pub fn pool_id_of<T: 'static>() -> PoolId {
    try_pool_id_of::<T>().expect("type not registered as a component, tag, or mask")
}

/// Returns the registered [`PoolId`] for type `T`, if any.
pub fn try_pool_id_of<T: 'static>() -> Option<PoolId> {
    let registry = pool_registry();
    let registry = registry.read().unwrap();
    registry.by_type.get(&TypeId::of::<T>()).copied()
}

/// Returns a copy of the descriptor for `pool_id`, if registered.
pub fn pool_desc_of(pool_id: PoolId) -> Option<PoolDesc> {
    let registry = pool_registry();
    let registry = registry.read().unwrap();
    registry
        .by_id
        .get(pool_id as usize)
        .and_then(|o| o.as_ref())
        .map(|(desc, _)| *desc)
}

/// Number of pool ids handed out so far.
pub fn registered_pool_count() -> usize {
    pool_registry().read().unwrap().next_id as usize
}

/// Creates an empty type-erased pool for `pool_id`.
///
/// ## Purpose
/// Used by world construction to materialize one pool per registered id.
///
/// ## Panics
/// Panics if no factory exists for the provided id.

pub fn make_empty_pool(pool_id: PoolId) -> Box<dyn RawPool> {
    let registry = pool_registry();
    let registry = registry.read().unwrap();
    let (_, factory) = registry.by_id[pool_id as usize]
        .as_ref()
        .expect("no factory registered for this pool id");
    factory()
}
