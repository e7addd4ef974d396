//! World: owning facade over the entity store and registered pools.
//!
//! ## Purpose
//!
//! `World` ties the subsystems together: the chunked [`EntityStore`], one
//! pool per registered type, and the reusable scratch buffer that compiled
//! query blocks are emitted into.
//!
//! ## Semantics
//!
//! Construction requires a frozen pool registry; the world instantiates
//! every registered pool up front so pool ids index directly into its pool
//! table for the world's whole lifetime.
//!
//! Despawn removes the entity's instances from every pool immediately, so
//! reclaimed slots are reused clean; the lifecycle masks themselves are
//! swept by [`World::reclaim`].
//!
//! ## Safety
//!
//! World state lives in an [`UnsafeCell`] so that a compiled
//! [`PreparedQuery`] can hand out component access while the world is
//! shared-borrowed. The compiled-block scratch buffer sits in its own
//! cell, claimed atomically by `prepare`, so compilation never forms a
//! mutable reference to the store or pools. Soundness rests on API
//! discipline, checked at runtime: at most one prepared query is live per
//! world (enforced by the scratch claim), and structural mutation while
//! one is live trips the pool blocker assertions in debug builds.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::component::{
    make_empty_pool, pool_id_of, pools_frozen, registered_pool_count, PoolKind,
};
use crate::engine::entity::EntityStore;
use crate::engine::error::{PoolError, StaleEntityError, StoreError, TypeMismatchError, WorldResult};
use crate::engine::filter::{QueryFilter, Unfiltered};
use crate::engine::query::{compile_into, ComponentSet, PreparedQuery, QueryBlock};
use crate::engine::storage::{Component, Pool, RawPool};
use crate::engine::types::{
    split_entity_id, ChunkIndex, ClusterId, ComponentStatus, EntityId, EntityIndex, EntityStatus,
};

/// Mutable world state behind the [`UnsafeCell`].
pub(crate) struct WorldData {
    pub(crate) store: EntityStore,
    /// One pool per registered type, indexed by pool id.
    pub(crate) pools: Vec<Box<dyn RawPool>>,
}

/// Plain-data construction options for [`World`].
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    /// Expected number of simultaneously loaded chunks; pre-reserves store
    /// bookkeeping.
    pub chunk_capacity_hint: usize,

    /// Initial capacity of the compiled-block scratch buffer.
    pub scratch_reserve: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_capacity_hint: 16,
            scratch_reserve: 1024,
        }
    }
}

/// The engine's top-level container. See the module docs.
pub struct World {
    inner: UnsafeCell<WorldData>,
    /// Reusable output buffer for query compilation.
    scratch: UnsafeCell<Vec<QueryBlock>>,
    /// Set while a prepared query is live; grants exclusive scratch access.
    scratch_in_use: AtomicBool,
}

// Parallel consumption of prepared queries shares the world across worker
// threads; coordination is the runner's responsibility.
unsafe impl Sync for World {}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world with default [`WorldConfig`].
    ///
    /// # Panics
    /// Panics if the pool registry has not been frozen.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates a world with one empty pool per registered type, sized per
    /// `config`.
    ///
    /// # Panics
    /// Panics if the pool registry has not been frozen.
    pub fn with_config(config: WorldConfig) -> Self {
        assert!(
            pools_frozen(),
            "freeze_pools() must be called before constructing a World"
        );
        let pools = (0..registered_pool_count())
            .map(|id| make_empty_pool(id as u16))
            .collect::<Vec<_>>();
        log::debug!("world created with {} pools", pools.len());
        Self {
            inner: UnsafeCell::new(WorldData {
                store: EntityStore::with_capacity(config.chunk_capacity_hint),
                pools,
            }),
            scratch: UnsafeCell::new(Vec::with_capacity(config.scratch_reserve)),
            scratch_in_use: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn data(&self) -> &WorldData {
        // Shared view; mutation goes through data_mut.
        unsafe { &*self.inner.get() }
    }

    #[inline]
    fn data_mut(&mut self) -> &mut WorldData {
        self.inner.get_mut()
    }

    /// Returns the scratch buffer to the world when a prepared query drops.
    #[inline]
    pub(crate) fn scratch_release(&self) {
        self.scratch_in_use.store(false, Ordering::Release);
    }

    // --- entity lifecycle ---------------------------------------------

    /// Creates a new, empty, enabled cluster.
    pub fn create_cluster(&mut self) -> ClusterId {
        self.data_mut().store.create_cluster()
    }

    /// Streams a chunk into `cluster`.
    pub fn load_chunk(&mut self, cluster: ClusterId) -> WorldResult<ChunkIndex> {
        Ok(self.data_mut().store.load_chunk(cluster)?)
    }

    /// Streams `chunk` out of its cluster and clears its mirror in every
    /// pool.
    pub fn unload_chunk(&mut self, chunk: ChunkIndex) -> WorldResult<()> {
        let data = self.data_mut();
        data.store.unload_chunk(chunk)?;
        for pool in &mut data.pools {
            pool.clear_chunk(chunk as usize);
        }
        Ok(())
    }

    /// Spawns an entity into `cluster`, streaming in a fresh chunk when all
    /// loaded chunks are full.
    pub fn spawn(&mut self, cluster: ClusterId) -> WorldResult<EntityId> {
        let store = &mut self.data_mut().store;
        match store.spawn(cluster) {
            Ok(entity) => Ok(entity),
            Err(StoreError::Capacity(_)) => {
                store.load_chunk(cluster)?;
                Ok(store.spawn(cluster)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Despawns `entity` and removes its instances from every pool.
    ///
    /// The slot itself becomes reusable after the next
    /// [`reclaim`](Self::reclaim) sweep.
    pub fn despawn(&mut self, entity: EntityId) -> WorldResult<()> {
        let data = self.data_mut();
        data.store.despawn(entity)?;
        let (index, _) = split_entity_id(entity);
        for pool in &mut data.pools {
            pool.remove(index);
        }
        Ok(())
    }

    /// Sweeps despawned slots back into the free pool. Returns how many
    /// were reclaimed.
    pub fn reclaim(&mut self) -> usize {
        self.data_mut().store.reclaim()
    }

    /// Soft-disables or re-enables a live entity.
    pub fn set_enabled(&mut self, entity: EntityId, enabled: bool) -> WorldResult<()> {
        Ok(self.data_mut().store.set_enabled(entity, enabled)?)
    }

    /// Toggles a cluster's wholesale-disable flag.
    pub fn set_cluster_enabled(&mut self, cluster: ClusterId, enabled: bool) -> WorldResult<()> {
        Ok(self.data_mut().store.set_cluster_enabled(cluster, enabled)?)
    }

    /// Returns `true` if `entity`'s handle is current and its slot live.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.data().store.is_alive(entity)
    }

    /// Returns `true` if `entity` is alive and not soft-disabled.
    pub fn is_enabled(&self, entity: EntityId) -> bool {
        self.data().store.is_enabled(entity)
    }

    /// Read access to the entity store.
    pub fn store(&self) -> &EntityStore {
        &self.data().store
    }

    fn live_index(&self, entity: EntityId) -> WorldResult<EntityIndex> {
        if !self.is_alive(entity) {
            let (index, _) = split_entity_id(entity);
            return Err(StoreError::from(StaleEntityError { index }).into());
        }
        Ok(split_entity_id(entity).0)
    }

    // --- component access ---------------------------------------------

    fn typed_pool<C: Component>(&self) -> WorldResult<&Pool<C>> {
        let pool = pool_id_of::<C>();
        let raw = &self.data().pools[pool as usize];
        raw.as_any().downcast_ref::<Pool<C>>().ok_or_else(|| {
            match raw.kind() {
                PoolKind::Component => PoolError::from(TypeMismatchError {
                    expected: std::any::TypeId::of::<C>(),
                    actual: raw.element_type_id(),
                })
                .into(),
                _ => PoolError::NoData { pool }.into(),
            }
        })
    }

    fn typed_pool_mut<C: Component>(&mut self) -> WorldResult<&mut Pool<C>> {
        let pool = pool_id_of::<C>();
        let raw = &mut self.data_mut().pools[pool as usize];
        let kind = raw.kind();
        let actual = raw.element_type_id();
        raw.as_any_mut().downcast_mut::<Pool<C>>().ok_or_else(|| {
            match kind {
                PoolKind::Component => PoolError::from(TypeMismatchError {
                    expected: std::any::TypeId::of::<C>(),
                    actual,
                })
                .into(),
                _ => PoolError::NoData { pool }.into(),
            }
        })
    }

    /// Writes (or overwrites) a component value on a live entity.
    pub fn set<C: Component>(&mut self, entity: EntityId, value: C) -> WorldResult<()> {
        let index = self.live_index(entity)?;
        self.typed_pool_mut::<C>()?.put(index, value);
        Ok(())
    }

    /// Reads a component of a live entity; `None` when the handle is stale
    /// or the component absent.
    pub fn get<C: Component>(&self, entity: EntityId) -> Option<&C> {
        if !self.is_alive(entity) {
            return None;
        }
        let (index, _) = split_entity_id(entity);
        self.typed_pool::<C>().ok()?.get(index)
    }

    /// Mutable counterpart of [`get`](Self::get).
    pub fn get_mut<C: Component>(&mut self, entity: EntityId) -> Option<&mut C> {
        if !self.is_alive(entity) {
            return None;
        }
        let (index, _) = split_entity_id(entity);
        self.typed_pool_mut::<C>().ok()?.get_mut(index)
    }

    /// Removes a component from a live entity. Returns `true` if it was
    /// present.
    pub fn remove<C: Component>(&mut self, entity: EntityId) -> WorldResult<bool> {
        let index = self.live_index(entity)?;
        Ok(self.typed_pool_mut::<C>()?.remove(index))
    }

    /// Soft-disables or re-enables one component instance.
    pub fn set_component_enabled<C: Component>(
        &mut self,
        entity: EntityId,
        enabled: bool,
    ) -> WorldResult<()> {
        let index = self.live_index(entity)?;
        let pool = pool_id_of::<C>();
        self.data_mut().pools[pool as usize].set_enabled(index, enabled);
        Ok(())
    }

    // --- tag and mask access ------------------------------------------

    /// Marks a live entity with the tag or mask type `T`.
    pub fn tag<T: 'static>(&mut self, entity: EntityId) -> WorldResult<()> {
        let index = self.live_index(entity)?;
        let pool = pool_id_of::<T>();
        self.data_mut().pools[pool as usize].insert_unit(index);
        Ok(())
    }

    /// Clears the tag or mask `T` from a live entity. Returns `true` if it
    /// was set.
    pub fn untag<T: 'static>(&mut self, entity: EntityId) -> WorldResult<bool> {
        let index = self.live_index(entity)?;
        let pool = pool_id_of::<T>();
        Ok(self.data_mut().pools[pool as usize].remove(index))
    }

    /// Returns `true` if a live entity carries the tag or mask `T`.
    pub fn has_tag<T: 'static>(&self, entity: EntityId) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let (index, _) = split_entity_id(entity);
        let pool = pool_id_of::<T>();
        self.data().pools[pool as usize].has(index)
    }

    // --- query compilation --------------------------------------------

    /// Compiles a query over the fetched component set `S`, restricted by
    /// `filter` and the status selectors, into a [`PreparedQuery`].
    ///
    /// `clusters` selects which clusters to walk: `None` walks all of
    /// them, and an explicit empty selection compiles to zero blocks.
    ///
    /// # Panics
    /// Panics if another prepared query on this world is still live.
    pub fn prepare<S: ComponentSet, F: QueryFilter>(
        &self,
        clusters: Option<&[ClusterId]>,
        filter: F,
        entity_status: EntityStatus,
        component_status: ComponentStatus,
    ) -> WorldResult<PreparedQuery<'_, S, F>> {
        let fetch = S::pool_ids();
        let data = self.data();
        for &pool in &fetch[..S::ARITY] {
            if data.pools[pool as usize].kind() != PoolKind::Component {
                return Err(PoolError::NoData { pool }.into());
            }
        }

        // Exclusive claim on the scratch buffer; the compiled block slice
        // below stays valid only while this claim holds.
        let claimed = self.scratch_in_use.swap(true, Ordering::AcqRel);
        assert!(!claimed, "prepare() while another prepared query is live");

        // The claim makes this the only access to the scratch cell until
        // the query is dropped. Store and pools stay shared-borrowed.
        let scratch = unsafe { &mut *self.scratch.get() };
        scratch.clear();
        compile_into(
            &data.store,
            &data.pools,
            &fetch[..S::ARITY],
            clusters,
            &filter,
            entity_status,
            component_status,
            scratch,
        );

        for &pool in &fetch[..S::ARITY] {
            data.pools[pool as usize].blocker_acquire();
        }
        filter.acquire(&data.pools);

        log::trace!(
            "prepared query: {} blocks, {} pools fetched",
            scratch.len(),
            S::ARITY
        );

        let blocks = unsafe { std::slice::from_raw_parts(scratch.as_ptr(), scratch.len()) };
        Ok(PreparedQuery {
            world: self,
            blocks,
            fetch,
            filter,
            _set: PhantomData,
        })
    }

    /// Shorthand for an unfiltered, enabled-only query over all clusters.
    pub fn query<S: ComponentSet>(&self) -> WorldResult<PreparedQuery<'_, S, Unfiltered>> {
        self.prepare::<S, _>(None, Unfiltered, EntityStatus::Enabled, ComponentStatus::Enabled)
    }
}
