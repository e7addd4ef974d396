//! Query compilation: from mask words to flat, pointer-resolved blocks.
//!
//! ## Purpose
//!
//! The query compiler turns the world's hierarchical mask state (clusters,
//! chunks, blocks) into a flat array of [`QueryBlock`] records. Each record
//! is self-contained: the base pointers of the data groups backing every
//! fetched component, the 64-bit mask of matching entities in the block,
//! and the global block index. Consumption then never touches the mask
//! hierarchy again — the runner walks a dense array.
//!
//! ## Semantics
//!
//! Compilation intersects, per block:
//!
//! 1. the entity lifecycle term ([`EntityStatus`]),
//! 2. one presence term per fetched component ([`ComponentStatus`]),
//! 3. the optional filter's entity-level predicate.
//!
//! Blocks are pre-pruned at summary level: a block is only visited when the
//! store's `not_empty_blocks`, every fetched pool's summary word, and the
//! filter's block-level predicate all leave its bit set. Wholesale-disabled
//! clusters are skipped without reading a single chunk.
//!
//! ## Pointer caching
//!
//! Data groups span `GROUP_BLOCKS` consecutive blocks, so consecutive
//! matching blocks usually share group base pointers. The compiler caches
//! the resolved pointer row and recomputes it only when the walk crosses a
//! group boundary, which bounds pointer resolution to once per group per
//! pool rather than once per block.
//!
//! ## Safety
//!
//! [`QueryBlock`] holds raw pointers into pool data groups. Their validity
//! is tied to the absence of structural pool mutation, which is enforced by
//! pool blocker counts for the lifetime of the owning [`PreparedQuery`]
//! and checked in debug builds.

use std::marker::PhantomData;

use crate::engine::component::pool_id_of;
use crate::engine::bits::lowest_set_bit;
use crate::engine::entity::EntityStore;
use crate::engine::filter::QueryFilter;
use crate::engine::storage::{cast_slice, Component, RawPool};
use crate::engine::types::{
    BlockIndex, ClusterId, ComponentStatus, EntityStatus, PoolId, BLOCKS_PER_CHUNK, BLOCK_CAP,
    GROUP_SHIFT, MAX_QUERY_COMPONENTS,
};
use crate::engine::world::World;

/// One compiled unit of work: a 64-entity block with its matching-entity
/// mask and the resolved data-group base pointers of every fetched pool.
///
/// Pointer slot *i* holds the base of the data group covering this block in
/// the query's *i*-th fetched pool; slots beyond the query's arity are
/// null. The in-group offset of the block's first entity is
/// `(block_index % GROUP_BLOCKS) * BLOCK_CAP`.

#[derive(Clone, Copy)]
pub struct QueryBlock {
    /// Data-group base pointers, one per fetched pool.
    pub pointers: [*const u8; MAX_QUERY_COMPONENTS],

    /// One bit per entity in the block; set bits match the query.
    pub entities_mask: u64,

    /// Global block index (`entity_index / BLOCK_CAP`).
    pub block_index: BlockIndex,
}

// Pointers reference pool data groups that stay immovable while blocker
// counts hold; consumption from worker threads is coordinated by the
// runner.
unsafe impl Send for QueryBlock {}
unsafe impl Sync for QueryBlock {}

/// A tuple of component types fetched by a query, up to
/// [`MAX_QUERY_COMPONENTS`] entries.
///
/// # Safety
/// Implementations must report pool ids whose pools store exactly the
/// tuple's element types, in tuple order, and must only dereference
/// pointer slots `0..ARITY`.
pub unsafe trait ComponentSet: 'static {
    /// Number of fetched component types.
    const ARITY: usize;

    /// Shared references to one entity's components.
    type Refs<'a>;

    /// Mutable references to one entity's components.
    type Muts<'a>;

    /// Whole-block component slices, each [`BLOCK_CAP`] elements.
    type Slices<'a>;

    /// Resolves the tuple's pool ids against the frozen registry, in tuple
    /// order; slots beyond [`ARITY`](Self::ARITY) are zero.
    ///
    /// # Panics
    /// Panics if any element type was never registered.
    fn pool_ids() -> [PoolId; MAX_QUERY_COMPONENTS];

    /// Builds shared references for the entity at in-group `slot`.
    ///
    /// # Safety
    /// `pointers` must come from a live [`QueryBlock`] compiled for this
    /// set and `slot` must lie inside the pointed-to groups.
    unsafe fn refs<'a>(pointers: &[*const u8; MAX_QUERY_COMPONENTS], slot: usize)
        -> Self::Refs<'a>;

    /// Builds mutable references for the entity at in-group `slot`.
    ///
    /// # Safety
    /// As [`refs`](Self::refs); additionally no other reference to the
    /// entity's components may be live.
    unsafe fn muts<'a>(pointers: &[*const u8; MAX_QUERY_COMPONENTS], slot: usize)
        -> Self::Muts<'a>;

    /// Builds whole-block slices starting at in-group slot `base`.
    ///
    /// # Safety
    /// As [`refs`](Self::refs), for the range `base..base + BLOCK_CAP`.
    unsafe fn slices<'a>(
        pointers: &[*const u8; MAX_QUERY_COMPONENTS],
        base: usize,
    ) -> Self::Slices<'a>;
}

macro_rules! impl_component_set {
    ($arity:literal, $(($t:ident, $i:tt)),+) => {
        unsafe impl<$($t: Component),+> ComponentSet for ($($t,)+) {
            const ARITY: usize = $arity;
            type Refs<'a> = ($(&'a $t,)+);
            type Muts<'a> = ($(&'a mut $t,)+);
            type Slices<'a> = ($(&'a [$t],)+);

            fn pool_ids() -> [PoolId; MAX_QUERY_COMPONENTS] {
                let mut ids = [0; MAX_QUERY_COMPONENTS];
                $(ids[$i] = pool_id_of::<$t>();)+
                ids
            }

            #[inline]
            unsafe fn refs<'a>(
                pointers: &[*const u8; MAX_QUERY_COMPONENTS],
                slot: usize,
            ) -> Self::Refs<'a> {
                unsafe { ($(&*(pointers[$i] as *const $t).add(slot),)+) }
            }

            #[inline]
            unsafe fn muts<'a>(
                pointers: &[*const u8; MAX_QUERY_COMPONENTS],
                slot: usize,
            ) -> Self::Muts<'a> {
                unsafe { ($(&mut *(pointers[$i] as *mut $t).add(slot),)+) }
            }

            #[inline]
            unsafe fn slices<'a>(
                pointers: &[*const u8; MAX_QUERY_COMPONENTS],
                base: usize,
            ) -> Self::Slices<'a> {
                unsafe {
                    ($(cast_slice::<$t>(
                        (pointers[$i] as *const $t).add(base) as *const u8,
                        BLOCK_CAP,
                    ),)+)
                }
            }
        }
    };
}

impl_component_set!(1, (A, 0));
impl_component_set!(2, (A, 0), (B, 1));
impl_component_set!(3, (A, 0), (B, 1), (C, 2));
impl_component_set!(4, (A, 0), (B, 1), (C, 2), (D, 3));
impl_component_set!(5, (A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_component_set!(6, (A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
impl_component_set!(7, (A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6));
impl_component_set!(8, (A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7));

/// Compiles matching blocks into `out`.
///
/// `clusters` selects which clusters to walk: `None` walks all of them,
/// while an explicit empty selection matches nothing. Wholesale-disabled
/// clusters are skipped either way. `out` is not cleared by the callee.
#[allow(clippy::too_many_arguments)]
pub(crate) fn compile_into<F: QueryFilter>(
    store: &EntityStore,
    pools: &[Box<dyn RawPool>],
    fetch: &[PoolId],
    clusters: Option<&[ClusterId]>,
    filter: &F,
    entity_status: EntityStatus,
    component_status: ComponentStatus,
    out: &mut Vec<QueryBlock>,
) {
    let all: Vec<ClusterId>;
    let selected: &[ClusterId] = match clusters {
        Some(list) => list,
        None => {
            all = (0..store.cluster_count() as ClusterId).collect();
            &all
        }
    };

    // Pointer row cache, keyed by data-group index.
    let mut cached_group = usize::MAX;
    let mut cached_pointers = [std::ptr::null::<u8>(); MAX_QUERY_COMPONENTS];

    for &cluster in selected {
        if store.cluster_disabled(cluster).unwrap_or(true) {
            continue;
        }
        let chunks = match store.cluster_chunks(cluster) {
            Ok(chunks) => chunks,
            Err(_) => continue,
        };
        for &chunk in chunks {
            let masks = store.chunk(chunk);

            let mut candidates = masks.not_empty_blocks;
            for &pool in fetch {
                candidates &= pools[pool as usize].not_empty_blocks(chunk as usize);
                if candidates == 0 {
                    break;
                }
            }
            if candidates != 0 {
                candidates = filter.prune_blocks(pools, chunk, candidates);
            }

            while candidates != 0 {
                let block = lowest_set_bit(candidates) as usize;
                candidates &= candidates - 1;

                let mut mask = entity_status.block_term(
                    masks.loaded[block],
                    masks.active[block],
                    masks.disabled[block],
                );
                for &pool in fetch {
                    if mask == 0 {
                        break;
                    }
                    let pool = &pools[pool as usize];
                    mask &= component_status.block_term(
                        pool.present_word(chunk as usize, block),
                        pool.disabled_word(chunk as usize, block),
                    );
                }
                if mask != 0 {
                    mask = filter.prune_entities(pools, chunk, block, mask);
                }
                if mask == 0 {
                    continue;
                }

                let block_index = chunk as usize * BLOCKS_PER_CHUNK + block;
                let group = block_index >> GROUP_SHIFT;
                if group != cached_group {
                    for (slot, &pool) in fetch.iter().enumerate() {
                        cached_pointers[slot] = pools[pool as usize].group_base(group);
                    }
                    cached_group = group;
                }

                out.push(QueryBlock {
                    pointers: cached_pointers,
                    entities_mask: mask,
                    block_index: block_index as BlockIndex,
                });
            }
        }
    }
}

/// A compiled query: a borrow of the world plus the flat block array
/// produced by compilation.
///
/// ## Semantics
///
/// The block array lives in the world's reusable scratch buffer; at most
/// one `PreparedQuery` can be live per world at a time and dropping it
/// returns the buffer. While live, it holds a blocker count on every
/// fetched and filtered pool, so structural pool mutation is a
/// checked-in-debug error.
///
/// Consumption entry points (`run`, `par_run`, and friends) live in the
/// runner module.

pub struct PreparedQuery<'w, S: ComponentSet, F: QueryFilter> {
    pub(crate) world: &'w World,
    pub(crate) blocks: &'w [QueryBlock],
    pub(crate) fetch: [PoolId; MAX_QUERY_COMPONENTS],
    pub(crate) filter: F,
    pub(crate) _set: PhantomData<fn() -> S>,
}

impl<S: ComponentSet, F: QueryFilter> PreparedQuery<'_, S, F> {
    /// Compiled blocks, in ascending block-index order.
    #[inline]
    pub fn blocks(&self) -> &[QueryBlock] {
        self.blocks
    }

    /// Number of compiled blocks.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of matching entities across all blocks.
    pub fn matched_entities(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.entities_mask.count_ones() as usize)
            .sum()
    }
}

impl<S: ComponentSet, F: QueryFilter> Drop for PreparedQuery<'_, S, F> {
    fn drop(&mut self) {
        let data = self.world.data();
        for &pool in &self.fetch[..S::ARITY] {
            data.pools[pool as usize].blocker_release();
        }
        self.filter.release(&data.pools);
        self.world.scratch_release();
    }
}
