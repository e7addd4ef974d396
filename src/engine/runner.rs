//! Runner: consumption of compiled query blocks.
//!
//! ## Purpose
//!
//! Walks the flat [`QueryBlock`] array of a [`PreparedQuery`] and invokes a
//! visitor per matching entity (or per block, for slice consumers),
//! serially or across the rayon pool.
//!
//! ## Dispatch
//!
//! Each block's 64-bit mask picks one of three decode strategies:
//!
//! - **bulk** — a saturated mask (`u64::MAX`) visits all 64 entities with
//!   no bit tests at all;
//! - **dense** — when the set bits fill at least half of the occupied span,
//!   a forward scan over the span beats bit extraction;
//! - **sparse** — otherwise, repeated lowest-set-bit extraction touches
//!   exactly the matching entities.
//!
//! ## Safety
//!
//! Entity visitors receive references built from the block's raw group
//! pointers. Blocks partition the entity index space, so the parallel
//! paths hand disjoint component slots to each worker; mutable visitation
//! through a shared world borrow is part of the prepared-query discipline
//! documented on the world type.

use rayon::prelude::*;

use crate::engine::bits::{bit_count, bit_span_end, clear_lowest_set_bit, lowest_set_bit};
use crate::engine::filter::QueryFilter;
use crate::engine::query::{ComponentSet, PreparedQuery, QueryBlock};
use crate::engine::types::{BlockIndex, EntityIndex, WorkerId, BLOCK_CAP, GROUP_BLOCKS};

/// Dense scan is chosen when `set_bits >= span / DENSE_SCAN_DIVISOR`.
pub const DENSE_SCAN_DIVISOR: usize = 2;

/// In-group slot of a block's first entity.
#[inline]
fn in_group_base(block_index: BlockIndex) -> usize {
    (block_index as usize & (GROUP_BLOCKS - 1)) * BLOCK_CAP
}

/// Visits every set bit of `block`, building shared references.
///
/// # Safety
/// `block` must come from a live prepared query compiled for `S`.
#[inline]
unsafe fn visit_block<S, V>(block: &QueryBlock, visit: &mut V)
where
    S: ComponentSet,
    V: FnMut(EntityIndex, S::Refs<'_>),
{
    let mask = block.entities_mask;
    let base = in_group_base(block.block_index);
    let entity_base = block.block_index as usize * BLOCK_CAP;

    if mask == u64::MAX {
        for bit in 0..BLOCK_CAP {
            let refs = unsafe { S::refs(&block.pointers, base + bit) };
            visit((entity_base + bit) as EntityIndex, refs);
        }
        return;
    }

    let start = mask.trailing_zeros() as usize;
    let end = bit_span_end(mask) as usize;
    let total = bit_count(mask) as usize;
    if total >= (end - start) / DENSE_SCAN_DIVISOR {
        for bit in start..end {
            if (mask >> bit) & 1 == 1 {
                let refs = unsafe { S::refs(&block.pointers, base + bit) };
                visit((entity_base + bit) as EntityIndex, refs);
            }
        }
    } else {
        let mut remaining = mask;
        while remaining != 0 {
            let bit = lowest_set_bit(remaining) as usize;
            remaining = clear_lowest_set_bit(remaining);
            let refs = unsafe { S::refs(&block.pointers, base + bit) };
            visit((entity_base + bit) as EntityIndex, refs);
        }
    }
}

/// Mutable-reference twin of [`visit_block`].
///
/// # Safety
/// As [`visit_block`]; the caller must guarantee no other live reference
/// to the visited component slots.
#[inline]
unsafe fn visit_block_mut<S, V>(block: &QueryBlock, visit: &mut V)
where
    S: ComponentSet,
    V: FnMut(EntityIndex, S::Muts<'_>),
{
    let mask = block.entities_mask;
    let base = in_group_base(block.block_index);
    let entity_base = block.block_index as usize * BLOCK_CAP;

    if mask == u64::MAX {
        for bit in 0..BLOCK_CAP {
            let muts = unsafe { S::muts(&block.pointers, base + bit) };
            visit((entity_base + bit) as EntityIndex, muts);
        }
        return;
    }

    let start = mask.trailing_zeros() as usize;
    let end = bit_span_end(mask) as usize;
    let total = bit_count(mask) as usize;
    if total >= (end - start) / DENSE_SCAN_DIVISOR {
        for bit in start..end {
            if (mask >> bit) & 1 == 1 {
                let muts = unsafe { S::muts(&block.pointers, base + bit) };
                visit((entity_base + bit) as EntityIndex, muts);
            }
        }
    } else {
        let mut remaining = mask;
        while remaining != 0 {
            let bit = lowest_set_bit(remaining) as usize;
            remaining = clear_lowest_set_bit(remaining);
            let muts = unsafe { S::muts(&block.pointers, base + bit) };
            visit((entity_base + bit) as EntityIndex, muts);
        }
    }
}

#[inline]
fn current_worker() -> WorkerId {
    rayon::current_thread_index().map_or(-1, |i| i as WorkerId)
}

// The worker-tagging adapters below must be higher-ranked over the
// component lifetime; a bare closure is inferred at a single lifetime and
// rejected against the block walkers' bounds. Passing it through these
// identity functions pins the general signature.
#[inline]
fn as_refs_visitor<S, V>(visit: V) -> V
where
    S: ComponentSet,
    V: for<'a> FnMut(EntityIndex, S::Refs<'a>),
{
    visit
}

#[inline]
fn as_muts_visitor<S, V>(visit: V) -> V
where
    S: ComponentSet,
    V: for<'a> FnMut(EntityIndex, S::Muts<'a>),
{
    visit
}

impl<S: ComponentSet, F: QueryFilter> PreparedQuery<'_, S, F> {
    /// Visits every matching entity with shared component references.
    pub fn run<V>(&self, mut visit: V)
    where
        V: FnMut(EntityIndex, S::Refs<'_>),
    {
        for block in self.blocks() {
            unsafe { visit_block::<S, _>(block, &mut visit) };
        }
    }

    /// Visits every matching entity with mutable component references.
    pub fn run_mut<V>(&self, mut visit: V)
    where
        V: FnMut(EntityIndex, S::Muts<'_>),
    {
        for block in self.blocks() {
            unsafe { visit_block_mut::<S, _>(block, &mut visit) };
        }
    }

    /// Visits the blocks `from..to` of the compiled array, tagging every
    /// visit with `worker`, for callers that slice and schedule work
    /// themselves.
    ///
    /// # Panics
    /// Panics if the range is out of bounds.
    pub fn run_range<V>(&self, from: usize, to: usize, worker: WorkerId, mut visit: V)
    where
        V: FnMut(WorkerId, EntityIndex, S::Refs<'_>),
    {
        for block in &self.blocks()[from..to] {
            let mut adapter = as_refs_visitor::<S, _>(|entity, refs| visit(worker, entity, refs));
            unsafe { visit_block::<S, _>(block, &mut adapter) };
        }
    }

    /// Visits whole blocks with component slices of [`BLOCK_CAP`] elements,
    /// for vectorizable consumers. The mask is passed through: slots whose
    /// bit is clear hold filler values.
    pub fn run_blocks<V>(&self, mut visit: V)
    where
        V: FnMut(BlockIndex, u64, S::Slices<'_>),
    {
        for block in self.blocks() {
            let slices = unsafe { S::slices(&block.pointers, in_group_base(block.block_index)) };
            visit(block.block_index, block.entities_mask, slices);
        }
    }

    /// Parallel [`run`](Self::run): blocks are distributed across the
    /// rayon pool; the visitor additionally receives a worker id (`-1`
    /// outside the pool).
    pub fn par_run<V>(&self, visit: V)
    where
        V: Fn(WorkerId, EntityIndex, S::Refs<'_>) + Send + Sync,
    {
        self.blocks().par_iter().for_each(|block| {
            let worker = current_worker();
            let mut adapter = as_refs_visitor::<S, _>(|entity, refs| visit(worker, entity, refs));
            unsafe { visit_block::<S, _>(block, &mut adapter) };
        });
    }

    /// Parallel [`run_mut`](Self::run_mut). Blocks never share component
    /// slots, so workers write disjoint memory.
    pub fn par_run_mut<V>(&self, visit: V)
    where
        V: Fn(WorkerId, EntityIndex, S::Muts<'_>) + Send + Sync,
    {
        self.blocks().par_iter().for_each(|block| {
            let worker = current_worker();
            let mut adapter = as_muts_visitor::<S, _>(|entity, muts| visit(worker, entity, muts));
            unsafe { visit_block_mut::<S, _>(block, &mut adapter) };
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testutil::{init_registry, Health, Position, Velocity};
    use crate::engine::world::World;

    fn seeded_world(count: usize) -> World {
        init_registry();
        let mut world = World::new();
        let cluster = world.create_cluster();
        for i in 0..count {
            let e = world.spawn(cluster).unwrap();
            world
                .set(e, Position { x: i as f32, y: 0.0 })
                .unwrap();
            world.set(e, Velocity { dx: 1.0, dy: 2.0 }).unwrap();
        }
        world
    }

    #[test]
    fn run_visits_each_matching_entity_once() {
        let world = seeded_world(130);
        let query = world.query::<(Position, Velocity)>().unwrap();
        assert_eq!(query.matched_entities(), 130);

        let mut seen = Vec::new();
        query.run(|entity, (pos, vel)| {
            assert_eq!(pos.x, entity as f32);
            assert_eq!(vel.dx, 1.0);
            seen.push(entity);
        });
        seen.sort_unstable();
        assert_eq!(seen, (0..130).collect::<Vec<_>>());
    }

    #[test]
    fn dispatch_strategies_agree() {
        init_registry();
        let mut world = World::new();
        let cluster = world.create_cluster();
        let mut entities = Vec::new();
        for i in 0..192 {
            let e = world.spawn(cluster).unwrap();
            world.set(e, Health(i as f32)).unwrap();
            entities.push(e);
        }
        // Block 0 stays saturated (bulk). Block 1 loses a quarter (dense).
        // Block 2 keeps only three entities (sparse).
        for e in &entities[64..80] {
            world.set_enabled(*e, false).unwrap();
        }
        for (i, e) in entities[128..192].iter().enumerate() {
            if ![3, 30, 60].contains(&i) {
                world.set_enabled(*e, false).unwrap();
            }
        }

        let query = world.query::<(Health,)>().unwrap();
        let mut seen = Vec::new();
        query.run(|entity, (h,)| {
            assert_eq!(h.0, entity as f32);
            seen.push(entity);
        });

        let expected: Vec<u32> = (0..64)
            .chain(80..128)
            .chain([131, 158, 188])
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn run_mut_then_run_observes_writes() {
        let world = seeded_world(70);
        {
            let query = world.query::<(Position, Velocity)>().unwrap();
            query.run_mut(|_, (pos, vel)| {
                pos.x += vel.dx;
                pos.y += vel.dy;
            });
        }
        let query = world.query::<(Position,)>().unwrap();
        query.run(|entity, (pos,)| {
            assert_eq!(pos.x, entity as f32 + 1.0);
            assert_eq!(pos.y, 2.0);
        });
    }

    #[test]
    fn run_range_visits_only_the_selected_blocks() {
        let world = seeded_world(200); // blocks 0..4, the last partial
        let query = world.query::<(Position,)>().unwrap();
        assert_eq!(query.block_count(), 4);

        let mut seen = Vec::new();
        query.run_range(1, 3, 7, |worker, entity, _| {
            assert_eq!(worker, 7);
            seen.push(entity);
        });
        assert_eq!(seen, (64..192).collect::<Vec<_>>());
    }

    #[test]
    fn par_run_covers_the_same_set_as_run() {
        use std::sync::atomic::{AtomicU64, Ordering};

        let world = seeded_world(300);
        let query = world.query::<(Position,)>().unwrap();

        let serial: u64 = {
            let mut sum = 0u64;
            query.run(|entity, _| sum += entity as u64);
            sum
        };
        let parallel = AtomicU64::new(0);
        query.par_run(|worker, entity, _| {
            assert!(worker >= -1);
            parallel.fetch_add(entity as u64, Ordering::Relaxed);
        });
        assert_eq!(parallel.into_inner(), serial);
    }

    #[test]
    fn par_run_mut_applies_writes_in_parallel() {
        let world = seeded_world(150);
        {
            let query = world.query::<(Position, Velocity)>().unwrap();
            query.par_run_mut(|worker, _, (pos, vel)| {
                assert!(worker >= -1);
                pos.x += vel.dx * 10.0;
            });
        }
        let query = world.query::<(Position,)>().unwrap();
        query.run(|entity, (pos,)| assert_eq!(pos.x, entity as f32 + 10.0));
    }

    #[test]
    fn run_blocks_exposes_full_slices() {
        let world = seeded_world(64);
        let query = world.query::<(Position,)>().unwrap();
        let mut blocks = 0;
        query.run_blocks(|block_index, mask, (positions,)| {
            assert_eq!(block_index, 0);
            assert_eq!(mask, u64::MAX);
            assert_eq!(positions.len(), 64);
            assert_eq!(positions[13].x, 13.0);
            blocks += 1;
        });
        assert_eq!(blocks, 1);
    }
}
