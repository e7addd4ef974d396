//! Composable presence filters for the query compiler.
//!
//! A filter narrows a query beyond its fetched component set, using only
//! the mask words of other pools. Filters work on *presence* — whether an
//! entity holds an instance of a type — for any registered pool kind:
//! components, tags, and masks alike.
//!
//! Three combinator families are provided, each over a tuple of up to four
//! types:
//!
//! - [`WithAll`] — every listed type must be present,
//! - [`WithNone`] — no listed type may be present,
//! - [`WithAny`] — at least one listed type must be present,
//!
//! plus [`And`] for conjunction of combinators and [`Unfiltered`] as the
//! neutral element.
//!
//! Filters participate at two granularities. `prune_blocks` intersects a
//! candidate word of 64 block bits against the pools' `not_empty_blocks`
//! summaries, letting the compiler skip whole blocks without touching
//! their presence words. `prune_entities` then refines a single block's
//! 64 entity bits. `WithNone` cannot prune at block level (an empty block
//! summary says nothing about individual absences), so it passes the
//! candidate word through unchanged.

use std::marker::PhantomData;

use crate::engine::component::pool_id_of;
use crate::engine::storage::RawPool;
use crate::engine::types::{ChunkIndex, PoolId};

/// Maximum number of types one combinator can list.
pub const MAX_FILTER_POOLS: usize = 4;

/// A block- and entity-level predicate over pool presence masks.
///
/// `acquire`/`release` bracket the lifetime of compiled query blocks that
/// were produced under this filter, maintaining the referenced pools'
/// blocker counts.
pub trait QueryFilter {
    /// Increments the blocker count of every pool this filter reads.
    fn acquire(&self, pools: &[Box<dyn RawPool>]);

    /// Decrements the blocker counts taken by [`acquire`](Self::acquire).
    fn release(&self, pools: &[Box<dyn RawPool>]);

    /// Narrows a word of candidate block bits for `chunk`.
    fn prune_blocks(&self, pools: &[Box<dyn RawPool>], chunk: ChunkIndex, candidates: u64) -> u64;

    /// Narrows a word of candidate entity bits for one block of `chunk`.
    fn prune_entities(
        &self,
        pools: &[Box<dyn RawPool>],
        chunk: ChunkIndex,
        block: usize,
        mask: u64,
    ) -> u64;

    /// Conjoins this filter with another.
    fn and<G: QueryFilter>(self, other: G) -> And<Self, G>
    where
        Self: Sized,
    {
        And { first: self, second: other }
    }
}

/// A tuple of up to [`MAX_FILTER_POOLS`] registered types.
pub trait PresenceSet: 'static {
    /// Writes the pool ids of the tuple's types into `out` and returns how
    /// many were written.
    ///
    /// # Panics
    /// Panics if any listed type was never registered.
    fn pool_ids(out: &mut [PoolId; MAX_FILTER_POOLS]) -> usize;
}

macro_rules! impl_presence_set {
    ($count:literal, $($t:ident),+) => {
        impl<$($t: 'static),+> PresenceSet for ($($t,)+) {
            fn pool_ids(out: &mut [PoolId; MAX_FILTER_POOLS]) -> usize {
                let ids = [$(pool_id_of::<$t>()),+];
                out[..$count].copy_from_slice(&ids);
                $count
            }
        }
    };
}

impl_presence_set!(1, A);
impl_presence_set!(2, A, B);
impl_presence_set!(3, A, B, C);
impl_presence_set!(4, A, B, C, D);

/// Resolved pool ids shared by the three combinator families.
#[derive(Clone, Copy)]
struct ResolvedSet {
    pools: [PoolId; MAX_FILTER_POOLS],
    len: usize,
}

impl ResolvedSet {
    fn of<S: PresenceSet>() -> Self {
        let mut pools = [0; MAX_FILTER_POOLS];
        let len = S::pool_ids(&mut pools);
        Self { pools, len }
    }

    #[inline]
    fn ids(&self) -> &[PoolId] {
        &self.pools[..self.len]
    }

    fn acquire(&self, pools: &[Box<dyn RawPool>]) {
        for &id in self.ids() {
            pools[id as usize].blocker_acquire();
        }
    }

    fn release(&self, pools: &[Box<dyn RawPool>]) {
        for &id in self.ids() {
            pools[id as usize].blocker_release();
        }
    }
}

/// Matches entities that hold **every** type in `S`.
pub struct WithAll<S> {
    set: ResolvedSet,
    _marker: PhantomData<fn() -> S>,
}

impl<S: PresenceSet> WithAll<S> {
    /// Resolves the listed types against the frozen pool registry.
    ///
    /// # Panics
    /// Panics if any type in `S` was never registered.
    pub fn new() -> Self {
        Self { set: ResolvedSet::of::<S>(), _marker: PhantomData }
    }
}

impl<S: PresenceSet> Default for WithAll<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PresenceSet> QueryFilter for WithAll<S> {
    fn acquire(&self, pools: &[Box<dyn RawPool>]) {
        self.set.acquire(pools);
    }

    fn release(&self, pools: &[Box<dyn RawPool>]) {
        self.set.release(pools);
    }

    #[inline]
    fn prune_blocks(&self, pools: &[Box<dyn RawPool>], chunk: ChunkIndex, candidates: u64) -> u64 {
        let mut out = candidates;
        for &id in self.set.ids() {
            out &= pools[id as usize].not_empty_blocks(chunk as usize);
            if out == 0 {
                break;
            }
        }
        out
    }

    #[inline]
    fn prune_entities(
        &self,
        pools: &[Box<dyn RawPool>],
        chunk: ChunkIndex,
        block: usize,
        mask: u64,
    ) -> u64 {
        let mut out = mask;
        for &id in self.set.ids() {
            out &= pools[id as usize].present_word(chunk as usize, block);
            if out == 0 {
                break;
            }
        }
        out
    }
}

/// Matches entities that hold **none** of the types in `S`.
pub struct WithNone<S> {
    set: ResolvedSet,
    _marker: PhantomData<fn() -> S>,
}

impl<S: PresenceSet> WithNone<S> {
    /// Resolves the listed types against the frozen pool registry.
    ///
    /// # Panics
    /// Panics if any type in `S` was never registered.
    pub fn new() -> Self {
        Self { set: ResolvedSet::of::<S>(), _marker: PhantomData }
    }
}

impl<S: PresenceSet> Default for WithNone<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PresenceSet> QueryFilter for WithNone<S> {
    fn acquire(&self, pools: &[Box<dyn RawPool>]) {
        self.set.acquire(pools);
    }

    fn release(&self, pools: &[Box<dyn RawPool>]) {
        self.set.release(pools);
    }

    /// Absence cannot be established from block summaries, so no block is
    /// pruned here.
    #[inline]
    fn prune_blocks(&self, _pools: &[Box<dyn RawPool>], _chunk: ChunkIndex, candidates: u64) -> u64 {
        candidates
    }

    #[inline]
    fn prune_entities(
        &self,
        pools: &[Box<dyn RawPool>],
        chunk: ChunkIndex,
        block: usize,
        mask: u64,
    ) -> u64 {
        let mut out = mask;
        for &id in self.set.ids() {
            out &= !pools[id as usize].present_word(chunk as usize, block);
            if out == 0 {
                break;
            }
        }
        out
    }
}

/// Matches entities that hold **at least one** of the types in `S`.
pub struct WithAny<S> {
    set: ResolvedSet,
    _marker: PhantomData<fn() -> S>,
}

impl<S: PresenceSet> WithAny<S> {
    /// Resolves the listed types against the frozen pool registry.
    ///
    /// # Panics
    /// Panics if any type in `S` was never registered.
    pub fn new() -> Self {
        Self { set: ResolvedSet::of::<S>(), _marker: PhantomData }
    }
}

impl<S: PresenceSet> Default for WithAny<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PresenceSet> QueryFilter for WithAny<S> {
    fn acquire(&self, pools: &[Box<dyn RawPool>]) {
        self.set.acquire(pools);
    }

    fn release(&self, pools: &[Box<dyn RawPool>]) {
        self.set.release(pools);
    }

    #[inline]
    fn prune_blocks(&self, pools: &[Box<dyn RawPool>], chunk: ChunkIndex, candidates: u64) -> u64 {
        let mut union = 0u64;
        for &id in self.set.ids() {
            union |= pools[id as usize].not_empty_blocks(chunk as usize);
        }
        candidates & union
    }

    #[inline]
    fn prune_entities(
        &self,
        pools: &[Box<dyn RawPool>],
        chunk: ChunkIndex,
        block: usize,
        mask: u64,
    ) -> u64 {
        let mut union = 0u64;
        for &id in self.set.ids() {
            union |= pools[id as usize].present_word(chunk as usize, block);
        }
        mask & union
    }
}

/// Conjunction of two filters; both must pass.
pub struct And<F, G> {
    first: F,
    second: G,
}

impl<F: QueryFilter, G: QueryFilter> And<F, G> {
    /// Combines two filters.
    pub fn new(first: F, second: G) -> Self {
        Self { first, second }
    }
}

impl<F: QueryFilter, G: QueryFilter> QueryFilter for And<F, G> {
    fn acquire(&self, pools: &[Box<dyn RawPool>]) {
        self.first.acquire(pools);
        self.second.acquire(pools);
    }

    fn release(&self, pools: &[Box<dyn RawPool>]) {
        self.first.release(pools);
        self.second.release(pools);
    }

    #[inline]
    fn prune_blocks(&self, pools: &[Box<dyn RawPool>], chunk: ChunkIndex, candidates: u64) -> u64 {
        let narrowed = self.first.prune_blocks(pools, chunk, candidates);
        if narrowed == 0 {
            return 0;
        }
        self.second.prune_blocks(pools, chunk, narrowed)
    }

    #[inline]
    fn prune_entities(
        &self,
        pools: &[Box<dyn RawPool>],
        chunk: ChunkIndex,
        block: usize,
        mask: u64,
    ) -> u64 {
        let narrowed = self.first.prune_entities(pools, chunk, block, mask);
        if narrowed == 0 {
            return 0;
        }
        self.second.prune_entities(pools, chunk, block, narrowed)
    }
}

/// The neutral filter: passes every candidate through untouched.
#[derive(Clone, Copy, Default)]
pub struct Unfiltered;

impl QueryFilter for Unfiltered {
    fn acquire(&self, _pools: &[Box<dyn RawPool>]) {}

    fn release(&self, _pools: &[Box<dyn RawPool>]) {}

    #[inline]
    fn prune_blocks(&self, _pools: &[Box<dyn RawPool>], _chunk: ChunkIndex, candidates: u64) -> u64 {
        candidates
    }

    #[inline]
    fn prune_entities(
        &self,
        _pools: &[Box<dyn RawPool>],
        _chunk: ChunkIndex,
        _block: usize,
        mask: u64,
    ) -> u64 {
        mask
    }
}
