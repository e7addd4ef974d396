//! Blocked-bitmask pool storage and type-erased access.
//!
//! This module implements the per-type storage of the engine: [`Pool<C>`]
//! for data-carrying components and [`TagPool`] for presence-only tags and
//! masks, both exposed behind the type-erased [`RawPool`] trait for
//! heterogeneous ownership by the world.
//!
//! # Storage model
//!
//! A pool mirrors the entity store's chunk addressing. For every chunk it
//! keeps a [`PoolChunk`]: two parallel arrays of 64-bit words — `present`
//! and `disabled`, one word per 64-entity block — plus a `not_empty_blocks`
//! summary word with one bit per block.
//!
//! Component *values* do not live in the chunks. They live in **data
//! groups**: contiguous `Box<[C]>` allocations each backing
//! `GROUP_CAP` entities (`1 << GROUP_SHIFT` blocks, several chunks' worth),
//! allocated lazily on first write into the group and indexed by
//! `group = global_block_index >> GROUP_SHIFT`. Because a group is one
//! allocation, a single base pointer serves every block inside it — the
//! property the query compiler's pointer cache amortizes.
//!
//! Slot validity is governed entirely by `present` bits; group memory not
//! covered by a set bit holds default-initialized filler. This keeps every
//! group base pointer valid for whole-block access without `MaybeUninit`
//! bookkeeping.
//!
//! # Invariants
//!
//! - `not_empty_blocks` bit *b* is set iff `present[b] != 0`.
//! - `disabled[b]` is a subset of `present[b]`.
//! - A set `present` bit implies the covering data group is allocated.
//!
//! # Type erasure
//!
//! [`RawPool`] provides the dynamically-typed interface the compiler,
//! filters, and world orchestration use: mask-word access, presence
//! queries, erased mutation, group base pointers, and `as_any` downcasting
//! hooks back to the concrete pool type.
//!
//! # Blockers
//!
//! Every pool carries an atomic **blocker** count, incremented for each
//! live compiled query that references the pool. Debug builds assert the
//! count is zero on structural mutation (`insert`/`remove`/chunk growth),
//! catching mutation-during-iteration bugs; release builds skip the check
//! entirely.

use std::any::{type_name, Any, TypeId};
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::component::PoolKind;
use crate::engine::types::{
    EntityIndex, BLOCKS_PER_CHUNK, BLOCK_CAP, CHUNK_CAP, GROUP_CAP, GROUP_SHIFT,
};

/// Marker bound for data-carrying component types.
///
/// `Default` supplies the filler value for unoccupied group slots; slot
/// validity itself is tracked by presence bits, never by the value.
pub trait Component: 'static + Send + Sync + Default {}

impl<T: 'static + Send + Sync + Default> Component for T {}

/// Decomposes a global entity index into `(chunk, block_in_chunk, bit)`.
#[inline]
pub(crate) fn slot_coords(index: EntityIndex) -> (usize, usize, u32) {
    let index = index as usize;
    let chunk = index / CHUNK_CAP;
    let block = (index / BLOCK_CAP) % BLOCKS_PER_CHUNK;
    let bit = (index % BLOCK_CAP) as u32;
    (chunk, block, bit)
}

/// Returns the data-group index covering a global entity index.
#[inline]
pub(crate) fn group_of_index(index: EntityIndex) -> usize {
    ((index as usize) / BLOCK_CAP) >> GROUP_SHIFT
}

/// Per-chunk presence and enabled-state masks for one pool.
///
/// One `u64` word per block; bit *i* of `present[b]` states whether entity
/// slot `b * 64 + i` of the chunk holds an instance of the pool's type.

#[derive(Clone)]
pub struct PoolChunk {
    /// One presence bit per entity slot, one word per block.
    pub present: [u64; BLOCKS_PER_CHUNK],

    /// One disabled bit per entity slot; always a subset of `present`.
    pub disabled: [u64; BLOCKS_PER_CHUNK],

    /// Summary word: bit *b* set iff `present[b] != 0`.
    pub not_empty_blocks: u64,
}

impl Default for PoolChunk {
    fn default() -> Self {
        Self {
            present: [0; BLOCKS_PER_CHUNK],
            disabled: [0; BLOCKS_PER_CHUNK],
            not_empty_blocks: 0,
        }
    }
}

impl PoolChunk {
    /// Sets the presence bit for `(block, bit)` and maintains the summary.
    #[inline]
    fn set_present(&mut self, block: usize, bit: u32) {
        self.present[block] |= 1u64 << bit;
        self.not_empty_blocks |= 1u64 << block;
    }

    /// Clears the presence (and disabled) bit and maintains the summary.
    #[inline]
    fn clear_present(&mut self, block: usize, bit: u32) {
        self.present[block] &= !(1u64 << bit);
        self.disabled[block] &= !(1u64 << bit);
        if self.present[block] == 0 {
            self.not_empty_blocks &= !(1u64 << block);
        }
    }

    #[inline]
    fn set_disabled(&mut self, block: usize, bit: u32, disabled: bool) {
        if disabled {
            self.disabled[block] |= (1u64 << bit) & self.present[block];
        } else {
            self.disabled[block] &= !(1u64 << bit);
        }
    }

    #[inline]
    fn has(&self, block: usize, bit: u32) -> bool {
        (self.present[block] >> bit) & 1 == 1
    }
}

/// A type-erased interface over per-type pool storage.
///
/// `RawPool` is the seam between the generic world plumbing and concrete
/// pool types. It allows:
/// - querying mask words at chunk/block granularity (the compiler's and
///   filters' entire read surface),
/// - erased entity-level mutation for orchestration code,
/// - retrieving data-group base pointers for the compiler,
/// - downcasting back to [`Pool<C>`] via `as_any` / `as_any_mut`,
/// - blocker accounting for the debug mutation-during-iteration guard.
///
/// Implementations must uphold the mask invariants documented on
/// [`PoolChunk`]; out-of-range chunk or block coordinates read as empty
/// words rather than panicking, because pools mirror only the chunks they
/// have been written into.

pub trait RawPool: Any + Send + Sync {
    /// Storage role of this pool (component, tag, or mask).
    fn kind(&self) -> PoolKind;

    /// Returns the `TypeId` of the element type stored by this pool.
    fn element_type_id(&self) -> TypeId;

    /// Returns the human-readable name of the element type stored.
    fn element_type_name(&self) -> &'static str;

    /// Number of chunks this pool currently mirrors.
    fn chunk_count(&self) -> usize;

    /// Summary word for `chunk`: bit *b* set iff block *b* has any present
    /// entity. Reads as 0 for chunks the pool has never been written into.
    fn not_empty_blocks(&self, chunk: usize) -> u64;

    /// Presence word for `(chunk, block)`; 0 if out of range.
    fn present_word(&self, chunk: usize, block: usize) -> u64;

    /// Disabled word for `(chunk, block)`; 0 if out of range.
    fn disabled_word(&self, chunk: usize, block: usize) -> u64;

    /// Returns `true` if `index` holds an instance.
    fn has(&self, index: EntityIndex) -> bool;

    /// Returns `true` if `index` holds an instance that is not disabled.
    fn is_enabled(&self, index: EntityIndex) -> bool;

    /// Sets or clears the disabled bit for `index`.
    ///
    /// A no-op for indices without a present instance.
    fn set_enabled(&mut self, index: EntityIndex, enabled: bool);

    /// Inserts a default-valued instance at `index`.
    ///
    /// For tag and mask pools this is the only insertion path; for
    /// component pools it inserts `C::default()`.
    fn insert_unit(&mut self, index: EntityIndex);

    /// Removes the instance at `index`. Returns `true` if one was present.
    fn remove(&mut self, index: EntityIndex) -> bool;

    /// Clears all masks of `chunk`, used when the entity store streams the
    /// chunk out. Data-group memory is retained.
    fn clear_chunk(&mut self, chunk: usize);

    /// Base pointer of data group `group`, or null if the pool carries no
    /// data or the group was never allocated.
    fn group_base(&self, group: usize) -> *const u8;

    /// Returns an immutable type-erased reference for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable type-erased reference for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Increments the live-query blocker count.
    fn blocker_acquire(&self);

    /// Decrements the live-query blocker count.
    fn blocker_release(&self);

    /// Current blocker count.
    fn blocker_count(&self) -> usize;
}

/// Dense, blocked-bitmask storage for one component type `C`.
///
/// See the module docs for the storage model. All structural mutation is
/// `O(1)`: setting or clearing a presence bit plus, at most, one lazy
/// data-group allocation.

pub struct Pool<C> {
    chunks: Vec<PoolChunk>,
    groups: Vec<Option<Box<[C]>>>,
    blockers: AtomicUsize,
}

impl<C> Default for Pool<C> {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            groups: Vec::new(),
            blockers: AtomicUsize::new(0),
        }
    }
}

impl<C: Component> Pool<C> {
    /// Asserts that no compiled query currently references this pool.
    ///
    /// Debug-only; release builds compile this to nothing.
    #[inline]
    fn assert_unblocked(&self) {
        debug_assert_eq!(
            self.blockers.load(Ordering::Acquire),
            0,
            "structural mutation of pool<{}> while compiled query blocks are live",
            type_name::<C>()
        );
    }

    /// Grows the chunk mirror so `chunk` is addressable.
    fn ensure_chunk(&mut self, chunk: usize) {
        if chunk >= self.chunks.len() {
            self.assert_unblocked();
            self.chunks.resize_with(chunk + 1, PoolChunk::default);
        }
    }

    /// Allocates data group `group` if it does not exist yet.
    fn ensure_group(&mut self, group: usize) {
        if group >= self.groups.len() {
            self.groups.resize_with(group + 1, || None);
        }
        if self.groups[group].is_none() {
            self.assert_unblocked();
            let filler: Box<[C]> = (0..GROUP_CAP).map(|_| C::default()).collect();
            self.groups[group] = Some(filler);
        }
    }

    /// Writes `value` for entity slot `index`, setting its presence bit.
    ///
    /// Overwrites any previous value. The covering chunk mirror and data
    /// group are created on demand.
    pub fn put(&mut self, index: EntityIndex, value: C) {
        self.assert_unblocked();
        let (chunk, block, bit) = slot_coords(index);
        let group = group_of_index(index);
        self.ensure_chunk(chunk);
        self.ensure_group(group);

        let slot = (index as usize) & (GROUP_CAP - 1);
        self.groups[group].as_mut().expect("group ensured above")[slot] = value;
        self.chunks[chunk].set_present(block, bit);
    }

    /// Clears the presence bit for `index`. Returns `true` if an instance
    /// was present. The stored value is replaced with filler.
    pub fn remove(&mut self, index: EntityIndex) -> bool {
        self.assert_unblocked();
        let (chunk, block, bit) = slot_coords(index);
        let Some(chunk_masks) = self.chunks.get_mut(chunk) else { return false };
        if !chunk_masks.has(block, bit) {
            return false;
        }
        chunk_masks.clear_present(block, bit);

        let group = group_of_index(index);
        if let Some(Some(data)) = self.groups.get_mut(group) {
            data[(index as usize) & (GROUP_CAP - 1)] = C::default();
        }
        true
    }

    /// Returns a shared reference to the value at `index`, if present.
    pub fn get(&self, index: EntityIndex) -> Option<&C> {
        let (chunk, block, bit) = slot_coords(index);
        if !self.chunks.get(chunk).is_some_and(|c| c.has(block, bit)) {
            return None;
        }
        let group = group_of_index(index);
        self.groups
            .get(group)?
            .as_ref()
            .map(|data| &data[(index as usize) & (GROUP_CAP - 1)])
    }

    /// Returns a mutable reference to the value at `index`, if present.
    pub fn get_mut(&mut self, index: EntityIndex) -> Option<&mut C> {
        let (chunk, block, bit) = slot_coords(index);
        if !self.chunks.get(chunk).is_some_and(|c| c.has(block, bit)) {
            return None;
        }
        let group = group_of_index(index);
        self.groups
            .get_mut(group)?
            .as_mut()
            .map(|data| &mut data[(index as usize) & (GROUP_CAP - 1)])
    }

    /// Typed base pointer of data group `group`, if allocated.
    pub fn group_ptr(&self, group: usize) -> Option<*const C> {
        self.groups
            .get(group)?
            .as_ref()
            .map(|data| data.as_ptr())
    }
}

impl<C: Component> RawPool for Pool<C> {
    fn kind(&self) -> PoolKind {
        PoolKind::Component
    }

    fn element_type_id(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<C>()
    }

    fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    fn not_empty_blocks(&self, chunk: usize) -> u64 {
        self.chunks.get(chunk).map_or(0, |c| c.not_empty_blocks)
    }

    #[inline]
    fn present_word(&self, chunk: usize, block: usize) -> u64 {
        self.chunks.get(chunk).map_or(0, |c| c.present[block])
    }

    #[inline]
    fn disabled_word(&self, chunk: usize, block: usize) -> u64 {
        self.chunks.get(chunk).map_or(0, |c| c.disabled[block])
    }

    fn has(&self, index: EntityIndex) -> bool {
        let (chunk, block, bit) = slot_coords(index);
        self.chunks.get(chunk).is_some_and(|c| c.has(block, bit))
    }

    fn is_enabled(&self, index: EntityIndex) -> bool {
        let (chunk, block, bit) = slot_coords(index);
        self.chunks
            .get(chunk)
            .is_some_and(|c| c.has(block, bit) && (c.disabled[block] >> bit) & 1 == 0)
    }

    fn set_enabled(&mut self, index: EntityIndex, enabled: bool) {
        let (chunk, block, bit) = slot_coords(index);
        if let Some(c) = self.chunks.get_mut(chunk) {
            c.set_disabled(block, bit, !enabled);
        }
    }

    fn insert_unit(&mut self, index: EntityIndex) {
        self.put(index, C::default());
    }

    fn remove(&mut self, index: EntityIndex) -> bool {
        Pool::remove(self, index)
    }

    fn clear_chunk(&mut self, chunk: usize) {
        self.assert_unblocked();
        if let Some(c) = self.chunks.get_mut(chunk) {
            *c = PoolChunk::default();
        }
    }

    fn group_base(&self, group: usize) -> *const u8 {
        self.group_ptr(group)
            .map_or(ptr::null(), |p| p as *const u8)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn blocker_acquire(&self) {
        self.blockers.fetch_add(1, Ordering::AcqRel);
    }

    fn blocker_release(&self) {
        let previous = self.blockers.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "blocker underflow");
    }

    fn blocker_count(&self) -> usize {
        self.blockers.load(Ordering::Acquire)
    }
}

/// Presence-only pool backing tag and mask types.
///
/// Identical mask-chunk structure to [`Pool<C>`] with no data groups;
/// `group_base` is always null and the compiler rejects tags/masks in
/// component positions at registration-kind level.

pub struct TagPool {
    kind: PoolKind,
    type_id: TypeId,
    name: &'static str,
    chunks: Vec<PoolChunk>,
    blockers: AtomicUsize,
}

impl TagPool {
    /// Creates an empty presence pool for type `T` with the given kind.
    pub fn of<T: 'static>(kind: PoolKind) -> Self {
        Self {
            kind,
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            chunks: Vec::new(),
            blockers: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn assert_unblocked(&self) {
        debug_assert_eq!(
            self.blockers.load(Ordering::Acquire),
            0,
            "structural mutation of {} pool `{}` while compiled query blocks are live",
            self.kind,
            self.name
        );
    }
}

impl RawPool for TagPool {
    fn kind(&self) -> PoolKind {
        self.kind
    }

    fn element_type_id(&self) -> TypeId {
        self.type_id
    }

    fn element_type_name(&self) -> &'static str {
        self.name
    }

    fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    fn not_empty_blocks(&self, chunk: usize) -> u64 {
        self.chunks.get(chunk).map_or(0, |c| c.not_empty_blocks)
    }

    #[inline]
    fn present_word(&self, chunk: usize, block: usize) -> u64 {
        self.chunks.get(chunk).map_or(0, |c| c.present[block])
    }

    #[inline]
    fn disabled_word(&self, chunk: usize, block: usize) -> u64 {
        self.chunks.get(chunk).map_or(0, |c| c.disabled[block])
    }

    fn has(&self, index: EntityIndex) -> bool {
        let (chunk, block, bit) = slot_coords(index);
        self.chunks.get(chunk).is_some_and(|c| c.has(block, bit))
    }

    fn is_enabled(&self, index: EntityIndex) -> bool {
        let (chunk, block, bit) = slot_coords(index);
        self.chunks
            .get(chunk)
            .is_some_and(|c| c.has(block, bit) && (c.disabled[block] >> bit) & 1 == 0)
    }

    fn set_enabled(&mut self, index: EntityIndex, enabled: bool) {
        let (chunk, block, bit) = slot_coords(index);
        if let Some(c) = self.chunks.get_mut(chunk) {
            c.set_disabled(block, bit, !enabled);
        }
    }

    fn insert_unit(&mut self, index: EntityIndex) {
        self.assert_unblocked();
        let (chunk, block, bit) = slot_coords(index);
        if chunk >= self.chunks.len() {
            self.chunks.resize_with(chunk + 1, PoolChunk::default);
        }
        self.chunks[chunk].set_present(block, bit);
    }

    fn remove(&mut self, index: EntityIndex) -> bool {
        self.assert_unblocked();
        let (chunk, block, bit) = slot_coords(index);
        let Some(chunk_masks) = self.chunks.get_mut(chunk) else { return false };
        if !chunk_masks.has(block, bit) {
            return false;
        }
        chunk_masks.clear_present(block, bit);
        true
    }

    fn clear_chunk(&mut self, chunk: usize) {
        self.assert_unblocked();
        if let Some(c) = self.chunks.get_mut(chunk) {
            *c = PoolChunk::default();
        }
    }

    fn group_base(&self, _group: usize) -> *const u8 {
        ptr::null()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn blocker_acquire(&self) {
        self.blockers.fetch_add(1, Ordering::AcqRel);
    }

    fn blocker_release(&self) {
        let previous = self.blockers.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "blocker underflow");
    }

    fn blocker_count(&self) -> usize {
        self.blockers.load(Ordering::Acquire)
    }
}

/// Reinterprets a raw base pointer as a typed slice of `len` elements.
///
/// # Safety
/// `ptr` must originate from a live data-group allocation of element type
/// `T`, `len` elements must lie within that allocation, and no mutable
/// reference to the range may exist for the lifetime `'a`.

#[inline]
pub unsafe fn cast_slice<'a, T>(ptr: *const u8, len: usize) -> &'a [T] {
    unsafe { slice::from_raw_parts(ptr as *const T, len) }
}

/// Reinterprets a raw base pointer as a mutable typed slice.
///
/// # Safety
/// As [`cast_slice`], and additionally no other reference (shared or
/// mutable) to the range may exist for the lifetime `'a`.

#[inline]
pub unsafe fn cast_slice_mut<'a, T>(ptr: *mut u8, len: usize) -> &'a mut [T] {
    unsafe { slice::from_raw_parts_mut(ptr as *mut T, len) }
}
