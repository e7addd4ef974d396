//! Core Types, Identifiers, and Bit-Level Layouts
//!
//! This module defines the **fundamental types, identifiers, and layout
//! constants** shared across all subsystems of the engine: the entity store,
//! pools, filters, the query compiler, and the runner.
//!
//! ## Design Philosophy
//!
//! The engine is designed around:
//!
//! - **Block granularity** — all matching is performed on groups of 64
//!   entities ("blocks"), one bit per entity in a `u64` word.
//! - **Chunked streaming** — blocks are batched into fixed-capacity chunks,
//!   the unit of loading and unloading.
//! - **Stable numeric identifiers** — small, copyable IDs for all engine
//!   concepts.
//! - **No heap allocation in hot paths.**
//!
//! ## Entity Representation
//!
//! Entities are encoded as a packed 64-bit integer:
//!
//! ```text
//! | version | index |
//! ```
//!
//! - **Index** identifies the global entity slot
//!   (`chunk * CHUNK_CAP + block * BLOCK_CAP + bit`).
//! - **Version** enables stale-handle detection after despawning.
//!
//! Bit widths are controlled by compile-time constants and validated with
//! static assertions.
//!
//! ## Addressing
//!
//! The same index space is shared by the entity store and every pool:
//!
//! ```text
//! global_block_index = index / BLOCK_CAP
//! chunk_index        = global_block_index / BLOCKS_PER_CHUNK
//! block_in_chunk     = global_block_index % BLOCKS_PER_CHUNK
//! data_group_index   = global_block_index >> GROUP_SHIFT
//! ```
//!
//! ## Status Selectors
//!
//! [`EntityStatus`] and [`ComponentStatus`] carry the per-block boolean
//! formulas that the query compiler intersects; they are the single source
//! of truth for enabled/disabled matching semantics.

/// Bit-width type used for compile-time layout calculations.
pub type Bits = u8;

/// Globally unique entity identifier encoded as a packed 64-bit value.
pub type EntityId = u64;
/// Global entity slot index (dense, shared with pool addressing).
pub type EntityIndex = u32;
/// Generation counter used to detect stale entity handles.
pub type VersionId = u32;

/// Identifier for a cluster (a coarse, wholesale-disableable chunk group).
pub type ClusterId = u32;
/// Global chunk index within the entity store.
pub type ChunkIndex = u32;
/// Global block index (`entity_index / BLOCK_CAP`).
pub type BlockIndex = u32;
/// Data-group index (`block_index >> GROUP_SHIFT`).
pub type GroupIndex = u32;

/// Unique identifier for a registered pool (component, tag, or mask type).
pub type PoolId = u16;

/// Worker identifier handed to runner callbacks during parallel consumption.
pub type WorkerId = i32;

/// Total number of bits in an [`EntityId`].
pub const ENTITY_BITS: Bits = 64;
/// Number of bits reserved for the slot index.
pub const INDEX_BITS: Bits = 32;
/// Number of bits reserved for entity versioning.
pub const VERSION_BITS: Bits = ENTITY_BITS - INDEX_BITS;

const _: [(); 1] = [(); (INDEX_BITS > 0) as usize];
const _: [(); 1] = [(); (VERSION_BITS > 0) as usize];
const _: [(); 1] = [(); ((INDEX_BITS as u16 + VERSION_BITS as u16) == ENTITY_BITS as u16) as usize];

const fn mask(bits: Bits) -> EntityId {
    if bits == 0 { 0 } else { ((1 as EntityId) << bits) - 1 }
}

/// Mask selecting the index portion of an [`EntityId`].
pub const INDEX_MASK: EntityId = mask(INDEX_BITS);

/// Number of entities per block — the unit of bitmask granularity.
pub const BLOCK_CAP: usize = 64;
/// Number of blocks per chunk.
pub const BLOCKS_PER_CHUNK: usize = 64;
/// Number of entities per chunk — the unit of streaming/loading.
pub const CHUNK_CAP: usize = BLOCK_CAP * BLOCKS_PER_CHUNK;

/// Shift converting a global block index into a data-group index.
pub const GROUP_SHIFT: u32 = 8;
/// Number of blocks covered by one data group.
pub const GROUP_BLOCKS: usize = 1 << GROUP_SHIFT;
/// Number of entities backed by one contiguous data group.
pub const GROUP_CAP: usize = GROUP_BLOCKS * BLOCK_CAP;

/// Maximum number of component types in a single query.
pub const MAX_QUERY_COMPONENTS: usize = 8;

/// Maximum number of registered pool types (components + tags + masks).
pub const POOL_CAP: usize = 4096;

const _: [(); 1] = [(); (BLOCK_CAP == 64) as usize];
const _: [(); 1] = [(); (CHUNK_CAP % BLOCK_CAP == 0) as usize];
const _: [(); 1] = [(); (GROUP_CAP % CHUNK_CAP == 0) as usize];

/// Packs a slot index and version into an [`EntityId`].
#[inline]
pub const fn make_entity_id(index: EntityIndex, version: VersionId) -> EntityId {
    ((version as EntityId) << INDEX_BITS) | (index as EntityId)
}

/// Splits an [`EntityId`] into `(index, version)`.
#[inline]
pub const fn split_entity_id(id: EntityId) -> (EntityIndex, VersionId) {
    ((id & INDEX_MASK) as EntityIndex, (id >> INDEX_BITS) as VersionId)
}

/// Selects which entities match a query with respect to their lifecycle and
/// enabled state.
///
/// The per-block formula is evaluated over the entity chunk's three mask
/// words (`loaded`, `active`, `disabled`):
///
/// | selector   | formula                        |
/// |-----------:|--------------------------------|
/// | `Enabled`  | `loaded & active & !disabled`  |
/// | `Disabled` | `loaded & disabled`            |
/// | `Any`      | `loaded & active`              |

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityStatus {
    /// Live, non-disabled entities.
    Enabled,
    /// Loaded entities that are disabled.
    Disabled,
    /// All live entities regardless of their disabled flag.
    Any,
}

impl EntityStatus {
    /// Evaluates the selector formula for one block.
    #[inline]
    pub fn block_term(self, loaded: u64, active: u64, disabled: u64) -> u64 {
        match self {
            EntityStatus::Enabled => loaded & active & !disabled,
            EntityStatus::Disabled => loaded & disabled,
            EntityStatus::Any => loaded & active,
        }
    }
}

/// Selects which component instances match a query with respect to their
/// per-pool enabled state.
///
/// The per-block formula is evaluated over each pool chunk's mask words
/// (`present`, `disabled`) and conjoined across all queried pools:
///
/// | selector   | per-pool term          |
/// |-----------:|------------------------|
/// | `Enabled`  | `present & !disabled`  |
/// | `Disabled` | `disabled`             |
/// | `Any`      | `present`              |

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentStatus {
    /// Present and not disabled.
    Enabled,
    /// Disabled instances.
    Disabled,
    /// Present regardless of the disabled flag.
    Any,
}

impl ComponentStatus {
    /// Evaluates the selector formula for one pool's block.
    #[inline]
    pub fn block_term(self, present: u64, disabled: u64) -> u64 {
        match self {
            ComponentStatus::Enabled => present & !disabled,
            ComponentStatus::Disabled => disabled,
            ComponentStatus::Any => present,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_round_trips() {
        let id = make_entity_id(0xDEAD_BEEF, 42);
        assert_eq!(split_entity_id(id), (0xDEAD_BEEF, 42));
    }

    #[test]
    fn entity_status_formulas() {
        let loaded = 0b1111;
        let active = 0b1101;
        let disabled = 0b0100;
        assert_eq!(EntityStatus::Enabled.block_term(loaded, active, disabled), 0b1001);
        assert_eq!(EntityStatus::Disabled.block_term(loaded, active, disabled), 0b0100);
        assert_eq!(EntityStatus::Any.block_term(loaded, active, disabled), 0b1101);
    }

    #[test]
    fn status_formulas_match_per_bit_evaluation() {
        use crate::engine::testutil::tl_rand_u64;

        for _ in 0..1_000 {
            let loaded = tl_rand_u64();
            let active = tl_rand_u64();
            let disabled = tl_rand_u64();
            for selector in [EntityStatus::Enabled, EntityStatus::Disabled, EntityStatus::Any] {
                let word = selector.block_term(loaded, active, disabled);
                for bit in 0..64 {
                    let (l, a, d) = (
                        loaded >> bit & 1 == 1,
                        active >> bit & 1 == 1,
                        disabled >> bit & 1 == 1,
                    );
                    let expected = match selector {
                        EntityStatus::Enabled => l && a && !d,
                        EntityStatus::Disabled => l && d,
                        EntityStatus::Any => l && a,
                    };
                    assert_eq!(word >> bit & 1 == 1, expected);
                }
            }
            let present = tl_rand_u64();
            for selector in [
                ComponentStatus::Enabled,
                ComponentStatus::Disabled,
                ComponentStatus::Any,
            ] {
                let word = selector.block_term(present, disabled);
                for bit in 0..64 {
                    let (p, d) = (present >> bit & 1 == 1, disabled >> bit & 1 == 1);
                    let expected = match selector {
                        ComponentStatus::Enabled => p && !d,
                        ComponentStatus::Disabled => d,
                        ComponentStatus::Any => p,
                    };
                    assert_eq!(word >> bit & 1 == 1, expected);
                }
            }
        }
    }

    #[test]
    fn component_status_formulas() {
        let present = 0b0111;
        let disabled = 0b0101;
        assert_eq!(ComponentStatus::Enabled.block_term(present, disabled), 0b0010);
        assert_eq!(ComponentStatus::Disabled.block_term(present, disabled), 0b0101);
        assert_eq!(ComponentStatus::Any.block_term(present, disabled), 0b0111);
    }
}
