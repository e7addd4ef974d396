//! Error types for the entity store and pool storage.
//!
//! This module declares focused, composable error types used across the
//! entity store, pools, and world orchestration layer. Each error carries
//! enough context to make failures actionable while remaining small and
//! cheap to pass around or convert into the aggregate [`WorldError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (e.g.
//!   cluster bound violations, stale entity handles, unregistered pools).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into
//!   [`WorldError`].
//! * **Actionability:** Structured fields (offending indices, expected vs.
//!   actual types) make logs useful without reproducing the issue.
//!
//! ## What is *not* an error
//! The query compiler follows a strict taxonomy: empty results (no matching
//! clusters, chunks, or entities) are represented by a zero-length block
//! list, never by a `Result`. Precondition violations (structural mutation
//! under active blockers, a nested `prepare` while compiled blocks are
//! live) are programmer errors caught by assertions, not values of these
//! types.

use std::fmt;
use std::any::TypeId;

use crate::engine::types::{ClusterId, ChunkIndex, EntityIndex, PoolId};

/// Result alias for world-level operations.
pub type WorldResult<T> = Result<T, WorldError>;

/// Returned when the store cannot satisfy a request to create additional
/// entities because every loaded chunk of the target cluster is full.
///
/// ### Fields
/// * `cluster` — The cluster the spawn targeted.
/// * `loaded_chunks` — How many chunks the cluster had loaded at the time.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    /// Cluster the spawn targeted.
    pub cluster: ClusterId,

    /// Number of chunks loaded in the cluster when the spawn failed.
    pub loaded_chunks: usize,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cluster {} is full ({} loaded chunks, no free slot)",
            self.cluster, self.loaded_chunks
        )
    }
}

impl std::error::Error for CapacityError {}

/// Returned when a cluster id is outside the valid range for the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterBoundsError {
    /// Offending cluster id that was requested.
    pub cluster: ClusterId,

    /// Number of clusters that exist.
    pub cluster_count: usize,
}

impl fmt::Display for ClusterBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cluster {} out of bounds ({} clusters exist)",
            self.cluster, self.cluster_count
        )
    }
}

impl std::error::Error for ClusterBoundsError {}

/// Returned when a chunk index does not refer to a loaded chunk of the
/// addressed cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBoundsError {
    /// Chunk index that was addressed.
    pub chunk: ChunkIndex,

    /// Cluster the chunk was expected to belong to, if the operation was
    /// cluster-scoped.
    pub cluster: Option<ClusterId>,
}

impl fmt::Display for ChunkBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cluster {
            Some(cluster) => write!(f, "chunk {} is not loaded in cluster {}", self.chunk, cluster),
            None => write!(f, "chunk {} is not loaded", self.chunk),
        }
    }
}

impl std::error::Error for ChunkBoundsError {}

/// Returned when an entity handle is no longer valid, typically because it
/// was despawned and its version no longer matches live storage.
///
/// Use this to prevent use-after-free style logic errors at the API
/// boundary.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntityError {
    /// Slot index of the offending handle.
    pub index: EntityIndex,
}

impl fmt::Display for StaleEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stale or dead entity reference (slot {})", self.index)
    }
}

impl std::error::Error for StaleEntityError {}

/// Aggregate error for entity store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Entity creation failed because the cluster had no free slot.
    Capacity(CapacityError),

    /// A cluster id was outside the valid range.
    ClusterBounds(ClusterBoundsError),

    /// A chunk index did not refer to a loaded chunk.
    ChunkBounds(ChunkBoundsError),

    /// An entity handle was stale or referred to a despawned entity.
    StaleEntity(StaleEntityError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Capacity(e) => write!(f, "{e}"),
            StoreError::ClusterBounds(e) => write!(f, "{e}"),
            StoreError::ChunkBounds(e) => write!(f, "{e}"),
            StoreError::StaleEntity(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<CapacityError> for StoreError {
    fn from(e: CapacityError) -> Self { StoreError::Capacity(e) }
}
impl From<ClusterBoundsError> for StoreError {
    fn from(e: ClusterBoundsError) -> Self { StoreError::ClusterBounds(e) }
}
impl From<ChunkBoundsError> for StoreError {
    fn from(e: ChunkBoundsError) -> Self { StoreError::ChunkBounds(e) }
}
impl From<StaleEntityError> for StoreError {
    fn from(e: StaleEntityError) -> Self { StoreError::StaleEntity(e) }
}

/// Returned when a pool write targets a slot whose element type does not
/// match the provided value's type.
///
/// This is a logic/configuration error surfaced when pool ids diverge from
/// their registered types (e.g. writing `Velocity` into a `Position` pool).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatchError {
    /// Destination pool's declared element type.
    pub expected: TypeId,

    /// Provided value's dynamic type.
    pub actual: TypeId,
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type mismatch: expected {:?}, actual {:?}", self.expected, self.actual)
    }
}

impl std::error::Error for TypeMismatchError {}

/// Aggregate error for pool (per-type storage) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The addressed pool id has no registered pool behind it.
    NotRegistered {
        /// Offending pool id.
        pool: PoolId,
    },

    /// The dynamic type of a value did not match the pool's element type.
    TypeMismatch(TypeMismatchError),

    /// An entity index addressed storage outside any loaded chunk.
    IndexOutOfBounds {
        /// Offending entity index.
        index: EntityIndex,

        /// Number of chunks the pool currently mirrors.
        chunks: usize,
    },

    /// The operation required a data-carrying pool but the pool is a tag or
    /// mask pool.
    NoData {
        /// Offending pool id.
        pool: PoolId,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::NotRegistered { pool } => write!(f, "pool {} is not registered", pool),
            PoolError::TypeMismatch(e) => write!(f, "{e}"),
            PoolError::IndexOutOfBounds { index, chunks } => write!(
                f,
                "entity index {} out of pool bounds ({} chunks mirrored)",
                index, chunks
            ),
            PoolError::NoData { pool } => {
                write!(f, "pool {} carries no data (tag or mask pool)", pool)
            }
        }
    }
}

impl std::error::Error for PoolError {}

impl From<TypeMismatchError> for PoolError {
    fn from(e: TypeMismatchError) -> Self { PoolError::TypeMismatch(e) }
}

/// High-level error for world operations.
///
/// Aggregates the store and pool failure modes so orchestration code can
/// use `?` throughout while callers still match on the structured cause.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldError {
    /// An entity store operation failed.
    Store(StoreError),

    /// A pool operation failed.
    Pool(PoolError),
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldError::Store(e) => write!(f, "{e}"),
            WorldError::Pool(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for WorldError {}

impl From<StoreError> for WorldError {
    fn from(e: StoreError) -> Self { WorldError::Store(e) }
}
impl From<PoolError> for WorldError {
    fn from(e: PoolError) -> Self { WorldError::Pool(e) }
}
impl From<CapacityError> for WorldError {
    fn from(e: CapacityError) -> Self { WorldError::Store(StoreError::Capacity(e)) }
}
impl From<ClusterBoundsError> for WorldError {
    fn from(e: ClusterBoundsError) -> Self { WorldError::Store(StoreError::ClusterBounds(e)) }
}
impl From<ChunkBoundsError> for WorldError {
    fn from(e: ChunkBoundsError) -> Self { WorldError::Store(StoreError::ChunkBounds(e)) }
}
impl From<StaleEntityError> for WorldError {
    fn from(e: StaleEntityError) -> Self { WorldError::Store(StoreError::StaleEntity(e)) }
}
