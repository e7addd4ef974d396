//! Entity store: clusters, streamed chunks, and lifecycle masks.
//!
//! Entities live in fixed-capacity chunks of `CHUNK_CAP` slots. Each chunk
//! tracks three mask words per 64-entity block:
//!
//! - `loaded`   — the slot is occupied (spawned and not yet reclaimed),
//! - `active`   — the slot has not been despawned,
//! - `disabled` — the slot is soft-disabled for matching.
//!
//! Chunks are grouped into **clusters**, the unit of wholesale disable and
//! of streaming: chunks are loaded into a cluster on demand and returned to
//! a free list on unload.
//!
//! Despawn is deferred: it clears `active` and bumps the slot version, but
//! the slot stays `loaded` (and thus unavailable for reuse) until an
//! explicit [`EntityStore::reclaim`] sweep folds `active` into `loaded`.
//! This keeps despawn O(1) and makes slot reuse a batched, caller-scheduled
//! event.

use crate::engine::error::{
    CapacityError, ChunkBoundsError, ClusterBoundsError, StaleEntityError, StoreError,
};
use crate::engine::bits::lowest_set_bit;
use crate::engine::types::{
    make_entity_id, split_entity_id, ChunkIndex, ClusterId, EntityId, EntityIndex, VersionId,
    BLOCKS_PER_CHUNK, BLOCK_CAP, CHUNK_CAP,
};

/// Per-chunk lifecycle masks, one word per block.
#[derive(Clone)]
pub struct EntityChunk {
    /// Occupied-slot bits.
    pub loaded: [u64; BLOCKS_PER_CHUNK],
    /// Not-despawned bits; meaningful only where `loaded` is set.
    pub active: [u64; BLOCKS_PER_CHUNK],
    /// Soft-disable bits; subset of `loaded`.
    pub disabled: [u64; BLOCKS_PER_CHUNK],
    /// Summary word: bit *b* set iff `loaded[b] != 0`.
    pub not_empty_blocks: u64,
}

impl Default for EntityChunk {
    fn default() -> Self {
        Self {
            loaded: [0; BLOCKS_PER_CHUNK],
            active: [0; BLOCKS_PER_CHUNK],
            disabled: [0; BLOCKS_PER_CHUNK],
            not_empty_blocks: 0,
        }
    }
}

/// A coarse, wholesale-disableable group of loaded chunks.
pub struct Cluster {
    /// When set, the query compiler skips every chunk of the cluster
    /// without reading a single block mask.
    pub disabled: bool,
    /// Chunks currently streamed into this cluster, in load order.
    pub loaded_chunks: Vec<ChunkIndex>,
}

/// Chunked entity storage with cluster streaming and deferred reclamation.
pub struct EntityStore {
    chunks: Vec<EntityChunk>,
    /// Per-slot generation counters, `chunks.len() * CHUNK_CAP` entries.
    versions: Vec<VersionId>,
    /// Owning cluster per chunk; `None` while the chunk sits on the free list.
    owners: Vec<Option<ClusterId>>,
    clusters: Vec<Cluster>,
    free_chunks: Vec<ChunkIndex>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    /// Creates an empty store with no clusters and no chunks.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty store with bookkeeping pre-reserved for `chunks`
    /// simultaneously loaded chunks.
    pub fn with_capacity(chunks: usize) -> Self {
        Self {
            chunks: Vec::with_capacity(chunks),
            versions: Vec::with_capacity(chunks * CHUNK_CAP),
            owners: Vec::with_capacity(chunks),
            clusters: Vec::new(),
            free_chunks: Vec::new(),
        }
    }

    /// Creates a new, empty, enabled cluster and returns its id.
    pub fn create_cluster(&mut self) -> ClusterId {
        let id = self.clusters.len() as ClusterId;
        self.clusters.push(Cluster {
            disabled: false,
            loaded_chunks: Vec::new(),
        });
        log::debug!("created cluster {id}");
        id
    }

    fn cluster(&self, cluster: ClusterId) -> Result<&Cluster, ClusterBoundsError> {
        self.clusters.get(cluster as usize).ok_or(ClusterBoundsError {
            cluster,
            cluster_count: self.clusters.len(),
        })
    }

    fn cluster_mut(&mut self, cluster: ClusterId) -> Result<&mut Cluster, ClusterBoundsError> {
        let cluster_count = self.clusters.len();
        self.clusters
            .get_mut(cluster as usize)
            .ok_or(ClusterBoundsError { cluster, cluster_count })
    }

    /// Streams a chunk into `cluster`, reusing a free chunk when one exists.
    ///
    /// Returns the global chunk index. New chunks extend the shared index
    /// space, so previously issued entity ids are never invalidated.
    pub fn load_chunk(&mut self, cluster: ClusterId) -> Result<ChunkIndex, StoreError> {
        self.cluster(cluster)?;
        let chunk = match self.free_chunks.pop() {
            Some(chunk) => chunk,
            None => {
                let chunk = self.chunks.len() as ChunkIndex;
                self.chunks.push(EntityChunk::default());
                self.versions.resize(self.chunks.len() * CHUNK_CAP, 0);
                self.owners.push(None);
                chunk
            }
        };
        self.owners[chunk as usize] = Some(cluster);
        self.clusters[cluster as usize].loaded_chunks.push(chunk);
        log::trace!("loaded chunk {chunk} into cluster {cluster}");
        Ok(chunk)
    }

    /// Streams `chunk` out: clears its masks and returns it to the free
    /// list. Slot versions are retained, so stale handles into the chunk
    /// keep failing even across reuse.
    ///
    /// The caller is responsible for clearing the mirrored pool chunks.
    pub fn unload_chunk(&mut self, chunk: ChunkIndex) -> Result<(), StoreError> {
        let owner = self
            .owners
            .get(chunk as usize)
            .copied()
            .flatten()
            .ok_or(ChunkBoundsError { chunk, cluster: None })?;

        // Stale-handle protection: bump every slot that was still loaded.
        let masks = &mut self.chunks[chunk as usize];
        let base = chunk as usize * CHUNK_CAP;
        for block in 0..BLOCKS_PER_CHUNK {
            let mut word = masks.loaded[block];
            while word != 0 {
                let bit = lowest_set_bit(word);
                word &= word - 1;
                let slot = base + block * BLOCK_CAP + bit as usize;
                self.versions[slot] = self.versions[slot].wrapping_add(1);
            }
        }
        *masks = EntityChunk::default();

        let loaded = &mut self.clusters[owner as usize].loaded_chunks;
        loaded.retain(|&c| c != chunk);
        self.owners[chunk as usize] = None;
        self.free_chunks.push(chunk);
        log::trace!("unloaded chunk {chunk} from cluster {owner}");
        Ok(())
    }

    /// Spawns an entity into the first free slot of `cluster`'s loaded
    /// chunks.
    ///
    /// Fails with [`StoreError::Capacity`] when every loaded chunk is full;
    /// callers stream in another chunk and retry.
    pub fn spawn(&mut self, cluster: ClusterId) -> Result<EntityId, StoreError> {
        let chunk_slots = self.cluster(cluster)?.loaded_chunks.len();
        for slot in 0..chunk_slots {
            let chunk = self.clusters[cluster as usize].loaded_chunks[slot];
            let masks = &mut self.chunks[chunk as usize];
            for block in 0..BLOCKS_PER_CHUNK {
                let free = !masks.loaded[block];
                if free == 0 {
                    continue;
                }
                let bit = lowest_set_bit(free);
                masks.loaded[block] |= 1u64 << bit;
                masks.active[block] |= 1u64 << bit;
                masks.disabled[block] &= !(1u64 << bit);
                masks.not_empty_blocks |= 1u64 << block;

                let index =
                    (chunk as usize * CHUNK_CAP + block * BLOCK_CAP + bit as usize) as EntityIndex;
                return Ok(make_entity_id(index, self.versions[index as usize]));
            }
        }
        Err(CapacityError {
            cluster,
            loaded_chunks: self.clusters[cluster as usize].loaded_chunks.len(),
        }
        .into())
    }

    /// Despawns `entity`: clears its `active` bit and bumps the slot
    /// version, invalidating the handle immediately. The slot itself is
    /// recycled by the next [`reclaim`](Self::reclaim) sweep.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), StoreError> {
        let (index, _) = self.check_alive(entity)?;
        let (chunk, block, bit) = slot_of(index);
        self.chunks[chunk].active[block] &= !(1u64 << bit);
        self.versions[index as usize] = self.versions[index as usize].wrapping_add(1);
        Ok(())
    }

    /// Folds despawns into free slots: `loaded &= active`, then
    /// `disabled &= loaded`, across every loaded chunk. Returns the number
    /// of slots reclaimed.
    pub fn reclaim(&mut self) -> usize {
        let mut reclaimed = 0usize;
        for cluster in &self.clusters {
            for &chunk in &cluster.loaded_chunks {
                let masks = &mut self.chunks[chunk as usize];
                let mut not_empty = 0u64;
                for block in 0..BLOCKS_PER_CHUNK {
                    let before = masks.loaded[block];
                    masks.loaded[block] &= masks.active[block];
                    masks.disabled[block] &= masks.loaded[block];
                    reclaimed += (before & !masks.loaded[block]).count_ones() as usize;
                    if masks.loaded[block] != 0 {
                        not_empty |= 1u64 << block;
                    }
                }
                masks.not_empty_blocks = not_empty;
            }
        }
        if reclaimed > 0 {
            log::trace!("reclaimed {reclaimed} entity slots");
        }
        reclaimed
    }

    /// Sets or clears the soft-disable bit of a live entity.
    pub fn set_enabled(&mut self, entity: EntityId, enabled: bool) -> Result<(), StoreError> {
        let (index, _) = self.check_alive(entity)?;
        let (chunk, block, bit) = slot_of(index);
        if enabled {
            self.chunks[chunk].disabled[block] &= !(1u64 << bit);
        } else {
            self.chunks[chunk].disabled[block] |= 1u64 << bit;
        }
        Ok(())
    }

    /// Toggles the wholesale-disable flag of a cluster.
    pub fn set_cluster_enabled(
        &mut self,
        cluster: ClusterId,
        enabled: bool,
    ) -> Result<(), StoreError> {
        self.cluster_mut(cluster)?.disabled = !enabled;
        Ok(())
    }

    /// Returns `true` if `entity`'s handle is current and its slot is
    /// loaded and active.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.check_alive(entity).is_ok()
    }

    /// Returns `true` if `entity` is alive and not soft-disabled.
    pub fn is_enabled(&self, entity: EntityId) -> bool {
        match self.check_alive(entity) {
            Ok((index, _)) => {
                let (chunk, block, bit) = slot_of(index);
                (self.chunks[chunk].disabled[block] >> bit) & 1 == 0
            }
            Err(_) => false,
        }
    }

    fn check_alive(&self, entity: EntityId) -> Result<(EntityIndex, VersionId), StoreError> {
        let (index, version) = split_entity_id(entity);
        let (chunk, block, bit) = slot_of(index);
        let masks = self.chunks.get(chunk).ok_or(ChunkBoundsError {
            chunk: chunk as ChunkIndex,
            cluster: None,
        })?;
        let live = (masks.loaded[block] & masks.active[block]) >> bit & 1 == 1;
        if !live || self.versions[index as usize] != version {
            return Err(StaleEntityError { index }.into());
        }
        Ok((index, version))
    }

    /// Number of chunks in the shared index space (loaded or free).
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of clusters created so far.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Chunks currently loaded into `cluster`, in load order.
    pub fn cluster_chunks(&self, cluster: ClusterId) -> Result<&[ChunkIndex], StoreError> {
        Ok(&self.cluster(cluster)?.loaded_chunks)
    }

    /// Whether `cluster` is wholesale-disabled.
    pub fn cluster_disabled(&self, cluster: ClusterId) -> Result<bool, StoreError> {
        Ok(self.cluster(cluster)?.disabled)
    }

    /// Mask chunk accessor for the query compiler.
    #[inline]
    pub fn chunk(&self, chunk: ChunkIndex) -> &EntityChunk {
        &self.chunks[chunk as usize]
    }
}

/// Decomposes a global entity index into `(chunk, block, bit)`.
#[inline]
fn slot_of(index: EntityIndex) -> (usize, usize, u32) {
    let index = index as usize;
    (
        index / CHUNK_CAP,
        (index / BLOCK_CAP) % BLOCKS_PER_CHUNK,
        (index % BLOCK_CAP) as u32,
    )
}
