//! # blockset_ecs
//!
//! A blocked-bitset entity engine with an ahead-of-time query compiler.
//!
//! Entities live in 64-entity **blocks**, batched into streamable
//! **chunks**, grouped into wholesale-disableable **clusters**. Every
//! membership and lifecycle fact is a bit in a 64-bit word, so matching a
//! query is word-level intersection: entity lifecycle masks, per-pool
//! presence masks, and composable presence filters, narrowed first at
//! block-summary granularity and then per entity.
//!
//! The result of matching is not an iterator but a **compiled query**: a
//! flat array of block records, each carrying the 64-bit mask of matching
//! entities and the resolved base pointers of the component data backing
//! the block. Consumption — serial or across the rayon pool — walks that
//! array with a per-block choice of bulk, dense, or sparse decode.
//!
//! ## Quick start
//!
//! ```
//! use blockset_ecs::prelude::*;
//!
//! #[derive(Clone, Copy, Debug, Default)]
//! struct Position { x: f32, y: f32 }
//! #[derive(Clone, Copy, Debug, Default)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! register_component::<Position>();
//! register_component::<Velocity>();
//! freeze_pools();
//!
//! let mut world = World::new();
//! let cluster = world.create_cluster();
//! for _ in 0..100 {
//!     let e = world.spawn(cluster).unwrap();
//!     world.set(e, Position::default()).unwrap();
//!     world.set(e, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
//! }
//!
//! let query = world.query::<(Position, Velocity)>().unwrap();
//! query.run_mut(|_entity, (pos, vel)| {
//!     pos.x += vel.dx;
//!     pos.y += vel.dy;
//! });
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod engine;

/// Commonly used entry points, re-exported flat.
pub mod prelude {
    pub use crate::engine::component::{
        freeze_pools, register_component, register_mask, register_tag, PoolKind,
    };
    pub use crate::engine::error::{WorldError, WorldResult};
    pub use crate::engine::filter::{And, QueryFilter, Unfiltered, WithAll, WithAny, WithNone};
    pub use crate::engine::query::{ComponentSet, PreparedQuery, QueryBlock};
    pub use crate::engine::storage::Component;
    pub use crate::engine::types::{
        ComponentStatus, EntityId, EntityIndex, EntityStatus, WorkerId,
    };
    pub use crate::engine::world::{World, WorldConfig};
}
