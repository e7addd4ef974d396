//! Engine internals: storage, compilation, and consumption.
//!
//! The modules stack bottom-up:
//!
//! - [`types`] — identifiers, layout constants, status selectors.
//! - [`bits`] — branch-free 64-bit word scanning.
//! - [`error`] — structured error types for store, pool, and world ops.
//! - [`storage`] — per-type pools with blocked presence masks.
//! - [`component`] — the global pool registry (register, freeze, resolve).
//! - [`entity`] — chunked entity store with clusters and reclamation.
//! - [`filter`] — composable presence predicates.
//! - [`query`] — compilation of mask state into flat block records.
//! - [`runner`] — serial and parallel consumption of compiled blocks.
//! - [`world`] — the owning facade tying the pieces together.

pub mod bits;
pub mod component;
pub mod entity;
pub mod error;
pub mod filter;
pub mod query;
pub mod runner;
pub mod storage;
pub mod types;
pub mod world;

#[cfg(test)]
pub(crate) mod testutil;
