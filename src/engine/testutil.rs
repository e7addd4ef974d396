//! Shared fixtures for in-crate unit tests.
//!
//! The pool registry is process-global and freezes once, so every unit-test
//! module must register through this single [`init_registry`] rather than
//! registering its own types ad hoc.

use std::cell::Cell;
use std::sync::Once;

use crate::engine::component::{
    freeze_pools, register_component, register_mask, register_tag,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Health(pub f32);

pub(crate) struct Armed;
pub(crate) struct Fleeing;
pub(crate) struct Wounded;

pub(crate) struct Selected;

thread_local! {
    static TL_RNG: Cell<u64> = Cell::new(0x9E37_79B9_7F4A_7C15);
}

/// Deterministic per-thread xorshift64* word source for mask sampling.
pub(crate) fn tl_rand_u64() -> u64 {
    TL_RNG.with(|c| {
        let mut x = c.get();
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        c.set(x);
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    })
}

static INIT: Once = Once::new();

/// Registers every fixture type and freezes the registry. Idempotent.
pub(crate) fn init_registry() {
    INIT.call_once(|| {
        register_component::<Position>();
        register_component::<Velocity>();
        register_component::<Health>();
        register_tag::<Armed>();
        register_tag::<Fleeing>();
        register_tag::<Wounded>();
        register_mask::<Selected>();
        freeze_pools();
    });
}
