//! # tgame_structures - Arena Storage
//!
//! Ownership containers for the physics world:
//! - SlotMap: generational index storage, stale keys are detected
//! - IdPool: reusable small integer ids

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod slot_map;
pub mod id_pool;

pub use slot_map::{SlotMap, SlotKey};
pub use id_pool::IdPool;

pub mod prelude {
    pub use crate::slot_map::{SlotMap, SlotKey};
    pub use crate::id_pool::IdPool;
}
