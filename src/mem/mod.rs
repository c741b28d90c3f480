//! Memory management: buddy-pool banks, the page map layered over them, and
//! the sequential-fit kernel heap layered over the page map (§4.1, §4.2).
//!
//! Dependency order matches the rest of the crate: [`buddy`] has no
//! dependencies below it, [`page_map`] is built from [`buddy::BuddyPool`],
//! and [`heap`] is an independent sbrk-style allocator that a kernel wires up
//! against page-map-backed growth.

pub mod buddy;
pub mod heap;
pub mod page_map;

pub use buddy::BuddyPool;
pub use heap::SequentialHeap;
pub use page_map::{PageMap, PageMapNode};
