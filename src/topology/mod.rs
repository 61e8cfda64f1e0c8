//! Patch-level mesh topology.
//!
//! A mesh is split into patches. Each patch stores its elements in
//! fixed-capacity slot arrays addressed by 16-bit local ids, with bitmasks for
//! the active and owned slots, an LP hash table per kind mapping non-owned
//! slots to their owner, and a small stash of neighbor patch ids.

pub mod bitmask;
pub mod handle;
pub mod lp_hash;
pub mod ownership;
pub mod patch_info;
pub mod patch_stash;
pub mod validation;

pub use bitmask::Bitmask;
pub use handle::{
    DEdgeHandle, EdgeHandle, ElementKind, FaceHandle, Handle, Kind, VertexHandle,
};
pub use lp_hash::{LPHashTable, LPPair};
pub use patch_info::PatchInfo;
pub use patch_stash::{PatchStash, STASH_SIZE};
