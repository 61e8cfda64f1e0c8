//! Whole-mesh algorithms: building patches, partitioning faces, reconciling
//! copies between edit rounds, and exporting.

pub mod build;
pub mod export;
pub mod patcher;
pub mod reconcile;

pub use build::{BuiltPatches, Connectivity, build_patches};
pub use export::export;
pub use patcher::grow_patches;
pub use reconcile::{ReconcileReport, reconcile};
