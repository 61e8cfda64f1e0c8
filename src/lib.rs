#![cfg_attr(docsrs, feature(doc_cfg))]
//! # patch-cavity
//!
//! patch-cavity is a dynamic triangle-mesh engine built on patches. The mesh
//! is split into patches of bounded size; each patch keeps its own elements
//! plus a ribbon of copies from its neighbors, so that local edits can run on
//! many patches at once.
//!
//! Edits are expressed as *cavities*: seed elements are grown into regions,
//! the regions are removed, and user code refills each hole along its
//! boundary loop. The engine resolves overlapping cavities, migrates missing
//! neighborhoods between patches, transfers ownership and keeps the copies
//! of neighbor patches consistent.
//!
//! ## Features
//! - Vertex, edge, edge-vertex and face cavities (`VertexCavity`,
//!   `EdgeCavity`, `EdgeVertexCavity`, `FaceCavity`)
//! - Non-blocking patch locks with an automatic retry driver
//! - Per-patch attributes carried across migration
//! - Invariant checking via [`DebugInvariants`] and the `strict-invariants` /
//!   `check-invariants` features
//!
//! ## Usage
//!
//! ```no_run
//! use patch_cavity::prelude::*;
//!
//! # fn main() -> Result<(), MeshError> {
//! let positions = vec![[0.0, 0.0, 0.0]; 4];
//! let faces = vec![[0, 1, 2], [0, 2, 3], [0, 3, 1], [1, 3, 2]];
//! let mesh = DynamicMesh::from_triangles(&positions, &faces, DynamicConfig::default())?;
//! let report = mesh.edit::<FaceCavity, _>(|block, cavity| {
//!     cavity.process(block)?;
//!     cavity.for_each_cavity(block, |_, _| Ok(()))
//! })?;
//! assert_eq!(report.cavities, 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Determinism
//!
//! Conflicts between cavities of one patch are always decided in favor of the
//! lower cavity id. The order in which patches commit within a round depends
//! on scheduling; tests that need exact results use a single patch or the
//! serial fallback.

pub mod algs;
pub mod attribute;
pub mod block;
pub mod cavity;
pub mod config;
pub mod context;
pub mod debug_invariants;
pub mod dynamic;
pub mod mesh_error;
pub mod query;
pub mod scheduler;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::attribute::Attribute;
    pub use crate::block::Block;
    pub use crate::cavity::{
        Cavity, CavityError, CavityOp, CommitSummary, EdgeCavity, EdgeVertexCavity, FaceCavity,
        OpKind, VertexCavity,
    };
    pub use crate::config::DynamicConfig;
    pub use crate::context::Context;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::dynamic::{DynamicMesh, EditReport};
    pub use crate::mesh_error::MeshError;
    pub use crate::query::{Neighbors, Op, PatchView, Query, Relation};
    pub use crate::topology::handle::{
        DEdgeHandle, EdgeHandle, ElementKind, FaceHandle, Handle, VertexHandle,
    };
}
