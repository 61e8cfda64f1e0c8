//! MeshError: unified error type for patch-cavity public APIs
//!
//! Construction, validation and the edit driver report through this type.
//! Failures raised inside a single cavity pass are [`CavityError`]s and are
//! wrapped here when they escape the driver.

use crate::cavity::CavityError;
use crate::topology::handle::ElementKind;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    /// A face referenced a vertex index past the end of the position array.
    #[error("face {face} references vertex {vertex}, but only {num_vertices} vertices exist")]
    IndexOutOfRange {
        face: usize,
        vertex: u32,
        num_vertices: usize,
    },
    /// A face repeats a vertex.
    #[error("face {face} is degenerate")]
    DegenerateFace { face: usize },
    /// An undirected edge is shared by more than two faces, or twice in the
    /// same direction.
    #[error("edge ({a}, {b}) is non-manifold or inconsistently oriented")]
    NonManifoldEdge { a: u32, b: u32 },
    /// A vertex is not referenced by any face.
    #[error("vertex {vertex} is not used by any face")]
    IsolatedVertex { vertex: u32 },
    /// The input has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,
    /// Per-face patch assignment does not match the face count.
    #[error("patch assignment has {got} entries for {expected} faces")]
    PartitionLength { expected: usize, got: usize },
    /// A patch with its ribbon needs more slots than a local id can address.
    #[error("patch {patch} needs {needed} {kind} slots (limit {limit})")]
    PatchTooLarge {
        patch: u32,
        kind: ElementKind,
        needed: usize,
        limit: u16,
    },
    /// A patch would reference more neighbor patches than its stash holds.
    #[error("patch {patch} references too many neighbor patches")]
    TooManyNeighbors { patch: u32 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -- invariant violations -------------------------------------------
    #[error("patch {patch}: {kind} count {count} exceeds capacity {capacity}")]
    CountExceedsCapacity {
        patch: u32,
        kind: ElementKind,
        count: u16,
        capacity: u16,
    },
    #[error("patch {patch}: {kind} slot {local} has inconsistent active/owned/LP state")]
    SlotStateMismatch {
        patch: u32,
        kind: ElementKind,
        local: u16,
    },
    #[error("patch {patch}: live {kind} {local} references an inactive slot")]
    DanglingReference {
        patch: u32,
        kind: ElementKind,
        local: u16,
    },
    #[error("patch {patch}: face {local} edges do not chain")]
    BrokenFace { patch: u32, local: u16 },
    #[error("patch {patch}: {kind} copy {local} cannot be resolved to an owner ({source})")]
    DanglingCopy {
        patch: u32,
        kind: ElementKind,
        local: u16,
        source: CavityError,
    },
    #[error("patch {patch}: {kind} copy {local} disagrees with its owner")]
    StaleCopy {
        patch: u32,
        kind: ElementKind,
        local: u16,
    },
    #[error("{kind} owned by patch {patch} slot {local} is owned twice")]
    DuplicateOwner {
        patch: u32,
        kind: ElementKind,
        local: u16,
    },
    #[error("global {kind} count is {recorded}, but {counted} owned elements exist")]
    CountMismatch {
        kind: ElementKind,
        recorded: u32,
        counted: u32,
    },
    #[error("patch {patch}: one-ring of vertex {local} is incomplete")]
    RibbonBroken { patch: u32, local: u16 },

    // -- editing ----------------------------------------------------------
    /// A patch kept failing with retryable errors.
    #[error("patch {patch} failed after {attempts} attempts: {source}")]
    EditFailed {
        patch: u32,
        attempts: u32,
        source: CavityError,
    },
    #[error("patch {patch}: {source}")]
    Cavity { patch: u32, source: CavityError },
}
