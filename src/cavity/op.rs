//! Cavity operation kinds.
//!
//! The operation decides what a seed element grows into before it is
//! removed:
//!
//! | op  | seed   | cavity                                          |
//! |-----|--------|-------------------------------------------------|
//! | V   | vertex | the vertex, its incident edges and faces        |
//! | E   | edge   | the edge and its incident faces                 |
//! | EV  | edge   | the edge, both endpoints and their full stars   |
//! | F   | face   | the face alone                                  |

use crate::topology::handle::{Edge, Face, Kind, Vertex};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OpKind {
    V,
    E,
    EV,
    F,
}

/// Type-level operation; fixes the seed kind accepted by
/// [`Cavity::add`](crate::cavity::Cavity::add).
pub trait CavityOp: Send + Sync + 'static {
    type Seed: Kind;
    const KIND: OpKind;
}

/// Vertex removal: the seed vertex and its star.
#[derive(Debug, Clone, Copy, Default)]
pub struct VertexCavity;

/// Edge removal: the seed edge and its two faces.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeCavity;

/// Edge collapse: the seed edge, its endpoints and their stars.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeVertexCavity;

/// Face removal.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaceCavity;

impl CavityOp for VertexCavity {
    type Seed = Vertex;
    const KIND: OpKind = OpKind::V;
}

impl CavityOp for EdgeCavity {
    type Seed = Edge;
    const KIND: OpKind = OpKind::E;
}

impl CavityOp for EdgeVertexCavity {
    type Seed = Edge;
    const KIND: OpKind = OpKind::EV;
}

impl CavityOp for FaceCavity {
    type Seed = Face;
    const KIND: OpKind = OpKind::F;
}
