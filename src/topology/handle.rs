//! Typed element handles.
//!
//! Every mesh element lives in a *slot* of a patch. A handle names that slot as
//! `(patch id, local id)`; the element kind travels in the type, so handing an
//! edge to an API that expects a vertex does not compile.
//!
//! Local ids are limited to [`LOCAL_ID_BITS`] bits so that a cross-patch
//! reference ([`LPPair`](crate::topology::lp_hash::LPPair)) packs into one
//! `u32`.

use std::fmt;
use std::marker::PhantomData;

/// Sentinel for 16-bit arrays (cavity tags, connectivity words).
pub const INVALID16: u16 = u16::MAX;
/// Sentinel for 32-bit ids (patch ids, packed pairs).
pub const INVALID32: u32 = u32::MAX;
/// Number of bits a local id may occupy.
pub const LOCAL_ID_BITS: u32 = 12;
/// Reserved local id; never names a slot.
pub const INVALID12: u16 = (1 << LOCAL_ID_BITS) - 1;
/// Largest per-kind slot capacity of a patch.
pub const MAX_PATCH_CAPACITY: u16 = INVALID12 - 1;

/// The three element kinds of a triangle mesh.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum ElementKind {
    Vertex,
    Edge,
    Face,
}

impl ElementKind {
    /// All kinds, in dimension order.
    pub const ALL: [ElementKind; 3] = [ElementKind::Vertex, ElementKind::Edge, ElementKind::Face];

    /// Dense index, used to address per-kind arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Vertex => "vertex",
            ElementKind::Edge => "edge",
            ElementKind::Face => "face",
        };
        f.write_str(name)
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Vertex {}
    impl Sealed for super::Edge {}
    impl Sealed for super::Face {}
}

/// Type-level element kind. Implemented by [`Vertex`], [`Edge`] and [`Face`] only.
pub trait Kind:
    sealed::Sealed + Copy + Clone + fmt::Debug + Default + Eq + Ord + std::hash::Hash + Send + Sync + 'static
{
    const KIND: ElementKind;
}

/// Vertex marker.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vertex;
/// Edge marker.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge;
/// Face marker.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Face;

impl Kind for Vertex {
    const KIND: ElementKind = ElementKind::Vertex;
}
impl Kind for Edge {
    const KIND: ElementKind = ElementKind::Edge;
}
impl Kind for Face {
    const KIND: ElementKind = ElementKind::Face;
}

/// A slot of a patch holding an element of kind `K`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle<K: Kind> {
    patch: u32,
    local: u16,
    _kind: PhantomData<K>,
}

pub type VertexHandle = Handle<Vertex>;
pub type EdgeHandle = Handle<Edge>;
pub type FaceHandle = Handle<Face>;

impl<K: Kind> Handle<K> {
    #[inline]
    pub const fn new(patch: u32, local: u16) -> Self {
        Self {
            patch,
            local,
            _kind: PhantomData,
        }
    }

    /// A handle that names no slot.
    #[inline]
    pub const fn invalid() -> Self {
        Self::new(INVALID32, INVALID16)
    }

    #[inline]
    pub const fn patch(self) -> u32 {
        self.patch
    }

    #[inline]
    pub const fn local(self) -> u16 {
        self.local
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.patch != INVALID32 && self.local != INVALID16
    }

    #[inline]
    pub const fn kind(self) -> ElementKind {
        K::KIND
    }
}

impl<K: Kind> Default for Handle<K> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<K: Kind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", K::KIND, self.patch, self.local)
    }
}

/// Pack an edge id and a direction bit the way `FE` stores them.
#[inline]
pub const fn pack_edge_dir(edge: u16, dir: bool) -> u16 {
    (edge << 1) | dir as u16
}

/// Inverse of [`pack_edge_dir`].
#[inline]
pub const fn unpack_edge_dir(word: u16) -> (u16, bool) {
    (word >> 1, word & 1 != 0)
}

/// An edge together with a traversal direction.
///
/// `dir == false` walks the edge from its first to its second vertex.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct DEdgeHandle {
    edge: EdgeHandle,
    dir: bool,
}

impl DEdgeHandle {
    #[inline]
    pub const fn new(edge: EdgeHandle, dir: bool) -> Self {
        Self { edge, dir }
    }

    #[inline]
    pub const fn edge(self) -> EdgeHandle {
        self.edge
    }

    #[inline]
    pub const fn dir(self) -> bool {
        self.dir
    }

    /// The same edge walked the other way.
    #[inline]
    pub const fn flipped(self) -> Self {
        Self::new(self.edge, !self.dir)
    }

    #[inline]
    pub const fn packed(self) -> u16 {
        pack_edge_dir(self.edge.local(), self.dir)
    }

    #[inline]
    pub const fn from_packed(patch: u32, word: u16) -> Self {
        let (edge, dir) = unpack_edge_dir(word);
        Self::new(EdgeHandle::new(patch, edge), dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_dir_packing() {
        assert_eq!(unpack_edge_dir(pack_edge_dir(17, true)), (17, true));
        assert_eq!(unpack_edge_dir(pack_edge_dir(17, false)), (17, false));
        let d = DEdgeHandle::new(EdgeHandle::new(3, 9), false);
        assert_eq!(DEdgeHandle::from_packed(3, d.packed()), d);
        assert_eq!(d.flipped().flipped(), d);
    }

    #[test]
    fn invalid_handles() {
        assert!(!VertexHandle::invalid().is_valid());
        assert!(FaceHandle::new(0, 0).is_valid());
        assert_eq!(format!("{:?}", EdgeHandle::new(2, 5)), "edge(2, 5)");
    }
}
