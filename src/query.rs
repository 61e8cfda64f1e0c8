//! Local neighborhood queries.
//!
//! A [`Query`] runs a callback for every owned, live element of one kind in a
//! patch and hands it that element's neighbors of another kind. The
//! neighborhoods are assembled once per call from the patch's `EV`/`FE`
//! arrays; neighbors are local handles and may be copies.
//!
//! The eight supported relations are listed in [`Op`]. `VV`, `VE`, `VF`, `EF`
//! and `FF` are unordered; `EV`, `FV` and `FE` follow storage order.

use crate::block::Block;
use crate::topology::handle::{Edge, ElementKind, Face, Handle, Kind, Vertex};
use crate::topology::patch_info::PatchInfo;
use std::ops::Index;

/// Read access to one patch's topology, implemented by committed patch
/// records and by an open cavity's working copy.
pub trait PatchView {
    fn patch_id(&self) -> u32;
    /// Slots in use (live or freed) of `kind`.
    fn slot_count(&self, kind: ElementKind) -> u16;
    fn is_active(&self, kind: ElementKind, local: u16) -> bool;
    fn is_owned(&self, kind: ElementKind, local: u16) -> bool;
    fn edge_vertices(&self, edge: u16) -> [u16; 2];
    fn face_edges(&self, face: u16) -> [(u16, bool); 3];

    fn face_vertices(&self, face: u16) -> [u16; 3] {
        self.face_edges(face).map(|(e, dir)| {
            let [a, b] = self.edge_vertices(e);
            if dir { b } else { a }
        })
    }
}

impl PatchView for PatchInfo {
    fn patch_id(&self) -> u32 {
        PatchInfo::patch_id(self)
    }
    fn slot_count(&self, kind: ElementKind) -> u16 {
        self.num(kind)
    }
    fn is_active(&self, kind: ElementKind, local: u16) -> bool {
        PatchInfo::is_active(self, kind, local)
    }
    fn is_owned(&self, kind: ElementKind, local: u16) -> bool {
        PatchInfo::is_owned(self, kind, local)
    }
    fn edge_vertices(&self, edge: u16) -> [u16; 2] {
        PatchInfo::edge_vertices(self, edge)
    }
    fn face_edges(&self, face: u16) -> [(u16, bool); 3] {
        PatchInfo::face_edges(self, face)
    }
}

/// Source-kind to target-kind relation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    VV,
    VE,
    VF,
    EV,
    EF,
    FV,
    FE,
    FF,
}

impl Op {
    pub fn from_kinds(source: ElementKind, target: ElementKind) -> Option<Op> {
        use ElementKind::*;
        Some(match (source, target) {
            (Vertex, Vertex) => Op::VV,
            (Vertex, Edge) => Op::VE,
            (Vertex, Face) => Op::VF,
            (Edge, Vertex) => Op::EV,
            (Edge, Face) => Op::EF,
            (Face, Vertex) => Op::FV,
            (Face, Edge) => Op::FE,
            (Face, Face) => Op::FF,
            (Edge, Edge) => return None,
        })
    }

    pub fn source(self) -> ElementKind {
        match self {
            Op::VV | Op::VE | Op::VF => ElementKind::Vertex,
            Op::EV | Op::EF => ElementKind::Edge,
            Op::FV | Op::FE | Op::FF => ElementKind::Face,
        }
    }

    pub fn target(self) -> ElementKind {
        match self {
            Op::VV | Op::EV | Op::FV => ElementKind::Vertex,
            Op::VE | Op::FE => ElementKind::Edge,
            Op::VF | Op::EF | Op::FF => ElementKind::Face,
        }
    }
}

/// A supported relation from `Self` elements to `T` elements. Edges have no
/// edge neighborhood, so `Edge: Relation<Edge>` does not hold:
///
/// ```compile_fail
/// use patch_cavity::prelude::*;
/// use patch_cavity::topology::handle::Edge;
/// use patch_cavity::topology::patch_info::PatchInfo;
///
/// fn edges_of_edges(q: &Query<'_, PatchInfo>, block: &Block) {
///     q.dispatch::<Edge, Edge, _>(block, |_, _| {});
/// }
/// ```
pub trait Relation<T: Kind>: Kind {
    const OP: Op;
}

macro_rules! relation {
    ($($source:ident => $target:ident: $op:ident),* $(,)?) => {
        $(impl Relation<$target> for $source {
            const OP: Op = Op::$op;
        })*
    };
}

relation! {
    Vertex => Vertex: VV,
    Vertex => Edge: VE,
    Vertex => Face: VF,
    Edge => Vertex: EV,
    Edge => Face: EF,
    Face => Vertex: FV,
    Face => Edge: FE,
    Face => Face: FF,
}

/// Neighbors of one element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbors<K: Kind> {
    items: Vec<Handle<K>>,
}

impl<K: Kind> Neighbors<K> {
    fn new(patch: u32, locals: &[u16]) -> Self {
        Self {
            items: locals.iter().map(|&l| Handle::new(patch, l)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<Handle<K>> {
        self.items.get(i).copied()
    }

    pub fn front(&self) -> Option<Handle<K>> {
        self.items.first().copied()
    }

    pub fn back(&self) -> Option<Handle<K>> {
        self.items.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Handle<K>> + '_ {
        self.items.iter().copied()
    }

    pub fn contains(&self, h: Handle<K>) -> bool {
        self.items.contains(&h)
    }
}

impl<K: Kind> Index<usize> for Neighbors<K> {
    type Output = Handle<K>;
    fn index(&self, i: usize) -> &Handle<K> {
        &self.items[i]
    }
}

pub struct Query<'a, P: PatchView + Sync + ?Sized> {
    view: &'a P,
}

impl<'a, P: PatchView + Sync + ?Sized> Query<'a, P> {
    pub fn new(view: &'a P) -> Self {
        Self { view }
    }

    /// For every owned, live `S` element, call `f` with its `T` neighbors.
    pub fn dispatch<S, T, F>(&self, block: &Block, f: F)
    where
        S: Relation<T>,
        T: Kind,
        F: Fn(Handle<S>, &Neighbors<T>) + Send + Sync,
    {
        let table = self.table(S::OP);
        let patch = self.view.patch_id();
        block.stride(table.len(), |i| {
            let local = i as u16;
            if !self.view.is_owned(S::KIND, local) {
                return;
            }
            let neighbors = Neighbors::<T>::new(patch, &table[i]);
            f(Handle::new(patch, local), &neighbors);
        });
    }

    /// The `op` neighborhood of every slot of the source kind; empty for
    /// inactive slots.
    pub fn table(&self, op: Op) -> Vec<Vec<u16>> {
        let v = self.view;
        let n_src = v.slot_count(op.source()) as usize;
        let mut out: Vec<Vec<u16>> = vec![Vec::new(); n_src];
        let edges = (0..v.slot_count(ElementKind::Edge))
            .filter(|&e| v.is_active(ElementKind::Edge, e));
        let faces = (0..v.slot_count(ElementKind::Face))
            .filter(|&f| v.is_active(ElementKind::Face, f));
        match op {
            Op::EV => {
                for e in edges {
                    out[e as usize].extend(v.edge_vertices(e));
                }
            }
            Op::FE => {
                for f in faces {
                    out[f as usize].extend(v.face_edges(f).map(|(e, _)| e));
                }
            }
            Op::FV => {
                for f in faces {
                    out[f as usize].extend(v.face_vertices(f));
                }
            }
            Op::VV => {
                for e in edges {
                    let [a, b] = v.edge_vertices(e);
                    out[a as usize].push(b);
                    out[b as usize].push(a);
                }
            }
            Op::VE => {
                for e in edges {
                    for x in v.edge_vertices(e) {
                        out[x as usize].push(e);
                    }
                }
            }
            Op::VF => {
                for f in faces {
                    for x in v.face_vertices(f) {
                        out[x as usize].push(f);
                    }
                }
            }
            Op::EF => {
                for f in faces {
                    for (e, _) in v.face_edges(f) {
                        out[e as usize].push(f);
                    }
                }
            }
            Op::FF => {
                let ef = self.table(Op::EF);
                for f in faces {
                    let mut adj = Vec::with_capacity(3);
                    for (e, _) in v.face_edges(f) {
                        adj.extend(ef[e as usize].iter().copied().filter(|&g| g != f));
                    }
                    out[f as usize] = adj;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::build::{Connectivity, build_patches};
    use crate::config::DynamicConfig;
    use itertools::Itertools;
    use parking_lot::Mutex;

    // two triangles sharing edge (1, 2)
    fn quad() -> PatchInfo {
        let conn = Connectivity::new(4, &[[0, 1, 2], [2, 1, 3]]).unwrap();
        let mut built = build_patches(&conn, None, &DynamicConfig::default()).unwrap();
        assert_eq!(built.patches.len(), 1);
        built.patches.remove(0)
    }

    fn sorted(mut v: Vec<u16>) -> Vec<u16> {
        v.sort_unstable();
        v
    }

    #[test]
    fn relation_kinds() {
        for op in [Op::VV, Op::VE, Op::VF, Op::EV, Op::EF, Op::FV, Op::FE, Op::FF] {
            assert_eq!(Op::from_kinds(op.source(), op.target()), Some(op));
        }
        assert_eq!(Op::from_kinds(ElementKind::Edge, ElementKind::Edge), None);
    }

    fn op_of<S: Relation<T>, T: Kind>() -> Op {
        S::OP
    }

    #[test]
    fn relations_name_their_kinds() {
        let ops = [
            op_of::<Vertex, Vertex>(),
            op_of::<Vertex, Edge>(),
            op_of::<Vertex, Face>(),
            op_of::<Edge, Vertex>(),
            op_of::<Edge, Face>(),
            op_of::<Face, Vertex>(),
            op_of::<Face, Edge>(),
            op_of::<Face, Face>(),
        ];
        assert_eq!(ops.iter().unique().count(), 8);
        assert_eq!(op_of::<Edge, Face>(), Op::EF);
        assert_eq!(
            (op_of::<Face, Edge>().source(), op_of::<Face, Edge>().target()),
            (ElementKind::Face, ElementKind::Edge)
        );
    }

    #[test]
    fn tables_of_a_quad() {
        let info = quad();
        let q = Query::new(&info);
        let ef = q.table(Op::EF);
        assert_eq!(ef.iter().filter(|fs| fs.len() == 2).count(), 1);
        assert_eq!(ef.iter().filter(|fs| fs.len() == 1).count(), 4);

        let ff = q.table(Op::FF);
        assert_eq!(ff, vec![vec![1], vec![0]]);

        let vv = q.table(Op::VV);
        let degrees = sorted(vv.iter().map(|n| n.len() as u16).collect());
        assert_eq!(degrees, vec![2, 2, 3, 3]);

        // face corners follow the stored edge loop
        for f in 0..2 {
            let fv = &q.table(Op::FV)[f as usize];
            assert_eq!(fv.as_slice(), info.face_vertices(f).as_slice());
        }
    }

    #[test]
    fn dispatch_visits_owned_elements() {
        let info = quad();
        let block = Block::new(2);
        let seen = Mutex::new(Vec::new());
        Query::new(&info).dispatch::<Face, Vertex, _>(&block, |f, vs| {
            assert_eq!(vs.len(), 3);
            assert_eq!(vs.front(), vs.get(0));
            assert_eq!(vs.back(), Some(vs[2]));
            seen.lock().push(f.local());
        });
        assert_eq!(sorted(seen.into_inner()), vec![0, 1]);

        let count = Mutex::new(0);
        Query::new(&info).dispatch::<Vertex, Edge, _>(&block, |v, es| {
            assert!(es.iter().all(|e| info.edge_vertices(e.local()).contains(&v.local())));
            *count.lock() += es.len();
        });
        assert_eq!(count.into_inner(), 10);
    }
}
