//! Refilling cavities and carrying attributes across migration.

use super::{Cavity, CavityError, CavityOp, State};
use crate::attribute::Attribute;
use crate::block::Block;
use crate::topology::handle::{
    DEdgeHandle, EdgeHandle, ElementKind, FaceHandle, Handle, Kind, VertexHandle,
};
use itertools::Itertools;
use std::sync::atomic::Ordering;

impl<O: CavityOp> Cavity<'_, O> {
    /// Run `f(cavity, size)` for every live cavity, in parallel.
    ///
    /// Stops at the first error, which is returned.
    pub fn for_each_cavity<F>(&self, block: &Block, f: F) -> Result<(), CavityError>
    where
        F: Fn(u16, u16) -> Result<(), CavityError> + Send + Sync,
    {
        debug_assert_eq!(self.state, State::Processed);
        let n = self.num_cavities() as usize;
        block
            .map(n, |c| {
                let c = c as u16;
                if self.is_live(c) {
                    f(c, self.cavity_size(c))
                } else {
                    Ok(())
                }
            })
            .into_iter()
            .collect()
    }

    /// Number of edges on the boundary loop of `cavity`.
    pub fn cavity_size(&self, cavity: u16) -> u16 {
        let c = cavity as usize;
        if c + 1 >= self.loop_offsets.len() {
            return 0;
        }
        (self.loop_offsets[c + 1] - self.loop_offsets[c]) as u16
    }

    fn loop_word(&self, cavity: u16, i: u16) -> u16 {
        debug_assert!(i < self.cavity_size(cavity));
        self.loop_edges[self.loop_offsets[cavity as usize] as usize + i as usize]
    }

    /// Edge `i` of the boundary loop, oriented along the loop.
    pub fn get_cavity_edge(&self, cavity: u16, i: u16) -> DEdgeHandle {
        DEdgeHandle::from_packed(self.s.patch_id, self.loop_word(cavity, i))
    }

    /// Vertex `i` of the boundary loop, the source of edge `i`.
    pub fn get_cavity_vertex(&self, cavity: u16, i: u16) -> VertexHandle {
        let e = self.get_cavity_edge(cavity, i);
        let [a, b] = self.s.edge_vertices(e.edge().local());
        Handle::new(self.s.patch_id, if e.dir() { b } else { a })
    }

    /// Make sure `additional` more elements of `kind` fit in this patch,
    /// growing its capacity if needed. `process` already leaves room for one
    /// new vertex per cavity and one new edge and face per boundary edge; a
    /// refill that needs more calls this before [`Cavity::for_each_cavity`].
    pub fn reserve(&mut self, kind: ElementKind, additional: usize) -> Result<(), CavityError> {
        if !self.s.reserve(kind, additional) {
            return Err(CavityError::CapacityExhausted {
                patch: self.s.patch_id,
                kind,
            });
        }
        self.fit_complete_v();
        Ok(())
    }

    pub(super) fn reserve_refill(&mut self) {
        let live: Vec<u16> = self.live_cavities().collect();
        let ring: usize = live.iter().map(|&c| self.cavity_size(c) as usize).sum();
        for (kind, n) in ElementKind::ALL.into_iter().zip([live.len(), ring, ring]) {
            // a shortfall shows up as an error from the add that runs out
            self.s.reserve(kind, n);
        }
        self.fit_complete_v();
    }

    fn fit_complete_v(&mut self) {
        let len = self.s.capacity[ElementKind::Vertex.index()] as usize;
        if self.complete_v.len() < len {
            self.complete_v = self.complete_v.resized(len);
        }
    }

    fn add_element(&self, kind: ElementKind, cavity: u16) -> Result<u16, CavityError> {
        let k = kind.index();
        let local = self.s.claim_slot(kind, Some(cavity))?;
        self.s.active[k].set(local as usize);
        self.s.owned[k].set(local as usize);
        self.added[k].fetch_add(1, Ordering::AcqRel);
        Ok(local)
    }

    pub fn add_vertex(&self, cavity: u16) -> Result<VertexHandle, CavityError> {
        let local = self.add_element(ElementKind::Vertex, cavity)?;
        Ok(Handle::new(self.s.patch_id, local))
    }

    /// Add the edge `v0 -> v1`. The returned handle walks it in that
    /// direction.
    pub fn add_edge(
        &self,
        cavity: u16,
        v0: VertexHandle,
        v1: VertexHandle,
    ) -> Result<DEdgeHandle, CavityError> {
        debug_assert!(v0.patch() == self.s.patch_id && v1.patch() == self.s.patch_id);
        let local = self.add_element(ElementKind::Edge, cavity)?;
        self.s.set_edge_vertices(local, [v0.local(), v1.local()]);
        Ok(DEdgeHandle::new(Handle::new(self.s.patch_id, local), false))
    }

    /// Add a face bounded by three oriented edges, in order.
    pub fn add_face(
        &self,
        cavity: u16,
        e0: DEdgeHandle,
        e1: DEdgeHandle,
        e2: DEdgeHandle,
    ) -> Result<FaceHandle, CavityError> {
        let local = self.add_element(ElementKind::Face, cavity)?;
        let word = |e: DEdgeHandle| {
            let h: EdgeHandle = e.edge();
            debug_assert_eq!(h.patch(), self.s.patch_id);
            (h.local(), e.dir())
        };
        self.s.set_face_edges(local, [word(e0), word(e1), word(e2)]);
        Ok(Handle::new(self.s.patch_id, local))
    }

    /// Copy `attr` values from their owners into every slot of this patch
    /// that was not owned here when the pass started: copies, new copies and
    /// elements taken over.
    ///
    /// Call after [`Cavity::process`] and before [`Cavity::commit`]. A refill
    /// that reads `attr` on the cavity boundary should call this first.
    pub fn update_attributes<K, T>(&self, block: &Block, attr: &Attribute<K, T>)
    where
        K: Kind,
        T: Clone + Send + Sync,
    {
        let kind = K::KIND;
        let home = self.s.patch_id;
        let groups: Vec<(u32, Vec<(u16, u16)>)> = self
            .pulls
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| (p.src_patch, (p.local, p.src_local)))
            .into_group_map()
            .into_iter()
            .collect();
        let values: Vec<Vec<(u16, T)>> = block.map(groups.len(), |g| {
            let (src, pairs) = &groups[g];
            let data = attr.patch(*src);
            pairs
                .iter()
                .map(|&(dst, from)| {
                    let value = data.get(from as usize).unwrap_or(attr.default_value());
                    (dst, value.clone())
                })
                .collect()
        });
        let mut dst = attr.patch_mut(home);
        let len = self.s.capacity[kind.index()] as usize;
        if dst.len() < len {
            dst.resize(len, attr.default_value().clone());
        }
        for (local, value) in values.into_iter().flatten() {
            dst[local as usize] = value;
        }
    }
}
