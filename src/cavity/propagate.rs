//! Cavity growth, conflict resolution and removal.
//!
//! Tags are lowered with `fetch_min`, so when two cavities reach the same
//! element the lower id keeps it and the higher id is deactivated. A cavity
//! whose seed lacks a complete neighborhood in this patch is deactivated up
//! front.

use super::{Cavity, CavityOp, OpKind};
use crate::block::Block;
use crate::topology::handle::{ElementKind, INVALID16, Kind};

impl<O: CavityOp> Cavity<'_, O> {
    #[inline]
    pub(super) fn deactivate(&self, cavity: u16) {
        self.active_cavity.reset(cavity as usize);
    }

    #[inline]
    fn mark(&self, kind: ElementKind, local: u16, cavity: u16) {
        let prev = self.s.min_tag(kind, local, cavity);
        if prev != INVALID16 && prev != cavity {
            self.deactivate(prev.max(cavity));
        }
    }

    /// Owned vertices and corners of owned faces.
    pub(super) fn mark_complete_vertices(&self, block: &Block) {
        let s = &self.s;
        block.stride(s.num(ElementKind::Vertex) as usize, |v| {
            if s.is_owned(ElementKind::Vertex, v as u16) {
                self.complete_v.set(v);
            }
        });
        block.stride(s.num(ElementKind::Face) as usize, |f| {
            if s.is_owned(ElementKind::Face, f as u16) {
                for x in s.face_vertices(f as u16) {
                    self.complete_v.set(x as usize);
                }
            }
        });
    }

    fn seed_is_usable(&self, local: u16) -> bool {
        let s = &self.s;
        let complete = |v: u16| self.complete_v.get(v as usize);
        match O::KIND {
            OpKind::V => s.is_active(ElementKind::Vertex, local) && complete(local),
            OpKind::E => {
                s.is_active(ElementKind::Edge, local)
                    && (s.is_owned(ElementKind::Edge, local)
                        || s.edge_vertices(local).into_iter().any(complete))
            }
            OpKind::EV => {
                s.is_active(ElementKind::Edge, local)
                    && s.edge_vertices(local).into_iter().all(complete)
            }
            OpKind::F => {
                s.is_active(ElementKind::Face, local)
                    && (s.is_owned(ElementKind::Face, local)
                        || s.face_vertices(local).into_iter().any(complete))
            }
        }
    }

    pub(super) fn check_seeds(&self, block: &Block) {
        let kind = O::Seed::KIND;
        block.stride(self.s.num(kind) as usize, |i| {
            let c = self.s.tag(kind, i as u16);
            if c != INVALID16 && !self.seed_is_usable(i as u16) {
                self.deactivate(c);
            }
        });
    }

    pub(super) fn propagate(&self, block: &Block) {
        match O::KIND {
            OpKind::V => {
                self.vertices_to_edges(block);
                block.sync();
                self.edges_to_faces(block);
            }
            OpKind::E => self.edges_to_faces(block),
            OpKind::EV => {
                self.edges_to_vertices(block);
                block.sync();
                self.vertices_to_edges(block);
                block.sync();
                self.edges_to_faces(block);
            }
            OpKind::F => {}
        }
    }

    fn vertices_to_edges(&self, block: &Block) {
        let s = &self.s;
        block.stride(s.num(ElementKind::Edge) as usize, |e| {
            let e = e as u16;
            if !s.is_active(ElementKind::Edge, e) {
                return;
            }
            for v in s.edge_vertices(e) {
                let c = s.tag(ElementKind::Vertex, v);
                if c != INVALID16 {
                    self.mark(ElementKind::Edge, e, c);
                }
            }
        });
    }

    fn edges_to_vertices(&self, block: &Block) {
        let s = &self.s;
        block.stride(s.num(ElementKind::Edge) as usize, |e| {
            let e = e as u16;
            let c = s.tag(ElementKind::Edge, e);
            if c == INVALID16 || !s.is_active(ElementKind::Edge, e) {
                return;
            }
            for v in s.edge_vertices(e) {
                self.mark(ElementKind::Vertex, v, c);
            }
        });
    }

    fn edges_to_faces(&self, block: &Block) {
        let s = &self.s;
        block.stride(s.num(ElementKind::Face) as usize, |f| {
            let f = f as u16;
            if !s.is_active(ElementKind::Face, f) {
                return;
            }
            for (e, _) in s.face_edges(f) {
                let c = s.tag(ElementKind::Edge, e);
                if c != INVALID16 {
                    self.mark(ElementKind::Face, f, c);
                }
            }
        });
    }

    /// Drop the tags of deactivated cavities.
    pub(super) fn clear_inactive_tags(&self, block: &Block) {
        for kind in ElementKind::ALL {
            block.stride(self.s.num(kind) as usize, |i| {
                let c = self.s.tag(kind, i as u16);
                if c != INVALID16 && !self.active_cavity.get(c as usize) {
                    self.s.set_tag(kind, i as u16, INVALID16);
                }
            });
        }
    }

    /// Remove every element still tagged.
    pub(super) fn remove_tagged(&self, block: &Block) {
        for kind in ElementKind::ALL {
            let k = kind.index();
            block.stride(self.s.num(kind) as usize, |i| {
                if self.s.tag(kind, i as u16) != INVALID16 {
                    self.s.active[k].reset(i);
                    self.s.deleted[k].set(i);
                }
            });
        }
    }
}
