//! Migration and ownership transfer.
//!
//! Let `B` be the corners of removed faces plus any removed vertex, and `R`
//! the faces with a corner in `B`. Before a cavity can be refilled, this
//! patch must
//!
//! * hold the full, current one-ring of every vertex in `B`,
//! * hold the one-ring of every other corner of a face in `R`,
//! * own every face in `R` together with its edges and corners.
//!
//! Owning every corner of `R` keeps the rule that the owner of a vertex holds
//! its current one-ring: no vertex outside this set has its ring changed by
//! the refill. Missing elements are copied from their owners. Ownership
//! changes are only recorded here and in the working copy; the previous
//! owners are updated when the pass commits, after their room for the new LP
//! entries has been checked.

use super::locks::LockSet;
use super::scratch::Scratch;
use super::{Cavity, CavityError, CavityOp};
use crate::block::Block;
use crate::topology::bitmask::Bitmask;
use crate::topology::handle::{ElementKind, INVALID16};
use crate::topology::ownership::{Hop, OwnerLookup, resolve_owner};
use hashbrown::HashMap;
use itertools::Itertools;

/// Slot `local` of this patch receives ownership from `(from_patch, from_local)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Transfer {
    pub(crate) kind: ElementKind,
    pub(crate) local: u16,
    pub(crate) from_patch: u32,
    pub(crate) from_local: u16,
    /// The element was removed by this pass.
    pub(crate) deleted: bool,
}

/// Slot `local` of this patch takes its attribute values from the owner at
/// `(src_patch, src_local)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Pull {
    pub(crate) kind: ElementKind,
    pub(crate) local: u16,
    pub(crate) src_patch: u32,
    pub(crate) src_local: u16,
}

/// Owner lookup that answers for the home patch from the working copy and
/// locks neighbors as the chain reaches them.
pub(crate) struct PassLookup<'r, 'a> {
    pub(crate) scratch: &'r Scratch,
    pub(crate) locks: &'r mut LockSet<'a>,
}

impl OwnerLookup for PassLookup<'_, '_> {
    fn hop(&mut self, patch: u32, kind: ElementKind, local: u16) -> Result<Hop, CavityError> {
        if patch == self.scratch.patch_id {
            Ok(self.scratch.hop(kind, local))
        } else {
            Ok(self.locks.get(patch)?.hop(kind, local))
        }
    }
}

/// Owner address of every present slot of the home patch, both ways.
#[derive(Default)]
struct CopyIndex {
    by_owner: HashMap<(ElementKind, u32, u16), u16>,
    owner_of: HashMap<(ElementKind, u16), (u32, u16)>,
}

impl CopyIndex {
    fn build(s: &Scratch, locks: &mut LockSet<'_>, max_hops: u32) -> Result<Self, CavityError> {
        let mut index = CopyIndex::default();
        let mut lookup = PassLookup { scratch: s, locks };
        for kind in ElementKind::ALL {
            for local in 0..s.num(kind) {
                if !s.is_present(kind, local) {
                    continue;
                }
                let owner = resolve_owner(&mut lookup, kind, s.patch_id, local, max_hops)?;
                index.insert(kind, local, owner);
            }
        }
        Ok(index)
    }

    fn insert(&mut self, kind: ElementKind, local: u16, owner: (u32, u16)) {
        self.by_owner.insert((kind, owner.0, owner.1), local);
        self.owner_of.insert((kind, local), owner);
    }

    fn local_of(&self, kind: ElementKind, owner: (u32, u16)) -> Option<u16> {
        self.by_owner.get(&(kind, owner.0, owner.1)).copied()
    }

    fn owner(&self, kind: ElementKind, local: u16) -> Option<(u32, u16)> {
        self.owner_of.get(&(kind, local)).copied()
    }
}

/// A face read out of a neighbor patch, in that patch's local ids.
struct RemoteFace {
    face: u16,
    edges: [(u16, bool, [u16; 2]); 3],
}

struct Migrator<'r, 'a> {
    s: &'r mut Scratch,
    locks: &'r mut LockSet<'a>,
    index: CopyIndex,
    max_hops: u32,
    transfers: Vec<Transfer>,
}

impl Migrator<'_, '_> {
    fn resolve(&mut self, kind: ElementKind, patch: u32, local: u16) -> Result<(u32, u16), CavityError> {
        let mut lookup = PassLookup {
            scratch: self.s,
            locks: self.locks,
        };
        resolve_owner(&mut lookup, kind, patch, local, self.max_hops)
    }

    /// This patch's slot for the element at `(patch, local)`, copying it in
    /// if absent. The flag is set when a new slot was made.
    fn localize(&mut self, kind: ElementKind, patch: u32, local: u16) -> Result<(u16, bool), CavityError> {
        let owner = self.resolve(kind, patch, local)?;
        if let Some(l) = self.index.local_of(kind, owner) {
            return Ok((l, false));
        }
        let l = self.s.claim_slot_growing(kind)?;
        self.s.insert_copy(kind, l, owner.0, owner.1)?;
        self.index.insert(kind, l, owner);
        Ok((l, true))
    }

    /// Copy every face around the vertex at `(owner, owner_local)` from its
    /// owner, with the faces' edges and corners.
    fn copy_one_ring(&mut self, vertex: u16) -> Result<(), CavityError> {
        let home = self.s.patch_id;
        let (q, qv) = self
            .index
            .owner(ElementKind::Vertex, vertex)
            .ok_or(CavityError::MissingCopy {
                kind: ElementKind::Vertex,
                patch: home,
                local: vertex,
            })?;
        if q == home {
            return Ok(());
        }
        let ring: Vec<RemoteFace> = {
            let info = self.locks.get(q)?;
            info.faces_around(qv)
                .into_iter()
                .map(|f| RemoteFace {
                    face: f,
                    edges: info
                        .face_edges(f)
                        .map(|(e, dir)| (e, dir, info.edge_vertices(e))),
                })
                .collect()
        };
        for rf in ring {
            let mut edges = [(INVALID16, false); 3];
            for (slot, &(qe, dir, [qa, qb])) in edges.iter_mut().zip(rf.edges.iter()) {
                let (a, _) = self.localize(ElementKind::Vertex, q, qa)?;
                let (b, _) = self.localize(ElementKind::Vertex, q, qb)?;
                let (e, fresh) = self.localize(ElementKind::Edge, q, qe)?;
                if fresh {
                    self.s.set_edge_vertices(e, [a, b]);
                }
                *slot = (e, dir);
            }
            let (f, fresh) = self.localize(ElementKind::Face, q, rf.face)?;
            if fresh {
                self.s.set_face_edges(f, edges);
            }
        }
        Ok(())
    }

    fn transfer(&mut self, kind: ElementKind, local: u16) -> Result<(), CavityError> {
        let (from_patch, from_local) = self.index.owner(kind, local).ok_or(CavityError::MissingCopy {
            kind,
            patch: self.s.patch_id,
            local,
        })?;
        let deleted = self.s.deleted[kind.index()].get(local as usize);
        self.transfers.push(Transfer {
            kind,
            local,
            from_patch,
            from_local,
            deleted,
        });
        Ok(())
    }

    /// Every previous owner needs a stash slot for this patch and room for
    /// one LP entry per element it keeps as a copy. Tables are grown here,
    /// their contents stay as they are.
    fn check_room(&mut self) -> Result<(), CavityError> {
        let home = self.s.patch_id;
        let mut needs: HashMap<u32, [usize; 3]> = HashMap::new();
        for t in self.transfers.iter().filter(|t| !t.deleted) {
            needs.entry(t.from_patch).or_default()[t.kind.index()] += 1;
        }
        for (patch, per_kind) in needs.into_iter().sorted_by_key(|(p, _)| *p) {
            let info = self.locks.get(patch)?;
            if !info.stash().has_room_for(home) {
                return Err(CavityError::StashOverflow { patch });
            }
            for kind in ElementKind::ALL {
                info.lp_mut(kind).reserve(per_kind[kind.index()]);
            }
        }
        Ok(())
    }
}

/// Non-complete corners of live faces touching `boundary`, outside it.
fn ribbon_vertices(s: &Scratch, boundary: &Bitmask, complete: &Bitmask) -> Vec<u16> {
    (0..s.num(ElementKind::Face))
        .filter(|&f| s.is_active(ElementKind::Face, f))
        .map(|f| s.face_vertices(f))
        .filter(|vs| vs.iter().any(|&v| boundary.get(v as usize)))
        .flat_map(|vs| vs.into_iter())
        .filter(|&v| !boundary.get(v as usize) && !complete.get(v as usize))
        .sorted_unstable()
        .dedup()
        .collect()
}

/// Faces with a corner in `boundary`, their edges and their corners, where
/// not owned yet.
fn transfer_candidates(s: &Scratch, boundary: &Bitmask) -> Vec<(ElementKind, u16)> {
    let touching: Vec<u16> = (0..s.num(ElementKind::Face))
        .filter(|&f| s.is_present(ElementKind::Face, f))
        .filter(|&f| s.face_vertices(f).iter().any(|&v| boundary.get(v as usize)))
        .collect();
    let faces = touching.iter().map(|&f| (ElementKind::Face, f));
    let edges = touching
        .iter()
        .flat_map(|&f| s.face_edges(f))
        .map(|(e, _)| (ElementKind::Edge, e));
    let vertices = touching
        .iter()
        .flat_map(|&f| s.face_vertices(f))
        .map(|v| (ElementKind::Vertex, v));
    vertices
        .chain(edges)
        .chain(faces)
        .filter(|&(kind, l)| !s.owned[kind.index()].get(l as usize))
        .sorted_unstable()
        .dedup()
        .collect()
}

/// Extend vertex masks to the vertex capacity, which copies made by
/// migration may have raised.
fn fit_vertex_masks(s: &Scratch, masks: [&mut Bitmask; 2]) {
    let len = s.capacity[ElementKind::Vertex.index()] as usize;
    for mask in masks {
        if mask.len() < len {
            *mask = mask.resized(len);
        }
    }
}

impl<O: CavityOp> Cavity<'_, O> {
    /// Corners of removed faces and removed vertices.
    fn boundary_vertices(&self, block: &Block) -> Bitmask {
        let s = &self.s;
        let boundary = Bitmask::new(s.capacity[ElementKind::Vertex.index()] as usize);
        block.stride(s.num(ElementKind::Face) as usize, |f| {
            if s.tag(ElementKind::Face, f as u16) != INVALID16 {
                for v in s.face_vertices(f as u16) {
                    boundary.set(v as usize);
                }
            }
        });
        block.stride(s.num(ElementKind::Vertex) as usize, |v| {
            if s.tag(ElementKind::Vertex, v as u16) != INVALID16 {
                boundary.set(v);
            }
        });
        block.sync();
        boundary
    }

    pub(super) fn migrate(&mut self, block: &Block) -> Result<(), CavityError> {
        let mut boundary = self.boundary_vertices(block);
        let incomplete: Vec<u16> = boundary
            .iter_ones()
            .filter(|&v| !self.complete_v.get(v))
            .map(|v| v as u16)
            .collect();
        // built even when nothing moves, it also feeds the pulls
        let index = CopyIndex::build(&self.s, &mut self.locks, self.max_owner_hops)?;
        let mut m = Migrator {
            s: &mut self.s,
            locks: &mut self.locks,
            index,
            max_hops: self.max_owner_hops,
            transfers: Vec::new(),
        };
        for v in incomplete {
            m.copy_one_ring(v)?;
            self.complete_v.set(v as usize);
        }
        fit_vertex_masks(m.s, [&mut boundary, &mut self.complete_v]);
        // every face around B is present now
        for v in ribbon_vertices(m.s, &boundary, &self.complete_v) {
            m.copy_one_ring(v)?;
            self.complete_v.set(v as usize);
        }
        fit_vertex_masks(m.s, [&mut boundary, &mut self.complete_v]);
        for (kind, local) in transfer_candidates(m.s, &boundary) {
            m.transfer(kind, local)?;
        }
        m.check_room()?;
        for t in &m.transfers {
            m.s.take_ownership(t.kind, t.local);
        }

        // every slot not owned before this pass takes its values from the
        // previous owner
        let home = m.s.patch_id;
        self.pulls = m
            .index
            .owner_of
            .iter()
            .filter(|(_, owner)| owner.0 != home)
            .map(|(&(kind, local), &(src_patch, src_local))| Pull {
                kind,
                local,
                src_patch,
                src_local,
            })
            .collect();
        self.transfers = m.transfers;
        Ok(())
    }
}
