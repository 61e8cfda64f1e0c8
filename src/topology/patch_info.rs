//! Per-patch topology record.
//!
//! A `PatchInfo` holds everything a patch knows: how many slots of each kind
//! it uses and may use, the `EV`/`FE` connectivity in local ids, which slots
//! are live (`active`) and which live slots it owns (`owned`), and for every
//! non-owned live slot an [`LPPair`] naming the owner.
//!
//! A slot is in exactly one of three states:
//!
//! | active | owned | LP entry | state |
//! |--------|-------|----------|-------|
//! | no     | no    | no       | free  |
//! | yes    | yes   | no       | owned |
//! | yes    | no    | yes      | copy  |

use crate::cavity::CavityError;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshError;
use crate::topology::bitmask::Bitmask;
use crate::topology::handle::{
    ElementKind, INVALID16, MAX_PATCH_CAPACITY, pack_edge_dir, unpack_edge_dir,
};
use crate::topology::lp_hash::{LPHashTable, LPPair};
use crate::topology::ownership::Hop;
use crate::topology::patch_stash::PatchStash;

/// Capacity a patch grows to from `current` when it must hold `needed`
/// slots: at least half again as many, never past [`MAX_PATCH_CAPACITY`].
/// `None` when `needed` itself is past the limit.
pub(crate) fn grown_capacity(current: u16, needed: usize) -> Option<u16> {
    let limit = MAX_PATCH_CAPACITY as usize;
    if needed > limit {
        return None;
    }
    let current = current as usize;
    Some(needed.max(current + current / 2 + 1).min(limit) as u16)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchInfo {
    pub(crate) patch_id: u32,
    pub(crate) num: [u16; 3],
    pub(crate) capacity: [u16; 3],
    /// Two vertex ids per edge slot.
    pub(crate) ev: Vec<u16>,
    /// Three packed `edge << 1 | dir` words per face slot.
    pub(crate) fe: Vec<u16>,
    pub(crate) active: [Bitmask; 3],
    pub(crate) owned: [Bitmask; 3],
    pub(crate) lp: [LPHashTable; 3],
    pub(crate) stash: PatchStash,
}

impl PatchInfo {
    /// An empty patch with the given per-kind capacities.
    pub fn new(patch_id: u32, capacity: [u16; 3], lp_load_factor: f32) -> Self {
        Self {
            patch_id,
            num: [0; 3],
            capacity,
            ev: vec![INVALID16; 2 * capacity[ElementKind::Edge.index()] as usize],
            fe: vec![INVALID16; 3 * capacity[ElementKind::Face.index()] as usize],
            active: capacity.map(|c| Bitmask::new(c as usize)),
            owned: capacity.map(|c| Bitmask::new(c as usize)),
            lp: capacity.map(|c| LPHashTable::with_capacity(c as usize, lp_load_factor)),
            stash: PatchStash::default(),
        }
    }

    #[inline]
    pub fn patch_id(&self) -> u32 {
        self.patch_id
    }

    /// Number of slots in use (live or freed) for `kind`.
    #[inline]
    pub fn num(&self, kind: ElementKind) -> u16 {
        self.num[kind.index()]
    }

    #[inline]
    pub fn capacity(&self, kind: ElementKind) -> u16 {
        self.capacity[kind.index()]
    }

    #[inline]
    pub fn active(&self, kind: ElementKind) -> &Bitmask {
        &self.active[kind.index()]
    }

    #[inline]
    pub fn owned(&self, kind: ElementKind) -> &Bitmask {
        &self.owned[kind.index()]
    }

    #[inline]
    pub fn lp(&self, kind: ElementKind) -> &LPHashTable {
        &self.lp[kind.index()]
    }

    #[inline]
    pub fn lp_mut(&mut self, kind: ElementKind) -> &mut LPHashTable {
        &mut self.lp[kind.index()]
    }

    #[inline]
    pub fn stash(&self) -> &PatchStash {
        &self.stash
    }

    #[inline]
    pub fn stash_mut(&mut self) -> &mut PatchStash {
        &mut self.stash
    }

    #[inline]
    pub fn is_active(&self, kind: ElementKind, local: u16) -> bool {
        local < self.num(kind) && self.active(kind).get(local as usize)
    }

    #[inline]
    pub fn is_owned(&self, kind: ElementKind, local: u16) -> bool {
        self.is_active(kind, local) && self.owned(kind).get(local as usize)
    }

    /// Live slots this patch owns.
    pub fn num_owned(&self, kind: ElementKind) -> usize {
        (0..self.num(kind))
            .filter(|&i| self.is_owned(kind, i))
            .count()
    }

    #[inline]
    pub fn edge_vertices(&self, edge: u16) -> [u16; 2] {
        let e = edge as usize;
        [self.ev[2 * e], self.ev[2 * e + 1]]
    }

    #[inline]
    pub fn face_edges(&self, face: u16) -> [(u16, bool); 3] {
        let f = face as usize;
        [0, 1, 2].map(|i| unpack_edge_dir(self.fe[3 * f + i]))
    }

    /// Corners of `face` in traversal order.
    pub fn face_vertices(&self, face: u16) -> [u16; 3] {
        self.face_edges(face).map(|(e, dir)| {
            let [a, b] = self.edge_vertices(e);
            if dir { b } else { a }
        })
    }

    /// One step of owner resolution from slot `local`.
    pub fn hop(&self, kind: ElementKind, local: u16) -> Hop {
        if !self.is_active(kind, local) {
            return Hop::Missing;
        }
        if self.owned(kind).get(local as usize) {
            return Hop::Owned;
        }
        match self.lp(kind).find(local) {
            Some(pair) => match self.stash.get(pair.stash()) {
                Some(patch) => Hop::Forward(patch, pair.owner_local()),
                None => Hop::Missing,
            },
            None => Hop::Missing,
        }
    }

    /// Free slot `local`: clear its bits and drop any LP entry.
    pub(crate) fn free_slot(&mut self, kind: ElementKind, local: u16) {
        self.active[kind.index()].reset(local as usize);
        self.owned[kind.index()].reset(local as usize);
        self.lp[kind.index()].remove(local);
    }

    pub(crate) fn set_edge_vertices(&mut self, edge: u16, vertices: [u16; 2]) {
        let e = edge as usize;
        self.ev[2 * e..2 * e + 2].copy_from_slice(&vertices);
    }

    pub(crate) fn set_face_edges(&mut self, face: u16, edges: [(u16, bool); 3]) {
        let f = face as usize;
        for (i, (e, dir)) in edges.into_iter().enumerate() {
            self.fe[3 * f + i] = pack_edge_dir(e, dir);
        }
    }

    /// Raise the slot capacity of `kind` to `capacity`. Local ids are kept.
    pub(crate) fn grow(&mut self, kind: ElementKind, capacity: u16) {
        let k = kind.index();
        if capacity <= self.capacity[k] {
            return;
        }
        match kind {
            ElementKind::Vertex => {}
            ElementKind::Edge => self.ev.resize(2 * capacity as usize, INVALID16),
            ElementKind::Face => self.fe.resize(3 * capacity as usize, INVALID16),
        }
        self.active[k] = self.active[k].resized(capacity as usize);
        self.owned[k] = self.owned[k].resized(capacity as usize);
        let copies = self.lp[k].len();
        self.lp[k].reserve((capacity as usize).saturating_sub(copies));
        self.capacity[k] = capacity;
    }

    /// A free slot of `kind`, extending the count if none is left below it
    /// and growing the capacity when the count is at it.
    pub(crate) fn claim_slot(&mut self, kind: ElementKind) -> Option<u16> {
        let k = kind.index();
        let free = (0..self.num[k]).find(|&l| {
            !self.active[k].get(l as usize)
                && !self.owned[k].get(l as usize)
                && self.lp[k].find(l).is_none()
        });
        if free.is_some() {
            return free;
        }
        if self.num[k] >= self.capacity[k] {
            let capacity = grown_capacity(self.capacity[k], self.num[k] as usize + 1)?;
            self.grow(kind, capacity);
        }
        self.num[k] += 1;
        Some(self.num[k] - 1)
    }

    /// Make `local` a live copy of `(owner_patch, owner_local)`.
    pub(crate) fn insert_copy(
        &mut self,
        kind: ElementKind,
        local: u16,
        owner_patch: u32,
        owner_local: u16,
    ) -> Result<(), CavityError> {
        let patch = self.patch_id;
        let stash = self
            .stash
            .insert_patch(owner_patch)
            .ok_or(CavityError::StashOverflow { patch })?;
        self.lp[kind.index()]
            .insert(LPPair::new(local, owner_local, stash))
            .map_err(|_| CavityError::HashTableFull { patch, kind })?;
        self.owned[kind.index()].reset(local as usize);
        self.active[kind.index()].set(local as usize);
        Ok(())
    }

    /// Live faces of this patch with `vertex` as a corner.
    pub fn faces_around(&self, vertex: u16) -> Vec<u16> {
        (0..self.num(ElementKind::Face))
            .filter(|&f| self.is_active(ElementKind::Face, f))
            .filter(|&f| self.face_vertices(f).contains(&vertex))
            .collect()
    }
}

impl DebugInvariants for PatchInfo {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "PatchInfo");
    }

    /// Checks that only need this patch: slot states, counts and that live
    /// connectivity only names live slots.
    fn validate_invariants(&self) -> Result<(), MeshError> {
        let patch = self.patch_id;
        for kind in ElementKind::ALL {
            if self.num(kind) > self.capacity(kind) {
                return Err(MeshError::CountExceedsCapacity {
                    patch,
                    kind,
                    count: self.num(kind),
                    capacity: self.capacity(kind),
                });
            }
            for local in 0..self.capacity(kind) {
                let active = self.active(kind).get(local as usize);
                let owned = self.owned(kind).get(local as usize);
                let entry = self.lp(kind).find(local).is_some();
                let consistent = match (active, owned, entry) {
                    (false, false, false) | (true, true, false) => true,
                    (true, false, true) => true,
                    _ => false,
                };
                if !consistent || (active && local >= self.num(kind)) {
                    return Err(MeshError::SlotStateMismatch {
                        patch,
                        kind,
                        local,
                    });
                }
            }
            for pair in self.lp(kind).iter() {
                if self.stash.get(pair.stash()).is_none() {
                    return Err(MeshError::SlotStateMismatch {
                        patch,
                        kind,
                        local: pair.local(),
                    });
                }
            }
        }
        for e in 0..self.num(ElementKind::Edge) {
            if !self.is_active(ElementKind::Edge, e) {
                continue;
            }
            for v in self.edge_vertices(e) {
                if !self.is_active(ElementKind::Vertex, v) {
                    return Err(MeshError::DanglingReference {
                        patch,
                        kind: ElementKind::Edge,
                        local: e,
                    });
                }
            }
        }
        for f in 0..self.num(ElementKind::Face) {
            if !self.is_active(ElementKind::Face, f) {
                continue;
            }
            let edges = self.face_edges(f);
            if edges.iter().any(|&(e, _)| !self.is_active(ElementKind::Edge, e)) {
                return Err(MeshError::DanglingReference {
                    patch,
                    kind: ElementKind::Face,
                    local: f,
                });
            }
            // consecutive oriented edges must chain
            let corners = self.face_vertices(f);
            for (i, &(e, dir)) in edges.iter().enumerate() {
                let [a, b] = self.edge_vertices(e);
                let head = if dir { a } else { b };
                if head != corners[(i + 1) % 3] {
                    return Err(MeshError::BrokenFace { patch, local: f });
                }
            }
        }
        Ok(())
    }
}
