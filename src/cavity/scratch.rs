//! Working copy of one patch.
//!
//! Every phase of a cavity pass reads and writes this copy only; the
//! committed [`PatchInfo`] is overwritten from it when the pass commits.
//! Connectivity words and counts are atomics so that stride-loop iterations
//! and refill callbacks can update them concurrently.

use crate::cavity::CavityError;
use crate::topology::bitmask::Bitmask;
use crate::topology::handle::{ElementKind, INVALID16, pack_edge_dir, unpack_edge_dir};
use crate::topology::lp_hash::{LPHashTable, LPPair};
use crate::topology::ownership::Hop;
use crate::topology::patch_info::{PatchInfo, grown_capacity};
use crate::topology::patch_stash::PatchStash;
use std::sync::atomic::{AtomicU16, Ordering};

fn atomic_vec(words: &[u16]) -> Box<[AtomicU16]> {
    words.iter().map(|&w| AtomicU16::new(w)).collect()
}

pub(crate) struct Scratch {
    pub(crate) patch_id: u32,
    pub(crate) num: [AtomicU16; 3],
    pub(crate) capacity: [u16; 3],
    pub(crate) ev: Box<[AtomicU16]>,
    pub(crate) fe: Box<[AtomicU16]>,
    pub(crate) active: [Bitmask; 3],
    pub(crate) owned: [Bitmask; 3],
    pub(crate) lp: [LPHashTable; 3],
    pub(crate) stash: PatchStash,
    /// Cavity id of each slot, `INVALID16` when untagged.
    pub(crate) tag: [Box<[AtomicU16]>; 3],
    /// Slots removed by this pass.
    pub(crate) deleted: [Bitmask; 3],
    /// Slots handed out to new elements during this pass.
    pub(crate) claimed: [Bitmask; 3],
}

impl Scratch {
    pub(crate) fn load(info: &PatchInfo) -> Self {
        let capacity = info.capacity;
        Self {
            patch_id: info.patch_id,
            num: info.num.map(AtomicU16::new),
            capacity,
            ev: atomic_vec(&info.ev),
            fe: atomic_vec(&info.fe),
            active: info.active.clone(),
            owned: info.owned.clone(),
            lp: info.lp.clone(),
            stash: info.stash.clone(),
            tag: capacity.map(|c| (0..c).map(|_| AtomicU16::new(INVALID16)).collect()),
            deleted: capacity.map(|c| Bitmask::new(c as usize)),
            claimed: capacity.map(|c| Bitmask::new(c as usize)),
        }
    }

    /// Write the working copy back into `info`.
    pub(crate) fn store(&self, info: &mut PatchInfo) {
        for kind in ElementKind::ALL {
            info.grow(kind, self.capacity[kind.index()]);
        }
        info.num = [0, 1, 2].map(|k| self.num[k].load(Ordering::Acquire));
        for (dst, src) in info.ev.iter_mut().zip(self.ev.iter()) {
            *dst = src.load(Ordering::Acquire);
        }
        for (dst, src) in info.fe.iter_mut().zip(self.fe.iter()) {
            *dst = src.load(Ordering::Acquire);
        }
        for k in 0..3 {
            info.active[k].copy_from(&self.active[k]);
            info.owned[k].copy_from(&self.owned[k]);
        }
        info.lp = self.lp.clone();
        info.stash = self.stash.clone();
    }

    #[inline]
    pub(crate) fn num(&self, kind: ElementKind) -> u16 {
        self.num[kind.index()].load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn is_active(&self, kind: ElementKind, local: u16) -> bool {
        local < self.num(kind) && self.active[kind.index()].get(local as usize)
    }

    #[inline]
    pub(crate) fn is_owned(&self, kind: ElementKind, local: u16) -> bool {
        self.is_active(kind, local) && self.owned[kind.index()].get(local as usize)
    }

    /// Live, or removed by this pass.
    #[inline]
    pub(crate) fn is_present(&self, kind: ElementKind, local: u16) -> bool {
        local < self.num(kind)
            && (self.active[kind.index()].get(local as usize)
                || self.deleted[kind.index()].get(local as usize))
    }

    #[inline]
    pub(crate) fn tag(&self, kind: ElementKind, local: u16) -> u16 {
        self.tag[kind.index()][local as usize].load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_tag(&self, kind: ElementKind, local: u16, cavity: u16) {
        self.tag[kind.index()][local as usize].store(cavity, Ordering::Release);
    }

    /// Lower the tag of a slot to `cavity`; returns the previous tag.
    #[inline]
    pub(crate) fn min_tag(&self, kind: ElementKind, local: u16, cavity: u16) -> u16 {
        self.tag[kind.index()][local as usize].fetch_min(cavity, Ordering::AcqRel)
    }

    #[inline]
    pub(crate) fn edge_vertices(&self, edge: u16) -> [u16; 2] {
        let e = edge as usize;
        [
            self.ev[2 * e].load(Ordering::Acquire),
            self.ev[2 * e + 1].load(Ordering::Acquire),
        ]
    }

    #[inline]
    pub(crate) fn set_edge_vertices(&self, edge: u16, vertices: [u16; 2]) {
        let e = edge as usize;
        self.ev[2 * e].store(vertices[0], Ordering::Release);
        self.ev[2 * e + 1].store(vertices[1], Ordering::Release);
    }

    #[inline]
    pub(crate) fn face_edges(&self, face: u16) -> [(u16, bool); 3] {
        let f = face as usize;
        [0, 1, 2].map(|i| unpack_edge_dir(self.fe[3 * f + i].load(Ordering::Acquire)))
    }

    #[inline]
    pub(crate) fn set_face_edges(&self, face: u16, edges: [(u16, bool); 3]) {
        let f = face as usize;
        for (i, (e, dir)) in edges.into_iter().enumerate() {
            self.fe[3 * f + i].store(pack_edge_dir(e, dir), Ordering::Release);
        }
    }

    pub(crate) fn face_vertices(&self, face: u16) -> [u16; 3] {
        self.face_edges(face).map(|(e, dir)| {
            let [a, b] = self.edge_vertices(e);
            if dir { b } else { a }
        })
    }

    /// One step of owner resolution; slots removed by this pass still
    /// resolve.
    pub(crate) fn hop(&self, kind: ElementKind, local: u16) -> Hop {
        if !self.is_present(kind, local) {
            return Hop::Missing;
        }
        if self.owned[kind.index()].get(local as usize) {
            return Hop::Owned;
        }
        match self.lp[kind.index()].find(local) {
            Some(pair) => match self.stash.get(pair.stash()) {
                Some(patch) => Hop::Forward(patch, pair.owner_local()),
                None => Hop::Missing,
            },
            None => Hop::Missing,
        }
    }

    /// Hand out a slot for a new element of `kind`.
    ///
    /// Tries, in order: a slot removed by `cavity`, a free slot, a slot past
    /// the current count. Safe to call concurrently.
    pub(crate) fn claim_slot(
        &self,
        kind: ElementKind,
        cavity: Option<u16>,
    ) -> Result<u16, CavityError> {
        let k = kind.index();
        let n = self.num(kind);
        if let Some(c) = cavity {
            for i in 0..n {
                if self.deleted[k].get(i as usize)
                    && self.tag(kind, i) == c
                    && self.claimed[k].try_set(i as usize)
                {
                    return Ok(i);
                }
            }
        }
        for i in 0..n {
            let slot = i as usize;
            if !self.active[k].get(slot)
                && !self.deleted[k].get(slot)
                && !self.owned[k].get(slot)
                && self.claimed[k].try_set(slot)
            {
                return Ok(i);
            }
        }
        let capacity = self.capacity[k];
        let fresh = self.num[k]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|_| CavityError::CapacityExhausted {
                patch: self.patch_id,
                kind,
            })?;
        self.claimed[k].set(fresh as usize);
        Ok(fresh)
    }

    /// [`Scratch::claim_slot`] for phases with exclusive access, growing the
    /// capacity instead of failing while the limit allows.
    pub(crate) fn claim_slot_growing(&mut self, kind: ElementKind) -> Result<u16, CavityError> {
        let claimed = self.claim_slot(kind, None);
        if matches!(claimed, Err(CavityError::CapacityExhausted { .. })) && self.reserve(kind, 1) {
            return self.claim_slot(kind, None);
        }
        claimed
    }

    /// Slots of `kind` a new element can take without growing.
    pub(crate) fn available(&self, kind: ElementKind) -> usize {
        let k = kind.index();
        let n = self.num(kind);
        let below = (0..n as usize)
            .filter(|&i| {
                !self.active[k].get(i)
                    && !self.deleted[k].get(i)
                    && !self.owned[k].get(i)
                    && !self.claimed[k].get(i)
            })
            .count();
        below + (self.capacity[k] - n) as usize
    }

    /// Grow `kind` so that `additional` more elements fit. Returns `false`
    /// when that would pass [`MAX_PATCH_CAPACITY`].
    ///
    /// [`MAX_PATCH_CAPACITY`]: crate::topology::handle::MAX_PATCH_CAPACITY
    pub(crate) fn reserve(&mut self, kind: ElementKind, additional: usize) -> bool {
        let available = self.available(kind);
        if available >= additional {
            return true;
        }
        let k = kind.index();
        let needed = self.capacity[k] as usize + additional - available;
        match grown_capacity(self.capacity[k], needed) {
            Some(capacity) => {
                self.grow(kind, capacity);
                true
            }
            None => false,
        }
    }

    /// Raise the slot capacity of `kind` to `capacity`. Local ids are kept.
    pub(crate) fn grow(&mut self, kind: ElementKind, capacity: u16) {
        let k = kind.index();
        let old = self.capacity[k];
        if capacity <= old {
            return;
        }
        let extend = |words: &mut Box<[AtomicU16]>, len: usize| {
            let mut v = std::mem::take(words).into_vec();
            v.resize_with(len, || AtomicU16::new(INVALID16));
            *words = v.into_boxed_slice();
        };
        match kind {
            ElementKind::Vertex => {}
            ElementKind::Edge => extend(&mut self.ev, 2 * capacity as usize),
            ElementKind::Face => extend(&mut self.fe, 3 * capacity as usize),
        }
        extend(&mut self.tag[k], capacity as usize);
        let len = capacity as usize;
        self.active[k] = self.active[k].resized(len);
        self.owned[k] = self.owned[k].resized(len);
        self.deleted[k] = self.deleted[k].resized(len);
        self.claimed[k] = self.claimed[k].resized(len);
        let copies = self.lp[k].len();
        self.lp[k].reserve(len.saturating_sub(copies));
        self.capacity[k] = capacity;
        log::trace!(
            "patch {}: {} capacity {} -> {}",
            self.patch_id,
            kind,
            old,
            capacity
        );
    }

    /// Register `local` as a copy of `(owner_patch, owner_local)`.
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

    /// Make `local` an owned slot of this patch.
    pub(crate) fn take_ownership(&mut self, kind: ElementKind, local: u16) {
        self.lp[kind.index()].remove(local);
        self.owned[kind.index()].set(local as usize);
    }
}
