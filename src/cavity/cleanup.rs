//! Commit: publish the working copy and fix up the neighbors.

use super::{Cavity, CavityError, CavityOp, State};
use crate::block::Block;
use crate::debug_invariants::DebugInvariants;
use crate::topology::handle::ElementKind;
use crate::topology::lp_hash::LPPair;
use crate::topology::patch_info::PatchInfo;
use hashbrown::HashSet;
use std::sync::atomic::Ordering;

/// What one committed pass changed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Live cavities refilled.
    pub cavities: u32,
    /// Slots filled by refill, per kind.
    pub added: [u32; 3],
    /// Elements removed, per kind.
    pub deleted: [u32; 3],
}

impl CommitSummary {
    /// Net change of the global counts.
    pub fn delta(&self) -> [i64; 3] {
        [0, 1, 2].map(|k| self.added[k] as i64 - self.deleted[k] as i64)
    }
}

/// Free every copy in `info` whose LP entry points straight at an element in
/// `dead`, then every copy left hanging off a freed one.
fn drop_dead_copies(info: &mut PatchInfo, dead: &HashSet<(ElementKind, u32, u16)>) {
    for kind in ElementKind::ALL {
        let doomed: Vec<u16> = info
            .lp(kind)
            .iter()
            .filter(|pair| {
                info.stash()
                    .get(pair.stash())
                    .is_some_and(|p| dead.contains(&(kind, p, pair.owner_local())))
            })
            .map(|pair| pair.local())
            .collect();
        for local in doomed {
            info.free_slot(kind, local);
        }
    }
    let hanging_edges: Vec<u16> = (0..info.num(ElementKind::Edge))
        .filter(|&e| info.is_active(ElementKind::Edge, e) && !info.is_owned(ElementKind::Edge, e))
        .filter(|&e| {
            info.edge_vertices(e)
                .iter()
                .any(|&v| !info.is_active(ElementKind::Vertex, v))
        })
        .collect();
    for e in hanging_edges {
        info.free_slot(ElementKind::Edge, e);
    }
    let hanging_faces: Vec<u16> = (0..info.num(ElementKind::Face))
        .filter(|&f| info.is_active(ElementKind::Face, f) && !info.is_owned(ElementKind::Face, f))
        .filter(|&f| {
            info.face_edges(f)
                .iter()
                .any(|&(e, _)| !info.is_active(ElementKind::Edge, e))
        })
        .collect();
    for f in hanging_faces {
        info.free_slot(ElementKind::Face, f);
    }
}

impl<O: CavityOp> Cavity<'_, O> {
    /// Publish the pass.
    ///
    /// Applies the ownership plan to the previous owners, removes neighbor
    /// copies of deleted elements, frees deleted slots no refill reused,
    /// writes the working copy back, updates the global counts and marks
    /// every locked patch as touched for the rest of the round. A pass that
    /// was never processed or has no live cavity releases its locks without
    /// writing anything.
    pub fn commit(mut self, block: &Block) -> Result<CommitSummary, CavityError> {
        let home = self.s.patch_id;
        match self.state {
            State::Failed => return Err(CavityError::Aborted { patch: home }),
            State::Collecting => return Ok(CommitSummary::default()),
            State::Processed => {}
        }
        let cavities = self.live_cavities().count() as u32;
        if cavities == 0 {
            return Ok(CommitSummary::default());
        }

        let mut dead: HashSet<(ElementKind, u32, u16)> = HashSet::new();
        for kind in ElementKind::ALL {
            for local in self.s.deleted[kind.index()].iter_ones() {
                dead.insert((kind, home, local as u16));
            }
        }
        let transfers = std::mem::take(&mut self.transfers);
        for t in &transfers {
            let prev = self.locks.get(t.from_patch)?;
            if t.deleted {
                prev.free_slot(t.kind, t.from_local);
                dead.insert((t.kind, t.from_patch, t.from_local));
            } else {
                // room was checked during migration
                let stash = prev
                    .stash_mut()
                    .insert_patch(home)
                    .ok_or(CavityError::StashOverflow { patch: t.from_patch })?;
                prev.owned[t.kind.index()].reset(t.from_local as usize);
                prev.lp_mut(t.kind)
                    .insert(LPPair::new(t.from_local, t.local, stash))
                    .map_err(|_| CavityError::HashTableFull {
                        patch: t.from_patch,
                        kind: t.kind,
                    })?;
            }
        }

        let neighbors: Vec<u32> = self.locks.locked().filter(|&p| p != home).collect();
        for p in neighbors {
            drop_dead_copies(self.locks.get(p)?, &dead);
        }

        let s = &self.s;
        for kind in ElementKind::ALL {
            let k = kind.index();
            block.stride(s.num(kind) as usize, |i| {
                if s.deleted[k].get(i) && !s.claimed[k].get(i) {
                    s.owned[k].reset(i);
                }
            });
        }
        block.sync();

        self.ctx.record_recycled(ElementKind::ALL.into_iter().flat_map(move |kind| {
            let k = kind.index();
            s.deleted[k]
                .iter_ones()
                .filter(move |&i| s.claimed[k].get(i))
                .map(move |i| (kind, home, i as u16))
        }));

        let added = [0, 1, 2].map(|k| self.added[k].load(Ordering::Acquire));
        let deleted = [0, 1, 2].map(|k| self.s.deleted[k].count_ones() as u32);
        let summary = CommitSummary {
            cavities,
            added,
            deleted,
        };
        self.s.store(self.locks.home_info());
        self.ctx.adjust_counts(summary.delta());
        self.locks.mark_touched();
        crate::debug_invariants!(self.locks.home_info().validate_invariants(), "commit");
        Ok(summary)
    }
}
