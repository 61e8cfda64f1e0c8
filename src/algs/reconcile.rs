//! Reconciliation of patch copies between edit rounds.
//!
//! Commits only fix up the patches they lock. Other patches may be left
//! holding copies of elements that no longer exist, copies whose owner slot
//! was refilled with a new element, or a ribbon that misses faces created
//! around one of their complete vertices. This pass repairs all of that:
//!
//! * copies that do not resolve, or resolve to a recycled slot, are freed,
//!   along with copies built on top of them,
//! * copies no live element of the patch refers to are freed,
//! * every complete vertex receives copies of the faces its owner has around
//!   it and the patch lacks,
//! * LP entries are pointed straight at the owner when the stash has room.
//!
//! Plans are computed for every patch in parallel under read locks, then
//! applied in parallel, each patch under its own write lock.

use crate::cavity::CavityError;
use crate::context::Context;
use crate::mesh_error::MeshError;
use crate::topology::handle::ElementKind;
use crate::topology::lp_hash::LPPair;
use crate::topology::ownership::{PatchTable, resolve_owner};
use crate::topology::patch_info::PatchInfo;
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

type Addr = (u32, u16);

/// What one reconciliation pass changed, summed over all patches.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Copies freed because their owner is gone or was replaced.
    pub stale: [usize; 3],
    /// Copies freed because nothing referred to them.
    pub orphaned: [usize; 3],
    /// Ribbon faces copied in.
    pub filled: usize,
    /// LP entries pointed straight at the owner.
    pub compressed: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }

    fn merge(mut self, other: Self) -> Self {
        for k in 0..3 {
            self.stale[k] += other.stale[k];
            self.orphaned[k] += other.orphaned[k];
        }
        self.filled += other.filled;
        self.compressed += other.compressed;
        self
    }
}

/// A face to copy in, addressed by owners.
#[derive(Clone, Debug, PartialEq, Eq)]
struct RibbonFace {
    face: Addr,
    edges: [(Addr, bool, [Addr; 2]); 3],
}

#[derive(Default)]
struct Plan {
    stale: [Vec<u16>; 3],
    orphaned: [Vec<u16>; 3],
    /// Owner address of every surviving slot.
    index: [HashMap<Addr, u16>; 3],
    fill: Vec<RibbonFace>,
    /// `(kind, local, owner)` of copies pointing at a middleman.
    repoint: Vec<(ElementKind, u16, Addr)>,
}

struct Planner<'t, 'a> {
    table: &'t PatchTable<'a>,
    info: &'a PatchInfo,
    recycled: &'t HashSet<(ElementKind, u32, u16)>,
    max_hops: u32,
}

impl Planner<'_, '_> {
    fn resolve(&self, kind: ElementKind, patch: u32, local: u16) -> Result<Addr, CavityError> {
        let mut lookup = self.table;
        let owner = resolve_owner(&mut lookup, kind, patch, local, self.max_hops)?;
        if self.recycled.contains(&(kind, owner.0, owner.1)) {
            return Err(CavityError::MissingCopy {
                kind,
                patch: owner.0,
                local: owner.1,
            });
        }
        Ok(owner)
    }

    /// Owner of every live slot of `kind`, `None` for stale copies.
    fn owners(&self, kind: ElementKind) -> Vec<Option<Addr>> {
        let info = self.info;
        let p = info.patch_id();
        (0..info.num(kind))
            .map(|l| {
                if !info.is_active(kind, l) {
                    None
                } else if info.is_owned(kind, l) {
                    Some((p, l))
                } else {
                    self.resolve(kind, p, l).ok()
                }
            })
            .collect()
    }

    /// Faces around the vertex owned at `owner`, as the owner sees them.
    fn owner_ring(&self, owner: Addr) -> Option<Vec<RibbonFace>> {
        let (q, qv) = owner;
        let info = self.table.get(q)?;
        info.faces_around(qv)
            .into_iter()
            .map(|g| {
                let face = self.resolve(ElementKind::Face, q, g).ok()?;
                let mut edges = [((0, 0), false, [(0, 0); 2]); 3];
                for (slot, (e, dir)) in edges.iter_mut().zip(info.face_edges(g)) {
                    let [a, b] = info.edge_vertices(e);
                    *slot = (
                        self.resolve(ElementKind::Edge, q, e).ok()?,
                        dir,
                        [
                            self.resolve(ElementKind::Vertex, q, a).ok()?,
                            self.resolve(ElementKind::Vertex, q, b).ok()?,
                        ],
                    );
                }
                Some(RibbonFace { face, edges })
            })
            .collect()
    }

    fn plan(&self) -> Plan {
        let info = self.info;
        let p = info.patch_id();
        let mut plan = Plan::default();
        let mut owners = ElementKind::ALL.map(|kind| self.owners(kind));
        let live = |kind: ElementKind, l: u16| info.is_active(kind, l);

        // stale copies, bottom up
        for l in 0..info.num(ElementKind::Edge) {
            let e = l as usize;
            if live(ElementKind::Edge, l)
                && !info.is_owned(ElementKind::Edge, l)
                && info.edge_vertices(l).iter().any(|&v| owners[0][v as usize].is_none())
            {
                owners[1][e] = None;
            }
        }
        for l in 0..info.num(ElementKind::Face) {
            let f = l as usize;
            if live(ElementKind::Face, l)
                && !info.is_owned(ElementKind::Face, l)
                && info.face_edges(l).iter().any(|&(e, _)| owners[1][e as usize].is_none())
            {
                owners[2][f] = None;
            }
        }
        for kind in ElementKind::ALL {
            let k = kind.index();
            plan.stale[k] = (0..info.num(kind))
                .filter(|&l| live(kind, l) && owners[k][l as usize].is_none())
                .collect();
        }

        // ribbon faces the patch lacks
        let mut complete: HashSet<u16> = HashSet::new();
        for f in 0..info.num(ElementKind::Face) {
            if info.is_owned(ElementKind::Face, f) {
                complete.extend(info.face_vertices(f));
            }
        }
        let mut seen: HashSet<Addr> = HashSet::new();
        let mut complete: Vec<u16> = complete.into_iter().collect();
        complete.sort_unstable();
        for v in complete {
            if info.is_owned(ElementKind::Vertex, v) {
                continue;
            }
            let Some(owner) = owners[0][v as usize] else {
                continue;
            };
            let Some(ring) = self.owner_ring(owner) else {
                continue;
            };
            let present: HashSet<Addr> = info
                .faces_around(v)
                .into_iter()
                .filter_map(|f| owners[2][f as usize])
                .collect();
            for rf in ring {
                if !present.contains(&rf.face) && seen.insert(rf.face) {
                    plan.fill.push(rf);
                }
            }
        }

        // orphans, top down
        let mut used_e: HashSet<u16> = HashSet::new();
        let mut wanted: [HashSet<Addr>; 2] = Default::default();
        for rf in &plan.fill {
            for (e, _, vs) in rf.edges {
                wanted[1].insert(e);
                wanted[0].extend(vs);
            }
        }
        for f in 0..info.num(ElementKind::Face) {
            if owners[2][f as usize].is_some() {
                used_e.extend(info.face_edges(f).map(|(e, _)| e));
            }
        }
        for l in 0..info.num(ElementKind::Edge) {
            let Some(addr) = owners[1][l as usize] else {
                continue;
            };
            if !info.is_owned(ElementKind::Edge, l) && !used_e.contains(&l) && !wanted[1].contains(&addr)
            {
                plan.orphaned[1].push(l);
                owners[1][l as usize] = None;
            }
        }
        let used_v: HashSet<u16> = (0..info.num(ElementKind::Edge))
            .filter(|&e| owners[1][e as usize].is_some())
            .flat_map(|e| info.edge_vertices(e))
            .collect();
        for l in 0..info.num(ElementKind::Vertex) {
            let Some(addr) = owners[0][l as usize] else {
                continue;
            };
            if !info.is_owned(ElementKind::Vertex, l)
                && !used_v.contains(&l)
                && !wanted[0].contains(&addr)
            {
                plan.orphaned[0].push(l);
                owners[0][l as usize] = None;
            }
        }

        // survivors and middlemen
        for kind in ElementKind::ALL {
            let k = kind.index();
            for (l, owner) in owners[k].iter().enumerate() {
                let Some(owner) = *owner else { continue };
                let l = l as u16;
                plan.index[k].insert(owner, l);
                if owner.0 == p {
                    continue;
                }
                let direct = info
                    .lp(kind)
                    .find(l)
                    .and_then(|pair| Some((info.stash().get(pair.stash())?, pair.owner_local())));
                if direct != Some(owner) {
                    plan.repoint.push((kind, l, owner));
                }
            }
        }
        plan
    }
}

fn localize(
    info: &mut PatchInfo,
    index: &mut HashMap<Addr, u16>,
    kind: ElementKind,
    owner: Addr,
) -> Result<(u16, bool), CavityError> {
    if let Some(&l) = index.get(&owner) {
        return Ok((l, false));
    }
    let patch = info.patch_id();
    let l = info
        .claim_slot(kind)
        .ok_or(CavityError::CapacityExhausted { patch, kind })?;
    info.insert_copy(kind, l, owner.0, owner.1)?;
    index.insert(owner, l);
    Ok((l, true))
}

fn apply(info: &mut PatchInfo, plan: Plan) -> Result<ReconcileReport, CavityError> {
    let mut report = ReconcileReport::default();
    for kind in ElementKind::ALL {
        let k = kind.index();
        for &l in plan.stale[k].iter().chain(&plan.orphaned[k]) {
            info.free_slot(kind, l);
        }
        report.stale[k] = plan.stale[k].len();
        report.orphaned[k] = plan.orphaned[k].len();
    }

    let [mut vi, mut ei, mut fi] = plan.index;
    for rf in &plan.fill {
        let mut edges = [(0u16, false); 3];
        for (slot, &(e, dir, [a, b])) in edges.iter_mut().zip(rf.edges.iter()) {
            let (a, _) = localize(info, &mut vi, ElementKind::Vertex, a)?;
            let (b, _) = localize(info, &mut vi, ElementKind::Vertex, b)?;
            let (e, fresh) = localize(info, &mut ei, ElementKind::Edge, e)?;
            if fresh {
                info.set_edge_vertices(e, [a, b]);
            }
            *slot = (e, dir);
        }
        let (f, fresh) = localize(info, &mut fi, ElementKind::Face, rf.face)?;
        if fresh {
            info.set_face_edges(f, edges);
            report.filled += 1;
        }
    }

    for (kind, l, (q, ql)) in plan.repoint {
        if let Some(stash) = info.stash_mut().insert_patch(q) {
            info.lp_mut(kind)
                .insert(LPPair::new(l, ql, stash))
                .map_err(|_| CavityError::HashTableFull {
                    patch: info.patch_id(),
                    kind,
                })?;
            report.compressed += 1;
        }
    }
    Ok(report)
}

/// Reconcile every patch of `ctx`. `recycled` lists the owned slots that
/// were freed and refilled since the last pass.
pub fn reconcile(
    ctx: &Context,
    recycled: &HashSet<(ElementKind, u32, u16)>,
    max_hops: u32,
) -> Result<ReconcileReport, MeshError> {
    let plans: Vec<Plan> = {
        let guards: Vec<_> = ctx.patches().iter().map(|slot| slot.read()).collect();
        let table = PatchTable::new(guards.iter().map(|g| &**g).collect());
        table
            .iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|info| {
                Planner {
                    table: &table,
                    info,
                    recycled,
                    max_hops,
                }
                .plan()
            })
            .collect()
    };

    let report = plans
        .into_par_iter()
        .enumerate()
        .map(|(p, plan)| {
            let mut info = ctx.patch(p as u32).write();
            apply(&mut info, plan).map_err(|source| MeshError::Cavity {
                patch: p as u32,
                source,
            })
        })
        .try_reduce(ReconcileReport::default, |a, b| Ok(a.merge(b)))?;
    if !report.is_clean() {
        log::debug!(
            "reconcile: stale {:?}, orphaned {:?}, filled {}, compressed {}",
            report.stale,
            report.orphaned,
            report.filled,
            report.compressed
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::build::{Connectivity, build_patches};
    use crate::config::DynamicConfig;
    use crate::debug_invariants::DebugInvariants;

    const QUAD: [[u32; 3]; 2] = [[0, 1, 2], [2, 1, 3]];

    fn two_patches() -> Context {
        let conn = Connectivity::new(4, &QUAD).unwrap();
        let built = build_patches(&conn, Some(&[0, 1]), &DynamicConfig::default()).unwrap();
        Context::new(built.patches, 2.0)
    }

    #[test]
    fn fresh_patches_need_nothing() {
        let ctx = two_patches();
        let report = reconcile(&ctx, &HashSet::new(), 8).unwrap();
        assert!(report.is_clean(), "{report:?}");
    }

    #[test]
    fn unreferenced_copy_is_freed() {
        let ctx = two_patches();
        let owner = {
            let p0 = ctx.patch(0).read();
            (0..p0.num(ElementKind::Vertex))
                .find(|&v| p0.is_owned(ElementKind::Vertex, v))
                .unwrap()
        };
        let extra = {
            let mut p1 = ctx.patch(1).write();
            let l = p1.claim_slot(ElementKind::Vertex).unwrap();
            p1.insert_copy(ElementKind::Vertex, l, 0, owner).unwrap();
            l
        };

        let report = reconcile(&ctx, &HashSet::new(), 8).unwrap();
        assert_eq!(report.orphaned, [1, 0, 0]);
        assert_eq!(report.stale, [0, 0, 0]);
        let p1 = ctx.patch(1).read();
        assert!(!p1.is_active(ElementKind::Vertex, extra));
        p1.validate_invariants().unwrap();
        drop(p1);
        assert!(reconcile(&ctx, &HashSet::new(), 8).unwrap().is_clean());
    }

    #[test]
    fn reports_add_up() {
        let a = ReconcileReport {
            stale: [1, 0, 2],
            orphaned: [0, 1, 0],
            filled: 3,
            compressed: 0,
        };
        let b = ReconcileReport {
            compressed: 4,
            ..a
        };
        let sum = a.merge(b);
        assert_eq!(sum.stale, [2, 0, 4]);
        assert_eq!(sum.orphaned, [0, 2, 0]);
        assert_eq!((sum.filled, sum.compressed), (6, 4));
        assert!(!sum.is_clean());
    }
}
