//! Whole-mesh validation.
//!
//! [`PatchInfo::validate_invariants`] covers what a single patch can check on
//! its own. [`validate_mesh`] adds the checks that need every patch:
//!
//! * each copy resolves to an owner within the hop bound,
//! * each edge or face copy has the same resolved connectivity as its owner,
//! * no edge or face is owned twice,
//! * the global counts match the owned slots,
//! * every complete vertex of a patch has exactly its global one-ring there.

use crate::context::Context;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshError;
use crate::topology::handle::ElementKind;
use crate::topology::ownership::{PatchTable, resolve_owner};
use crate::topology::patch_info::PatchInfo;
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

type Addr = (u32, u16);

struct Checker<'t, 'a> {
    table: &'t PatchTable<'a>,
    max_hops: u32,
}

impl Checker<'_, '_> {
    fn owner(&self, kind: ElementKind, patch: u32, local: u16) -> Result<Addr, MeshError> {
        let mut lookup = self.table;
        resolve_owner(&mut lookup, kind, patch, local, self.max_hops).map_err(|source| {
            MeshError::DanglingCopy {
                patch,
                kind,
                local,
                source,
            }
        })
    }

    fn edge_key(&self, info: &PatchInfo, e: u16) -> Result<[Addr; 2], MeshError> {
        let [a, b] = info.edge_vertices(e);
        let p = info.patch_id();
        Ok([
            self.owner(ElementKind::Vertex, p, a)?,
            self.owner(ElementKind::Vertex, p, b)?,
        ])
    }

    fn face_key(&self, info: &PatchInfo, f: u16) -> Result<[(Addr, bool); 3], MeshError> {
        let p = info.patch_id();
        let edges = info.face_edges(f);
        let mut key = [((0, 0), false); 3];
        for (slot, (e, dir)) in key.iter_mut().zip(edges) {
            *slot = (self.owner(ElementKind::Edge, p, e)?, dir);
        }
        Ok(key)
    }

    /// Copies agree with their owners.
    fn check_copies(&self, info: &PatchInfo) -> Result<(), MeshError> {
        let p = info.patch_id();
        for kind in ElementKind::ALL {
            for l in 0..info.num(kind) {
                if !info.is_active(kind, l) || info.is_owned(kind, l) {
                    continue;
                }
                let (q, ql) = self.owner(kind, p, l)?;
                let Some(owner) = self.table.get(q) else {
                    continue;
                };
                let agrees = match kind {
                    ElementKind::Vertex => true,
                    ElementKind::Edge => self.edge_key(info, l)? == self.edge_key(owner, ql)?,
                    ElementKind::Face => self.face_key(info, l)? == self.face_key(owner, ql)?,
                };
                if !agrees {
                    return Err(MeshError::StaleCopy {
                        patch: p,
                        kind,
                        local: l,
                    });
                }
            }
        }
        Ok(())
    }

    /// Faces around each owned vertex, from the owned faces of every patch.
    fn global_rings(&self) -> Result<HashMap<Addr, HashSet<Addr>>, MeshError> {
        let mut rings: HashMap<Addr, HashSet<Addr>> = HashMap::new();
        for info in self.table.iter() {
            let p = info.patch_id();
            for f in 0..info.num(ElementKind::Face) {
                if !info.is_owned(ElementKind::Face, f) {
                    continue;
                }
                for v in info.face_vertices(f) {
                    let owner = self.owner(ElementKind::Vertex, p, v)?;
                    rings.entry(owner).or_default().insert((p, f));
                }
            }
        }
        Ok(rings)
    }

    fn check_ribbon(
        &self,
        info: &PatchInfo,
        rings: &HashMap<Addr, HashSet<Addr>>,
    ) -> Result<(), MeshError> {
        let p = info.patch_id();
        let mut complete: HashSet<u16> = (0..info.num(ElementKind::Vertex))
            .filter(|&v| info.is_owned(ElementKind::Vertex, v))
            .collect();
        for f in 0..info.num(ElementKind::Face) {
            if info.is_owned(ElementKind::Face, f) {
                complete.extend(info.face_vertices(f));
            }
        }
        for v in complete {
            let owner = self.owner(ElementKind::Vertex, p, v)?;
            let local = info
                .faces_around(v)
                .into_iter()
                .map(|f| self.owner(ElementKind::Face, p, f))
                .collect::<Result<HashSet<_>, _>>()?;
            if rings.get(&owner) != Some(&local) {
                return Err(MeshError::RibbonBroken { patch: p, local: v });
            }
        }
        Ok(())
    }
}

/// Check every invariant of the patched mesh in `ctx`.
pub fn validate_mesh(ctx: &Context, max_hops: u32) -> Result<(), MeshError> {
    let guards: Vec<_> = ctx.patches().iter().map(|slot| slot.read()).collect();
    let table = PatchTable::new(guards.iter().map(|g| &**g).collect());
    let checker = Checker {
        table: &table,
        max_hops,
    };
    let patches: Vec<&PatchInfo> = table.iter().collect();

    patches
        .par_iter()
        .try_for_each(|info| info.validate_invariants())?;
    patches
        .par_iter()
        .try_for_each(|info| checker.check_copies(info))?;

    let mut edges: HashMap<[Addr; 2], Addr> = HashMap::new();
    let mut faces: HashMap<[Addr; 3], Addr> = HashMap::new();
    for info in &patches {
        let p = info.patch_id();
        for e in 0..info.num(ElementKind::Edge) {
            if !info.is_owned(ElementKind::Edge, e) {
                continue;
            }
            let mut key = checker.edge_key(info, e)?;
            key.sort_unstable();
            if edges.insert(key, (p, e)).is_some() {
                return Err(MeshError::DuplicateOwner {
                    patch: p,
                    kind: ElementKind::Edge,
                    local: e,
                });
            }
        }
        for f in 0..info.num(ElementKind::Face) {
            if !info.is_owned(ElementKind::Face, f) {
                continue;
            }
            let corners = info.face_vertices(f);
            let mut key = [(0, 0); 3];
            for (slot, v) in key.iter_mut().zip(corners) {
                *slot = checker.owner(ElementKind::Vertex, p, v)?;
            }
            // same triangle under any rotation
            let start = (0..3).min_by_key(|&i| key[i]).unwrap_or(0);
            key.rotate_left(start);
            if faces.insert(key, (p, f)).is_some() {
                return Err(MeshError::DuplicateOwner {
                    patch: p,
                    kind: ElementKind::Face,
                    local: f,
                });
            }
        }
    }

    for kind in ElementKind::ALL {
        let counted: usize = patches.iter().map(|info| info.num_owned(kind)).sum();
        let recorded = ctx.num(kind);
        if counted != recorded as usize {
            return Err(MeshError::CountMismatch {
                kind,
                recorded,
                counted: counted as u32,
            });
        }
    }

    let rings = checker.global_rings()?;
    patches
        .par_iter()
        .try_for_each(|info| checker.check_ribbon(info, &rings))
}
