//! Building patches from an indexed triangle list.
//!
//! The input is checked for range, degeneracy and edge-manifoldness, edges
//! are numbered in order of first use, and faces are grouped into patches.
//! Every vertex and edge is owned by the patch of its lowest-indexed face.
//! A patch holds its owned faces and every face around a corner of those, so
//! each vertex it owns, and each corner of a face it owns, starts with its
//! full one-ring present.

use crate::algs::patcher::{grow_patches, num_patches};
use crate::cavity::CavityError;
use crate::config::DynamicConfig;
use crate::mesh_error::MeshError;
use crate::topology::handle::{ElementKind, MAX_PATCH_CAPACITY, pack_edge_dir};
use crate::topology::lp_hash::LPPair;
use crate::topology::patch_info::PatchInfo;
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use rayon::prelude::*;

/// Global connectivity of a triangle list.
#[derive(Debug, Clone)]
pub struct Connectivity {
    /// Endpoints of each edge, in the direction of the first face using it.
    pub edges: Vec<[u32; 2]>,
    /// Edge `i` of a face runs from corner `i` to corner `i + 1`; the flag is
    /// set when that is against the stored edge direction.
    pub face_edges: Vec<[(u32, bool); 3]>,
    /// Faces of each edge, ascending.
    pub edge_faces: Vec<Vec<u32>>,
    /// Faces around each vertex, ascending.
    pub vertex_faces: Vec<Vec<u32>>,
}

impl Connectivity {
    pub fn new(num_vertices: usize, faces: &[[u32; 3]]) -> Result<Self, MeshError> {
        if faces.is_empty() {
            return Err(MeshError::EmptyMesh);
        }
        let mut edge_of: HashMap<(u32, u32), u32> = HashMap::new();
        let mut directed: HashSet<(u32, u32)> = HashSet::new();
        let mut edges = Vec::new();
        let mut edge_faces: Vec<Vec<u32>> = Vec::new();
        let mut vertex_faces = vec![Vec::new(); num_vertices];
        let mut face_edges = Vec::with_capacity(faces.len());

        for (f, tri) in faces.iter().enumerate() {
            if let Some(&vertex) = tri.iter().find(|&&v| v as usize >= num_vertices) {
                return Err(MeshError::IndexOutOfRange {
                    face: f,
                    vertex,
                    num_vertices,
                });
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
                return Err(MeshError::DegenerateFace { face: f });
            }
            let mut fe = [(0u32, false); 3];
            for i in 0..3 {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                if !directed.insert((a, b)) {
                    return Err(MeshError::NonManifoldEdge { a, b });
                }
                let e = *edge_of.entry((a.min(b), a.max(b))).or_insert_with(|| {
                    edges.push([a, b]);
                    edge_faces.push(Vec::new());
                    (edges.len() - 1) as u32
                });
                let incident = &mut edge_faces[e as usize];
                if incident.len() == 2 {
                    return Err(MeshError::NonManifoldEdge { a, b });
                }
                incident.push(f as u32);
                fe[i] = (e, edges[e as usize][0] != a);
            }
            face_edges.push(fe);
            for &v in tri {
                vertex_faces[v as usize].push(f as u32);
            }
        }
        if let Some(v) = vertex_faces.iter().position(Vec::is_empty) {
            return Err(MeshError::IsolatedVertex { vertex: v as u32 });
        }
        Ok(Self {
            edges,
            face_edges,
            edge_faces,
            vertex_faces,
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.vertex_faces.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_faces(&self) -> usize {
        self.face_edges.len()
    }

    /// Corners of face `f`, in input order.
    pub fn face_vertices(&self, f: u32) -> [u32; 3] {
        self.face_edges[f as usize].map(|(e, dir)| {
            let [a, b] = self.edges[e as usize];
            if dir { b } else { a }
        })
    }

    /// Faces sharing an edge with each face.
    pub fn face_neighbors(&self) -> Vec<Vec<u32>> {
        (0..self.num_faces() as u32)
            .map(|f| {
                self.face_edges[f as usize]
                    .iter()
                    .flat_map(|&(e, _)| self.edge_faces[e as usize].iter().copied())
                    .filter(|&g| g != f)
                    .collect()
            })
            .collect()
    }
}

/// Patch records plus, for every patch, the input vertex index of each
/// vertex slot.
pub struct BuiltPatches {
    pub patches: Vec<PatchInfo>,
    pub vertex_ids: Vec<Vec<u32>>,
}

/// Global ids held by one patch per kind, owned first.
struct Layout {
    ids: [Vec<u32>; 3],
    owned: [usize; 3],
}

fn owned_first(ids: impl Iterator<Item = u32>, owner: &[u32], patch: u32) -> (Vec<u32>, usize) {
    let (owned, rest): (Vec<u32>, Vec<u32>) = ids
        .sorted_unstable()
        .dedup()
        .partition(|&g| owner[g as usize] == patch);
    let n = owned.len();
    (owned.into_iter().chain(rest).collect(), n)
}

fn layout(conn: &Connectivity, owner: &[Vec<u32>; 3], owned_faces: &[u32], patch: u32) -> Layout {
    let faces = owned_faces
        .iter()
        .flat_map(|&f| conn.face_vertices(f))
        .flat_map(|v| conn.vertex_faces[v as usize].iter().copied());
    let (faces, nf) = owned_first(faces, &owner[2], patch);
    let (edges, ne) = owned_first(
        faces
            .iter()
            .flat_map(|&f| conn.face_edges[f as usize].map(|(e, _)| e)),
        &owner[1],
        patch,
    );
    let (vertices, nv) = owned_first(
        faces.iter().flat_map(|&f| conn.face_vertices(f)),
        &owner[0],
        patch,
    );
    Layout {
        ids: [vertices, edges, faces],
        owned: [nv, ne, nf],
    }
}

fn capacity_for(len: usize, factor: f32) -> u16 {
    let scaled = (len as f64 * factor as f64).ceil() as usize;
    scaled.clamp(len, MAX_PATCH_CAPACITY as usize) as u16
}

fn fill_patch(
    conn: &Connectivity,
    owner: &[Vec<u32>; 3],
    layouts: &[Layout],
    locals: &[[HashMap<u32, u16>; 3]],
    patch: u32,
    config: &DynamicConfig,
) -> Result<PatchInfo, MeshError> {
    let lay = &layouts[patch as usize];
    let local = &locals[patch as usize];
    let capacity = [0, 1, 2].map(|k| capacity_for(lay.ids[k].len(), config.capacity_factor));
    let mut info = PatchInfo::new(patch, capacity, config.lp_load_factor);
    info.num = [0, 1, 2].map(|k| lay.ids[k].len() as u16);

    for (i, &e) in lay.ids[1].iter().enumerate() {
        let [a, b] = conn.edges[e as usize];
        info.ev[2 * i] = local[0][&a];
        info.ev[2 * i + 1] = local[0][&b];
    }
    for (i, &f) in lay.ids[2].iter().enumerate() {
        for (j, &(e, dir)) in conn.face_edges[f as usize].iter().enumerate() {
            info.fe[3 * i + j] = pack_edge_dir(local[1][&e], dir);
        }
    }

    for kind in ElementKind::ALL {
        let k = kind.index();
        for (i, &g) in lay.ids[k].iter().enumerate() {
            info.active[k].set(i);
            if i < lay.owned[k] {
                info.owned[k].set(i);
                continue;
            }
            let q = owner[k][g as usize];
            let owner_local = locals[q as usize][k][&g];
            let stash = info
                .stash_mut()
                .insert_patch(q)
                .ok_or(MeshError::TooManyNeighbors { patch })?;
            info.lp_mut(kind)
                .insert(LPPair::new(i as u16, owner_local, stash))
                .map_err(|_| MeshError::Cavity {
                    patch,
                    source: CavityError::HashTableFull { patch, kind },
                })?;
        }
    }
    Ok(info)
}

/// Split a checked triangle list into patch records.
///
/// `face_patch` assigns each face to a patch; when absent faces are grouped
/// by [`grow_patches`] with `config.patch_size` faces per patch.
pub fn build_patches(
    conn: &Connectivity,
    face_patch: Option<&[u32]>,
    config: &DynamicConfig,
) -> Result<BuiltPatches, MeshError> {
    config.validate()?;
    let part = match face_patch {
        Some(part) if part.len() != conn.num_faces() => {
            return Err(MeshError::PartitionLength {
                expected: conn.num_faces(),
                got: part.len(),
            });
        }
        Some(part) => part.to_vec(),
        None => grow_patches(&conn.face_neighbors(), config.patch_size),
    };
    let n = num_patches(&part);

    let owner: [Vec<u32>; 3] = [
        conn.vertex_faces.iter().map(|fs| part[fs[0] as usize]).collect(),
        conn.edge_faces.iter().map(|fs| part[fs[0] as usize]).collect(),
        part.clone(),
    ];
    let mut owned_faces = vec![Vec::new(); n as usize];
    for (f, &p) in part.iter().enumerate() {
        owned_faces[p as usize].push(f as u32);
    }

    let layouts: Vec<Layout> = (0..n)
        .into_par_iter()
        .map(|p| layout(conn, &owner, &owned_faces[p as usize], p))
        .collect();
    for (p, lay) in layouts.iter().enumerate() {
        for kind in ElementKind::ALL {
            let needed = lay.ids[kind.index()].len();
            if needed > MAX_PATCH_CAPACITY as usize {
                return Err(MeshError::PatchTooLarge {
                    patch: p as u32,
                    kind,
                    needed,
                    limit: MAX_PATCH_CAPACITY,
                });
            }
        }
    }
    let locals: Vec<[HashMap<u32, u16>; 3]> = layouts
        .par_iter()
        .map(|lay| {
            lay.ids.each_ref().map(|ids| {
                ids.iter()
                    .enumerate()
                    .map(|(i, &g)| (g, i as u16))
                    .collect()
            })
        })
        .collect();
    let patches = (0..n)
        .into_par_iter()
        .map(|p| fill_patch(conn, &owner, &layouts, &locals, p, config))
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!(
        "built {} patches from {} faces ({} vertices, {} edges)",
        n,
        conn.num_faces(),
        conn.num_vertices(),
        conn.num_edges()
    );
    Ok(BuiltPatches {
        patches,
        vertex_ids: layouts.into_iter().map(|lay| lay.ids[0].clone()).collect(),
    })
}
