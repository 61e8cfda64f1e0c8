#![allow(dead_code)]
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use patch_cavity::prelude::*;

pub type Mesh = (Vec<[f64; 3]>, Vec<[u32; 3]>);

/// Regular icosahedron: 12 vertices, 30 edges, 20 faces, outward winding.
pub fn icosahedron() -> Mesh {
    let t = (1.0 + 5f64.sqrt()) / 2.0;
    let positions = vec![
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ];
    let faces = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    (positions, faces)
}

/// Icosahedron split `levels` times, each face into four.
pub fn icosphere(levels: u32) -> Mesh {
    let (mut positions, mut faces) = icosahedron();
    for _ in 0..levels {
        let mut mid: HashMap<(u32, u32), u32> = HashMap::new();
        let mut next = Vec::with_capacity(faces.len() * 4);
        for [a, b, c] in faces {
            let mut midpoint = |u: u32, v: u32| {
                let key = (u.min(v), u.max(v));
                *mid.entry(key).or_insert_with(|| {
                    let (p, q) = (positions[u as usize], positions[v as usize]);
                    positions.push([
                        (p[0] + q[0]) / 2.0,
                        (p[1] + q[1]) / 2.0,
                        (p[2] + q[2]) / 2.0,
                    ]);
                    positions.len() as u32 - 1
                })
            };
            let (ab, bc, ca) = (midpoint(a, b), midpoint(b, c), midpoint(c, a));
            next.extend([[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        faces = next;
    }
    (positions, faces)
}

/// Config with small patches so that a test mesh spans several of them.
pub fn small_patches(patch_size: usize) -> DynamicConfig {
    DynamicConfig {
        patch_size,
        block_threads: 4,
        ..Default::default()
    }
}

/// Undirected edges of a triangle list.
pub fn edge_set(faces: &[[u32; 3]]) -> HashSet<(u32, u32)> {
    faces
        .iter()
        .flat_map(|&[a, b, c]| [(a, b), (b, c), (c, a)])
        .map(|(u, v)| (u.min(v), u.max(v)))
        .collect()
}

/// Every directed edge appears once and its reverse once.
pub fn assert_closed_manifold(faces: &[[u32; 3]]) {
    let mut directed: HashMap<(u32, u32), usize> = HashMap::new();
    for &[a, b, c] in faces {
        assert!(a != b && b != c && c != a, "degenerate face {:?}", [a, b, c]);
        for e in [(a, b), (b, c), (c, a)] {
            *directed.entry(e).or_default() += 1;
        }
    }
    for (&(u, v), &n) in &directed {
        assert_eq!(n, 1, "directed edge ({u}, {v}) used {n} times");
        assert_eq!(
            directed.get(&(v, u)),
            Some(&1),
            "edge ({u}, {v}) has no opposite face"
        );
    }
}

/// `V - E + F` of a triangle list.
pub fn euler(num_vertices: usize, faces: &[[u32; 3]]) -> i64 {
    num_vertices as i64 - edge_set(faces).len() as i64 + faces.len() as i64
}

/// Full consistency check of a mesh against its export.
pub fn assert_consistent(mesh: &DynamicMesh) {
    mesh.validate().unwrap();
    let (positions, faces) = mesh.export().unwrap();
    assert_eq!(positions.len(), mesh.num_vertices() as usize);
    assert_eq!(faces.len(), mesh.num_faces() as usize);
    assert_eq!(edge_set(&faces).len(), mesh.num_edges() as usize);
    assert_closed_manifold(&faces);
    assert_eq!(euler(positions.len(), &faces), 2);
}

/// Triangles with each rotated to start at its smallest corner.
pub fn normalized(faces: &[[u32; 3]]) -> Vec<[u32; 3]> {
    let mut out: Vec<[u32; 3]> = faces
        .iter()
        .map(|&f| {
            let start = (0..3).min_by_key(|&i| f[i]).unwrap();
            let mut f = f;
            f.rotate_left(start);
            f
        })
        .collect();
    out.sort_unstable();
    out
}

/// Triangles as corner positions, independent of vertex numbering.
pub fn surface((positions, faces): Mesh) -> Vec<[[u64; 3]; 3]> {
    let mut out: Vec<[[u64; 3]; 3]> = normalized(&faces)
        .into_iter()
        .map(|f| f.map(|v| positions[v as usize].map(f64::to_bits)))
        .map(|mut f| {
            let start = (0..3).min_by_key(|&i| f[i]).unwrap();
            f.rotate_left(start);
            f
        })
        .collect();
    out.sort_unstable();
    out
}

/// Deterministic pseudo-random pick of roughly one in `every` slots.
pub fn sparse(salt: u64, every: u64) -> impl Fn(u32, u16) -> bool + Send + Sync {
    move |p, l| {
        let mut x = salt ^ ((p as u64) << 16 | l as u64);
        x ^= x >> 33;
        x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
        x ^= x >> 33;
        x % every == 0
    }
}

/// Fill a hole with a fan from loop vertex `apex`.
pub fn fan_fill<O: CavityOp>(
    cavity: &Cavity<'_, O>,
    c: u16,
    size: u16,
    apex: u16,
) -> Result<(), CavityError> {
    let at = |i: u16| (apex + i) % size;
    let origin = cavity.get_cavity_vertex(c, apex);
    let mut prev = cavity.get_cavity_edge(c, apex);
    for k in 1..size - 1 {
        let side = cavity.get_cavity_edge(c, at(k));
        let closing = if k + 1 == size - 1 {
            cavity.get_cavity_edge(c, at(k + 1))
        } else {
            cavity.add_edge(c, cavity.get_cavity_vertex(c, at(k + 1)), origin)?
        };
        cavity.add_face(c, prev, side, closing)?;
        prev = closing.flipped();
    }
    Ok(())
}

/// Fill a hole with a new vertex joined to every loop vertex.
pub fn star_fill<O: CavityOp>(
    cavity: &Cavity<'_, O>,
    c: u16,
    size: u16,
) -> Result<VertexHandle, CavityError> {
    let center = cavity.add_vertex(c)?;
    let spokes = (0..size)
        .map(|i| cavity.add_edge(c, center, cavity.get_cavity_vertex(c, i)))
        .collect::<Result<Vec<_>, _>>()?;
    for i in 0..size {
        let next = spokes[((i + 1) % size) as usize].flipped();
        cavity.add_face(c, spokes[i as usize], cavity.get_cavity_edge(c, i), next)?;
    }
    Ok(center)
}

pub fn centroid(points: impl IntoIterator<Item = [f64; 3]>) -> [f64; 3] {
    let mut sum = [0.0; 3];
    let mut n = 0.0;
    for p in points {
        for k in 0..3 {
            sum[k] += p[k];
        }
        n += 1.0;
    }
    sum.map(|s| s / n)
}

/// Whether the live edges of the cavity's patch already join `a` and `b`.
pub fn has_edge<O: CavityOp>(cavity: &Cavity<'_, O>, a: VertexHandle, b: VertexHandle) -> bool {
    (0..cavity.slot_count(ElementKind::Edge)).any(|e| {
        let h = EdgeHandle::new(cavity.patch_id(), e);
        if !cavity.is_active(ElementKind::Edge, e) || cavity.is_deleted(h) {
            return false;
        }
        let [u, v] = cavity.edge_vertices(e);
        (u, v) == (a.local(), b.local()) || (u, v) == (b.local(), a.local())
    })
}

/// Flip the edge of each cavity: the two loop vertices off the seed edge get
/// joined. A cavity whose flip would duplicate an edge, one already in the
/// patch or one another cavity of the pass adds, is filled back as it was.
pub fn flip_kernel<'m>(
    mesh: &'m DynamicMesh,
    pick: impl Fn(u32, u16) -> bool + Send + Sync + 'm,
) -> impl Fn(&Block, &mut Cavity<'_, EdgeCavity>) -> Result<(), CavityError> + Send + Sync + 'm {
    move |block, cavity| {
        let p = cavity.patch_id();
        for e in 0..cavity.slot_count(ElementKind::Edge) {
            if cavity.is_owned(ElementKind::Edge, e) && pick(p, e) {
                cavity.add(EdgeHandle::new(p, e));
            }
        }
        cavity.process(block)?;
        cavity.update_attributes(block, mesh.positions());
        let cavity = &*cavity;
        let pair = |a: u16, b: u16| (a.min(b), a.max(b));
        // seed edges stay reserved for the cavities that may restore them
        let taken: Mutex<HashSet<(u16, u16)>> = Mutex::new(
            cavity
                .live_cavities()
                .map(|c| {
                    let [a, b] = cavity.edge_vertices(cavity.seed(c).local());
                    pair(a, b)
                })
                .collect(),
        );
        cavity.for_each_cavity(block, |c, size| {
            let ends = cavity.edge_vertices(cavity.seed(c).local());
            let off = (0..size)
                .find(|&i| !ends.contains(&cavity.get_cavity_vertex(c, i).local()))
                .unwrap_or(0);
            let flip = size == 4 && {
                let a = cavity.get_cavity_vertex(c, off);
                let b = cavity.get_cavity_vertex(c, (off + 2) % size);
                !has_edge(cavity, a, b) && taken.lock().insert(pair(a.local(), b.local()))
            };
            let apex = if flip { off } else { (off + 1) % size };
            fan_fill(cavity, c, size, apex)
        })
    }
}

/// Split every picked edge at its midpoint.
pub fn split_kernel<'m>(
    mesh: &'m DynamicMesh,
    pick: impl Fn(u32, u16) -> bool + Send + Sync + 'm,
) -> impl Fn(&Block, &mut Cavity<'_, EdgeCavity>) -> Result<(), CavityError> + Send + Sync + 'm {
    move |block, cavity| {
        let p = cavity.patch_id();
        for e in 0..cavity.slot_count(ElementKind::Edge) {
            if cavity.is_owned(ElementKind::Edge, e) && pick(p, e) {
                cavity.add(EdgeHandle::new(p, e));
            }
        }
        cavity.process(block)?;
        cavity.update_attributes(block, mesh.positions());
        let cavity = &*cavity;
        cavity.for_each_cavity(block, |c, size| {
            let ends = cavity.edge_vertices(cavity.seed(c).local());
            let mid = centroid(
                ends.map(|v| mesh.positions().get(VertexHandle::new(p, v))),
            );
            let center = star_fill(cavity, c, size)?;
            mesh.positions().set(center, mid);
            Ok(())
        })
    }
}
