mod util;

use hashbrown::HashSet;
use patch_cavity::prelude::*;
use util::*;

/// Icosahedron in two patches; vertex 5 sits on their interface.
fn two_patches() -> (DynamicMesh, Mesh) {
    let (positions, faces) = icosahedron();
    let part: Vec<u32> = (0..faces.len() as u32).map(|f| u32::from(f >= 5)).collect();
    let mesh =
        DynamicMesh::from_partitioned(&positions, &faces, &part, small_patches(64)).unwrap();
    (mesh, (positions, faces))
}

fn bits(p: [f64; 3]) -> [u64; 3] {
    p.map(f64::to_bits)
}

#[test]
fn partition_is_respected() {
    let (mesh, _) = two_patches();
    assert_eq!(mesh.num_patches(), 2);
    assert_eq!(mesh.patch(0).num_owned(ElementKind::Face), 5);
    assert_eq!(mesh.patch(1).num_owned(ElementKind::Face), 15);
    assert_consistent(&mesh);
}

#[test]
fn vertex_removal_spanning_two_patches() {
    let (mesh, (positions, _)) = two_patches();
    let target = positions[5];
    let report = mesh
        .edit::<VertexCavity, _>(|block, cavity| {
            let p = cavity.patch_id();
            for v in 0..cavity.slot_count(ElementKind::Vertex) {
                let h = VertexHandle::new(p, v);
                if cavity.is_owned(ElementKind::Vertex, v) && mesh.positions().get(h) == target
                {
                    cavity.add(h);
                }
            }
            cavity.process(block)?;
            cavity.update_attributes(block, mesh.positions());
            let cavity = &*cavity;
            cavity.for_each_cavity(block, |c, size| {
                assert_eq!(size, 5);
                fan_fill(cavity, c, size, 0)
            })
        })
        .unwrap();
    assert_eq!(report.cavities, 1);
    assert_eq!(report.delta, [-1, -3, -2]);
    assert_consistent(&mesh);

    let (out, _) = mesh.export().unwrap();
    assert!(!out.iter().any(|&p| bits(p) == bits(target)));
    let left: HashSet<_> = out.iter().map(|&p| bits(p)).collect();
    let want: HashSet<_> = positions
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != 5)
        .map(|(_, &p)| bits(p))
        .collect();
    assert_eq!(left, want);
}

#[test]
fn edge_collapse_across_the_interface() {
    let (mesh, (positions, _)) = two_patches();
    let (a, b) = (positions[0], positions[5]);
    let mid = centroid([a, b]);
    let report = mesh
        .edit::<EdgeVertexCavity, _>(|block, cavity| {
            let p = cavity.patch_id();
            let at = |v: u16| mesh.positions().get(VertexHandle::new(p, v));
            for e in 0..cavity.slot_count(ElementKind::Edge) {
                if !cavity.is_owned(ElementKind::Edge, e) {
                    continue;
                }
                let ends = cavity.edge_vertices(e).map(at);
                if ends == [a, b] || ends == [b, a] {
                    cavity.add(EdgeHandle::new(p, e));
                }
            }
            cavity.process(block)?;
            cavity.update_attributes(block, mesh.positions());
            let cavity = &*cavity;
            cavity.for_each_cavity(block, |c, size| {
                assert_eq!(size, 6);
                let center = star_fill(cavity, c, size)?;
                mesh.positions().set(center, mid);
                Ok(())
            })
        })
        .unwrap();
    assert_eq!(report.cavities, 1);
    assert_eq!(report.delta, [-1, -3, -2]);
    assert_consistent(&mesh);

    let (out, faces) = mesh.export().unwrap();
    let center = out.iter().position(|&p| bits(p) == bits(mid)).unwrap() as u32;
    let degree = edge_set(&faces)
        .iter()
        .filter(|&&(u, v)| u == center || v == center)
        .count();
    assert_eq!(degree, 6);
}

#[test]
fn ownership_moves_to_the_editing_patch() {
    let (mesh, (positions, _)) = two_patches();
    let owned_before = mesh.patch(0).num_owned(ElementKind::Face);
    let target = positions[5];
    mesh.edit::<VertexCavity, _>(|block, cavity| {
        let p = cavity.patch_id();
        for v in 0..cavity.slot_count(ElementKind::Vertex) {
            let h = VertexHandle::new(p, v);
            if cavity.is_owned(ElementKind::Vertex, v) && mesh.positions().get(h) == target {
                cavity.add(h);
            }
        }
        cavity.process(block)?;
        cavity.update_attributes(block, mesh.positions());
        let cavity = &*cavity;
        cavity.for_each_cavity(block, |c, size| fan_fill(cavity, c, size, 0))
    })
    .unwrap();

    // the refill and every face next to it live in patch 0 now
    let owned_after = mesh.patch(0).num_owned(ElementKind::Face);
    assert!(owned_after > owned_before);
    let total: usize = (0..mesh.num_patches())
        .map(|p| mesh.patch(p).num_owned(ElementKind::Face))
        .sum();
    assert_eq!(total, 18);
    assert!(mesh.reconcile().unwrap().is_clean());
}

#[test]
fn splits_on_many_patches_land_on_midpoints() {
    let (positions, faces) = icosphere(1);
    let mesh = DynamicMesh::from_triangles(&positions, &faces, small_patches(6)).unwrap();
    let midpoints: HashSet<[u64; 3]> = edge_set(&faces)
        .iter()
        .map(|&(u, v)| bits(centroid([positions[u as usize], positions[v as usize]])))
        .collect();

    let report = mesh.edit(split_kernel(&mesh, |_, e| e % 4 == 0)).unwrap();
    assert!(report.cavities > 0);
    let n = report.cavities as i64;
    assert_eq!(report.delta, [n, 3 * n, 2 * n]);
    assert_consistent(&mesh);

    let (out, _) = mesh.export().unwrap();
    let original: HashSet<[u64; 3]> = positions.iter().map(|&p| bits(p)).collect();
    let added: Vec<_> = out
        .iter()
        .map(|&p| bits(p))
        .filter(|p| !original.contains(p))
        .collect();
    assert_eq!(added.len() as i64, n);
    assert!(added.iter().all(|p| midpoints.contains(p)));
}

#[test]
fn vertex_removal_seeded_from_a_copy() {
    let (mesh, (positions, _)) = two_patches();
    let target = positions[5];
    let owned_at = |p: u32| {
        let info = mesh.patch(p);
        (0..info.num(ElementKind::Vertex)).find(|&v| {
            info.is_owned(ElementKind::Vertex, v)
                && mesh.positions().get(VertexHandle::new(p, v)) == target
        })
    };
    let owner_local = owned_at(0).unwrap();
    assert_eq!(owned_at(1), None);

    let report = mesh
        .edit_patches::<VertexCavity, _, _>([1], |block, cavity| {
            let p = cavity.patch_id();
            let first = cavity.find_copy_vertex(owner_local, 0)?;
            let second = cavity.find_copy_vertex(owner_local, 0)?;
            assert_eq!(first, second);
            let copy = first.expect("patch 1 holds a copy of the vertex");
            assert_eq!(copy.patch(), p);
            assert!(!cavity.is_owned(ElementKind::Vertex, copy.local()));
            cavity.add(copy);

            cavity.process(block)?;
            cavity.update_attributes(block, mesh.positions());
            let cavity = &*cavity;
            cavity.for_each_cavity(block, |c, size| {
                // each loop edge ends where the next one starts
                for i in 0..size {
                    let e = cavity.get_cavity_edge(c, i);
                    let [a, b] = cavity.edge_vertices(e.edge().local());
                    let head = if e.dir() { a } else { b };
                    assert_eq!(head, cavity.get_cavity_vertex(c, (i + 1) % size).local());
                }
                fan_fill(cavity, c, size, 0)
            })
        })
        .unwrap();
    assert_eq!(report.cavities, 1);
    assert_eq!(report.delta, [-1, -3, -2]);
    assert_eq!(owned_at(0), None);
    assert_eq!(owned_at(1), None);
    assert_consistent(&mesh);
}
