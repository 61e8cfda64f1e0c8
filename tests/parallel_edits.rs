mod util;

use patch_cavity::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use util::*;

fn face_split_kernel<'m>(
    mesh: &'m DynamicMesh,
    pick: impl Fn(u32, u16) -> bool + Send + Sync + 'm,
) -> impl Fn(&Block, &mut Cavity<'_, FaceCavity>) -> Result<(), CavityError> + Send + Sync + 'm {
    move |block, cavity| {
        let p = cavity.patch_id();
        for f in 0..cavity.slot_count(ElementKind::Face) {
            if cavity.is_owned(ElementKind::Face, f) && pick(p, f) {
                cavity.add(FaceHandle::new(p, f));
            }
        }
        cavity.process(block)?;
        cavity.update_attributes(block, mesh.positions());
        let cavity = &*cavity;
        cavity.for_each_cavity(block, |c, size| {
            let corners = (0..size)
                .map(|i| mesh.positions().get(cavity.get_cavity_vertex(c, i)))
                .collect::<Vec<_>>();
            let center = star_fill(cavity, c, size)?;
            mesh.positions().set(center, centroid(corners));
            Ok(())
        })
    }
}

#[test]
fn mixed_edits_over_many_patches() {
    let (positions, faces) = icosphere(2);
    let config = DynamicConfig {
        capacity_factor: 4.0,
        ..small_patches(16)
    };
    let mesh = DynamicMesh::from_triangles(&positions, &faces, config).unwrap();
    assert!(mesh.num_patches() >= 16);
    let mut rng = SmallRng::seed_from_u64(7);

    for step in 0..6 {
        let salt = rng.r#gen::<u64>();
        let before = [mesh.num_vertices(), mesh.num_edges(), mesh.num_faces()];
        let report = match step % 3 {
            0 => mesh.edit(split_kernel(&mesh, sparse(salt, 5))),
            1 => mesh.edit(flip_kernel(&mesh, sparse(salt, 4))),
            _ => mesh.edit(face_split_kernel(&mesh, sparse(salt, 6))),
        }
        .unwrap();
        let after = [mesh.num_vertices(), mesh.num_edges(), mesh.num_faces()];
        for k in 0..3 {
            assert_eq!(after[k] as i64 - before[k] as i64, report.delta[k], "step {step}");
        }
        assert_consistent(&mesh);
        assert!(mesh.reconcile().unwrap().is_clean(), "step {step}");
    }
}

#[test]
fn every_patch_edited_in_one_call() {
    let (positions, faces) = icosphere(2);
    let mesh = DynamicMesh::from_triangles(&positions, &faces, small_patches(12)).unwrap();
    // one face per patch, all at once
    let report = mesh
        .edit(face_split_kernel(&mesh, |_, f| f == 0))
        .unwrap();
    // a retried patch may have lost its face 0 to a neighbor
    assert_eq!(report.commits, mesh.num_patches());
    assert!(report.cavities >= 1 && report.cavities <= mesh.num_patches());
    let n = report.cavities as i64;
    assert_eq!(report.delta, [n, 3 * n, 2 * n]);
    assert_consistent(&mesh);
}

#[test]
fn conflicting_seeds_keep_the_lower_cavity() {
    let (positions, faces) = icosahedron();
    let config = DynamicConfig {
        capacity_factor: 8.0,
        ..Default::default()
    };
    let mesh = DynamicMesh::from_triangles(&positions, &faces, config).unwrap();
    // every face seeded, neighboring faces share edges but face cavities do
    // not overlap, so all of them survive
    let report = mesh.edit(face_split_kernel(&mesh, |_, _| true)).unwrap();
    assert_eq!(report.cavities, 20);
    assert_consistent(&mesh);

    // every edge seeded: edge cavities share faces, so only a matching
    // survives
    let report = mesh.edit(split_kernel(&mesh, |_, _| true)).unwrap();
    assert!(report.cavities > 0);
    assert!(report.cavities <= 30, "each cavity takes two of 60 faces");
    assert_consistent(&mesh);
}

#[test]
fn adjacent_vertex_seeds_keep_the_lower_id() {
    let (positions, faces) = icosahedron();
    let mesh = DynamicMesh::from_triangles(&positions, &faces, DynamicConfig::default()).unwrap();
    assert_eq!(mesh.num_patches(), 1);
    let [a, b] = mesh.patch(0).edge_vertices(0);

    let report = mesh
        .edit::<VertexCavity, _>(|block, cavity| {
            assert_eq!(cavity.add(VertexHandle::new(0, a)), Some(0));
            assert_eq!(cavity.add(VertexHandle::new(0, b)), Some(1));
            cavity.process(block)?;
            assert_eq!(cavity.live_cavities().collect::<Vec<_>>(), vec![0]);
            assert!(!cavity.is_live(1));
            assert_eq!(cavity.cavity_size(0), 5);

            // exactly the star of `a` is gone, all of it under cavity 0
            let deleted = |kind: ElementKind| {
                (0..cavity.slot_count(kind))
                    .filter(|&l| match kind {
                        ElementKind::Vertex => cavity.is_deleted(VertexHandle::new(0, l)),
                        ElementKind::Edge => cavity.is_deleted(EdgeHandle::new(0, l)),
                        ElementKind::Face => cavity.is_deleted(FaceHandle::new(0, l)),
                    })
                    .collect::<Vec<_>>()
            };
            assert_eq!(deleted(ElementKind::Vertex), vec![a]);
            assert_eq!(deleted(ElementKind::Edge).len(), 5);
            assert_eq!(deleted(ElementKind::Face).len(), 5);
            for e in deleted(ElementKind::Edge) {
                assert_eq!(cavity.cavity_of(EdgeHandle::new(0, e)), Some(0));
                assert!(cavity.edge_vertices(e).contains(&a));
            }
            for f in deleted(ElementKind::Face) {
                assert_eq!(cavity.cavity_of(FaceHandle::new(0, f)), Some(0));
            }
            assert!(!cavity.is_deleted(VertexHandle::new(0, b)));
            assert_eq!(cavity.cavity_of(VertexHandle::new(0, b)), None);

            cavity.update_attributes(block, mesh.positions());
            let cavity = &*cavity;
            cavity.for_each_cavity(block, |c, size| fan_fill(cavity, c, size, 0))
        })
        .unwrap();
    assert_eq!(report.cavities, 1);
    assert_eq!(report.delta, [-1, -3, -2]);
    assert_consistent(&mesh);
}

#[test]
fn patches_grow_as_ownership_piles_up() {
    let (positions, faces) = icosphere(2);
    // no spare slots at all: every new element needs a grown patch
    let config = DynamicConfig {
        capacity_factor: 1.0,
        ..small_patches(12)
    };
    let mesh = DynamicMesh::from_triangles(&positions, &faces, config).unwrap();
    let capacity = |p: u32| {
        let info = mesh.patch(p);
        ElementKind::ALL.map(|kind| info.capacity(kind))
    };
    let initial: Vec<_> = (0..mesh.num_patches()).map(capacity).collect();

    for step in 0..12u64 {
        let report = if step % 2 == 0 {
            mesh.edit(split_kernel(&mesh, sparse(step, 25)))
        } else {
            mesh.edit(flip_kernel(&mesh, sparse(step, 40)))
        }
        .unwrap();
        if step % 2 == 1 {
            assert_eq!(report.delta, [0, 0, 0], "step {step}");
        }
        assert_consistent(&mesh);
    }

    let grown = (0..mesh.num_patches())
        .filter(|&p| {
            let now = capacity(p);
            (0..3).any(|k| now[k] > initial[p as usize][k])
        })
        .count();
    assert!(grown > 0);
    for p in 0..mesh.num_patches() {
        let info = mesh.patch(p);
        for kind in ElementKind::ALL {
            assert!(info.num(kind) <= info.capacity(kind));
        }
    }
}

#[test]
fn refill_past_its_reserve_fails_cleanly() {
    let (positions, faces) = icosphere(1);
    let config = DynamicConfig {
        capacity_factor: 1.0,
        ..small_patches(10)
    };
    let mesh = DynamicMesh::from_triangles(&positions, &faces, config).unwrap();
    let before = surface(mesh.export().unwrap());
    let limit = u16::MAX as usize;
    let err = mesh
        .edit::<FaceCavity, _>(|block, cavity| {
            let p = cavity.patch_id();
            if let Some(f) = (0..cavity.slot_count(ElementKind::Face))
                .find(|&f| cavity.is_owned(ElementKind::Face, f))
            {
                cavity.add(FaceHandle::new(p, f));
            }
            cavity.process(block)?;
            let cavity = &*cavity;
            // far more vertices than any patch can hold
            cavity.for_each_cavity(block, |c, _| {
                for _ in 0..limit {
                    cavity.add_vertex(c)?;
                }
                Ok(())
            })
        })
        .unwrap_err();
    assert!(matches!(
        err,
        MeshError::Cavity {
            source: CavityError::CapacityExhausted {
                kind: ElementKind::Vertex,
                ..
            },
            ..
        }
    ));
    assert_consistent(&mesh);
    assert_eq!(surface(mesh.export().unwrap()), before);
}

#[test]
fn reserve_makes_room_for_a_larger_refill() {
    let (positions, faces) = icosahedron();
    let config = DynamicConfig {
        capacity_factor: 1.0,
        ..Default::default()
    };
    let mesh = DynamicMesh::from_triangles(&positions, &faces, config).unwrap();
    assert_eq!(mesh.num_patches(), 1);
    let initial = ElementKind::ALL.map(|kind| mesh.patch(0).capacity(kind));
    let report = mesh
        .edit::<FaceCavity, _>(|block, cavity| {
            cavity.add(FaceHandle::new(0, 0));
            cavity.process(block)?;
            for kind in ElementKind::ALL {
                cavity.reserve(kind, 8)?;
            }
            cavity.update_attributes(block, mesh.positions());
            let cavity = &*cavity;
            cavity.for_each_cavity(block, |c, size| {
                let corners = (0..size)
                    .map(|i| mesh.positions().get(cavity.get_cavity_vertex(c, i)))
                    .collect::<Vec<_>>();
                let center = star_fill(cavity, c, size)?;
                mesh.positions().set(center, centroid(corners));
                Ok(())
            })
        })
        .unwrap();
    assert_eq!(report.cavities, 1);
    assert_eq!(report.delta, [1, 3, 2]);
    let grown = ElementKind::ALL.map(|kind| mesh.patch(0).capacity(kind));
    for k in 0..3 {
        assert!(grown[k] > initial[k], "{grown:?} {initial:?}");
    }
    assert_consistent(&mesh);
}

#[test]
fn repeated_splits_grow_the_mesh() {
    let (positions, faces) = icosahedron();
    let config = DynamicConfig {
        capacity_factor: 8.0,
        ..small_patches(4)
    };
    let mesh = DynamicMesh::from_triangles(&positions, &faces, config).unwrap();
    let mut rng = SmallRng::seed_from_u64(42);
    let mut total = 0;
    for _ in 0..4 {
        let report = mesh
            .edit(split_kernel(&mesh, sparse(rng.r#gen(), 3)))
            .unwrap();
        total += report.cavities;
        assert_consistent(&mesh);
    }
    assert_eq!(mesh.num_faces(), 20 + 2 * total);
}
