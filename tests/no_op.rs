mod util;

use patch_cavity::prelude::*;
use util::*;

fn mesh(patch_size: usize) -> (DynamicMesh, Mesh) {
    let input = icosphere(1);
    let mesh = DynamicMesh::from_triangles(&input.0, &input.1, small_patches(patch_size)).unwrap();
    (mesh, input)
}

#[test]
fn kernel_without_seeds_commits_nothing() {
    let (mesh, (positions, faces)) = mesh(12);
    let report = mesh
        .edit::<FaceCavity, _>(|block, cavity| {
            cavity.process(block)?;
            cavity.for_each_cavity(block, |_, _| Ok(()))
        })
        .unwrap();
    assert_eq!(report.cavities, 0);
    assert_eq!(report.delta, [0, 0, 0]);
    assert_eq!(report.retries, 0);
    assert_eq!(report.rounds, 1);
    let (out_positions, out_faces) = mesh.export().unwrap();
    assert_eq!(out_positions.len(), positions.len());
    assert_eq!(out_faces.len(), faces.len());
    assert!(mesh.reconcile().unwrap().is_clean());
}

#[test]
fn kernel_that_never_processes_is_dropped() {
    let (mesh, _) = mesh(12);
    let before = mesh.export().unwrap();
    let report = mesh
        .edit::<VertexCavity, _>(|_, cavity| {
            let p = cavity.patch_id();
            cavity.add(VertexHandle::new(p, 0));
            Ok(())
        })
        .unwrap();
    assert_eq!(report.cavities, 0);
    assert_eq!(mesh.export().unwrap(), before);
}

#[test]
fn refilling_faces_with_themselves_keeps_the_surface() {
    let (mesh, _) = mesh(16);
    let before = surface(mesh.export().unwrap());
    let report = mesh
        .edit::<FaceCavity, _>(|block, cavity| {
            let p = cavity.patch_id();
            for f in 0..cavity.slot_count(ElementKind::Face) {
                if cavity.is_owned(ElementKind::Face, f) {
                    cavity.add(FaceHandle::new(p, f));
                }
            }
            cavity.process(block)?;
            cavity.update_attributes(block, mesh.positions());
            let cavity = &*cavity;
            cavity.for_each_cavity(block, |c, size| {
                assert_eq!(size, 3);
                fan_fill(cavity, c, size, 0)
            })
        })
        .unwrap();
    assert!(report.cavities > 0);
    assert_eq!(report.delta, [0, 0, 0]);
    assert_consistent(&mesh);
    // vertex numbering follows ownership, which may have moved
    assert_eq!(surface(mesh.export().unwrap()), before);
}

#[test]
fn failing_kernel_leaves_the_mesh_untouched() {
    let (mesh, _) = mesh(16);
    let before = mesh.export().unwrap();
    let err = mesh
        .edit::<EdgeCavity, _>(|block, cavity| {
            let p = cavity.patch_id();
            cavity.add(EdgeHandle::new(p, 0));
            cavity.process(block)?;
            Err(CavityError::Kernel("refused".into()))
        })
        .unwrap_err();
    assert!(matches!(
        err,
        MeshError::Cavity {
            source: CavityError::Kernel(_),
            ..
        }
    ));
    assert_eq!(mesh.export().unwrap(), before);
    assert_consistent(&mesh);
}
