//! Flattening a patched mesh back into an indexed triangle list.

use crate::attribute::Attribute;
use crate::context::Context;
use crate::mesh_error::MeshError;
use crate::topology::handle::{ElementKind, Vertex};
use crate::topology::ownership::{PatchTable, resolve_owner};
use hashbrown::HashMap;

/// Positions and triangles of every owned element.
///
/// Vertices are numbered patch by patch in slot order. Triangle corners keep
/// the face orientation.
pub fn export(
    ctx: &Context,
    positions: &Attribute<Vertex, [f64; 3]>,
    max_hops: u32,
) -> Result<(Vec<[f64; 3]>, Vec<[u32; 3]>), MeshError> {
    let guards: Vec<_> = ctx.patches().iter().map(|slot| slot.read()).collect();
    let table = PatchTable::new(guards.iter().map(|g| &**g).collect());

    let mut number: HashMap<(u32, u16), u32> = HashMap::new();
    let mut coords = Vec::with_capacity(ctx.num_vertices() as usize);
    for info in table.iter() {
        let p = info.patch_id();
        let values = positions.patch(p);
        for v in 0..info.num(ElementKind::Vertex) {
            if info.is_owned(ElementKind::Vertex, v) {
                number.insert((p, v), coords.len() as u32);
                let value = values.get(v as usize).copied();
                coords.push(value.unwrap_or(*positions.default_value()));
            }
        }
    }

    let mut triangles = Vec::with_capacity(ctx.num_faces() as usize);
    let mut lookup = &table;
    for info in table.iter() {
        let p = info.patch_id();
        for f in 0..info.num(ElementKind::Face) {
            if !info.is_owned(ElementKind::Face, f) {
                continue;
            }
            let mut tri = [0u32; 3];
            for (corner, v) in tri.iter_mut().zip(info.face_vertices(f)) {
                let owner = resolve_owner(&mut lookup, ElementKind::Vertex, p, v, max_hops)
                    .map_err(|source| MeshError::DanglingCopy {
                        patch: p,
                        kind: ElementKind::Vertex,
                        local: v,
                        source,
                    })?;
                *corner = number[&owner];
            }
            triangles.push(tri);
        }
    }
    Ok((coords, triangles))
}
