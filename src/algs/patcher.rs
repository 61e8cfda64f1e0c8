//! Face partitioning by breadth-first region growing.

use std::collections::VecDeque;

/// Assign every face to a patch of at most `patch_size` faces.
///
/// `neighbors[f]` lists the faces sharing an edge with `f`. Patches are grown
/// breadth-first from the lowest unassigned face, so patch ids follow face
/// order and every patch but the last of each connected component is full.
pub fn grow_patches(neighbors: &[Vec<u32>], patch_size: usize) -> Vec<u32> {
    let n = neighbors.len();
    let patch_size = patch_size.max(1);
    let mut part = vec![u32::MAX; n];
    let mut queue = VecDeque::new();
    let mut next = 0u32;
    for seed in 0..n {
        if part[seed] != u32::MAX {
            continue;
        }
        let id = next;
        next += 1;
        let mut size = 0usize;
        queue.clear();
        queue.push_back(seed);
        part[seed] = id;
        while let Some(f) = queue.pop_front() {
            size += 1;
            if size == patch_size {
                break;
            }
            for &g in &neighbors[f] {
                let g = g as usize;
                if part[g] == u32::MAX && size + queue.len() < patch_size {
                    part[g] = id;
                    queue.push_back(g);
                }
            }
        }
    }
    part
}

/// Number of patches in a face-to-patch assignment.
pub fn num_patches(part: &[u32]) -> u32 {
    part.iter().copied().max().map_or(0, |p| p + 1)
}
