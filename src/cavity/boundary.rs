//! Boundary loops.
//!
//! The boundary of a cavity is the set of edges of its faces that the cavity
//! itself did not tag, each taken in the direction its cavity face walks it.
//! Edges are gathered into one contiguous range per cavity (count, prefix
//! sum, scatter) and then chained into a loop starting at the smallest edge
//! word. A cavity whose edges do not form one simple closed loop is put back.

use super::{Cavity, CavityOp};
use crate::block::Block;
use crate::topology::bitmask::Bitmask;
use crate::topology::handle::{ElementKind, INVALID16, pack_edge_dir, unpack_edge_dir};
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

/// Chain boundary edge words into a simple closed loop.
///
/// `ends` maps an edge id to its stored vertex pair. Returns `None` when the
/// edges do not close, branch, or revisit a vertex.
pub(crate) fn chain_loop(words: &[u16], ends: impl Fn(u16) -> [u16; 2]) -> Option<Vec<u16>> {
    if words.len() < 3 {
        return None;
    }
    let walk = |word: u16| {
        let (e, dir) = unpack_edge_dir(word);
        let [a, b] = ends(e);
        if dir { (b, a) } else { (a, b) }
    };
    let mut pool = words.to_vec();
    pool.sort_unstable();
    let mut used = vec![false; pool.len()];
    let mut out = Vec::with_capacity(pool.len());
    let (start, mut head) = walk(pool[0]);
    let mut visited = vec![start];
    used[0] = true;
    out.push(pool[0]);
    for _ in 1..pool.len() {
        let next = (0..pool.len()).find(|&i| !used[i] && walk(pool[i]).0 == head)?;
        let (src, dst) = walk(pool[next]);
        if visited.contains(&src) {
            return None;
        }
        visited.push(src);
        used[next] = true;
        out.push(pool[next]);
        head = dst;
    }
    (head == start).then_some(out)
}

impl<O: CavityOp> Cavity<'_, O> {
    pub(super) fn construct_loops(&mut self, block: &Block) {
        let n = self.num_cavities() as usize;
        let s = &self.s;
        let num_faces = s.num(ElementKind::Face) as usize;

        let counts: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
        block.stride(num_faces, |f| {
            let c = s.tag(ElementKind::Face, f as u16);
            if c == INVALID16 {
                return;
            }
            for (e, _) in s.face_edges(f as u16) {
                if s.tag(ElementKind::Edge, e) != c {
                    counts[c as usize].fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        block.sync();

        let counts: Vec<u32> = counts.iter().map(|c| c.load(Ordering::Acquire)).collect();
        let offsets = block.exclusive_sum(&counts);
        let cursor: Vec<AtomicU32> = offsets[..n].iter().map(|&o| AtomicU32::new(o)).collect();
        let slots: Vec<AtomicU16> = (0..offsets[n]).map(|_| AtomicU16::new(INVALID16)).collect();
        block.stride(num_faces, |f| {
            let c = s.tag(ElementKind::Face, f as u16);
            if c == INVALID16 {
                return;
            }
            for (e, dir) in s.face_edges(f as u16) {
                if s.tag(ElementKind::Edge, e) != c {
                    let at = cursor[c as usize].fetch_add(1, Ordering::AcqRel);
                    slots[at as usize].store(pack_edge_dir(e, dir), Ordering::Release);
                }
            }
        });
        block.sync();

        let mut words: Vec<u16> = slots.iter().map(|w| w.load(Ordering::Acquire)).collect();
        let loops = block.map(n, |c| {
            if !self.active_cavity.get(c) {
                return None;
            }
            let range = offsets[c] as usize..offsets[c + 1] as usize;
            chain_loop(&words[range], |e| s.edge_vertices(e))
        });

        let failed = Bitmask::new(n);
        for (c, chain) in loops.into_iter().enumerate() {
            match chain {
                Some(chain) => {
                    let start = offsets[c] as usize;
                    words[start..start + chain.len()].copy_from_slice(&chain);
                }
                None if self.active_cavity.get(c) => {
                    failed.set(c);
                    self.deactivate(c as u16);
                }
                None => {}
            }
        }
        if failed.count_ones() > 0 {
            self.restore(block, &failed);
            block.sync();
        }
        self.loop_offsets = offsets;
        self.loop_edges = words;
    }

    /// Put back every element removed by a cavity in `failed`.
    fn restore(&self, block: &Block, failed: &Bitmask) {
        for kind in ElementKind::ALL {
            let k = kind.index();
            block.stride(self.s.num(kind) as usize, |i| {
                let c = self.s.tag(kind, i as u16);
                if c != INVALID16 && failed.get(c as usize) {
                    self.s.active[k].set(i);
                    self.s.deleted[k].reset(i);
                    self.s.set_tag(kind, i as u16, INVALID16);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // edges 0:(0,1) 1:(1,2) 2:(2,0) 3:(2,3)
    fn ends(e: u16) -> [u16; 2] {
        [[0, 1], [1, 2], [2, 0], [2, 3]][e as usize]
    }

    #[test]
    fn chains_a_triangle_from_the_smallest_word() {
        let words = [pack_edge_dir(2, false), pack_edge_dir(0, false), pack_edge_dir(1, false)];
        let chain = chain_loop(&words, ends).unwrap();
        assert_eq!(
            chain,
            vec![pack_edge_dir(0, false), pack_edge_dir(1, false), pack_edge_dir(2, false)]
        );
    }

    #[test]
    fn follows_reversed_edges() {
        // walk 0 -> 2 -> 1 -> 0
        let words = [pack_edge_dir(0, true), pack_edge_dir(1, true), pack_edge_dir(2, true)];
        let chain = chain_loop(&words, ends).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0], pack_edge_dir(0, true));
    }

    #[test]
    fn rejects_open_and_short_chains() {
        let open = [pack_edge_dir(0, false), pack_edge_dir(1, false), pack_edge_dir(3, false)];
        assert!(chain_loop(&open, ends).is_none());
        assert!(chain_loop(&[pack_edge_dir(0, false)], ends).is_none());
    }
}
