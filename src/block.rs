//! Cooperative groups.
//!
//! A [`Block`] stands for the group of workers bound to one patch. Work inside
//! a phase is expressed as stride loops over element indices; the loops fan
//! out over the rayon pool once they are long enough to be worth splitting.
//! Consecutive phases are separated with [`Block::sync`].

use rayon::prelude::*;
use std::sync::atomic::{Ordering, fence};

#[derive(Clone, Copy, Debug)]
pub struct Block {
    threads: usize,
}

impl Default for Block {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Block {
    /// A block of `threads` cooperating workers (at least one).
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `f(i)` for every `i` in `0..n`.
    ///
    /// Iterations run concurrently; `f` must only write through atomics or to
    /// locations no other iteration touches.
    pub fn stride<F>(&self, n: usize, f: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        if n <= self.threads {
            (0..n).for_each(f);
        } else {
            (0..n)
                .into_par_iter()
                .with_min_len(self.threads)
                .for_each(f);
        }
    }

    /// Run `f(i)` for every `i` in `0..n` and collect the results in order.
    pub fn map<R, F>(&self, n: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Send + Sync,
    {
        if n <= self.threads {
            (0..n).map(f).collect()
        } else {
            (0..n)
                .into_par_iter()
                .with_min_len(self.threads)
                .map(f)
                .collect()
        }
    }

    /// Block-wide barrier: every write issued before the call is visible to
    /// every read issued after it.
    #[inline]
    pub fn sync(&self) {
        fence(Ordering::SeqCst);
    }

    /// Exclusive prefix sum of `counts`. The returned vector has one more
    /// entry than `counts`; its last entry is the total.
    pub fn exclusive_sum(&self, counts: &[u32]) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        let mut acc = 0u32;
        offsets.push(0);
        for &c in counts {
            acc += c;
            offsets.push(acc);
        }
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn stride_visits_every_index_once() {
        let block = Block::new(8);
        let hits: Vec<AtomicUsize> = (0..1000).map(|_| AtomicUsize::new(0)).collect();
        block.stride(hits.len(), |i| {
            hits[i].fetch_add(1, Ordering::Relaxed);
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn map_keeps_order() {
        let block = Block::new(4);
        let squares = block.map(100, |i| i * i);
        assert_eq!(squares[7], 49);
        assert_eq!(squares.len(), 100);
    }

    #[test]
    fn exclusive_sum_has_total() {
        let block = Block::default();
        assert_eq!(block.exclusive_sum(&[3, 0, 2]), vec![0, 3, 3, 5]);
        assert_eq!(block.exclusive_sum(&[]), vec![0]);
    }
}
