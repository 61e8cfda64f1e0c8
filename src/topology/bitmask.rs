//! Fixed-capacity atomic bitset.
//!
//! `Bitmask` backs every "active", "owned", "deleted" and "live cavity" set of
//! the engine. Words are `AtomicU32`, so single-bit updates are safe from
//! concurrent stride-loop iterations; the collective operations take the
//! [`Block`] that performs them and leave synchronisation to the caller.

use crate::block::Block;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

const WORD_BITS: usize = 32;

pub struct Bitmask {
    words: Box<[AtomicU32]>,
    len: usize,
}

impl Bitmask {
    /// An all-zero mask of `len` bits.
    pub fn new(len: usize) -> Self {
        let words = (0..len.div_ceil(WORD_BITS))
            .map(|_| AtomicU32::new(0))
            .collect();
        Self { words, len }
    }

    /// A mask with bits `0..len` set from an iterator of indices.
    pub fn from_indices<I: IntoIterator<Item = usize>>(len: usize, indices: I) -> Self {
        let mask = Self::new(len);
        for i in indices {
            mask.set(i);
        }
        mask
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn locate(&self, i: usize) -> (usize, u32) {
        debug_assert!(i < self.len, "bit {i} out of range for mask of {}", self.len);
        (i / WORD_BITS, 1u32 << (i % WORD_BITS))
    }

    /// Test bit `i`.
    #[inline]
    pub fn get(&self, i: usize) -> bool {
        let (w, bit) = self.locate(i);
        self.words[w].load(Ordering::Acquire) & bit != 0
    }

    #[inline]
    pub fn set(&self, i: usize) {
        let (w, bit) = self.locate(i);
        self.words[w].fetch_or(bit, Ordering::AcqRel);
    }

    #[inline]
    pub fn reset(&self, i: usize) {
        let (w, bit) = self.locate(i);
        self.words[w].fetch_and(!bit, Ordering::AcqRel);
    }

    /// Set bit `i`; returns `true` if this call flipped it from 0 to 1.
    #[inline]
    pub fn try_set(&self, i: usize) -> bool {
        let (w, bit) = self.locate(i);
        self.words[w].fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    #[inline]
    pub fn assign(&self, i: usize, value: bool) {
        if value {
            self.set(i)
        } else {
            self.reset(i)
        }
    }

    /// Collectively clear every bit.
    pub fn clear(&self, block: &Block) {
        block.stride(self.words.len(), |w| {
            self.words[w].store(0, Ordering::Relaxed);
        });
    }

    /// Collectively set every bit in `0..len`.
    pub fn fill(&self, block: &Block) {
        let last = self.words.len().saturating_sub(1);
        let tail = self.len % WORD_BITS;
        block.stride(self.words.len(), |w| {
            let value = if w == last && tail != 0 {
                (1u32 << tail) - 1
            } else {
                u32::MAX
            };
            self.words[w].store(value, Ordering::Relaxed);
        });
    }

    /// Overwrite this mask with `other`, which must have the same length.
    pub fn copy_from(&self, other: &Bitmask) {
        assert_eq!(self.len, other.len, "bitmask length mismatch");
        for (dst, src) in self.words.iter().zip(other.words.iter()) {
            dst.store(src.load(Ordering::Acquire), Ordering::Release);
        }
    }

    /// A copy of this mask with `len` bits; bits past the old length are 0,
    /// bits past the new one are dropped.
    pub fn resized(&self, len: usize) -> Bitmask {
        let out = Bitmask::new(len);
        for (dst, src) in out.words.iter().zip(self.words.iter()) {
            dst.store(src.load(Ordering::Acquire), Ordering::Relaxed);
        }
        let tail = len % WORD_BITS;
        if tail != 0 && len < self.len {
            if let Some(last) = out.words.last() {
                last.fetch_and((1u32 << tail) - 1, Ordering::Relaxed);
            }
        }
        out
    }

    pub fn count_ones(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Acquire).count_ones() as usize)
            .sum()
    }

    /// Indices of the set bits, ascending.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(move |(w, word)| {
            let mut bits = word.load(Ordering::Acquire);
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(w * WORD_BITS + tz)
            })
        })
    }
}

impl Clone for Bitmask {
    fn clone(&self) -> Self {
        let words = self
            .words
            .iter()
            .map(|w| AtomicU32::new(w.load(Ordering::Acquire)))
            .collect();
        Self {
            words,
            len: self.len,
        }
    }
}

impl PartialEq for Bitmask {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self
                .words
                .iter()
                .zip(other.words.iter())
                .all(|(a, b)| a.load(Ordering::Acquire) == b.load(Ordering::Acquire))
    }
}

impl Eq for Bitmask {}

impl fmt::Debug for Bitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmask")
            .field("len", &self.len)
            .field("ones", &self.count_ones())
            .finish()
    }
}
