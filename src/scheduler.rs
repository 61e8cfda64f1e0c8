//! Work queue of patch ids awaiting an edit pass.

use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct PatchScheduler {
    queue: Mutex<VecDeque<u32>>,
}

impl PatchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue contents with `patches`.
    pub fn fill<I: IntoIterator<Item = u32>>(&self, patches: I) {
        let mut q = self.queue.lock();
        q.clear();
        q.extend(patches);
    }

    pub fn push(&self, patch: u32) {
        self.queue.lock().push_back(patch);
    }

    pub fn pop(&self) -> Option<u32> {
        self.queue.lock().pop_front()
    }

    /// Take every queued id, in queue order.
    pub fn drain(&self) -> Vec<u32> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let s = PatchScheduler::new();
        s.fill([3, 1]);
        s.push(7);
        assert_eq!(s.pop(), Some(3));
        assert_eq!(s.drain(), vec![1, 7]);
        assert!(s.is_empty());
    }
}
