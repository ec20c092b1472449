//! Unlink queue
//!
//! Each engine owns one queue. Any thread may push; only the engine drains,
//! from its pump point. The queue grows instead of pushing back, so a burst of
//! destructions never blocks the destroying thread.

use crossbeam::queue::SegQueue;
use scriptbridge_sdk::ObjectAddr;

use super::engines;

/// Pending destroyed-object addresses for one engine
#[derive(Debug, Default)]
pub(crate) struct UnlinkQueue {
    queue: SegQueue<ObjectAddr>,
}

impl UnlinkQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, addr: ObjectAddr) {
        self.queue.push(addr);
    }

    /// Move up to `max` addresses into `batch`, oldest first
    pub(crate) fn pop_batch(&self, batch: &mut Vec<ObjectAddr>, max: usize) -> usize {
        let mut taken = 0;
        while taken < max {
            match self.queue.pop() {
                Some(addr) => {
                    batch.push(addr);
                    taken += 1;
                }
                None => break,
            }
        }
        taken
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Report that a native object was destroyed.
///
/// Safe to call from any thread. The address is queued into every live
/// engine; each engine drops its wrapper on its next pump.
pub fn notify_destroyed(addr: ObjectAddr) {
    engines::for_each_live(|runtime| runtime.unlink.push(addr));
}
