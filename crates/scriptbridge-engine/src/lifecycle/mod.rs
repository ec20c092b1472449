//! Cross-engine object lifecycle
//!
//! From the bridge's side a native object is either unbound or bound to one
//! script wrapper per engine:
//!
//! ```text
//! Unbound ──link──> BoundToScript(engine, handle) ──unlink / destroyed──> Unbound
//! ```
//!
//! Destruction is only ever queued ([`notify_destroyed`]); the engine turns
//! queued addresses into `drop_wrapper` calls when it pumps.

pub(crate) mod engines;
pub(crate) mod unlink;

pub use engines::{is_live, live_engines, EngineId};
pub use unlink::notify_destroyed;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use scriptbridge_sdk::{ObjectAddr, ScriptHandle, ScriptHost};

use unlink::UnlinkQueue;

/// Address to wrapper table for one engine
#[derive(Debug, Default)]
pub(crate) struct ObjectBindings {
    map: Mutex<FxHashMap<ObjectAddr, ScriptHandle>>,
}

impl ObjectBindings {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bind, returning any previous handle
    pub(crate) fn link(&self, addr: ObjectAddr, handle: ScriptHandle) -> Option<ScriptHandle> {
        self.map.lock().insert(addr, handle)
    }

    pub(crate) fn unlink(&self, addr: ObjectAddr) -> Option<ScriptHandle> {
        self.map.lock().remove(&addr)
    }

    pub(crate) fn get(&self, addr: ObjectAddr) -> Option<ScriptHandle> {
        self.map.lock().get(&addr).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }
}

/// Drain `queue` in batches of `batch_size`, unbinding each address and
/// handing it to the host. Returns the number of addresses delivered.
pub(crate) fn drain(
    queue: &UnlinkQueue,
    bindings: &ObjectBindings,
    host: &dyn ScriptHost,
    batch_size: usize,
) -> usize {
    let batch_size = batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size.min(queue.len().max(1)));
    let mut delivered = 0;

    while queue.pop_batch(&mut batch, batch_size) > 0 {
        for addr in batch.drain(..) {
            let handle = bindings.unlink(addr);
            host.drop_wrapper(addr, handle);
            delivered += 1;
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptbridge_sdk::{DispatchStatus, OverrideCall};

    #[derive(Default)]
    struct CountingHost {
        dropped: Mutex<Vec<(ObjectAddr, Option<ScriptHandle>)>>,
    }

    impl ScriptHost for CountingHost {
        fn dispatch(&self, _call: &OverrideCall<'_>) -> DispatchStatus {
            DispatchStatus::NotImplemented
        }

        fn drop_wrapper(&self, object: ObjectAddr, script: Option<ScriptHandle>) {
            self.dropped.lock().push((object, script));
        }
    }

    #[test]
    fn test_link_unlink() {
        let bindings = ObjectBindings::new();
        assert_eq!(bindings.link(ObjectAddr(1), ScriptHandle(10)), None);
        assert_eq!(bindings.link(ObjectAddr(1), ScriptHandle(11)), Some(ScriptHandle(10)));
        assert_eq!(bindings.get(ObjectAddr(1)), Some(ScriptHandle(11)));
        assert_eq!(bindings.unlink(ObjectAddr(1)), Some(ScriptHandle(11)));
        assert_eq!(bindings.len(), 0);
    }

    #[test]
    fn test_drain_in_small_batches() {
        let queue = UnlinkQueue::new();
        let bindings = ObjectBindings::new();
        let host = CountingHost::default();

        bindings.link(ObjectAddr(0x20), ScriptHandle(2));
        for i in 0..7 {
            queue.push(ObjectAddr(0x10 * (i + 1)));
        }

        assert_eq!(drain(&queue, &bindings, &host, 2), 7);
        let dropped = host.dropped.lock();
        assert_eq!(dropped.len(), 7);
        assert_eq!(dropped[0], (ObjectAddr(0x10), None));
        assert_eq!(dropped[1], (ObjectAddr(0x20), Some(ScriptHandle(2))));
        assert_eq!(bindings.len(), 0);
        assert_eq!(queue.len(), 0);
    }
}
