//! Process-wide list of live engines
//!
//! Engines enter the list when a [`ScriptRuntime`](crate::ScriptRuntime) is
//! created and leave it first thing on drop, before their tables are
//! restored. Lookups upgrade a weak reference and release the lock at once, so
//! no caller ever runs engine code while holding it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::runtime::RuntimeInner;

/// Unique identifier for a script engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(u64);

impl EngineId {
    /// Create a new unique engine ID
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        EngineId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn from_u64(raw: u64) -> Self {
        EngineId(raw)
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

static LIVE_ENGINES: Lazy<RwLock<FxHashMap<EngineId, Weak<RuntimeInner>>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

pub(crate) fn register(id: EngineId, runtime: Weak<RuntimeInner>) {
    LIVE_ENGINES.write().insert(id, runtime);
}

pub(crate) fn unregister(id: EngineId) {
    LIVE_ENGINES.write().remove(&id);
}

/// Strong reference to a live engine
pub(crate) fn lookup(id: EngineId) -> Option<Arc<RuntimeInner>> {
    LIVE_ENGINES.read().get(&id).and_then(Weak::upgrade)
}

/// Engine is still in the live list
pub fn is_live(id: EngineId) -> bool {
    LIVE_ENGINES.read().contains_key(&id)
}

/// IDs of all live engines
pub fn live_engines() -> Vec<EngineId> {
    let mut ids: Vec<EngineId> = LIVE_ENGINES.read().keys().copied().collect();
    ids.sort();
    ids
}

/// Run `f` for every live engine while holding the list's read lock.
///
/// `f` must not call back into engine code.
pub(crate) fn for_each_live(mut f: impl FnMut(&RuntimeInner)) {
    let engines = LIVE_ENGINES.read();
    for runtime in engines.values().filter_map(Weak::upgrade) {
        f(&runtime);
    }
}
