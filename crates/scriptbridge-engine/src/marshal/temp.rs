//! Temporary function cache
//!
//! Ad hoc calls that were never registered still need a wrapper and a
//! signature. Wrappers are cached by signature key plus function address, so
//! two functions sharing a name and signature get separate wrappers. When the
//! cache reaches its limit it is cleared before the next insert. Callers keep
//! their `Arc`, so a clear never invalidates a wrapper in use.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::registry::FunctionEntry;

#[derive(Debug)]
pub(crate) struct TempFunctionCache {
    limit: usize,
    entries: Mutex<FxHashMap<String, Arc<FunctionEntry>>>,
}

impl TempFunctionCache {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Cached entry for `signature`, built with `make` on a miss.
    ///
    /// Returns the entry and whether the cache was cleared to make room.
    pub(crate) fn get_or_insert_with(
        &self,
        signature: &str,
        make: impl FnOnce() -> FunctionEntry,
    ) -> (Arc<FunctionEntry>, bool) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(signature) {
            return (entry.clone(), false);
        }

        let cleared = entries.len() >= self.limit;
        if cleared {
            entries.clear();
        }
        let entry = Arc::new(make());
        entries.insert(signature.to_string(), entry.clone());
        (entry, cleared)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
