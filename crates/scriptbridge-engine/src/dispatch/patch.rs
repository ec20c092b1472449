//! Per-engine patched table bookkeeping
//!
//! Two caches, matching the two ways an object reaches the bridge:
//!
//! - native-created objects: keyed by original table address. Native tables of
//!   one build sit next to each other, so the next registered original above a
//!   new one bounds how many slots belong to it.
//! - engine-created objects: keyed by class entry. Interface-only classes may
//!   share one original table between unrelated classes, so the original is no
//!   safe key there.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::mem::size_of;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::arena::MAX_TABLE_SLOTS;
use super::table::{self, TablePtr};
use crate::lifecycle::{engines, EngineId};
use crate::registry::{ClassEntry, ClassId, ClassRegistry};

const WORD: usize = size_of::<usize>();

#[derive(Debug, Clone, Copy)]
struct PatchRecord {
    table: usize,
    /// Slots copied from the original
    copied: usize,
    /// Recursion level the table was built at (engine-created path only)
    level: u32,
}

impl PatchRecord {
    fn table(&self) -> TablePtr {
        self.table as TablePtr
    }
}

#[derive(Debug, Default)]
struct PatchState {
    by_original: BTreeMap<usize, PatchRecord>,
    by_class: FxHashMap<ClassId, PatchRecord>,
}

/// Patched tables built by one engine
#[derive(Debug)]
pub(crate) struct Patcher {
    engine: EngineId,
    state: Mutex<PatchState>,
}

impl Patcher {
    pub(crate) fn new(engine: EngineId) -> Self {
        Self {
            engine,
            state: Mutex::new(PatchState::default()),
        }
    }

    /// Find or build the patched table for `original` under `entry`.
    ///
    /// # Safety
    ///
    /// `original` must be a live, sentinel-terminated native table.
    pub(crate) unsafe fn ensure_patched(
        &self,
        registry: &ClassRegistry,
        entry: &ClassEntry,
        original: TablePtr,
        engine_originated: bool,
        level: u32,
    ) -> TablePtr {
        debug_assert!(!table::is_patched(original));
        let mut state = self.state.lock();

        if engine_originated {
            if let Some(record) = state.by_class.get(&entry.id()) {
                if record.level <= level {
                    return record.table();
                }
            }

            let count = table::slot_count(original, MAX_TABLE_SLOTS);
            let record = match state.by_class.get(&entry.id()) {
                Some(existing) => {
                    let capacity = table::header_of(existing.table()).map_or(0, |h| h.capacity());
                    PatchRecord {
                        table: existing.table,
                        copied: count.min(capacity),
                        level,
                    }
                }
                None => {
                    let capacity = count.max(entry.overrides().len());
                    let table = table::allocate_table(self.engine, original, entry.id(), capacity);
                    PatchRecord {
                        table: table as usize,
                        copied: count,
                        level,
                    }
                }
            };
            fill(record.table(), original, record.copied, entry);
            state.by_class.insert(entry.id(), record);
            return record.table();
        }

        let key = original as usize;
        if let Some(record) = state.by_original.get(&key) {
            let patched = record.table();
            if let Some(header) = table::header_of(patched) {
                let current_depth = header
                    .class()
                    .and_then(|class| registry.entry(class))
                    .map_or(0, ClassEntry::depth);
                if header.class().is_none() || entry.depth() > current_depth {
                    header.set_class(Some(entry.id()));
                    apply_overrides(patched, entry);
                }
            }
            return patched;
        }

        let mut copied = table::slot_count(original, MAX_TABLE_SLOTS);
        if let Some((&next, _)) = state.by_original.range(key + 1..).next() {
            let distance = (next - key) / WORD;
            if distance < copied {
                copied = distance;
            }
        }

        let capacity = copied.max(entry.overrides().len());
        let patched = table::allocate_table(self.engine, original, entry.id(), capacity);
        fill(patched, original, copied, entry);
        state.by_original.insert(
            key,
            PatchRecord {
                table: patched as usize,
                copied,
                level: 0,
            },
        );
        patched
    }

    /// Point `object` and every base sub-object at this engine's patched tables.
    ///
    /// # Safety
    ///
    /// `object` must be a live instance laid out as `class` describes.
    ///
    /// # Panics
    ///
    /// Panics when a sub-object already carries a table owned by another live
    /// engine.
    pub(crate) unsafe fn replace(
        &self,
        registry: &ClassRegistry,
        object: *mut c_void,
        class: ClassId,
        engine_originated: bool,
        level: u32,
    ) {
        let Some(entry) = registry.entry(class) else {
            return;
        };

        let mut patched = None;
        if entry.has_overrides() {
            let original = table::original_table_of(object);
            patched = Some(self.ensure_patched(registry, entry, original, engine_originated, level));
        }

        for base in entry.bases() {
            let base_object = (object as *mut u8).add(base.offset) as *mut c_void;
            self.replace(registry, base_object, base.class, engine_originated, level + 1);
        }

        if let Some(patched) = patched {
            self.check_owner(object);
            table::set_object_table(object, patched);
        }
    }

    /// Restore the original table of `object` and every base sub-object.
    ///
    /// # Safety
    ///
    /// As [`Patcher::replace`].
    pub(crate) unsafe fn recover(&self, registry: &ClassRegistry, object: *mut c_void, class: ClassId) {
        let Some(entry) = registry.entry(class) else {
            return;
        };

        for base in entry.bases() {
            let base_object = (object as *mut u8).add(base.offset) as *mut c_void;
            self.recover(registry, base_object, base.class);
        }

        let current = table::object_table(object);
        let original = table::original_table(current);
        if original != current {
            table::set_object_table(object, original);
        }
    }

    /// Number of tables this engine has built
    pub(crate) fn table_count(&self) -> usize {
        let state = self.state.lock();
        state.by_original.len() + state.by_class.len()
    }

    /// Detach every table from this engine: clear the class and put the
    /// original slots back. Tables stay allocated.
    pub(crate) fn teardown(&self) -> usize {
        let mut state = self.state.lock();
        let records: Vec<PatchRecord> = state
            .by_original
            .values()
            .chain(state.by_class.values())
            .copied()
            .collect();

        for record in &records {
            let patched = record.table();
            let Some(header) = table::header_of(patched) else {
                continue;
            };
            header.set_class(None);
            let original = header.original();
            // SAFETY: capacity bounds the writes; copied never exceeds it
            unsafe {
                for slot in 0..header.capacity() {
                    let target = if slot < record.copied {
                        table::read_slot(original, slot)
                    } else {
                        None
                    };
                    table::write_slot(patched, slot, target);
                }
            }
        }

        state.by_original.clear();
        state.by_class.clear();
        records.len()
    }

    fn check_owner(&self, object: *mut c_void) {
        // SAFETY: caller of replace guarantees a live object
        let current = unsafe { table::object_table(object) };
        let Some(header) = table::header_of(current) else {
            return;
        };
        let owner = header.engine();
        if owner != self.engine && header.class().is_some() && engines::is_live(owner) {
            panic!(
                "Dispatch table integrity violation: object {:p} uses a table of live engine {} but engine {} is patching it",
                object,
                owner.as_u64(),
                self.engine.as_u64()
            );
        }
    }
}

/// Copy `copied` original slots, clear the rest and apply the entry's bindings.
unsafe fn fill(patched: TablePtr, original: TablePtr, copied: usize, entry: &ClassEntry) {
    let Some(header) = table::header_of(patched) else {
        return;
    };
    for slot in 0..header.capacity() {
        let target = if slot < copied {
            table::read_slot(original, slot)
        } else {
            None
        };
        table::write_slot(patched, slot, target);
    }
    header.set_original(original);
    header.set_class(Some(entry.id()));
    apply_overrides(patched, entry);
}

/// Install the entry's trampolines over a patched table
fn apply_overrides(patched: TablePtr, entry: &ClassEntry) {
    let Some(header) = table::header_of(patched) else {
        return;
    };
    let capacity = header.capacity();
    for (slot, binding) in entry.overrides().iter().enumerate() {
        if slot >= capacity {
            break;
        }
        if let Some(binding) = binding {
            // SAFETY: slot is below the table's capacity
            unsafe { table::write_slot(patched, slot, Some(binding.boot())) };
        }
    }
}
