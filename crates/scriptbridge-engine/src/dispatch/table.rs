//! Dispatch table layout
//!
//! Every layout assumption the bridge makes about native objects lives here.
//!
//! ```text
//! native object                 patched table (arena)
//! ┌──────────────┐              ┌──────────────────────┐
//! │ table ───────┼──┐           │ TableHeader          │
//! ├──────────────┤  │           │   engine             │
//! │ fields ...   │  │           │   original ──────────┼──> native table
//! └──────────────┘  │           │   class              │
//!                   │           │   capacity           │
//!                   └─────────> ├──────────────────────┤
//!                               │ slot 0               │
//!                               │ ...                  │
//!                               │ slot capacity-1      │
//!                               │ None (sentinel)      │
//!                               └──────────────────────┘
//! ```
//!
//! An interceptable object starts with a [`VirtualObject`]. A table is an array
//! of [`SlotFn`] ending in a `None` sentinel; patched tables additionally carry
//! a [`TableHeader`] immediately before slot 0. Slots and the object's table
//! pointer are accessed atomically since native calls may race with patching.

use std::ffi::c_void;
use std::mem::{align_of, size_of};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use scriptbridge_sdk::SlotFn;

use super::arena::{arena, MAX_TABLE_SLOTS};
use crate::lifecycle::EngineId;
use crate::registry::ClassId;

/// Pointer to slot 0 of a dispatch table
pub type TablePtr = *const Option<SlotFn>;

const WORD: usize = size_of::<usize>();
const HEADER_WORDS: usize = size_of::<TableHeader>() / WORD;
const NO_CLASS: usize = usize::MAX;

const _: () = assert!(size_of::<TableHeader>() % WORD == 0);
const _: () = assert!(size_of::<Option<SlotFn>>() == WORD);

/// Leading field of every interceptable native object
#[repr(C)]
#[derive(Debug)]
pub struct VirtualObject {
    /// Current dispatch table
    pub table: TablePtr,
}

impl VirtualObject {
    /// Object whose table is the given native array
    pub const fn new(table: TablePtr) -> Self {
        Self { table }
    }
}

/// Record preceding every patched table
#[repr(C)]
#[derive(Debug)]
pub struct TableHeader {
    engine: AtomicU64,
    original: AtomicUsize,
    class: AtomicUsize,
    capacity: AtomicUsize,
}

impl TableHeader {
    /// Engine that built the table
    pub fn engine(&self) -> EngineId {
        EngineId::from_u64(self.engine.load(Ordering::Acquire))
    }

    /// Table the patch was copied from
    pub fn original(&self) -> TablePtr {
        self.original.load(Ordering::Acquire) as TablePtr
    }

    /// Class entry that last wrote the table, `None` once the engine tore down
    pub fn class(&self) -> Option<ClassId> {
        match self.class.load(Ordering::Acquire) {
            NO_CLASS => None,
            raw => Some(ClassId::from_index(raw)),
        }
    }

    /// Usable slots, sentinel excluded
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    pub(crate) fn set_class(&self, class: Option<ClassId>) {
        let raw = class.map_or(NO_CLASS, ClassId::index);
        self.class.store(raw, Ordering::Release);
    }

    pub(crate) fn set_original(&self, original: TablePtr) {
        self.original.store(original as usize, Ordering::Release);
    }
}

// ============================================================================
// Allocation
// ============================================================================

/// Carve a fresh patched table out of the arena.
///
/// All slots start empty; the caller fills them.
pub(crate) fn allocate_table(
    engine: EngineId,
    original: TablePtr,
    class: ClassId,
    capacity: usize,
) -> TablePtr {
    let block = arena().allocate(HEADER_WORDS + capacity + 1, align_of::<TableHeader>());
    // SAFETY: the block is zeroed, aligned for TableHeader and never freed
    unsafe {
        let header = &*(block.as_ptr() as *const TableHeader);
        header.engine.store(engine.as_u64(), Ordering::Relaxed);
        header.capacity.store(capacity, Ordering::Relaxed);
        header.set_original(original);
        header.set_class(Some(class));
        block.as_ptr().add(HEADER_WORDS) as TablePtr
    }
}

/// Table was issued by the arena
pub fn is_patched(table: TablePtr) -> bool {
    !table.is_null() && arena().contains(table as usize)
}

/// Header of a patched table, `None` for native tables
pub fn header_of(table: TablePtr) -> Option<&'static TableHeader> {
    if !is_patched(table) {
        return None;
    }
    // SAFETY: arena tables are always preceded by a header and never freed
    Some(unsafe { &*((table as *const usize).sub(HEADER_WORDS) as *const TableHeader) })
}

/// Pre-patch table; identity for native tables
pub fn original_table(table: TablePtr) -> TablePtr {
    header_of(table).map_or(table, TableHeader::original)
}

// ============================================================================
// Slot access
// ============================================================================

/// Read slot `index`.
///
/// # Safety
///
/// `table` must be valid for at least `index + 1` slots.
pub unsafe fn read_slot(table: TablePtr, index: usize) -> Option<SlotFn> {
    let cell = &*(table.add(index) as *const AtomicUsize);
    let raw = cell.load(Ordering::Acquire);
    // SAFETY: Option<SlotFn> is a nullable function pointer of word size
    std::mem::transmute::<usize, Option<SlotFn>>(raw)
}

/// Write slot `index` of a patched table.
///
/// # Safety
///
/// `table` must be an arena table with capacity greater than `index`.
pub(crate) unsafe fn write_slot(table: TablePtr, index: usize, target: Option<SlotFn>) {
    let cell = &*(table.add(index) as *const AtomicUsize);
    cell.store(target.map_or(0, |f| f as usize), Ordering::Release);
}

/// Populated slots before the sentinel, scanning at most `limit`.
///
/// # Safety
///
/// `table` must be sentinel-terminated or valid for `limit` slots.
pub unsafe fn slot_count(table: TablePtr, limit: usize) -> usize {
    let limit = limit.min(MAX_TABLE_SLOTS);
    let mut count = 0;
    while count < limit && read_slot(table, count).is_some() {
        count += 1;
    }
    count
}

/// Read slot `index` if it lies before the sentinel.
///
/// # Safety
///
/// `table` must be sentinel-terminated.
pub unsafe fn slot_checked(table: TablePtr, index: usize) -> Option<SlotFn> {
    if table.is_null() || slot_count(table, index + 1) <= index {
        return None;
    }
    read_slot(table, index)
}

// ============================================================================
// Objects
// ============================================================================

/// Current table of an object.
///
/// # Safety
///
/// `object` must point at a live object starting with a [`VirtualObject`].
pub unsafe fn object_table(object: *const c_void) -> TablePtr {
    let cell = &*(object as *const AtomicUsize);
    cell.load(Ordering::Acquire) as TablePtr
}

/// Point an object at a different table.
///
/// # Safety
///
/// As [`object_table`]; the new table must outlive the object.
pub(crate) unsafe fn set_object_table(object: *mut c_void, table: TablePtr) {
    let cell = &*(object as *const AtomicUsize);
    cell.store(table as usize, Ordering::Release);
}

/// Pre-patch table of an object.
///
/// # Safety
///
/// As [`object_table`].
pub unsafe fn original_table_of(object: *const c_void) -> TablePtr {
    original_table(object_table(object))
}

/// Object's table is usable by `engine`: native, or patched by that engine.
///
/// # Safety
///
/// As [`object_table`].
pub unsafe fn is_table_valid_for(object: *const c_void, engine: EngineId) -> bool {
    header_of(object_table(object)).map_or(true, |header| header.engine() == engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptbridge_sdk::STATUS_OK;

    unsafe extern "C" fn noop(_: *mut c_void, _: *mut c_void, _: *const *mut c_void) -> i32 {
        STATUS_OK
    }

    static NATIVE: [Option<SlotFn>; 3] = [Some(noop), Some(noop), None];

    #[test]
    fn test_native_table_has_no_header() {
        let table = NATIVE.as_ptr();
        assert!(!is_patched(table));
        assert!(header_of(table).is_none());
        assert_eq!(original_table(table), table);
        assert_eq!(unsafe { slot_count(table, 16) }, 2);
    }

    #[test]
    fn test_allocated_table_header() {
        let engine = EngineId::from_u64(9001);
        let table = allocate_table(engine, NATIVE.as_ptr(), ClassId::from_index(3), 4);
        let header = header_of(table).unwrap();
        assert_eq!(header.engine(), engine);
        assert_eq!(header.original(), NATIVE.as_ptr());
        assert_eq!(header.class(), Some(ClassId::from_index(3)));
        assert_eq!(header.capacity(), 4);
        assert_eq!(original_table(table), NATIVE.as_ptr());

        header.set_class(None);
        assert_eq!(header.class(), None);
    }

    #[test]
    fn test_slot_write_and_sentinel() {
        let table = allocate_table(EngineId::from_u64(9002), NATIVE.as_ptr(), ClassId::from_index(0), 2);
        assert_eq!(unsafe { slot_count(table, 16) }, 0);
        unsafe {
            write_slot(table, 0, Some(noop));
            write_slot(table, 1, Some(noop));
        }
        assert_eq!(unsafe { slot_count(table, 16) }, 2);
        assert!(unsafe { slot_checked(table, 1) }.is_some());
        assert!(unsafe { slot_checked(table, 2) }.is_none());
    }

    #[test]
    fn test_object_table_swap() {
        let mut object = VirtualObject::new(NATIVE.as_ptr());
        let ptr = &mut object as *mut VirtualObject as *mut c_void;
        let engine = EngineId::from_u64(9003);
        let patched = allocate_table(engine, NATIVE.as_ptr(), ClassId::from_index(1), 2);

        unsafe {
            assert!(is_table_valid_for(ptr, engine));
            set_object_table(ptr, patched);
            assert_eq!(object_table(ptr), patched);
            assert_eq!(original_table_of(ptr), NATIVE.as_ptr());
            assert!(is_table_valid_for(ptr, engine));
            assert!(!is_table_valid_for(ptr, EngineId::from_u64(9004)));
        }
    }
}
