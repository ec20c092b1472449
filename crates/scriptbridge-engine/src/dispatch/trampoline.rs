//! Slot trampolines
//!
//! A patched table holds one of these in every slot a script may override.
//! Each trampoline is monomorphized for its slot index, so the index is known
//! without any per-call state: the rest comes from the header in front of the
//! object's current table.
//!
//! Routing for a call on slot `N`:
//!
//! 1. no header: the table was never patched, report `STATUS_NOT_PATCHED`
//! 2. owning engine gone or class cleared: call the original slot
//! 3. class has no binding at `N`: call the original slot
//! 4. otherwise hand the call to the engine's [`ScriptHost`]; an unimplemented
//!    non-pure override falls back to the original slot
//!
//! [`ScriptHost`]: scriptbridge_sdk::ScriptHost

use std::ffi::c_void;

use scriptbridge_sdk::{
    DispatchStatus, ObjectAddr, OverrideCall, SlotFn, STATUS_NOT_PATCHED, STATUS_OK,
    STATUS_UNIMPLEMENTED,
};

use super::table::{self, TablePtr};
use crate::lifecycle::engines;

/// Number of slots that can carry a script override
pub const MAX_OVERRIDE_SLOTS: usize = 64;

unsafe extern "C" fn trampoline<const SLOT: u32>(
    object: *mut c_void,
    ret: *mut c_void,
    args: *const *mut c_void,
) -> i32 {
    route(SLOT, object, ret, args)
}

macro_rules! trampolines {
    ($($slot:literal)*) => {
        [$(trampoline::<$slot> as SlotFn),*]
    };
}

static TRAMPOLINES: [SlotFn; MAX_OVERRIDE_SLOTS] = trampolines!(
    0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
    16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
    32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47
    48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63
);

/// Trampoline installed for `slot`, `None` beyond the budget
pub fn boot_function(slot: u32) -> Option<SlotFn> {
    TRAMPOLINES.get(slot as usize).copied()
}

unsafe fn route(slot: u32, object: *mut c_void, ret: *mut c_void, args: *const *mut c_void) -> i32 {
    let Some(header) = table::header_of(table::object_table(object)) else {
        return STATUS_NOT_PATCHED;
    };
    let original = header.original();

    let (Some(class), Some(runtime)) = (header.class(), engines::lookup(header.engine())) else {
        return call_original(original, slot, object, ret, args);
    };

    // Registry lock is released before the host runs
    let Some(binding) = runtime.registry.read().override_at(class, slot) else {
        return call_original(original, slot, object, ret, args);
    };

    let addr = ObjectAddr::from_ptr(object);
    let call = OverrideCall::new(
        slot,
        binding.name(),
        binding.signature(),
        binding.types(),
        addr,
        runtime.bindings.get(addr),
        ret,
        args,
    );

    match runtime.host.dispatch(&call) {
        DispatchStatus::Handled => STATUS_OK,
        DispatchStatus::NotImplemented if binding.is_pure_virtual() => STATUS_UNIMPLEMENTED,
        DispatchStatus::NotImplemented => call_original(original, slot, object, ret, args),
        failed @ DispatchStatus::Failed(_) => failed.code(),
    }
}

unsafe fn call_original(
    original: TablePtr,
    slot: u32,
    object: *mut c_void,
    ret: *mut c_void,
    args: *const *mut c_void,
) -> i32 {
    match table::slot_checked(original, slot as usize) {
        Some(target) => target(object, ret, args),
        None => STATUS_UNIMPLEMENTED,
    }
}
