//! Typed outgoing virtual calls
//!
//! Native code calling an overridable method goes through the object's
//! current table, whether or not an engine patched it. [`invoke_virtual`]
//! packs typed arguments into an argument-pointer array for that call and
//! unpacks the return according to its shape.

use std::ffi::c_void;
use std::mem::MaybeUninit;

use scriptbridge_sdk::{ArgFetch, CallError, CallResult, ReturnShape, STATUS_OK, STATUS_UNIMPLEMENTED};

use crate::dispatch::table;

/// Tuple of outgoing arguments
pub trait ArgList {
    /// Slot addresses, valid while `self` is neither moved nor dropped
    fn arg_pointers(&mut self) -> Vec<*mut c_void>;
}

impl ArgList for () {
    fn arg_pointers(&mut self) -> Vec<*mut c_void> {
        Vec::new()
    }
}

macro_rules! impl_arg_list {
    ($($arg:ident $idx:tt),+) => {
        impl<$($arg: ArgFetch),+> ArgList for ($($arg,)+) {
            fn arg_pointers(&mut self) -> Vec<*mut c_void> {
                vec![$(self.$idx.callback_arg()),+]
            }
        }
    };
}

impl_arg_list!(A0 0);
impl_arg_list!(A0 0, A1 1);
impl_arg_list!(A0 0, A1 1, A2 2);
impl_arg_list!(A0 0, A1 1, A2 2, A3 3);
impl_arg_list!(A0 0, A1 1, A2 2, A3 3, A4 4);
impl_arg_list!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);
impl_arg_list!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6);
impl_arg_list!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7);

/// Call `slot` of `object` through its current dispatch table.
///
/// An override the script declared but did not implement yields the return
/// shape's fallback: the default for built-in values, `()` for void, and an
/// error for references and class values.
///
/// # Safety
///
/// `object` must be a live interceptable object whose slot `slot` has the
/// signature `fn(A...) -> R`.
pub unsafe fn invoke_virtual<R: ReturnShape, A: ArgList>(
    object: *mut c_void,
    slot: u32,
    function: &str,
    mut args: A,
) -> CallResult<R> {
    let current = table::object_table(object);
    let Some(target) = table::slot_checked(current, slot as usize) else {
        return Err(CallError::EmptySlot(slot));
    };

    let pointers = args.arg_pointers();
    let mut ret = MaybeUninit::<R>::zeroed();
    let status = target(object, ret.as_mut_ptr() as *mut c_void, pointers.as_ptr());

    match status {
        STATUS_OK => Ok(R::load(ret.as_mut_ptr() as *mut c_void)),
        STATUS_UNIMPLEMENTED => R::unimplemented(function),
        other => Err(CallError::from_status(other, function).unwrap_or(CallError::Status(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::table::VirtualObject;
    use scriptbridge_sdk::{ByRef, SlotFn};

    #[repr(C)]
    struct Gauge {
        base: VirtualObject,
        level: i64,
    }

    unsafe extern "C" fn level(object: *mut c_void, ret: *mut c_void, _: *const *mut c_void) -> i32 {
        *(ret as *mut i64) = (*(object as *mut Gauge)).level;
        STATUS_OK
    }

    unsafe extern "C" fn add(object: *mut c_void, _: *mut c_void, args: *const *mut c_void) -> i32 {
        let delta = *(*args as *const i64);
        (*(object as *mut Gauge)).level += delta;
        STATUS_OK
    }

    unsafe extern "C" fn missing(_: *mut c_void, _: *mut c_void, _: *const *mut c_void) -> i32 {
        STATUS_UNIMPLEMENTED
    }

    static GAUGE_TABLE: [Option<SlotFn>; 4] = [Some(level), Some(add), Some(missing), None];

    fn gauge(level: i64) -> Gauge {
        Gauge {
            base: VirtualObject::new(GAUGE_TABLE.as_ptr()),
            level,
        }
    }

    #[test]
    fn test_value_return_and_args() {
        let mut g = gauge(5);
        let ptr = &mut g as *mut Gauge as *mut c_void;
        unsafe {
            invoke_virtual::<(), _>(ptr, 1, "add", (10i64,)).unwrap();
            assert_eq!(invoke_virtual::<i64, _>(ptr, 0, "level", ()), Ok(15));
        }
    }

    #[test]
    fn test_unimplemented_shapes() {
        let mut g = gauge(0);
        let ptr = &mut g as *mut Gauge as *mut c_void;
        unsafe {
            assert_eq!(invoke_virtual::<i32, _>(ptr, 2, "missing", ()), Ok(0));
            assert_eq!(invoke_virtual::<(), _>(ptr, 2, "missing", ()), Ok(()));
            assert_eq!(
                invoke_virtual::<ByRef<i64>, _>(ptr, 2, "missing", ()),
                Err(CallError::AbstractReference {
                    function: "missing".to_string()
                })
            );
        }
    }

    #[test]
    fn test_empty_slot() {
        let mut g = gauge(0);
        let ptr = &mut g as *mut Gauge as *mut c_void;
        let result = unsafe { invoke_virtual::<i32, _>(ptr, 3, "nothing", ()) };
        assert_eq!(result, Err(CallError::EmptySlot(3)));
    }
}
