//! Script engine callback interface
//!
//! A script engine plugs into the bridge by implementing [`ScriptHost`]. The
//! bridge calls it from two places only:
//!
//! - [`ScriptHost::dispatch`] from a trampoline, when native code makes a
//!   virtual call on an object whose table this engine patched
//! - [`ScriptHost::drop_wrapper`] from the engine's own unlink pump
//!
//! Both run on whichever thread made the native call or pumped the queue; the
//! bridge never calls a host from the thread that destroyed an object.

use std::ffi::c_void;

use crate::convert::{ArgFetch, ReturnShape};
use crate::types::TypeInfoArray;

// ============================================================================
// Slot ABI
// ============================================================================

/// Uniform call target stored in every dispatch table slot.
///
/// `object` is the receiver, `ret` the return buffer and `args` the
/// argument-pointer array (receiver not included). Returns a status code.
pub type SlotFn =
    unsafe extern "C" fn(object: *mut c_void, ret: *mut c_void, args: *const *mut c_void) -> i32;

/// Call completed
pub const STATUS_OK: i32 = 0;

/// Script override declared but not implemented, and no native fallback
pub const STATUS_UNIMPLEMENTED: i32 = -1;

/// Trampoline reached through a table that has no bridge header
pub const STATUS_NOT_PATCHED: i32 = -2;

/// Script raised with a code that collides with one of the statuses above
pub const STATUS_SCRIPT_FAILED: i32 = -3;

// ============================================================================
// Identities
// ============================================================================

/// Raw address of a live native object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectAddr(pub usize);

impl ObjectAddr {
    /// Address of the object behind `ptr`
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        ObjectAddr(ptr as usize)
    }

    /// Untyped pointer to the object
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Address `offset` bytes into the object
    pub fn offset(self, offset: usize) -> Self {
        ObjectAddr(self.0 + offset)
    }
}

/// Engine-defined identity of the script-side wrapper bound to an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptHandle(pub u64);

// ============================================================================
// Dispatch
// ============================================================================

/// Outcome reported by a host for one override call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// The script handled the call and wrote the return buffer
    Handled,
    /// The script has no implementation for this override
    NotImplemented,
    /// The script raised; the code is passed back to the native caller.
    /// Codes reserved by the slot ABI are reported as `STATUS_SCRIPT_FAILED`.
    Failed(i32),
}

impl DispatchStatus {
    /// Raw status code for the slot ABI
    pub fn code(self) -> i32 {
        match self {
            DispatchStatus::Handled => STATUS_OK,
            DispatchStatus::NotImplemented => STATUS_UNIMPLEMENTED,
            DispatchStatus::Failed(STATUS_OK | STATUS_UNIMPLEMENTED | STATUS_NOT_PATCHED) => STATUS_SCRIPT_FAILED,
            DispatchStatus::Failed(code) => code,
        }
    }
}

/// One intercepted virtual call, as handed to [`ScriptHost::dispatch`]
#[derive(Debug)]
pub struct OverrideCall<'a> {
    /// Slot index in the dispatch table
    pub slot: u32,
    /// Function name of the override
    pub function: &'a str,
    /// Qualified signature key
    pub signature: &'a str,
    /// Parameter and return descriptors
    pub types: &'a TypeInfoArray,
    /// Receiver
    pub object: ObjectAddr,
    /// Wrapper linked to the receiver in this engine, if any
    pub script: Option<ScriptHandle>,
    ret: *mut c_void,
    args: *const *mut c_void,
}

impl<'a> OverrideCall<'a> {
    /// Describe a call arriving through the slot ABI.
    ///
    /// # Safety
    ///
    /// `ret` and `args` must be the buffers the slot was invoked with, laid out
    /// according to `types`.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn new(
        slot: u32,
        function: &'a str,
        signature: &'a str,
        types: &'a TypeInfoArray,
        object: ObjectAddr,
        script: Option<ScriptHandle>,
        ret: *mut c_void,
        args: *const *mut c_void,
    ) -> Self {
        Self {
            slot,
            function,
            signature,
            types,
            object,
            script,
            ret,
            args,
        }
    }

    /// Number of arguments (receiver excluded)
    pub fn arg_count(&self) -> usize {
        self.types.param_count()
    }

    /// Raw slot for argument `index`, `None` when out of range
    pub fn arg_slot(&self, index: usize) -> Option<*mut c_void> {
        if index >= self.arg_count() || self.args.is_null() {
            return None;
        }
        // SAFETY: index is within the declared parameter count
        Some(unsafe { *self.args.add(index) })
    }

    /// Read argument `index`.
    ///
    /// # Safety
    ///
    /// `T` must match the declared parameter type at `index`.
    pub unsafe fn arg<T: ArgFetch>(&self, index: usize) -> Option<T> {
        self.arg_slot(index).map(|slot| T::fetch(slot))
    }

    /// Write the return value.
    ///
    /// # Safety
    ///
    /// `R` must match the declared return type.
    pub unsafe fn set_return<R: ReturnShape>(&self, value: R) {
        value.store(self.ret);
    }

    /// Raw return buffer
    pub fn ret_ptr(&self) -> *mut c_void {
        self.ret
    }

    /// Raw argument-pointer array
    pub fn args_ptr(&self) -> *const *mut c_void {
        self.args
    }
}

/// Callback interface implemented by each embedded script engine
pub trait ScriptHost: Send + Sync {
    /// Run the script override for an intercepted call
    fn dispatch(&self, call: &OverrideCall<'_>) -> DispatchStatus;

    /// Drop the script-side wrapper of a destroyed native object.
    ///
    /// `script` is the handle that was linked to the address in this engine,
    /// if any.
    fn drop_wrapper(&self, object: ObjectAddr, script: Option<ScriptHandle>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeDescriptor;

    #[test]
    fn test_dispatch_status_codes() {
        assert_eq!(DispatchStatus::Handled.code(), STATUS_OK);
        assert_eq!(DispatchStatus::NotImplemented.code(), STATUS_UNIMPLEMENTED);
        assert_eq!(DispatchStatus::Failed(9).code(), 9);
        // Reserved codes never read as success or fallback
        assert_eq!(DispatchStatus::Failed(STATUS_OK).code(), STATUS_SCRIPT_FAILED);
        assert_eq!(DispatchStatus::Failed(STATUS_UNIMPLEMENTED).code(), STATUS_SCRIPT_FAILED);
        assert_eq!(DispatchStatus::Failed(STATUS_NOT_PATCHED).code(), STATUS_SCRIPT_FAILED);
    }

    #[test]
    fn test_override_call_args_and_return() {
        let types = TypeInfoArray::new(vec![i32::type_info(), f64::type_info()], i64::type_info());
        let mut a = 3i32;
        let mut b = 0.5f64;
        let args = [
            &mut a as *mut i32 as *mut c_void,
            &mut b as *mut f64 as *mut c_void,
        ];
        let mut ret = 0i64;

        let call = unsafe {
            OverrideCall::new(
                2,
                "mix",
                "mix(i32,f64)->i64",
                &types,
                ObjectAddr(0x1000),
                None,
                &mut ret as *mut i64 as *mut c_void,
                args.as_ptr(),
            )
        };

        assert_eq!(call.arg_count(), 2);
        assert_eq!(unsafe { call.arg::<i32>(0) }, Some(3));
        assert_eq!(unsafe { call.arg::<f64>(1) }, Some(0.5));
        assert!(call.arg_slot(2).is_none());

        unsafe { call.set_return(42i64) };
        assert_eq!(ret, 42);
    }

    #[test]
    fn test_object_addr_offset() {
        let addr = ObjectAddr(0x2000);
        assert_eq!(addr.offset(16), ObjectAddr(0x2010));
        assert_eq!(addr.as_ptr() as usize, 0x2000);
    }
}
