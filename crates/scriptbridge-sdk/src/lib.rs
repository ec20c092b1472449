//! ScriptBridge SDK - the surface a script engine compiles against
//!
//! This crate holds everything a script engine needs to plug into the bridge
//! without depending on the bridge runtime itself:
//!
//! - [`types`]: compile-time native type descriptors ([`TypeTag`], [`TypeInfo`])
//! - [`convert`]: argument fetch and return shapes for the slot ABI
//! - [`host`]: the [`ScriptHost`] callback interface and call identities
//! - [`error`]: per-call errors
//!
//! # Example
//!
//! ```ignore
//! use scriptbridge_sdk::{DispatchStatus, ObjectAddr, OverrideCall, ScriptHandle, ScriptHost};
//!
//! struct Lua;
//!
//! impl ScriptHost for Lua {
//!     fn dispatch(&self, call: &OverrideCall<'_>) -> DispatchStatus {
//!         unsafe { call.set_return(1i32) };
//!         DispatchStatus::Handled
//!     }
//!
//!     fn drop_wrapper(&self, _object: ObjectAddr, _script: Option<ScriptHandle>) {}
//! }
//! ```

pub mod convert;
pub mod error;
pub mod host;
pub mod types;

pub use convert::{ArgFetch, ByRef, CRef, Const, ConstPtr, ReturnShape};
pub use error::{CallError, CallResult};
pub use host::{
    DispatchStatus, ObjectAddr, OverrideCall, ScriptHandle, ScriptHost, SlotFn, STATUS_NOT_PATCHED,
    STATUS_OK, STATUS_SCRIPT_FAILED, STATUS_UNIMPLEMENTED,
};
pub use types::{
    BaseKind, CLong, CStrArg, CULong, Qualifier, TypeDescriptor, TypeInfo, TypeInfoArray, TypeTag,
    WChar, WStrArg, MAX_QUALIFIERS,
};
