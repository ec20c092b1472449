//! Script bridge engine
//!
//! This crate lets an embedded script engine subclass native classes:
//! - Class registry with inheritance, sub-object offsets and override slots
//! - Dispatch table patching routed through per-slot trampolines
//! - Cross-engine destruction notices delivered through per-engine queues
//! - Typed marshalling for outgoing virtual calls and registered functions
//!
//! Script engines plug in by implementing [`scriptbridge_sdk::ScriptHost`] and
//! holding a [`ScriptRuntime`].

#![warn(rust_2018_idioms)]

/// Trace to stderr when the runtime's options enable it
macro_rules! trace {
    ($options:expr, $($arg:tt)*) => {
        if $options.trace {
            eprintln!("[scriptbridge] {}", format_args!($($arg)*));
        }
    };
}

pub mod dispatch;
pub mod lifecycle;
pub mod marshal;
pub mod options;
pub mod registry;
mod runtime;

pub use scriptbridge_sdk;

pub use dispatch::table::{is_patched, original_table_of};
pub use dispatch::{TableHeader, TablePtr, VirtualObject, MAX_OVERRIDE_SLOTS, MAX_TABLE_SLOTS};
pub use lifecycle::{is_live, live_engines, notify_destroyed, EngineId};
pub use marshal::{invoke_virtual, ArgList, NativeSignature};
pub use options::BridgeOptions;
pub use registry::{
    BaseLink, CallKind, ClassEntry, ClassError, ClassId, ClassRegistry, FunctionEntry,
    ObjectHooks, OverrideSlot, RegistrationError, TypedHooks,
};
pub use runtime::ScriptRuntime;
