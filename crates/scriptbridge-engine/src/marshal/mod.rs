//! Generic call marshaling
//!
//! - [`wrap`]: native function pointers behind the uniform
//!   `(return buffer, argument-pointer array)` shape
//! - [`callback`]: typed calls out through an object's dispatch table
//! - temporary function cache for unregistered ad hoc calls

pub mod callback;
pub(crate) mod temp;
pub mod wrap;

pub use callback::{invoke_virtual, ArgList};
pub use wrap::NativeSignature;
