//! Dispatch table interception
//!
//! - [`arena`]: process-wide, page-committed storage for patched tables
//! - [`table`]: the only module that knows the table and object layout
//! - [`trampoline`]: per-slot call targets that route into an engine
//! - patch bookkeeping per engine

pub mod arena;
pub(crate) mod patch;
pub mod table;
pub mod trampoline;

pub use arena::MAX_TABLE_SLOTS;
pub use table::{TableHeader, TablePtr, VirtualObject};
pub use trampoline::MAX_OVERRIDE_SLOTS;
