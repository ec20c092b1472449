//! Construction, assignment and destruction hooks

use std::ffi::c_void;
use std::marker::PhantomData;

use super::ClassId;

/// Errors from proxied object operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassError {
    /// The class was exposed for declaration only and cannot be instantiated
    #[error("Cannot {operation} declaration-only class {class}")]
    DeclarationOnly {
        /// Class name
        class: String,
        /// Refused operation
        operation: &'static str,
    },

    /// No such class in this engine
    #[error("Unknown class id {0:?}")]
    UnknownClass(ClassId),
}

/// Object operations for one exposed class
pub trait ObjectHooks: Send + Sync {
    /// Initialise raw storage.
    ///
    /// # Safety
    ///
    /// `object` must be valid, aligned, uninitialised storage for the class.
    unsafe fn construct(&self, object: *mut c_void);

    /// Copy-assign `src` into `dest`.
    ///
    /// # Safety
    ///
    /// Both must be live instances of the class.
    unsafe fn assign(&self, dest: *mut c_void, src: *const c_void);

    /// Destroy in place, leaving raw storage.
    ///
    /// # Safety
    ///
    /// `object` must be a live instance; it is dead afterwards.
    unsafe fn destruct(&self, object: *mut c_void);
}

/// Hooks for any `Default + Clone` type
pub struct TypedHooks<T>(PhantomData<fn() -> T>);

impl<T> TypedHooks<T> {
    pub fn new() -> Self {
        TypedHooks(PhantomData)
    }
}

impl<T> Default for TypedHooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TypedHooks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypedHooks<{}>", std::any::type_name::<T>())
    }
}

impl<T: Default + Clone + 'static> ObjectHooks for TypedHooks<T> {
    unsafe fn construct(&self, object: *mut c_void) {
        std::ptr::write(object as *mut T, T::default());
    }

    unsafe fn assign(&self, dest: *mut c_void, src: *const c_void) {
        (*(dest as *mut T)).clone_from(&*(src as *const T));
    }

    unsafe fn destruct(&self, object: *mut c_void) {
        std::ptr::drop_in_place(object as *mut T);
    }
}
