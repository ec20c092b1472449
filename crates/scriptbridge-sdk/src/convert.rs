//! Argument fetch and return shapes
//!
//! The bridge passes every call as `(return buffer, argument-pointer array)`.
//! Each argument slot points at the argument's storage:
//!
//! - value-ish parameters: the slot points at the value (one dereference)
//! - reference parameters: the slot points at a pointer to the value (two
//!   dereferences)
//!
//! [`ArgFetch`] reads a parameter out of a slot and, symmetrically, produces
//! the slot address for an outgoing call. [`ReturnShape`] does the same for
//! the return buffer: values are constructed in place, references store the
//! address, `()` writes nothing.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::error::CallError;
use crate::types::{CLong, CStrArg, CULong, Qualifier, TypeDescriptor, TypeTag, WStrArg};

/// Reads one parameter from an argument slot
pub trait ArgFetch: Sized {
    /// Read the parameter.
    ///
    /// # Safety
    ///
    /// `slot` must point at storage laid out for this parameter kind and stay
    /// valid for the duration of the call.
    unsafe fn fetch(slot: *mut c_void) -> Self;

    /// Slot address to place in an outgoing argument array
    fn callback_arg(&mut self) -> *mut c_void;
}

/// How a return value travels through the return buffer
pub trait ReturnShape: Sized {
    /// Write into the return buffer.
    ///
    /// # Safety
    ///
    /// `ret` must be valid for writes of `Self` and suitably aligned.
    unsafe fn store(self, ret: *mut c_void);

    /// Read what a callee left in the return buffer.
    ///
    /// # Safety
    ///
    /// `ret` must hold an initialized `Self`.
    unsafe fn load(ret: *mut c_void) -> Self;

    /// Result of calling an override the script side did not implement
    fn unimplemented(function: &str) -> Result<Self, CallError> {
        Err(CallError::Unimplemented {
            function: function.to_string(),
        })
    }
}

/// Reference read out of an argument slot. A script passing null for a
/// reference parameter is a binding bug.
fn non_null<T>(ptr: *mut T) -> NonNull<T> {
    debug_assert!(!ptr.is_null(), "null reference argument");
    NonNull::new(ptr).unwrap_or_else(|| panic!("null reference argument of type {}", std::any::type_name::<T>()))
}

/// Generate by-value marshaling for a `Clone` type
#[macro_export]
macro_rules! native_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::ArgFetch for $ty {
                unsafe fn fetch(slot: *mut ::std::ffi::c_void) -> Self {
                    (*(slot as *const $ty)).clone()
                }

                fn callback_arg(&mut self) -> *mut ::std::ffi::c_void {
                    self as *mut $ty as *mut ::std::ffi::c_void
                }
            }

            impl $crate::ReturnShape for $ty {
                unsafe fn store(self, ret: *mut ::std::ffi::c_void) {
                    ::std::ptr::write(ret as *mut $ty, self);
                }

                unsafe fn load(ret: *mut ::std::ffi::c_void) -> Self {
                    ::std::ptr::read(ret as *const $ty)
                }
            }
        )+
    };
}

// Built-in kinds return their value-initialized default when the override is
// missing, matching a zeroed return buffer on the native side.
macro_rules! builtin_marshal {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ArgFetch for $ty {
                unsafe fn fetch(slot: *mut c_void) -> Self {
                    *(slot as *const $ty)
                }

                fn callback_arg(&mut self) -> *mut c_void {
                    self as *mut $ty as *mut c_void
                }
            }

            impl ReturnShape for $ty {
                unsafe fn store(self, ret: *mut c_void) {
                    std::ptr::write(ret as *mut $ty, self);
                }

                unsafe fn load(ret: *mut c_void) -> Self {
                    std::ptr::read(ret as *const $ty)
                }

                fn unimplemented(_function: &str) -> Result<Self, CallError> {
                    Ok(<$ty>::default())
                }
            }
        )+
    };
}

builtin_marshal!(i8, i16, i32, i64, u8, u16, u32, u64, CLong, CULong, char, bool, f32, f64);
builtin_marshal!(CStrArg, WStrArg);

impl ReturnShape for () {
    unsafe fn store(self, _ret: *mut c_void) {}

    unsafe fn load(_ret: *mut c_void) -> Self {}

    fn unimplemented(_function: &str) -> Result<Self, CallError> {
        Ok(())
    }
}

impl<T> ArgFetch for *mut T {
    unsafe fn fetch(slot: *mut c_void) -> Self {
        *(slot as *const *mut T)
    }

    fn callback_arg(&mut self) -> *mut c_void {
        self as *mut *mut T as *mut c_void
    }
}

impl<T> ArgFetch for *const T {
    unsafe fn fetch(slot: *mut c_void) -> Self {
        *(slot as *const *const T)
    }

    fn callback_arg(&mut self) -> *mut c_void {
        self as *mut *const T as *mut c_void
    }
}

impl<T> ReturnShape for *mut T {
    unsafe fn store(self, ret: *mut c_void) {
        *(ret as *mut *mut T) = self;
    }

    unsafe fn load(ret: *mut c_void) -> Self {
        *(ret as *const *mut T)
    }

    fn unimplemented(_function: &str) -> Result<Self, CallError> {
        Ok(std::ptr::null_mut())
    }
}

// ============================================================================
// Qualifier wrappers
// ============================================================================

/// Mutable reference parameter (`T&`)
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq)]
pub struct ByRef<T>(NonNull<T>);

impl<T> ByRef<T> {
    /// Wrap a live value
    pub fn new(value: &mut T) -> Self {
        ByRef(NonNull::from(value))
    }

    /// Wrap a raw pointer
    pub fn from_ptr(ptr: NonNull<T>) -> Self {
        ByRef(ptr)
    }

    /// Address of the referenced value
    pub fn as_ptr(&self) -> *mut T {
        self.0.as_ptr()
    }

    /// Borrow the referenced value.
    ///
    /// # Safety
    ///
    /// The referenced value must still be alive.
    pub unsafe fn as_ref(&self) -> &T {
        self.0.as_ref()
    }

    /// Mutably borrow the referenced value.
    ///
    /// # Safety
    ///
    /// The referenced value must still be alive and not aliased.
    pub unsafe fn as_mut(&mut self) -> &mut T {
        self.0.as_mut()
    }
}

impl<T> Clone for ByRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ByRef<T> {}

impl<T: TypeDescriptor> TypeDescriptor for ByRef<T> {
    const TAG: TypeTag = T::TAG.push(Qualifier::Reference);
    const SIZE: u32 = std::mem::size_of::<*mut T>() as u32;
}

impl<T> ArgFetch for ByRef<T> {
    unsafe fn fetch(slot: *mut c_void) -> Self {
        ByRef(non_null(*(slot as *const *mut T)))
    }

    fn callback_arg(&mut self) -> *mut c_void {
        &mut self.0 as *mut NonNull<T> as *mut c_void
    }
}

impl<T> ReturnShape for ByRef<T> {
    unsafe fn store(self, ret: *mut c_void) {
        *(ret as *mut NonNull<T>) = self.0;
    }

    unsafe fn load(ret: *mut c_void) -> Self {
        ByRef(*(ret as *const NonNull<T>))
    }

    fn unimplemented(function: &str) -> Result<Self, CallError> {
        Err(CallError::AbstractReference {
            function: function.to_string(),
        })
    }
}

/// Const reference parameter (`const T&`).
///
/// Always described as a const reference. For the built-in kinds only the
/// fetch is aliased to the plain value: the slot points straight at it.
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq)]
pub struct CRef<T>(NonNull<T>);

impl<T> CRef<T> {
    /// Wrap a live value
    pub fn new(value: &T) -> Self {
        CRef(NonNull::from(value))
    }

    /// Address of the referenced value
    pub fn as_ptr(&self) -> *const T {
        self.0.as_ptr()
    }

    /// Borrow the referenced value.
    ///
    /// # Safety
    ///
    /// The referenced value must still be alive.
    pub unsafe fn as_ref(&self) -> &T {
        self.0.as_ref()
    }
}

impl<T> Clone for CRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CRef<T> {}

impl<T: TypeDescriptor> TypeDescriptor for CRef<T> {
    const TAG: TypeTag = T::TAG.push(Qualifier::Const).push(Qualifier::Reference);
    const SIZE: u32 = std::mem::size_of::<*const T>() as u32;
}

impl<T: TypeDescriptor> ArgFetch for CRef<T> {
    unsafe fn fetch(slot: *mut c_void) -> Self {
        if T::CONST_REF_BY_VALUE {
            CRef(non_null(slot as *mut T))
        } else {
            CRef(non_null(*(slot as *const *mut T)))
        }
    }

    fn callback_arg(&mut self) -> *mut c_void {
        if T::CONST_REF_BY_VALUE {
            self.0.as_ptr() as *mut c_void
        } else {
            &mut self.0 as *mut NonNull<T> as *mut c_void
        }
    }
}

/// Const pointer parameter (`T* const`)
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq)]
pub struct ConstPtr<T>(pub *mut T);

impl<T> Clone for ConstPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ConstPtr<T> {}

impl<T: TypeDescriptor> TypeDescriptor for ConstPtr<T> {
    const TAG: TypeTag = T::TAG.push(Qualifier::ConstPointer);
    const SIZE: u32 = std::mem::size_of::<*mut T>() as u32;
}

impl<T> ArgFetch for ConstPtr<T> {
    unsafe fn fetch(slot: *mut c_void) -> Self {
        ConstPtr(*(slot as *const *mut T))
    }

    fn callback_arg(&mut self) -> *mut c_void {
        &mut self.0 as *mut *mut T as *mut c_void
    }
}

/// Const-qualified value (`const T`)
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Const<T>(pub T);

impl<T: TypeDescriptor> TypeDescriptor for Const<T> {
    const TAG: TypeTag = T::TAG.push(Qualifier::Const);
    const SIZE: u32 = T::SIZE;
}

impl<T: ArgFetch> ArgFetch for Const<T> {
    unsafe fn fetch(slot: *mut c_void) -> Self {
        Const(T::fetch(slot))
    }

    fn callback_arg(&mut self) -> *mut c_void {
        self.0.callback_arg()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseKind;

    #[derive(Clone, Debug, PartialEq, Default)]
    struct Point {
        x: i32,
        y: i32,
    }
    crate::native_class!(Point);
    crate::native_value!(Point);

    #[test]
    fn test_value_fetch_single_deref() {
        let mut value = 41i32;
        let slot = value.callback_arg();
        let fetched = unsafe { i32::fetch(slot) };
        assert_eq!(fetched, 41);
    }

    #[test]
    fn test_reference_fetch_double_deref() {
        let mut point = Point { x: 1, y: 2 };
        let mut by_ref = ByRef::new(&mut point);
        let slot = by_ref.callback_arg();
        let mut fetched = unsafe { ByRef::<Point>::fetch(slot) };
        unsafe { fetched.as_mut().x = 10 };
        assert_eq!(point.x, 10);
    }

    #[test]
    fn test_builtin_const_ref_fetches_by_value() {
        let tag = <CRef<i32> as TypeDescriptor>::TAG;
        assert_ne!(tag, <i32 as TypeDescriptor>::TAG);
        assert_eq!(tag.kind(), BaseKind::Int32);
        let chain: Vec<_> = tag.qualifiers().collect();
        assert_eq!(chain, vec![Qualifier::Value, Qualifier::Const, Qualifier::Reference]);
        assert_eq!(
            <CRef<f64> as TypeDescriptor>::SIZE,
            std::mem::size_of::<*const f64>() as u32
        );
        assert_ne!(<CRef<i32> as TypeDescriptor>::type_name(), <i32 as TypeDescriptor>::type_name());

        // Fetch stays a single dereference

        let mut value = 7i32;
        let slot = value.callback_arg();
        let fetched = unsafe { CRef::<i32>::fetch(slot) };
        assert_eq!(unsafe { *fetched.as_ref() }, 7);
    }

    #[test]
    #[should_panic(expected = "null reference argument")]
    fn test_null_reference_argument_panics() {
        let mut null: *mut Point = std::ptr::null_mut();
        let slot = &mut null as *mut *mut Point as *mut c_void;
        let _ = unsafe { ByRef::<Point>::fetch(slot) };
    }

    #[test]
    fn test_class_const_ref_is_const_reference() {
        let tag = <CRef<Point> as TypeDescriptor>::TAG;
        let chain: Vec<_> = tag.qualifiers().collect();
        assert_eq!(chain, vec![Qualifier::Value, Qualifier::Const, Qualifier::Reference]);
        assert!(tag.is_reference());

        // Same prefix as const T, with the reference applied outside it
        let const_tag = <Const<Point> as TypeDescriptor>::TAG;
        assert_eq!(const_tag.qualifier(1), Qualifier::Const);
        assert_eq!(tag.qualifier(1), const_tag.qualifier(1));
    }

    #[test]
    fn test_const_pointer_vs_pointer_to_const() {
        let const_ptr = <ConstPtr<Point> as TypeDescriptor>::TAG;
        let ptr_to_const = <*const Point as TypeDescriptor>::TAG;
        assert_ne!(const_ptr, ptr_to_const);
        assert_eq!(const_ptr.outermost(), Qualifier::ConstPointer);
        assert_eq!(ptr_to_const.outermost(), Qualifier::Pointer);
        assert_eq!(const_ptr.kind(), BaseKind::Class);
    }

    #[test]
    fn test_return_shapes() {
        let mut buf = std::mem::MaybeUninit::<Point>::uninit();
        unsafe {
            Point { x: 3, y: 4 }.store(buf.as_mut_ptr() as *mut c_void);
            assert_eq!(Point::load(buf.as_mut_ptr() as *mut c_void), Point { x: 3, y: 4 });
        }

        let mut target = 5u64;
        let mut ref_buf = std::mem::MaybeUninit::<ByRef<u64>>::uninit();
        unsafe {
            ByRef::new(&mut target).store(ref_buf.as_mut_ptr() as *mut c_void);
            let loaded = ByRef::<u64>::load(ref_buf.as_mut_ptr() as *mut c_void);
            assert_eq!(loaded.as_ptr(), &mut target as *mut u64);
        }
    }

    #[test]
    fn test_unimplemented_shapes() {
        assert_eq!(i32::unimplemented("f"), Ok(0));
        assert_eq!(<()>::unimplemented("f"), Ok(()));
        assert!(matches!(
            ByRef::<Point>::unimplemented("f"),
            Err(CallError::AbstractReference { .. })
        ));
        assert!(matches!(
            Point::unimplemented("f"),
            Err(CallError::Unimplemented { .. })
        ));
    }
}
