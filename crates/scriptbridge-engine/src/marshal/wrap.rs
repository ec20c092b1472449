//! Type-erased native function wrappers
//!
//! A native function pointer `fn(A, B) -> R` is turned into the uniform
//! `(return buffer, argument-pointer array)` shape by [`NativeSignature`],
//! implemented for function pointers of up to eight parameters. The same
//! trait produces the [`TypeInfoArray`] describing the signature.

use std::ffi::c_void;

use scriptbridge_sdk::{ArgFetch, ReturnShape, TypeDescriptor, TypeInfoArray};

/// A native function pointer callable through the uniform call shape
pub trait NativeSignature: Copy + Send + Sync + 'static {
    /// Number of parameters
    const ARITY: usize;

    /// Parameter descriptors followed by the return descriptor
    fn type_infos() -> TypeInfoArray;

    /// Code address of the function
    fn address(self) -> usize;

    /// Fetch every parameter from `args`, call, and store the result in `ret`.
    ///
    /// # Safety
    ///
    /// `args` must hold [`Self::ARITY`](NativeSignature::ARITY) slots laid out
    /// for the parameter types and `ret` must be valid for the return type.
    unsafe fn call_erased(self, ret: *mut c_void, args: *const *mut c_void);
}

macro_rules! impl_native_signature {
    (@one $arg:ident) => {
        1
    };
    ($($arg:ident $idx:tt),*) => {
        impl<R, $($arg),*> NativeSignature for fn($($arg),*) -> R
        where
            R: ReturnShape + TypeDescriptor + 'static,
            $($arg: ArgFetch + TypeDescriptor + 'static,)*
        {
            const ARITY: usize = 0 $(+ impl_native_signature!(@one $arg))*;

            fn type_infos() -> TypeInfoArray {
                TypeInfoArray::new(vec![$(<$arg as TypeDescriptor>::type_info()),*], R::type_info())
            }

            fn address(self) -> usize {
                self as usize
            }

            #[allow(unused_variables)]
            unsafe fn call_erased(self, ret: *mut c_void, args: *const *mut c_void) {
                let value = (self)($(<$arg as ArgFetch>::fetch(*args.add($idx))),*);
                value.store(ret);
            }
        }
    };
}

impl_native_signature!();
impl_native_signature!(A0 0);
impl_native_signature!(A0 0, A1 1);
impl_native_signature!(A0 0, A1 1, A2 2);
impl_native_signature!(A0 0, A1 1, A2 2, A3 3);
impl_native_signature!(A0 0, A1 1, A2 2, A3 3, A4 4);
impl_native_signature!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);
impl_native_signature!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6);
impl_native_signature!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7);

/// Object-safe view of a wrapped native function
pub(crate) trait ErasedCall: Send + Sync {
    unsafe fn call(&self, ret: *mut c_void, args: *const *mut c_void);
}

/// Holder that erases the concrete signature
pub(crate) struct FunctionWrap<F>(pub(crate) F);

impl<F: NativeSignature> ErasedCall for FunctionWrap<F> {
    unsafe fn call(&self, ret: *mut c_void, args: *const *mut c_void) {
        self.0.call_erased(ret, args)
    }
}
