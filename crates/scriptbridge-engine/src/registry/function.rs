//! Registered callables and override bindings

use std::ffi::c_void;
use std::fmt;

use scriptbridge_sdk::{SlotFn, TypeInfoArray};

use super::{ClassId, RegistrationError};
use crate::dispatch::trampoline::{boot_function, MAX_OVERRIDE_SLOTS};
use crate::marshal::wrap::{ErasedCall, FunctionWrap, NativeSignature};

/// How a registered function is called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Ad hoc call, cached by signature but never registered
    Temporary,
    /// Free function
    Global,
    /// Static function scoped to a class
    ClassStatic,
    /// Method; the receiver is the first native parameter
    ClassFunction,
    /// Field accessor; the receiver is the first native parameter
    Member,
}

impl CallKind {
    /// Calls of this kind prepend the receiver to the arguments
    pub fn takes_receiver(self) -> bool {
        matches!(self, CallKind::ClassFunction | CallKind::Member)
    }
}

/// A native callable exposed to scripts
pub struct FunctionEntry {
    kind: CallKind,
    class: Option<ClassId>,
    name: String,
    signature: String,
    types: TypeInfoArray,
    call: Box<dyn ErasedCall>,
}

impl FunctionEntry {
    /// Wrap a native function pointer
    pub fn new<F: NativeSignature>(kind: CallKind, class: Option<ClassId>, name: &str, function: F) -> Self {
        let types = F::type_infos();
        Self {
            kind,
            class,
            name: name.to_string(),
            signature: types.signature(name),
            types,
            call: Box::new(FunctionWrap(function)),
        }
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn class(&self) -> Option<ClassId> {
        self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Qualified signature key
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn types(&self) -> &TypeInfoArray {
        &self.types
    }

    /// Call through the uniform shape.
    ///
    /// For receiver-taking kinds, `object` is passed as the first native
    /// parameter and `args` holds the remaining ones.
    ///
    /// # Safety
    ///
    /// `args` and `ret` must match the registered signature; `object` must be
    /// a live instance when the kind takes a receiver.
    pub unsafe fn invoke(&self, object: Option<*mut c_void>, ret: *mut c_void, args: *const *mut c_void) {
        match object {
            Some(mut receiver) if self.kind.takes_receiver() => {
                let count = self.types.param_count();
                let mut full = Vec::with_capacity(count);
                full.push(&mut receiver as *mut *mut c_void as *mut c_void);
                for i in 0..count.saturating_sub(1) {
                    full.push(*args.add(i));
                }
                self.call.call(ret, full.as_ptr());
            }
            _ => self.call.call(ret, args),
        }
    }
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("kind", &self.kind)
            .field("class", &self.class)
            .field("signature", &self.signature)
            .finish()
    }
}

/// A script-overridable slot of a class
#[derive(Debug)]
pub struct OverrideSlot {
    slot: u32,
    name: String,
    signature: String,
    types: TypeInfoArray,
    pure_virtual: bool,
    boot: SlotFn,
}

impl OverrideSlot {
    /// Describe an override at `slot`; `types` excludes the receiver
    pub fn new(slot: u32, name: &str, types: TypeInfoArray, pure_virtual: bool) -> Result<Self, RegistrationError> {
        let boot = boot_function(slot).ok_or(RegistrationError::SlotOutOfRange {
            slot,
            max: MAX_OVERRIDE_SLOTS,
        })?;
        Ok(Self {
            slot,
            name: name.to_string(),
            signature: types.signature(name),
            types,
            pure_virtual,
            boot,
        })
    }

    /// Describe an override from a native signature
    pub fn typed<F: NativeSignature>(slot: u32, name: &str, pure_virtual: bool) -> Result<Self, RegistrationError> {
        Self::new(slot, name, F::type_infos(), pure_virtual)
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn types(&self) -> &TypeInfoArray {
        &self.types
    }

    /// No native implementation to fall back to
    pub fn is_pure_virtual(&self) -> bool {
        self.pure_virtual
    }

    /// Trampoline installed in patched tables
    pub fn boot(&self) -> SlotFn {
        self.boot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptbridge_sdk::{ArgFetch, TypeDescriptor};

    #[repr(C)]
    struct Meter {
        reading: i32,
    }
    scriptbridge_sdk::native_class!(Meter);

    fn read(meter: *mut Meter, scale: i32) -> i32 {
        unsafe { (*meter).reading * scale }
    }

    #[test]
    fn test_member_call_prepends_receiver() {
        let entry = FunctionEntry::new(
            CallKind::ClassFunction,
            None,
            "read",
            read as fn(*mut Meter, i32) -> i32,
        );
        assert_eq!(entry.types().param_count(), 2);

        let mut meter = Meter { reading: 7 };
        let mut scale = 3i32;
        let args = [scale.callback_arg()];
        let mut ret = 0i32;
        unsafe {
            entry.invoke(
                Some(&mut meter as *mut Meter as *mut c_void),
                &mut ret as *mut i32 as *mut c_void,
                args.as_ptr(),
            );
        }
        assert_eq!(ret, 21);
    }

    #[test]
    fn test_override_slot_budget() {
        let types = TypeInfoArray::new(vec![], <()>::type_info());
        assert!(OverrideSlot::new(3, "tick", types.clone(), false).is_ok());
        assert_eq!(
            OverrideSlot::new(MAX_OVERRIDE_SLOTS as u32, "tick", types, false).unwrap_err(),
            RegistrationError::SlotOutOfRange {
                slot: MAX_OVERRIDE_SLOTS as u32,
                max: MAX_OVERRIDE_SLOTS
            }
        );
    }

    #[test]
    fn test_typed_override_signature() {
        let slot = OverrideSlot::typed::<fn(i32) -> bool>(1, "accept", true).unwrap();
        assert_eq!(slot.signature(), "accept(i32)->bool");
        assert!(slot.is_pure_virtual());
    }
}
