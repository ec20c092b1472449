//! Class Registry Integration Tests
//!
//! Exercises class exposure through the runtime: instantiable and
//! declaration-only classes, function registration and lookup, ad hoc
//! temporary wrappers and registration conflicts.
//!
//! # Running Tests
//! ```bash
//! cargo test --test registry_integration
//! ```

use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::sync::Arc;

use scriptbridge_engine::{
    BridgeOptions, CallKind, ClassError, RegistrationError, ScriptRuntime, MAX_OVERRIDE_SLOTS,
};
use scriptbridge_sdk::{
    ArgFetch, BaseKind, DispatchStatus, ObjectAddr, OverrideCall, ScriptHandle, ScriptHost,
};

struct Idle;

impl ScriptHost for Idle {
    fn dispatch(&self, _call: &OverrideCall<'_>) -> DispatchStatus {
        DispatchStatus::NotImplemented
    }

    fn drop_wrapper(&self, _object: ObjectAddr, _script: Option<ScriptHandle>) {}
}

fn runtime() -> ScriptRuntime {
    ScriptRuntime::new(Arc::new(Idle))
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Counter {
    hits: i32,
    label: String,
}
scriptbridge_sdk::native_class!(Counter);

fn counter_add(counter: *mut Counter, amount: i32) -> i32 {
    unsafe {
        (*counter).hits += amount;
        (*counter).hits
    }
}

fn counter_zero() -> i32 {
    0
}

fn clamp(value: f64, low: f64, high: f64) -> f64 {
    value.max(low).min(high)
}

// ===== Instantiation =====

#[test]
fn test_typed_class_lifecycle() {
    let runtime = runtime();
    let class = runtime.register_class_of::<Counter>("Counter").unwrap();
    assert_eq!(runtime.find_class("Counter"), Some(class));
    assert_eq!(runtime.class_of_type(std::any::type_name::<Counter>()), Some(class));

    let mut a = MaybeUninit::<Counter>::uninit();
    let mut b = MaybeUninit::<Counter>::uninit();
    let a_ptr = a.as_mut_ptr() as *mut c_void;
    let b_ptr = b.as_mut_ptr() as *mut c_void;

    unsafe {
        runtime.construct(class, a_ptr).unwrap();
        runtime.construct(class, b_ptr).unwrap();
        (*b.as_mut_ptr()).hits = 5;
        (*b.as_mut_ptr()).label = "b".to_string();

        runtime.assign(class, a_ptr, b_ptr).unwrap();
        assert_eq!(*a.as_ptr(), *b.as_ptr());

        runtime.destruct(class, a_ptr).unwrap();
        runtime.destruct(class, b_ptr).unwrap();
    }
}

#[test]
fn test_declaration_only_class_refuses_instances() {
    let runtime = runtime();
    let shape = runtime.declare_class("Shape", "geo::Shape", 16).unwrap();
    assert!(runtime.with_registry(|registry| registry.entry(shape).unwrap().is_declaration_only()));

    let mut storage = [0u8; 16];
    let result = unsafe { runtime.construct(shape, storage.as_mut_ptr() as *mut c_void) };
    assert_eq!(
        result,
        Err(ClassError::DeclarationOnly {
            class: "Shape".to_string(),
            operation: "construct",
        })
    );
}

// ===== Functions =====

#[test]
fn test_member_function_takes_receiver() {
    let runtime = runtime();
    let class = runtime.register_class_of::<Counter>("Counter").unwrap();
    let add = runtime
        .register_function(
            Some(class),
            CallKind::ClassFunction,
            "add",
            counter_add as fn(*mut Counter, i32) -> i32,
        )
        .unwrap();
    runtime
        .register_function(Some(class), CallKind::ClassStatic, "add", counter_zero as fn() -> i32)
        .unwrap();

    assert!(Arc::ptr_eq(&runtime.function(Some(class), add.signature()).unwrap(), &add));
    assert_eq!(runtime.functions_named(Some(class), "add").len(), 2);
    assert!(runtime.function(None, add.signature()).is_none());

    let mut counter = Counter::default();
    let mut amount = 3i32;
    let args = [amount.callback_arg()];
    let mut ret = 0i32;
    unsafe {
        add.invoke(
            Some(&mut counter as *mut Counter as *mut c_void),
            &mut ret as *mut i32 as *mut c_void,
            args.as_ptr(),
        );
    }
    assert_eq!(ret, 3);
    assert_eq!(counter.hits, 3);
}

#[test]
fn test_global_function_and_duplicates() {
    let runtime = runtime();
    let entry = runtime
        .register_function(None, CallKind::Global, "clamp", clamp as fn(f64, f64, f64) -> f64)
        .unwrap();
    assert_eq!(entry.types().param_count(), 3);
    assert_eq!(entry.types().ret().tag.kind(), BaseKind::Double);

    let again = runtime.register_function(None, CallKind::Global, "clamp", clamp as fn(f64, f64, f64) -> f64);
    assert!(matches!(again, Err(RegistrationError::DuplicateFunction(_))));

    let mut value = 12.5f64;
    let mut low = 0.0f64;
    let mut high = 10.0f64;
    let args = [value.callback_arg(), low.callback_arg(), high.callback_arg()];
    let mut ret = 0.0f64;
    unsafe { entry.invoke(None, &mut ret as *mut f64 as *mut c_void, args.as_ptr()) };
    assert_eq!(ret, 10.0);
}

#[test]
fn test_temporary_functions_cached_by_signature() {
    let runtime = ScriptRuntime::with_options(
        Arc::new(Idle),
        BridgeOptions::default().with_temp_function_limit(1),
    );
    let first = runtime.temp_function("clamp", clamp as fn(f64, f64, f64) -> f64);
    let second = runtime.temp_function("clamp", clamp as fn(f64, f64, f64) -> f64);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.kind(), CallKind::Temporary);
    assert!(runtime.function(None, first.signature()).is_none());

    // Cache of one: a new signature evicts, held wrappers stay usable
    let zero = runtime.temp_function("zero", counter_zero as fn() -> i32);
    let third = runtime.temp_function("clamp", clamp as fn(f64, f64, f64) -> f64);
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(zero.name(), "zero");
    assert_eq!(first.name(), "clamp");
}

fn times_hundred(value: i32) -> i32 {
    value * 100
}

fn plus_one(value: i32) -> i32 {
    value + 1
}

#[test]
fn test_temporary_functions_keep_their_own_body() {
    let runtime = runtime();
    let first = runtime.temp_function("scale", plus_one as fn(i32) -> i32);
    let second = runtime.temp_function("scale", times_hundred as fn(i32) -> i32);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.signature(), second.signature());

    let mut value = 5i32;
    let args = [value.callback_arg()];
    let mut ret = 0i32;
    unsafe { second.invoke(None, &mut ret as *mut i32 as *mut c_void, args.as_ptr()) };
    assert_eq!(ret, 500);
    unsafe { first.invoke(None, &mut ret as *mut i32 as *mut c_void, args.as_ptr()) };
    assert_eq!(ret, 6);
}

// ===== Overrides and inheritance =====

#[test]
fn test_override_registration_errors() {
    let runtime = runtime();
    let widget = runtime.declare_class("Widget", "ui::Widget", 16).unwrap();
    let button = runtime.declare_class("Button", "ui::Button", 24).unwrap();
    runtime.add_base(button, widget, 0).unwrap();

    runtime.bind_override::<fn() -> i32>(widget, 1, "draw", false).unwrap();
    assert_eq!(runtime.overrides_of(button).len(), 1);
    assert_eq!(runtime.overrides_of(button)[0].slot(), 1);

    assert_eq!(
        runtime
            .bind_override::<fn() -> i32>(widget, MAX_OVERRIDE_SLOTS as u32, "late", false)
            .unwrap_err(),
        RegistrationError::SlotOutOfRange {
            slot: MAX_OVERRIDE_SLOTS as u32,
            max: MAX_OVERRIDE_SLOTS,
        }
    );
    assert!(matches!(
        runtime.bind_override::<fn() -> i32>(widget, 1, "draw", false),
        Err(RegistrationError::DuplicateSlot { slot: 1, .. })
    ));
    assert!(matches!(
        runtime.add_base(widget, button, 0),
        Err(RegistrationError::InheritanceCycle { .. })
    ));
    assert_eq!(
        runtime.add_base(button, widget, -8),
        Err(RegistrationError::NegativeOffset(-8))
    );
}

#[test]
fn test_sub_object_ranges() {
    let runtime = runtime();
    let left = runtime.declare_class("Left", "mi::Left", 16).unwrap();
    let right = runtime.declare_class("Right", "mi::Right", 8).unwrap();
    let both = runtime.declare_class("Both", "mi::Both", 32).unwrap();
    runtime.add_base(both, left, 0).unwrap();
    runtime.add_base(both, right, 16).unwrap();

    assert_eq!(runtime.resolve_offset(both, right), Some(16));
    assert_eq!(runtime.resolve_offset(both, left), Some(0));
    assert_eq!(runtime.resolve_offset(left, right), None);

    assert!(runtime.is_within_base(both, 0));
    assert!(runtime.is_within_base(both, 16));
    // Fields inside Left and Right, not the start of a sub-object
    assert!(!runtime.is_within_base(both, 8));
    assert!(!runtime.is_within_base(both, 20));
    // Both's own fields after Right
    assert!(!runtime.is_within_base(both, 24));
    assert!(!runtime.is_within_base(both, 32));
}
