//! Per-engine bridge runtime
//!
//! A [`ScriptRuntime`] is what one embedded script engine holds on to. It owns
//! the engine's class registry, its patched-table caches, its object binding
//! table and its unlink queue, and it enters the process-wide live list for as
//! long as it exists.
//!
//! Dropping the runtime leaves the live list first, then detaches every table
//! it patched so native objects still pointing at them call straight through
//! to their original implementations.

use std::ffi::c_void;
use std::sync::Arc;

use parking_lot::RwLock;
use scriptbridge_sdk::{ObjectAddr, ScriptHandle, ScriptHost};

use crate::dispatch::patch::Patcher;
use crate::dispatch::table;
use crate::lifecycle::unlink::UnlinkQueue;
use crate::lifecycle::{self, engines, EngineId, ObjectBindings};
use crate::marshal::temp::TempFunctionCache;
use crate::marshal::NativeSignature;
use crate::options::BridgeOptions;
use crate::registry::{
    CallKind, ClassError, ClassId, ClassRegistry, FunctionEntry, ObjectHooks,
    OverrideSlot, RegistrationError, TypedHooks,
};

/// State shared between a runtime and the trampolines routing into it
pub(crate) struct RuntimeInner {
    pub(crate) id: EngineId,
    pub(crate) options: BridgeOptions,
    pub(crate) host: Arc<dyn ScriptHost>,
    pub(crate) registry: RwLock<ClassRegistry>,
    pub(crate) patcher: Patcher,
    pub(crate) bindings: ObjectBindings,
    pub(crate) unlink: UnlinkQueue,
    pub(crate) temps: TempFunctionCache,
}

/// One script engine's view of the bridge
pub struct ScriptRuntime {
    inner: Arc<RuntimeInner>,
}

impl ScriptRuntime {
    /// Create a runtime with default options
    pub fn new(host: Arc<dyn ScriptHost>) -> Self {
        Self::with_options(host, BridgeOptions::default())
    }

    /// Create a runtime and enter it into the live engine list
    pub fn with_options(host: Arc<dyn ScriptHost>, options: BridgeOptions) -> Self {
        let id = EngineId::next();
        let inner = Arc::new(RuntimeInner {
            id,
            temps: TempFunctionCache::new(options.temp_function_limit),
            options,
            host,
            registry: RwLock::new(ClassRegistry::new()),
            patcher: Patcher::new(id),
            bindings: ObjectBindings::new(),
            unlink: UnlinkQueue::new(),
        });
        engines::register(id, Arc::downgrade(&inner));
        trace!(inner.options, "engine {} started", id.as_u64());
        Self { inner }
    }

    pub fn id(&self) -> EngineId {
        self.inner.id
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }

    // ========================================================================
    // Class exposure
    // ========================================================================

    /// Expose a class with explicit hooks; `None` makes it declaration-only
    pub fn register_class(
        &self,
        name: &str,
        type_name: &str,
        size: usize,
        hooks: Option<Arc<dyn ObjectHooks>>,
    ) -> Result<ClassId, RegistrationError> {
        self.inner.registry.write().register(name, type_name, size, hooks)
    }

    /// Expose a `Default + Clone` native type with generated hooks
    pub fn register_class_of<T: Default + Clone + 'static>(&self, name: &str) -> Result<ClassId, RegistrationError> {
        let hooks: Arc<dyn ObjectHooks> = Arc::new(TypedHooks::<T>::new());
        self.register_class(name, std::any::type_name::<T>(), std::mem::size_of::<T>(), Some(hooks))
    }

    /// Expose an abstract or interface-only class
    pub fn declare_class(&self, name: &str, type_name: &str, size: usize) -> Result<ClassId, RegistrationError> {
        self.register_class(name, type_name, size, None)
    }

    pub fn add_base(&self, derived: ClassId, base: ClassId, offset: isize) -> Result<(), RegistrationError> {
        self.inner.registry.write().add_base(derived, base, offset)
    }

    /// Make `slot` of `class` overridable by scripts.
    ///
    /// `F` is the slot's native signature without the receiver. A pure
    /// virtual override has no native implementation to fall back to.
    pub fn bind_override<F: NativeSignature>(
        &self,
        class: ClassId,
        slot: u32,
        name: &str,
        pure_virtual: bool,
    ) -> Result<Arc<OverrideSlot>, RegistrationError> {
        let binding = Arc::new(OverrideSlot::typed::<F>(slot, name, pure_virtual)?);
        self.inner
            .registry
            .write()
            .bind_override(class, slot, binding.clone())?;
        Ok(binding)
    }

    /// Register a native callable on a class, or globally when `class` is `None`
    pub fn register_function<F: NativeSignature>(
        &self,
        class: Option<ClassId>,
        kind: CallKind,
        name: &str,
        function: F,
    ) -> Result<Arc<FunctionEntry>, RegistrationError> {
        let entry = FunctionEntry::new(kind, class, name, function);
        self.inner.registry.write().register_function(class, entry)
    }

    /// Wrapper for an unregistered ad hoc call, cached by signature and
    /// function address
    pub fn temp_function<F: NativeSignature>(&self, name: &str, function: F) -> Arc<FunctionEntry> {
        let signature = format!("{}@{:#x}", F::type_infos().signature(name), function.address());
        let (entry, cleared) = self.inner.temps.get_or_insert_with(&signature, || {
            FunctionEntry::new(CallKind::Temporary, None, name, function)
        });
        if cleared {
            trace!(self.inner.options, "temporary function cache cleared at {}", signature);
        }
        entry
    }

    // ========================================================================
    // Lookup and introspection
    // ========================================================================

    /// Run `f` against the registry under its read lock
    pub fn with_registry<T>(&self, f: impl FnOnce(&ClassRegistry) -> T) -> T {
        f(&self.inner.registry.read())
    }

    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.inner.registry.read().find(name)
    }

    /// Class registered for a native type name
    pub fn class_of_type(&self, type_name: &str) -> Option<ClassId> {
        self.inner.registry.read().find_by_type_name(type_name)
    }

    pub fn function(&self, class: Option<ClassId>, signature: &str) -> Option<Arc<FunctionEntry>> {
        self.inner.registry.read().function(class, signature)
    }

    pub fn functions_named(&self, class: Option<ClassId>, name: &str) -> Vec<Arc<FunctionEntry>> {
        self.inner.registry.read().functions_named(class, name)
    }

    pub fn resolve_offset(&self, from: ClassId, to: ClassId) -> Option<usize> {
        self.inner.registry.read().resolve_offset(from, to)
    }

    pub fn is_within_base(&self, class: ClassId, delta: usize) -> bool {
        self.inner.registry.read().is_within_base(class, delta)
    }

    /// Bound override slots of a class, in slot order
    pub fn overrides_of(&self, class: ClassId) -> Vec<Arc<OverrideSlot>> {
        self.inner
            .registry
            .read()
            .entry(class)
            .map(|entry| entry.overrides().iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Patched tables built by this engine so far
    pub fn patched_table_count(&self) -> usize {
        self.inner.patcher.table_count()
    }

    // ========================================================================
    // Dispatch tables
    // ========================================================================

    /// Route the overridable slots of `object` (and its base sub-objects)
    /// through this engine.
    ///
    /// `engine_originated` marks objects whose storage the script engine
    /// allocated.
    ///
    /// # Safety
    ///
    /// `object` must be a live instance laid out as `class` describes, each
    /// sub-object starting with a [`VirtualObject`](crate::VirtualObject).
    ///
    /// # Panics
    ///
    /// Panics when a sub-object already uses a table patched by another live
    /// engine.
    pub unsafe fn patch_object(
        &self,
        object: *mut c_void,
        class: ClassId,
        engine_originated: bool,
    ) -> Result<(), ClassError> {
        let registry = self.inner.registry.read();
        if registry.entry(class).is_none() {
            return Err(ClassError::UnknownClass(class));
        }
        let before = self.inner.patcher.table_count();
        self.inner
            .patcher
            .replace(&registry, object, class, engine_originated, 0);
        let after = self.inner.patcher.table_count();
        if after > before {
            trace!(
                self.inner.options,
                "engine {} built {} table(s) for {:p}",
                self.inner.id.as_u64(),
                after - before,
                object
            );
        }
        Ok(())
    }

    /// Put the original tables back on `object` and its base sub-objects.
    ///
    /// # Safety
    ///
    /// As [`ScriptRuntime::patch_object`].
    pub unsafe fn recover_object(&self, object: *mut c_void, class: ClassId) -> Result<(), ClassError> {
        let registry = self.inner.registry.read();
        if registry.entry(class).is_none() {
            return Err(ClassError::UnknownClass(class));
        }
        self.inner.patcher.recover(&registry, object, class);
        Ok(())
    }

    /// Object's current table is native or patched by this engine.
    ///
    /// # Safety
    ///
    /// `object` must be a live interceptable object.
    pub unsafe fn is_table_valid(&self, object: *const c_void) -> bool {
        table::is_table_valid_for(object, self.inner.id)
    }

    // ========================================================================
    // Object lifecycle
    // ========================================================================

    /// Construct an instance through the class hooks, then pump.
    ///
    /// # Safety
    ///
    /// See [`ObjectHooks::construct`].
    pub unsafe fn construct(&self, class: ClassId, object: *mut c_void) -> Result<(), ClassError> {
        self.hooks_of(class, "construct")?.construct(object);
        self.pump();
        Ok(())
    }

    /// Copy-assign through the class hooks.
    ///
    /// # Safety
    ///
    /// See [`ObjectHooks::assign`].
    pub unsafe fn assign(&self, class: ClassId, dest: *mut c_void, src: *const c_void) -> Result<(), ClassError> {
        self.hooks_of(class, "assign")?.assign(dest, src);
        Ok(())
    }

    /// Destroy an instance through the class hooks, then pump.
    ///
    /// # Safety
    ///
    /// See [`ObjectHooks::destruct`].
    pub unsafe fn destruct(&self, class: ClassId, object: *mut c_void) -> Result<(), ClassError> {
        self.hooks_of(class, "destruct")?.destruct(object);
        self.pump();
        Ok(())
    }

    /// Bind a script wrapper to a native object, returning any previous one
    pub fn link(&self, object: ObjectAddr, script: ScriptHandle) -> Option<ScriptHandle> {
        self.inner.bindings.link(object, script)
    }

    /// Sever the binding of a native object without destroying it
    pub fn unlink(&self, object: ObjectAddr) -> Option<ScriptHandle> {
        self.inner.bindings.unlink(object)
    }

    pub fn script_of(&self, object: ObjectAddr) -> Option<ScriptHandle> {
        self.inner.bindings.get(object)
    }

    pub fn linked_count(&self) -> usize {
        self.inner.bindings.len()
    }

    /// Destroyed objects waiting for the next pump
    pub fn pending_unlinks(&self) -> usize {
        self.inner.unlink.len()
    }

    /// Deliver queued destructions to the host.
    ///
    /// Call only where the script engine can safely be re-entered. Returns
    /// the number of addresses delivered.
    pub fn pump(&self) -> usize {
        let inner = &self.inner;
        let delivered = lifecycle::drain(
            &inner.unlink,
            &inner.bindings,
            inner.host.as_ref(),
            inner.options.unlink_batch,
        );
        if delivered > 0 {
            trace!(inner.options, "engine {} unlinked {} object(s)", inner.id.as_u64(), delivered);
        }
        delivered
    }

    fn hooks_of(&self, class: ClassId, operation: &'static str) -> Result<Arc<dyn ObjectHooks>, ClassError> {
        let registry = self.inner.registry.read();
        let entry = registry.entry(class).ok_or(ClassError::UnknownClass(class))?;
        entry.hooks_for(operation)
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        engines::unregister(self.inner.id);
        let restored = self.inner.patcher.teardown();
        trace!(
            self.inner.options,
            "engine {} stopped, {} table(s) restored",
            self.inner.id.as_u64(),
            restored
        );
    }
}

impl std::fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRuntime")
            .field("id", &self.inner.id)
            .field("classes", &self.inner.registry.read().len())
            .field("linked", &self.inner.bindings.len())
            .field("pending_unlinks", &self.inner.unlink.len())
            .field("temp_functions", &self.inner.temps.len())
            .finish()
    }
}
