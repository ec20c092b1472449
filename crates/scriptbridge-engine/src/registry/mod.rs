//! Class registry
//!
//! Per-engine table of exposed native classes. Inheritance is kept as data: a
//! directed acyclic graph of [`BaseLink`]s annotated with byte offsets, so
//! upcasts are plain offset arithmetic and no native RTTI is needed.
//!
//! Slot numbering is shared along zero-offset (primary) inheritance edges.
//! A binding on a class is therefore visible through every class deriving from
//! it at offset 0, unless that class bound the same slot itself.

mod class_entry;
mod function;
mod hooks;

pub use class_entry::{BaseLink, ClassEntry};
pub use function::{CallKind, FunctionEntry, OverrideSlot};
pub use hooks::{ClassError, ObjectHooks, TypedHooks};

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::dispatch::trampoline::MAX_OVERRIDE_SLOTS;

/// Index of a class within one engine's registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub(crate) fn from_index(index: usize) -> Self {
        ClassId(index as u32)
    }

    /// Position in the registry
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Registration conflicts. These are programmer errors in binding code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("Class already registered: {0}")]
    DuplicateClass(String),

    #[error("Native type already registered: {0}")]
    DuplicateTypeName(String),

    #[error("Function already registered: {0}")]
    DuplicateFunction(String),

    #[error("Override declared for slot {declared} registered at slot {requested}")]
    SlotMismatch { declared: u32, requested: u32 },

    #[error("Slot {slot} of class {class} is already bound")]
    DuplicateSlot { class: String, slot: u32 },

    #[error("Slot {slot} exceeds the override budget of {max}")]
    SlotOutOfRange { slot: u32, max: usize },

    #[error("Unknown class id {0:?}")]
    UnknownClass(ClassId),

    #[error("Inheriting {base} from {derived} would create a cycle")]
    InheritanceCycle { derived: String, base: String },

    #[error("Negative base offset {0}")]
    NegativeOffset(isize),
}

/// Exposed classes of one engine
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: Vec<ClassEntry>,
    by_name: FxHashMap<String, ClassId>,
    by_type_name: FxHashMap<String, ClassId>,
    globals: FxHashMap<String, Arc<FunctionEntry>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Expose a class. Without hooks the class is declaration-only.
    pub fn register(
        &mut self,
        name: &str,
        type_name: &str,
        size: usize,
        hooks: Option<Arc<dyn ObjectHooks>>,
    ) -> Result<ClassId, RegistrationError> {
        if self.by_name.contains_key(name) {
            return Err(RegistrationError::DuplicateClass(name.to_string()));
        }
        if self.by_type_name.contains_key(type_name) {
            return Err(RegistrationError::DuplicateTypeName(type_name.to_string()));
        }

        let id = ClassId::from_index(self.classes.len());
        self.classes.push(ClassEntry::new(id, name, type_name, size, hooks));
        self.by_name.insert(name.to_string(), id);
        self.by_type_name.insert(type_name.to_string(), id);
        Ok(id)
    }

    /// Declare `base` as a base of `derived` at `offset` bytes.
    ///
    /// A zero offset is primary inheritance: the base's current slot bindings
    /// are inherited at once.
    pub fn add_base(&mut self, derived: ClassId, base: ClassId, offset: isize) -> Result<(), RegistrationError> {
        self.check(derived)?;
        self.check(base)?;
        if offset < 0 {
            return Err(RegistrationError::NegativeOffset(offset));
        }
        if derived == base || self.derives_from(base, derived) {
            return Err(RegistrationError::InheritanceCycle {
                derived: self.classes[derived.index()].name.clone(),
                base: self.classes[base.index()].name.clone(),
            });
        }
        let offset = offset as usize;

        let base_depth = self.classes[base.index()].depth;
        let entry = &mut self.classes[derived.index()];
        entry.depth = entry.depth.max(base_depth + 1);
        entry.bases.push(BaseLink { class: base, offset });
        self.classes[base.index()]
            .derived
            .push(BaseLink { class: derived, offset });

        if offset != 0 {
            return Ok(());
        }

        let inherited: Vec<(u32, Arc<OverrideSlot>)> = self.classes[base.index()]
            .overrides
            .iter()
            .enumerate()
            .filter_map(|(slot, binding)| binding.clone().map(|b| (slot as u32, b)))
            .collect();
        for (slot, binding) in inherited {
            self.propagate(derived, slot, &binding, None);
        }
        Ok(())
    }

    /// Bind an override on `class` and every zero-offset descendant that has
    /// not bound the slot itself.
    pub fn bind_override(
        &mut self,
        class: ClassId,
        slot: u32,
        binding: Arc<OverrideSlot>,
    ) -> Result<(), RegistrationError> {
        self.check(class)?;
        if binding.slot() != slot {
            return Err(RegistrationError::SlotMismatch {
                declared: binding.slot(),
                requested: slot,
            });
        }
        if slot as usize >= MAX_OVERRIDE_SLOTS {
            return Err(RegistrationError::SlotOutOfRange {
                slot,
                max: MAX_OVERRIDE_SLOTS,
            });
        }

        // An inherited binding may be replaced once; a direct one may not
        let replaced = self.classes[class.index()].override_at(slot).cloned();
        if let Some(existing) = &replaced {
            if !self.inherits_binding(class, slot, existing) {
                return Err(RegistrationError::DuplicateSlot {
                    class: self.classes[class.index()].name.clone(),
                    slot,
                });
            }
        }

        let entry = &mut self.classes[class.index()];
        set_slot(entry, slot, binding.clone());
        let children: Vec<ClassId> = zero_offset_children(entry);
        for child in children {
            self.propagate(child, slot, &binding, replaced.as_ref());
        }
        Ok(())
    }

    /// Register a callable on a class, or globally when `class` is `None`
    pub fn register_function(
        &mut self,
        class: Option<ClassId>,
        function: FunctionEntry,
    ) -> Result<Arc<FunctionEntry>, RegistrationError> {
        let map = match class {
            Some(class) => {
                self.check(class)?;
                &mut self.classes[class.index()].functions
            }
            None => &mut self.globals,
        };
        if map.contains_key(function.signature()) {
            return Err(RegistrationError::DuplicateFunction(function.signature().to_string()));
        }
        let function = Arc::new(function);
        map.insert(function.signature().to_string(), function.clone());
        Ok(function)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn entry(&self, class: ClassId) -> Option<&ClassEntry> {
        self.classes.get(class.index())
    }

    /// Class by script-visible name
    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Class by native type name
    pub fn find_by_type_name(&self, type_name: &str) -> Option<ClassId> {
        self.by_type_name.get(type_name).copied()
    }

    /// Binding at `slot` of `class`, cloned out of the registry
    pub fn override_at(&self, class: ClassId, slot: u32) -> Option<Arc<OverrideSlot>> {
        self.entry(class)?.override_at(slot).cloned()
    }

    /// Function by qualified signature on a class, or globally
    pub fn function(&self, class: Option<ClassId>, signature: &str) -> Option<Arc<FunctionEntry>> {
        match class {
            Some(class) => self.entry(class)?.function(signature).cloned(),
            None => self.globals.get(signature).cloned(),
        }
    }

    /// Functions by plain name on a class, or globally
    pub fn functions_named(&self, class: Option<ClassId>, name: &str) -> Vec<Arc<FunctionEntry>> {
        let mut found: Vec<Arc<FunctionEntry>> = match class {
            Some(class) => match self.entry(class) {
                Some(entry) => entry.functions_named(name).cloned().collect(),
                None => Vec::new(),
            },
            None => self.globals.values().filter(|f| f.name() == name).cloned().collect(),
        };
        found.sort_by(|a, b| a.signature().cmp(b.signature()));
        found
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.iter()
    }

    // ========================================================================
    // Inheritance queries
    // ========================================================================

    /// Byte offset of `to` inside `from`, depth-first over the base lists
    pub fn resolve_offset(&self, from: ClassId, to: ClassId) -> Option<usize> {
        if from == to {
            return Some(0);
        }
        let entry = self.entry(from)?;
        entry.bases.iter().find_map(|base| {
            self.resolve_offset(base.class, to)
                .map(|offset| base.offset + offset)
        })
    }

    /// `delta` bytes into an instance of `class` is where `class` or one of
    /// its (nested) base sub-objects starts
    pub fn is_within_base(&self, class: ClassId, delta: usize) -> bool {
        if delta == 0 {
            return true;
        }
        let Some(entry) = self.entry(class) else {
            return false;
        };
        if delta >= entry.size {
            return false;
        }
        entry
            .bases
            .iter()
            .filter(|base| base.offset <= delta)
            .any(|base| self.is_within_base(base.class, delta - base.offset))
    }

    /// `class` is `base` or inherits from it
    pub fn derives_from(&self, class: ClassId, base: ClassId) -> bool {
        if class == base {
            return true;
        }
        self.entry(class)
            .is_some_and(|entry| entry.bases.iter().any(|link| self.derives_from(link.class, base)))
    }

    fn check(&self, class: ClassId) -> Result<(), RegistrationError> {
        if class.index() < self.classes.len() {
            Ok(())
        } else {
            Err(RegistrationError::UnknownClass(class))
        }
    }

    /// `binding` at `slot` of `class` came from a zero-offset base
    fn inherits_binding(&self, class: ClassId, slot: u32, binding: &Arc<OverrideSlot>) -> bool {
        self.classes[class.index()]
            .bases
            .iter()
            .filter(|link| link.offset == 0)
            .any(|link| {
                self.classes[link.class.index()]
                    .override_at(slot)
                    .is_some_and(|base| Arc::ptr_eq(base, binding))
            })
    }

    /// Push `binding` down zero-offset edges. Descendants keep their own
    /// binding unless it is the `replaced` one they inherited.
    fn propagate(
        &mut self,
        start: ClassId,
        slot: u32,
        binding: &Arc<OverrideSlot>,
        replaced: Option<&Arc<OverrideSlot>>,
    ) {
        let mut pending = vec![start];
        while let Some(class) = pending.pop() {
            let entry = &mut self.classes[class.index()];
            let keep = match (entry.override_at(slot), replaced) {
                (None, _) => false,
                (Some(current), Some(replaced)) => !Arc::ptr_eq(current, replaced),
                (Some(_), None) => true,
            };
            if keep {
                continue;
            }
            set_slot(entry, slot, binding.clone());
            pending.extend(zero_offset_children(entry));
        }
    }
}

fn set_slot(entry: &mut ClassEntry, slot: u32, binding: Arc<OverrideSlot>) {
    let index = slot as usize;
    if index >= entry.overrides.len() {
        entry.overrides.resize(index + 1, None);
    }
    entry.overrides[index] = Some(binding);
}

fn zero_offset_children(entry: &ClassEntry) -> Vec<ClassId> {
    entry
        .derived
        .iter()
        .filter(|link| link.offset == 0)
        .map(|link| link.class)
        .collect()
}
