//! One exposed native class

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::function::{FunctionEntry, OverrideSlot};
use super::hooks::{ClassError, ObjectHooks};
use super::ClassId;

/// Inheritance edge with the base sub-object's byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseLink {
    pub class: ClassId,
    pub offset: usize,
}

/// Registry record of one exposed class
pub struct ClassEntry {
    pub(super) id: ClassId,
    pub(super) name: String,
    pub(super) type_name: String,
    pub(super) size: usize,
    pub(super) depth: u32,
    pub(super) bases: Vec<BaseLink>,
    pub(super) derived: Vec<BaseLink>,
    pub(super) functions: FxHashMap<String, Arc<FunctionEntry>>,
    pub(super) overrides: Vec<Option<Arc<OverrideSlot>>>,
    pub(super) hooks: Option<Arc<dyn ObjectHooks>>,
}

impl ClassEntry {
    pub(super) fn new(
        id: ClassId,
        name: &str,
        type_name: &str,
        size: usize,
        hooks: Option<Arc<dyn ObjectHooks>>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            type_name: type_name.to_string(),
            size,
            depth: 0,
            bases: Vec::new(),
            derived: Vec::new(),
            functions: FxHashMap::default(),
            overrides: Vec::new(),
            hooks,
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Script-visible class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native type name used for native-to-entry lookup
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Instance size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Inheritance depth: 0 for roots, otherwise one more than the deepest base
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn bases(&self) -> &[BaseLink] {
        &self.bases
    }

    /// Classes deriving directly from this one, with their offset of this base
    pub fn derived(&self) -> &[BaseLink] {
        &self.derived
    }

    /// Slot bindings by index; holes are unbound slots
    pub fn overrides(&self) -> &[Option<Arc<OverrideSlot>>] {
        &self.overrides
    }

    pub fn override_at(&self, slot: u32) -> Option<&Arc<OverrideSlot>> {
        self.overrides.get(slot as usize).and_then(Option::as_ref)
    }

    /// Any slot bound on this class
    pub fn has_overrides(&self) -> bool {
        self.overrides.iter().any(Option::is_some)
    }

    /// Function by qualified signature
    pub fn function(&self, signature: &str) -> Option<&Arc<FunctionEntry>> {
        self.functions.get(signature)
    }

    /// Functions sharing a plain name (overloads)
    pub fn functions_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<FunctionEntry>> + 'a {
        self.functions.values().filter(move |f| f.name() == name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Arc<FunctionEntry>> {
        self.functions.values()
    }

    /// Exposed for declaration only: no hooks, cannot be instantiated
    pub fn is_declaration_only(&self) -> bool {
        self.hooks.is_none()
    }

    /// Hooks for `operation`; declaration-only classes are reported and refused
    pub fn hooks_for(&self, operation: &'static str) -> Result<Arc<dyn ObjectHooks>, ClassError> {
        match &self.hooks {
            Some(hooks) => Ok(hooks.clone()),
            None => {
                eprintln!(
                    "[scriptbridge] Refusing to {} declaration-only class {}",
                    operation, self.name
                );
                Err(ClassError::DeclarationOnly {
                    class: self.name.clone(),
                    operation,
                })
            }
        }
    }
}

impl std::fmt::Debug for ClassEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("depth", &self.depth)
            .field("bases", &self.bases)
            .field("overrides", &self.overrides.iter().filter(|o| o.is_some()).count())
            .finish()
    }
}
