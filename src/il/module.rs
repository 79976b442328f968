use std::collections::HashMap;

use super::error::IlError;
use super::function::Function;
use super::refs::{FunctionRefs, ModuleRefs, StringId, StringPool, TypeRefs};
use super::registry::TypeRegistry;
use super::types::{ModuleId, Type};

/// A module-level variable living in the module's globals slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
}

/// A compilation unit: declared types, globals, string literals, reference
/// tables and functions.
#[derive(Debug)]
pub struct Module {
    id: ModuleId,
    name: String,
    pub(crate) types: TypeRegistry,
    globals: Vec<Global>,
    globals_size: u32,
    pub(crate) strings: StringPool,
    pub(crate) module_refs: ModuleRefs,
    pub(crate) type_refs: TypeRefs,
    pub(crate) function_refs: FunctionRefs,
    pub(crate) functions: Vec<Function>,
    function_index: HashMap<String, u32>,
}

impl Module {
    pub(crate) fn new(id: ModuleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            types: TypeRegistry::new(),
            globals: Vec::new(),
            globals_size: 0,
            strings: StringPool::new(),
            module_refs: ModuleRefs::new(),
            type_refs: TypeRefs::new(),
            function_refs: FunctionRefs::new(),
            functions: Vec::new(),
            function_index: HashMap::new(),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    pub fn global(&self, index: u32) -> Option<&Global> {
        self.globals.get(index as usize)
    }

    /// Byte size of the module's globals slot.
    pub fn globals_size(&self) -> u32 {
        self.globals_size
    }

    pub(crate) fn push_global(&mut self, name: String, ty: Type, size: u32) -> u32 {
        self.globals.push(Global {
            name,
            ty,
            offset: self.globals_size,
        });
        self.globals_size += size;
        self.globals.len() as u32 - 1
    }

    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    pub fn intern_string(&mut self, s: &str) -> StringId {
        self.strings.intern(s)
    }

    pub fn module_refs(&self) -> &ModuleRefs {
        &self.module_refs
    }

    pub fn type_refs(&self) -> &TypeRefs {
        &self.type_refs
    }

    pub fn function_refs(&self) -> &FunctionRefs {
        &self.function_refs
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, index: u32) -> Option<&Function> {
        self.functions.get(index as usize)
    }

    pub fn function_mut(&mut self, index: u32) -> Option<&mut Function> {
        self.functions.get_mut(index as usize)
    }

    pub fn function_index(&self, name: &str) -> Option<u32> {
        self.function_index.get(name).copied()
    }

    pub(crate) fn push_function(&mut self, func: Function) -> Result<u32, IlError> {
        if self.function_index.contains_key(&func.name) {
            return Err(IlError::DuplicateFunction(func.name));
        }
        let index = self.functions.len() as u32;
        self.function_index.insert(func.name.clone(), index);
        self.functions.push(func);
        Ok(index)
    }
}
