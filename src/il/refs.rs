//! Per-module reference tables.
//!
//! Instructions refer to types, functions, modules and string literals by
//! small dense ids into append-only, deduplicated side tables. Each entry
//! carries a lazily-filled resolution cache, so a reference into a module
//! that does not exist yet can be numbered now and resolved on first use.

use std::cell::OnceCell;
use std::collections::HashMap;
use std::hash::Hash;

use super::function::FunctionId;
use super::types::{ModuleId, Type};

/// Module-ref sentinel naming the intrinsic type registry.
pub const INTRINSIC_MODULE_REF: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionRefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(pub u32);

/// A global variable as seen from an instruction: the owning module (by
/// module-ref) and the global's index in that module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalRef {
    pub module_ref: u32,
    pub index: u32,
}

impl GlobalRef {
    pub fn pack(self) -> u64 {
        ((self.module_ref as u64) << 32) | self.index as u64
    }

    pub fn unpack(payload: u64) -> Self {
        Self {
            module_ref: (payload >> 32) as u32,
            index: payload as u32,
        }
    }
}

/// One layer of a composite type around its declared base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wrapper {
    Pointer,
    Reference,
    StaticArray(u32),
    DynamicArray,
    Vector(u32),
}

impl Wrapper {
    pub fn apply(self, inner: Type) -> Type {
        match self {
            Wrapper::Pointer => Type::pointer(inner),
            Wrapper::Reference => Type::reference(inner),
            Wrapper::StaticArray(count) => Type::array(inner, count),
            Wrapper::DynamicArray => Type::dynamic_array(inner),
            Wrapper::Vector(count) => Type::vector(inner, count),
        }
    }
}

/// Compact structural description of a (possibly composite) type.
///
/// `wrappers` are listed innermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRefDesc {
    pub module_ref: u32,
    pub declared: u32,
    pub wrappers: Vec<Wrapper>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionRefDesc {
    pub module_ref: u32,
    pub name: String,
}

/// A type reference after resolution, with its size precomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    pub ty: Type,
    pub size: u32,
}

#[derive(Debug)]
struct RefEntry<D, R> {
    desc: D,
    resolved: OnceCell<R>,
}

/// Append-only table of descriptors with per-entry resolution caches.
#[derive(Debug)]
pub struct RefTable<D, R> {
    entries: Vec<RefEntry<D, R>>,
    index: HashMap<D, u32>,
}

impl<D, R> Default for RefTable<D, R> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<D: Clone + Eq + Hash, R> RefTable<D, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `desc`, appending it if not present.
    pub fn intern(&mut self, desc: D) -> u32 {
        if let Some(&id) = self.index.get(&desc) {
            return id;
        }
        let id = self.entries.len() as u32;
        self.index.insert(desc.clone(), id);
        self.entries.push(RefEntry {
            desc,
            resolved: OnceCell::new(),
        });
        id
    }

    pub fn get(&self, id: u32) -> Option<&D> {
        self.entries.get(id as usize).map(|e| &e.desc)
    }

    pub fn find(&self, desc: &D) -> Option<u32> {
        self.index.get(desc).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.entries.iter().map(|e| &e.desc)
    }

    /// The cached resolution of `id`, if it has been resolved before.
    pub fn cached(&self, id: u32) -> Option<&R> {
        self.entries.get(id as usize)?.resolved.get()
    }

    /// Store the resolution of `id` (first writer wins) and return it.
    pub fn cache(&self, id: u32, value: R) -> Option<&R> {
        let entry = self.entries.get(id as usize)?;
        let _ = entry.resolved.set(value);
        entry.resolved.get()
    }

    /// A copy of the descriptors with empty caches. Ids are preserved.
    pub fn draft(&self) -> Self {
        let mut table = Self::new();
        for entry in &self.entries {
            table.intern(entry.desc.clone());
        }
        table
    }
}

pub type ModuleRefs = RefTable<String, ModuleId>;
pub type TypeRefs = RefTable<TypeRefDesc, ResolvedType>;
pub type FunctionRefs = RefTable<FunctionRefDesc, FunctionId>;

/// Deduplicated string-literal pool.
#[derive(Debug, Clone, Default)]
pub struct StringPool {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.index.get(s) {
            return StringId(id);
        }
        let id = self.strings.len() as u32;
        self.index.insert(s.to_string(), id);
        self.strings.push(s.to_string());
        StringId(id)
    }

    pub fn get(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(|s| s.as_str())
    }
}
