//! Catalog of declared types.
//!
//! Every module owns a [`TypeRegistry`]; the context owns one more for the
//! intrinsic types. Ids are assigned sequentially per registry.

use std::collections::HashMap;

use super::error::IlError;
use super::types::{FloatWidth, IntWidth, Type};

/// A struct field with its byte offset inside the struct.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
}

/// Layout progress of a struct definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutState {
    /// Name reserved, no fields yet.
    Declared,
    /// Fields known, offsets not computed yet.
    Pending,
    /// Offsets and size computed.
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub fields: Vec<Field>,
    pub size: u32,
    pub state: LayoutState,
}

impl StructDef {
    pub fn declared() -> Self {
        Self {
            fields: Vec::new(),
            size: 0,
            state: LayoutState::Declared,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == LayoutState::Complete
    }

    pub fn field(&self, index: u32) -> Option<&Field> {
        self.fields.get(index as usize)
    }

    pub fn field_index(&self, name: &str) -> Option<u32> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| i as u32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredKind {
    Struct(StructDef),
    /// A name bound to a structural type (all intrinsics are aliases).
    Alias(Type),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredType {
    pub name: String,
    pub kind: DeclaredKind,
}

impl DeclaredType {
    pub fn alias(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            kind: DeclaredKind::Alias(ty),
        }
    }

    pub fn as_struct(&self) -> Option<&StructDef> {
        match &self.kind {
            DeclaredKind::Struct(def) => Some(def),
            DeclaredKind::Alias(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<DeclaredType>,
    by_name: HashMap<String, u32>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared registry of intrinsic global types.
    pub fn intrinsics() -> Self {
        let mut registry = Self::new();
        let ints = [
            ("i8", IntWidth::W8, true),
            ("i16", IntWidth::W16, true),
            ("i32", IntWidth::W32, true),
            ("i64", IntWidth::W64, true),
            ("u8", IntWidth::W8, false),
            ("u16", IntWidth::W16, false),
            ("u32", IntWidth::W32, false),
            ("u64", IntWidth::W64, false),
        ];
        let mut builtins: Vec<DeclaredType> = ints
            .into_iter()
            .map(|(name, width, signed)| DeclaredType::alias(name, Type::int(width, signed)))
            .collect();
        builtins.push(DeclaredType::alias("f32", Type::Float(FloatWidth::F32)));
        builtins.push(DeclaredType::alias("f64", Type::Float(FloatWidth::F64)));
        builtins.push(DeclaredType::alias("bool", Type::Boolean));
        builtins.push(DeclaredType::alias("char", Type::Char));
        builtins.push(DeclaredType::alias("string", Type::String));
        for count in 2..=4 {
            builtins.push(DeclaredType::alias(
                format!("vec{}f", count),
                Type::vector(Type::f32(), count),
            ));
            builtins.push(DeclaredType::alias(
                format!("vec{}i", count),
                Type::vector(Type::i32(), count),
            ));
        }
        for ty in builtins {
            // Names above are distinct.
            let _ = registry.define_type(ty);
        }
        registry
    }

    /// Register a type under the next sequential id.
    pub fn define_type(&mut self, ty: DeclaredType) -> Result<u32, IlError> {
        if self.by_name.contains_key(&ty.name) {
            return Err(IlError::DuplicateType(ty.name));
        }
        let id = self.types.len() as u32;
        self.by_name.insert(ty.name.clone(), id);
        self.types.push(ty);
        Ok(id)
    }

    pub fn get_type(&self, name: &str) -> Option<(u32, &DeclaredType)> {
        let id = *self.by_name.get(name)?;
        Some((id, &self.types[id as usize]))
    }

    pub fn try_get_type_by_id(&self, id: u32) -> Option<&DeclaredType> {
        self.types.get(id as usize)
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut DeclaredType> {
        self.types.get_mut(id as usize)
    }

    /// Find the id of an alias whose target equals `ty`.
    pub fn find_alias(&self, ty: &Type) -> Option<u32> {
        self.types
            .iter()
            .position(|d| matches!(&d.kind, DeclaredKind::Alias(t) if t == ty))
            .map(|i| i as u32)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &DeclaredType)> {
        self.types.iter().enumerate().map(|(i, t)| (i as u32, t))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
