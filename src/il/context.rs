//! The module graph root.
//!
//! A [`Context`] owns every module plus the intrinsic type registry. All
//! reference-resolution caches live inside the modules it owns; there is no
//! process-wide state.

use std::collections::HashMap;

use super::error::IlError;
use super::function::{Function, FunctionId};
use super::module::{Global, Module};
use super::refs::{
    FunctionRefDesc, FunctionRefId, GlobalRef, INTRINSIC_MODULE_REF, ResolvedType, StringId,
    TypeRefDesc, TypeRefId, Wrapper,
};
use super::registry::{DeclaredKind, DeclaredType, Field, LayoutState, StructDef, TypeRegistry};
use super::types::{DeclId, ModuleId, POINTER_SIZE, SLICE_SIZE, Type};
use super::verifier;

#[derive(Debug)]
pub struct Context {
    intrinsics: TypeRegistry,
    modules: Vec<Module>,
    by_name: HashMap<String, ModuleId>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            intrinsics: TypeRegistry::intrinsics(),
            modules: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    pub fn add_module(&mut self, name: &str) -> Result<ModuleId, IlError> {
        if self.by_name.contains_key(name) {
            return Err(IlError::DuplicateModule(name.to_string()));
        }
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module::new(id, name));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0 as usize)
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id.0 as usize)
    }

    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn module_by_name(&self, name: &str) -> Option<&Module> {
        self.module(self.module_id(name)?)
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn intrinsics(&self) -> &TypeRegistry {
        &self.intrinsics
    }

    fn get_module(&self, id: ModuleId) -> Result<&Module, IlError> {
        self.module(id)
            .ok_or_else(|| IlError::ModuleNotFound(format!("#{}", id.0)))
    }

    fn get_module_mut(&mut self, id: ModuleId) -> Result<&mut Module, IlError> {
        self.modules
            .get_mut(id.0 as usize)
            .ok_or_else(|| IlError::ModuleNotFound(format!("#{}", id.0)))
    }

    // ------------------------------------------------------------------
    // Declared types
    // ------------------------------------------------------------------

    /// Look a type name up in `module`, then in the intrinsic registry.
    pub fn get_type(&self, module: ModuleId, name: &str) -> Result<Type, IlError> {
        let m = self.get_module(module)?;
        if let Some((index, decl)) = m.types.get_type(name) {
            return Ok(match &decl.kind {
                DeclaredKind::Struct(_) => Type::Struct(DeclId { module, index }),
                DeclaredKind::Alias(ty) => ty.clone(),
            });
        }
        match self.intrinsics.get_type(name) {
            Some((_, DeclaredType {
                kind: DeclaredKind::Alias(ty),
                ..
            })) => Ok(ty.clone()),
            _ => Err(IlError::UnknownType(name.to_string())),
        }
    }

    pub fn declared(&self, decl: DeclId) -> Option<&DeclaredType> {
        self.module(decl.module)?.types.try_get_type_by_id(decl.index)
    }

    pub fn struct_def(&self, decl: DeclId) -> Result<&StructDef, IlError> {
        let declared = self
            .declared(decl)
            .ok_or_else(|| IlError::UnknownType(format!("struct#{}.{}", decl.module.0, decl.index)))?;
        declared
            .as_struct()
            .ok_or_else(|| IlError::NotAStruct(declared.name.clone()))
    }

    fn struct_def_mut(&mut self, decl: DeclId) -> Result<(&str, &mut StructDef), IlError> {
        let declared = self
            .modules
            .get_mut(decl.module.0 as usize)
            .and_then(|m| m.types.get_mut(decl.index))
            .ok_or_else(|| IlError::UnknownType(format!("struct#{}.{}", decl.module.0, decl.index)))?;
        match &mut declared.kind {
            DeclaredKind::Struct(def) => Ok((&declared.name, def)),
            DeclaredKind::Alias(_) => Err(IlError::NotAStruct(declared.name.clone())),
        }
    }

    /// Reserve a struct name so later fields (and other structs) can refer
    /// to it before its layout is known.
    pub fn declare_struct(&mut self, module: ModuleId, name: &str) -> Result<DeclId, IlError> {
        let m = self.get_module_mut(module)?;
        let index = m.types.define_type(DeclaredType {
            name: name.to_string(),
            kind: DeclaredKind::Struct(StructDef::declared()),
        })?;
        Ok(DeclId { module, index })
    }

    /// Set the fields of a declared struct and compute its layout.
    pub fn define_struct_fields(
        &mut self,
        decl: DeclId,
        fields: Vec<(String, Type)>,
    ) -> Result<(), IlError> {
        self.set_struct_fields(decl, fields)?;
        if let Err(err) = self.layout_struct(decl) {
            if let Ok((_, def)) = self.struct_def_mut(decl) {
                *def = StructDef::declared();
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn define_struct(
        &mut self,
        module: ModuleId,
        name: &str,
        fields: Vec<(String, Type)>,
    ) -> Result<DeclId, IlError> {
        let decl = self.declare_struct(module, name)?;
        self.define_struct_fields(decl, fields)?;
        Ok(decl)
    }

    pub fn define_alias(&mut self, module: ModuleId, name: &str, ty: Type) -> Result<u32, IlError> {
        self.get_module_mut(module)?
            .types
            .define_type(DeclaredType::alias(name, ty))
    }

    /// Retarget an alias reserved earlier with a placeholder type.
    pub(crate) fn set_alias(&mut self, module: ModuleId, index: u32, ty: Type) -> Result<(), IlError> {
        let declared = self
            .get_module_mut(module)?
            .types
            .get_mut(index)
            .ok_or_else(|| IlError::UnknownType(format!("type#{}.{}", module.0, index)))?;
        match &mut declared.kind {
            DeclaredKind::Alias(target) => {
                *target = ty;
                Ok(())
            }
            DeclaredKind::Struct(_) => Err(IlError::DuplicateType(declared.name.clone())),
        }
    }

    /// Record fields without laying them out. Used when several structs
    /// must all know their fields before any layout runs.
    pub(crate) fn set_struct_fields(
        &mut self,
        decl: DeclId,
        fields: Vec<(String, Type)>,
    ) -> Result<(), IlError> {
        let (name, def) = self.struct_def_mut(decl)?;
        if def.state != LayoutState::Declared {
            return Err(IlError::DuplicateType(name.to_string()));
        }
        def.fields = fields
            .into_iter()
            .map(|(name, ty)| Field {
                name,
                ty,
                offset: 0,
            })
            .collect();
        def.state = LayoutState::Pending;
        Ok(())
    }

    pub(crate) fn layout_struct(&mut self, decl: DeclId) -> Result<u32, IlError> {
        let mut roots = Vec::new();
        self.compute_struct_layout(decl, &mut roots)
    }

    fn compute_struct_layout(
        &mut self,
        decl: DeclId,
        roots: &mut Vec<DeclId>,
    ) -> Result<u32, IlError> {
        let (name, state, size, field_types) = {
            let (name, def) = self.struct_def_mut(decl)?;
            let types: Vec<Type> = def.fields.iter().map(|f| f.ty.clone()).collect();
            (name.to_string(), def.state, def.size, types)
        };
        if state == LayoutState::Complete {
            return Ok(size);
        }
        if roots.contains(&decl) {
            return Err(IlError::CircularStruct(name));
        }
        if state == LayoutState::Declared {
            return Err(IlError::IncompleteType(name));
        }

        roots.push(decl);
        let mut sizes = Vec::with_capacity(field_types.len());
        for ty in &field_types {
            sizes.push(self.layout_size(ty, roots)?);
        }
        roots.pop();

        let mut offset = 0u32;
        let mut offsets = Vec::with_capacity(sizes.len());
        for size in sizes {
            offsets.push(offset);
            offset = offset
                .checked_add(size)
                .ok_or_else(|| IlError::TypeTooLarge(name.clone()))?;
        }

        let (_, def) = self.struct_def_mut(decl)?;
        for (field, field_offset) in def.fields.iter_mut().zip(offsets) {
            field.offset = field_offset;
        }
        def.size = offset;
        def.state = LayoutState::Complete;
        Ok(offset)
    }

    /// Size of a field type during layout. Descends through by-value
    /// aggregates only; indirections end the walk.
    fn layout_size(&mut self, ty: &Type, roots: &mut Vec<DeclId>) -> Result<u32, IlError> {
        match ty {
            Type::Struct(decl) => self.compute_struct_layout(*decl, roots),
            Type::StaticArray { element, count } | Type::Vector { element, count } => self
                .layout_size(element, roots)?
                .checked_mul(*count)
                .ok_or_else(|| IlError::TypeTooLarge(ty.to_string())),
            other => self.size_of(other),
        }
    }

    /// Byte size of `ty`. Structs must be laid out.
    pub fn size_of(&self, ty: &Type) -> Result<u32, IlError> {
        Ok(match ty {
            Type::Integer { width, .. } => width.bytes(),
            Type::Float(width) => width.bytes(),
            Type::Boolean => 1,
            Type::Char => 4,
            Type::String | Type::DynamicArray(_) => SLICE_SIZE,
            Type::Pointer(_) | Type::Reference(_) => POINTER_SIZE,
            Type::Struct(decl) => {
                let def = self.struct_def(*decl)?;
                if !def.is_complete() {
                    return Err(IlError::IncompleteType(self.type_name(ty)));
                }
                def.size
            }
            Type::StaticArray { element, count } | Type::Vector { element, count } => self
                .size_of(element)?
                .checked_mul(*count)
                .ok_or_else(|| IlError::TypeTooLarge(self.type_name(ty)))?,
        })
    }

    pub fn field(&self, ty: &Type, index: u32) -> Result<&Field, IlError> {
        let Type::Struct(decl) = ty else {
            return Err(IlError::NotAStruct(self.type_name(ty)));
        };
        let def = self.struct_def(*decl)?;
        def.field(index).ok_or_else(|| IlError::FieldOutOfRange {
            ty: self.type_name(ty),
            index,
        })
    }

    /// Whether a value of `ty` holds anything the collector traces.
    pub fn contains_references(&self, ty: &Type) -> bool {
        match ty {
            Type::Reference(_) | Type::DynamicArray(_) | Type::String => true,
            Type::StaticArray { element, .. } | Type::Vector { element, .. } => {
                self.contains_references(element)
            }
            Type::Struct(decl) => self
                .struct_def(*decl)
                .is_ok_and(|def| def.fields.iter().any(|f| self.contains_references(&f.ty))),
            _ => false,
        }
    }

    /// Human-readable type name using declared struct names.
    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Struct(decl) => match self.declared(*decl) {
                Some(d) => d.name.clone(),
                None => ty.to_string(),
            },
            Type::StaticArray { element, count } => {
                format!("{}[{}]", self.type_name(element), count)
            }
            Type::DynamicArray(element) => format!("{}[]", self.type_name(element)),
            Type::Pointer(inner) => format!("{}*", self.type_name(inner)),
            Type::Reference(inner) => format!("{}&", self.type_name(inner)),
            Type::Vector { element, count } => {
                format!("vec<{}, {}>", self.type_name(element), count)
            }
            _ => ty.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    pub fn add_global(&mut self, module: ModuleId, name: &str, ty: Type) -> Result<u32, IlError> {
        let size = self.size_of(&ty)?;
        let m = self.get_module_mut(module)?;
        if m.globals().iter().any(|g| g.name == name) {
            return Err(IlError::DuplicateGlobal(name.to_string()));
        }
        Ok(m.push_global(name.to_string(), ty, size))
    }

    pub fn global_ref(
        &mut self,
        module: ModuleId,
        target_module: &str,
        index: u32,
    ) -> Result<GlobalRef, IlError> {
        Ok(GlobalRef {
            module_ref: self.module_ref(module, target_module)?,
            index,
        })
    }

    pub fn resolve_global(
        &self,
        module: ModuleId,
        global: GlobalRef,
    ) -> Result<(ModuleId, &Global), IlError> {
        let target = self.resolve_module_ref(module, global.module_ref)?;
        let g = self.get_module(target)?.global(global.index).ok_or_else(|| {
            IlError::UnresolvedGlobal {
                module: self.module_label(module),
                index: global.index,
            }
        })?;
        Ok((target, g))
    }

    // ------------------------------------------------------------------
    // Reference tables
    // ------------------------------------------------------------------

    fn module_label(&self, module: ModuleId) -> String {
        match self.module(module) {
            Some(m) => m.name().to_string(),
            None => format!("#{}", module.0),
        }
    }

    /// Intern `target` into `module`'s module-ref table.
    pub fn module_ref(&mut self, module: ModuleId, target: &str) -> Result<u32, IlError> {
        Ok(self
            .get_module_mut(module)?
            .module_refs
            .intern(target.to_string()))
    }

    pub fn resolve_module_ref(&self, module: ModuleId, id: u32) -> Result<ModuleId, IlError> {
        let m = self.get_module(module)?;
        if let Some(&target) = m.module_refs.cached(id) {
            return Ok(target);
        }
        let unresolved = || IlError::UnresolvedModuleRef {
            module: m.name().to_string(),
            id,
        };
        let name = m.module_refs.get(id).ok_or_else(unresolved)?;
        let target = *self.by_name.get(name).ok_or_else(unresolved)?;
        m.module_refs.cache(id, target).copied().ok_or_else(unresolved)
    }

    /// Decompose `ty` into a declared base plus a wrapper chain, interning
    /// the base's owning module into `module`'s module-ref table.
    pub fn describe_type(&mut self, module: ModuleId, ty: &Type) -> Result<TypeRefDesc, IlError> {
        let (owner, declared, wrappers) = self.decompose_type(ty)?;
        let module_ref = match owner {
            Some(owner) => {
                let owner = owner.to_string();
                self.module_ref(module, &owner)?
            }
            None => INTRINSIC_MODULE_REF,
        };
        Ok(TypeRefDesc {
            module_ref,
            declared,
            wrappers,
        })
    }

    /// Split `ty` into the name of the module owning its declared base
    /// (`None` for intrinsics), the base's declared id, and the wrapper
    /// chain innermost first.
    pub(crate) fn decompose_type(
        &self,
        ty: &Type,
    ) -> Result<(Option<&str>, u32, Vec<Wrapper>), IlError> {
        let mut wrappers = Vec::new();
        let mut base = ty;
        loop {
            base = match base {
                Type::Pointer(inner) => {
                    wrappers.push(Wrapper::Pointer);
                    &**inner
                }
                Type::Reference(inner) => {
                    wrappers.push(Wrapper::Reference);
                    &**inner
                }
                Type::StaticArray { element, count } => {
                    wrappers.push(Wrapper::StaticArray(*count));
                    &**element
                }
                Type::DynamicArray(element) => {
                    wrappers.push(Wrapper::DynamicArray);
                    &**element
                }
                Type::Vector { element, count } => {
                    wrappers.push(Wrapper::Vector(*count));
                    &**element
                }
                _ => break,
            };
        }
        wrappers.reverse();

        match base {
            Type::Struct(decl) => Ok((
                Some(self.get_module(decl.module)?.name()),
                decl.index,
                wrappers,
            )),
            other => {
                let id = self
                    .intrinsics
                    .find_alias(other)
                    .ok_or_else(|| IlError::UndescribableType(other.to_string()))?;
                Ok((None, id, wrappers))
            }
        }
    }

    /// Intern `ty` into `module`'s type-ref table.
    pub fn type_ref(&mut self, module: ModuleId, ty: &Type) -> Result<TypeRefId, IlError> {
        let desc = self.describe_type(module, ty)?;
        Ok(TypeRefId(self.get_module_mut(module)?.type_refs.intern(desc)))
    }

    /// Resolve a type reference, caching the result on first use.
    pub fn resolve_type_ref(
        &self,
        module: ModuleId,
        id: TypeRefId,
    ) -> Result<&ResolvedType, IlError> {
        let m = self.get_module(module)?;
        if let Some(resolved) = m.type_refs.cached(id.0) {
            return Ok(resolved);
        }
        let unresolved = || IlError::UnresolvedTypeRef {
            module: m.name().to_string(),
            id: id.0,
        };
        let desc = m.type_refs.get(id.0).ok_or_else(unresolved)?;
        let ty = self.resolve_desc(module, desc).ok_or_else(unresolved)?;
        let size = self.size_of(&ty)?;
        m.type_refs
            .cache(id.0, ResolvedType { ty, size })
            .ok_or_else(unresolved)
    }

    /// Rebuild the type a descriptor names, without touching caches.
    pub fn resolve_desc(&self, module: ModuleId, desc: &TypeRefDesc) -> Option<Type> {
        let base = if desc.module_ref == INTRINSIC_MODULE_REF {
            match &self.intrinsics.try_get_type_by_id(desc.declared)?.kind {
                DeclaredKind::Alias(ty) => ty.clone(),
                DeclaredKind::Struct(_) => return None,
            }
        } else {
            let target = self.resolve_module_ref(module, desc.module_ref).ok()?;
            let declared = self
                .module(target)?
                .types
                .try_get_type_by_id(desc.declared)?;
            match &declared.kind {
                DeclaredKind::Struct(_) => Type::Struct(DeclId {
                    module: target,
                    index: desc.declared,
                }),
                DeclaredKind::Alias(ty) => ty.clone(),
            }
        };
        Some(desc.wrappers.iter().fold(base, |ty, w| w.apply(ty)))
    }

    /// Intern a by-name function reference. The target module need not
    /// exist yet.
    pub fn function_ref(
        &mut self,
        module: ModuleId,
        target_module: &str,
        name: &str,
    ) -> Result<FunctionRefId, IlError> {
        let module_ref = self.module_ref(module, target_module)?;
        let desc = FunctionRefDesc {
            module_ref,
            name: name.to_string(),
        };
        Ok(FunctionRefId(
            self.get_module_mut(module)?.function_refs.intern(desc),
        ))
    }

    pub fn resolve_function_ref(
        &self,
        module: ModuleId,
        id: FunctionRefId,
    ) -> Result<FunctionId, IlError> {
        let m = self.get_module(module)?;
        if let Some(&target) = m.function_refs.cached(id.0) {
            return Ok(target);
        }
        let unresolved = || IlError::UnresolvedFunctionRef {
            module: m.name().to_string(),
            id: id.0,
        };
        let desc = m.function_refs.get(id.0).ok_or_else(unresolved)?;
        let target = self
            .resolve_module_ref(module, desc.module_ref)
            .map_err(|_| unresolved())?;
        let index = self
            .get_module(target)?
            .function_index(&desc.name)
            .ok_or_else(unresolved)?;
        let resolved = FunctionId {
            module: target,
            index,
        };
        m.function_refs
            .cache(id.0, resolved)
            .copied()
            .ok_or_else(unresolved)
    }

    pub fn string(&self, module: ModuleId, id: StringId) -> Result<&str, IlError> {
        let m = self.get_module(module)?;
        m.strings.get(id).ok_or_else(|| IlError::UnresolvedString {
            module: m.name().to_string(),
            id: id.0,
        })
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    pub fn add_function(&mut self, module: ModuleId, func: Function) -> Result<FunctionId, IlError> {
        let index = self.get_module_mut(module)?.push_function(func)?;
        Ok(FunctionId { module, index })
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.module(id.module)?.function(id.index)
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.module_mut(id.module)?.function_mut(id.index)
    }

    pub fn find_function(&self, module: &str, name: &str) -> Result<FunctionId, IlError> {
        let m = self
            .module_by_name(module)
            .ok_or_else(|| IlError::ModuleNotFound(module.to_string()))?;
        let index = m
            .function_index(name)
            .ok_or_else(|| IlError::FunctionNotFound {
                module: module.to_string(),
                function: name.to_string(),
            })?;
        Ok(FunctionId {
            module: m.id(),
            index,
        })
    }

    /// Finalize every function: prune empty blocks, compute frame layouts
    /// and verify block structure.
    pub fn commit(&mut self) -> Result<(), IlError> {
        for m in 0..self.modules.len() {
            for f in 0..self.modules[m].functions.len() {
                let removed = self.modules[m].functions[f].prune_blocks()?;
                if removed > 0 {
                    tracing::debug!(
                        module = self.modules[m].name(),
                        function = %self.modules[m].functions[f].name,
                        removed,
                        "pruned empty blocks"
                    );
                }
                let (param_sizes, local_sizes) = {
                    let func = &self.modules[m].functions[f];
                    let params = func
                        .params()
                        .iter()
                        .map(|p| self.size_of(&p.ty))
                        .collect::<Result<Vec<_>, _>>()?;
                    let locals = func
                        .locals()
                        .iter()
                        .map(|l| self.size_of(&l.ty))
                        .collect::<Result<Vec<_>, _>>()?;
                    (params, locals)
                };
                self.modules[m].functions[f].set_layout(&param_sizes, &local_sizes);
            }
        }
        verifier::verify_context(self)
    }
}
