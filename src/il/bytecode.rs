//! Binary image serialization.
//!
//! Binary format (all integers little-endian, strings are a u32 byte
//! length followed by UTF-8):
//! - Magic: "STIL" (4 bytes)
//! - Version: u32
//! - Module count: u32, then per module:
//!   name, module-ref names, type-ref descriptors, function-ref
//!   descriptors, string pool, declared-type catalog, globals, and a
//!   length-prefixed function blob.
//!
//! Decoding is two-phase. Phase 1 reads every module's tables and keeps
//! the function blobs raw; the module graph is then built (struct names
//! first, then fields and layouts across all modules). Phase 2 parses the
//! function blobs against the complete graph.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use thiserror::Error;

use super::context::Context;
use super::error::IlError;
use super::function::{Block, Function};
use super::instr::{Instr, RawInstr};
use super::refs::{
    FunctionRefDesc, INTRINSIC_MODULE_REF, ModuleRefs, TypeRefDesc, TypeRefId, TypeRefs, Wrapper,
};
use super::registry::DeclaredKind;
use super::types::{DeclId, FloatWidth, IntWidth, ModuleId, Type};

/// Magic bytes for image files
pub const MAGIC: &[u8; 4] = b"STIL";

/// Current image format version
pub const VERSION: u32 = 1;

/// Return-type slot value meaning "void".
const VOID_TYPE_REF: u32 = u32::MAX;

/// Deepest wrapper nesting accepted in a serialized type.
const MAX_TYPE_DEPTH: usize = 64;

#[derive(Error, Debug)]
pub enum BytecodeError {
    #[error("invalid magic number")]
    InvalidMagic,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),

    #[error("unexpected end of file")]
    UnexpectedEof,

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("invalid {what} tag: {tag}")]
    InvalidTag { what: &'static str, tag: u8 },

    #[error("type nesting deeper than {MAX_TYPE_DEPTH}")]
    NestingTooDeep,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("type load failed: {0}")]
    TypeLoad(#[from] IlError),
}

// Type tags
const TYPE_INT: u8 = 0;
const TYPE_FLOAT: u8 = 1;
const TYPE_BOOL: u8 = 2;
const TYPE_CHAR: u8 = 3;
const TYPE_STRING: u8 = 4;
const TYPE_STRUCT: u8 = 5;
const TYPE_STATIC: u8 = 6;
const TYPE_DYNAMIC: u8 = 7;
const TYPE_POINTER: u8 = 8;
const TYPE_REFERENCE: u8 = 9;
const TYPE_VECTOR: u8 = 10;

// Declared-type kinds
const DECL_STRUCT: u8 = 0;
const DECL_ALIAS: u8 = 1;

// Wrapper tags inside a type-ref descriptor
const WRAP_POINTER: u8 = 0;
const WRAP_REFERENCE: u8 = 1;
const WRAP_STATIC: u8 = 2;
const WRAP_DYNAMIC: u8 = 3;
const WRAP_VECTOR: u8 = 4;

/// Serialize a context to bytes
pub fn serialize(ctx: &Context) -> Result<Vec<u8>, BytecodeError> {
    let mut buf = Vec::new();
    write_image(&mut buf, ctx)?;
    Ok(buf)
}

/// Deserialize a context from bytes
pub fn deserialize(data: &[u8]) -> Result<Context, BytecodeError> {
    let mut cursor = io::Cursor::new(data);
    read_image(&mut cursor)
}

pub fn save_to_file(ctx: &Context, path: &Path) -> Result<(), BytecodeError> {
    let bytes = serialize(ctx)?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<Context, BytecodeError> {
    let bytes = fs::read(path)?;
    deserialize(&bytes)
}

// ============================================================================
// Writer
// ============================================================================

/// Write an image of every module in `ctx`.
///
/// Signature types that were never interned get appended to a draft copy of
/// the module's type-ref table; ids already handed out are preserved.
pub fn write_image<W: Write>(w: &mut W, ctx: &Context) -> Result<(), BytecodeError> {
    w.write_all(MAGIC)?;
    write_u32(w, VERSION)?;
    write_u32(w, ctx.modules().len() as u32)?;
    for module in ctx.modules() {
        write_module(w, ctx, module.id())?;
    }
    Ok(())
}

/// Draft copies of a module's ref tables that the writer may extend.
struct Drafts {
    module_refs: ModuleRefs,
    type_refs: TypeRefs,
}

impl Drafts {
    fn module_ref(&mut self, owner: Option<&str>) -> u32 {
        match owner {
            Some(name) => self.module_refs.intern(name.to_string()),
            None => INTRINSIC_MODULE_REF,
        }
    }

    fn type_ref(&mut self, ctx: &Context, ty: &Type) -> Result<u32, IlError> {
        let (owner, declared, wrappers) = ctx.decompose_type(ty)?;
        let module_ref = self.module_ref(owner);
        Ok(self.type_refs.intern(TypeRefDesc {
            module_ref,
            declared,
            wrappers,
        }))
    }
}

fn write_module<W: Write>(w: &mut W, ctx: &Context, id: ModuleId) -> Result<(), BytecodeError> {
    let module = ctx
        .module(id)
        .ok_or_else(|| IlError::ModuleNotFound(format!("#{}", id.0)))?;
    let mut drafts = Drafts {
        module_refs: module.module_refs().draft(),
        type_refs: module.type_refs().draft(),
    };

    // Sections after the ref tables may extend the drafts, so they are
    // rendered first.
    let mut types = Vec::new();
    write_u32(&mut types, module.types().len() as u32)?;
    for (_, decl) in module.types().iter() {
        write_string(&mut types, &decl.name)?;
        match &decl.kind {
            DeclaredKind::Struct(def) => {
                write_u8(&mut types, DECL_STRUCT)?;
                write_u32(&mut types, def.fields.len() as u32)?;
                for field in &def.fields {
                    write_string(&mut types, &field.name)?;
                    write_type(&mut types, ctx, &mut drafts, &field.ty)?;
                }
            }
            DeclaredKind::Alias(ty) => {
                write_u8(&mut types, DECL_ALIAS)?;
                write_type(&mut types, ctx, &mut drafts, ty)?;
            }
        }
    }

    let mut globals = Vec::new();
    write_u32(&mut globals, module.globals().len() as u32)?;
    for global in module.globals() {
        write_string(&mut globals, &global.name)?;
        write_type(&mut globals, ctx, &mut drafts, &global.ty)?;
    }

    let mut blob = Vec::new();
    write_u32(&mut blob, module.functions().len() as u32)?;
    for func in module.functions() {
        write_function(&mut blob, ctx, &mut drafts, func)?;
    }

    write_string(w, module.name())?;

    write_u32(w, drafts.module_refs.len() as u32)?;
    for name in drafts.module_refs.iter() {
        write_string(w, name)?;
    }

    write_u32(w, drafts.type_refs.len() as u32)?;
    for desc in drafts.type_refs.iter() {
        write_type_ref(w, desc)?;
    }

    write_u32(w, module.function_refs().len() as u32)?;
    for desc in module.function_refs().iter() {
        write_u32(w, desc.module_ref)?;
        write_string(w, &desc.name)?;
    }

    write_u32(w, module.strings().len() as u32)?;
    for s in module.strings().iter() {
        write_string(w, s)?;
    }

    w.write_all(&types)?;
    w.write_all(&globals)?;
    write_u32(w, blob.len() as u32)?;
    w.write_all(&blob)?;
    Ok(())
}

fn write_type_ref<W: Write>(w: &mut W, desc: &TypeRefDesc) -> Result<(), BytecodeError> {
    if desc.wrappers.len() > MAX_TYPE_DEPTH {
        return Err(BytecodeError::NestingTooDeep);
    }
    write_u32(w, desc.module_ref)?;
    write_u32(w, desc.declared)?;
    write_u8(w, desc.wrappers.len() as u8)?;
    for wrapper in &desc.wrappers {
        match wrapper {
            Wrapper::Pointer => write_u8(w, WRAP_POINTER)?,
            Wrapper::Reference => write_u8(w, WRAP_REFERENCE)?,
            Wrapper::StaticArray(count) => {
                write_u8(w, WRAP_STATIC)?;
                write_u32(w, *count)?;
            }
            Wrapper::DynamicArray => write_u8(w, WRAP_DYNAMIC)?,
            Wrapper::Vector(count) => {
                write_u8(w, WRAP_VECTOR)?;
                write_u32(w, *count)?;
            }
        }
    }
    Ok(())
}

fn write_type<W: Write>(
    w: &mut W,
    ctx: &Context,
    drafts: &mut Drafts,
    ty: &Type,
) -> Result<(), BytecodeError> {
    match ty {
        Type::Integer { width, signed } => {
            write_u8(w, TYPE_INT)?;
            write_u8(w, width.bits() as u8)?;
            write_u8(w, *signed as u8)?;
        }
        Type::Float(width) => {
            write_u8(w, TYPE_FLOAT)?;
            write_u8(w, (width.bytes() * 8) as u8)?;
        }
        Type::Boolean => write_u8(w, TYPE_BOOL)?,
        Type::Char => write_u8(w, TYPE_CHAR)?,
        Type::String => write_u8(w, TYPE_STRING)?,
        Type::Struct(decl) => {
            let owner = ctx
                .module(decl.module)
                .ok_or_else(|| IlError::ModuleNotFound(format!("#{}", decl.module.0)))?
                .name();
            write_u8(w, TYPE_STRUCT)?;
            write_u32(w, drafts.module_ref(Some(owner)))?;
            write_u32(w, decl.index)?;
        }
        Type::StaticArray { element, count } => {
            write_u8(w, TYPE_STATIC)?;
            write_u32(w, *count)?;
            write_type(w, ctx, drafts, element)?;
        }
        Type::DynamicArray(element) => {
            write_u8(w, TYPE_DYNAMIC)?;
            write_type(w, ctx, drafts, element)?;
        }
        Type::Pointer(inner) => {
            write_u8(w, TYPE_POINTER)?;
            write_type(w, ctx, drafts, inner)?;
        }
        Type::Reference(inner) => {
            write_u8(w, TYPE_REFERENCE)?;
            write_type(w, ctx, drafts, inner)?;
        }
        Type::Vector { element, count } => {
            write_u8(w, TYPE_VECTOR)?;
            write_u32(w, *count)?;
            write_type(w, ctx, drafts, element)?;
        }
    }
    Ok(())
}

fn write_function<W: Write>(
    w: &mut W,
    ctx: &Context,
    drafts: &mut Drafts,
    func: &Function,
) -> Result<(), BytecodeError> {
    write_string(w, &func.name)?;
    let ret = match &func.return_type {
        Some(ty) => drafts.type_ref(ctx, ty)?,
        None => VOID_TYPE_REF,
    };
    write_u32(w, ret)?;

    write_u32(w, func.params().len() as u32)?;
    for param in func.params() {
        write_string(w, &param.name)?;
        write_u32(w, drafts.type_ref(ctx, &param.ty)?)?;
    }

    write_u32(w, func.locals().len() as u32)?;
    for local in func.locals() {
        write_u32(w, drafts.type_ref(ctx, &local.ty)?)?;
    }

    write_u32(w, func.blocks().len() as u32)?;
    for block in func.blocks() {
        write_u32(w, block.len() as u32)?;
        for instr in block.instrs() {
            w.write_all(&RawInstr::from(*instr).to_bytes())?;
        }
    }
    Ok(())
}

// ============================================================================
// Reader
// ============================================================================

/// Serialized type before module refs can be resolved.
#[derive(Debug, Clone)]
enum WireType {
    Int { width: IntWidth, signed: bool },
    Float(FloatWidth),
    Bool,
    Char,
    String,
    Struct { module_ref: u32, id: u32 },
    Static(u32, Box<WireType>),
    Dynamic(Box<WireType>),
    Pointer(Box<WireType>),
    Reference(Box<WireType>),
    Vector(u32, Box<WireType>),
}

#[derive(Debug)]
enum WireDecl {
    Struct(Vec<(String, WireType)>),
    Alias(WireType),
}

/// Everything phase 1 reads for one module.
#[derive(Debug)]
struct ModuleImage {
    name: String,
    module_refs: Vec<String>,
    type_refs: Vec<TypeRefDesc>,
    function_refs: Vec<FunctionRefDesc>,
    strings: Vec<String>,
    types: Vec<(String, WireDecl)>,
    globals: Vec<(String, WireType)>,
    blob: Vec<u8>,
}

/// Read an image into a fresh context.
pub fn read_image<R: Read>(r: &mut R) -> Result<Context, BytecodeError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)
        .map_err(|_| BytecodeError::UnexpectedEof)?;
    if &magic != MAGIC {
        return Err(BytecodeError::InvalidMagic);
    }
    let version = read_u32(r)?;
    if version != VERSION {
        return Err(BytecodeError::UnsupportedVersion(version));
    }

    // Phase 1: scalar state of every module.
    let module_count = read_u32(r)? as usize;
    let mut images = Vec::with_capacity(module_count.min(1024));
    for _ in 0..module_count {
        images.push(read_module_image(r)?);
    }
    tracing::debug!(modules = images.len(), "read module tables");

    let mut ctx = Context::new();
    let ids = build_modules(&mut ctx, &images)?;

    // Phase 2: function bodies against the complete graph.
    for (image, &id) in images.iter().zip(&ids) {
        let mut blob = image.blob.as_slice();
        let count = read_u32(&mut blob)?;
        for _ in 0..count {
            let func = read_function(&mut blob, &ctx, id)?;
            ctx.add_function(id, func)?;
        }
        tracing::debug!(module = %image.name, functions = count, "loaded function blob");
    }
    Ok(ctx)
}

fn read_module_image<R: Read>(r: &mut R) -> Result<ModuleImage, BytecodeError> {
    let name = read_string(r)?;

    let count = read_u32(r)? as usize;
    let mut module_refs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        module_refs.push(read_string(r)?);
    }

    let count = read_u32(r)? as usize;
    let mut type_refs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        type_refs.push(read_type_ref(r)?);
    }

    let count = read_u32(r)? as usize;
    let mut function_refs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let module_ref = read_u32(r)?;
        let name = read_string(r)?;
        function_refs.push(FunctionRefDesc { module_ref, name });
    }

    let count = read_u32(r)? as usize;
    let mut strings = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        strings.push(read_string(r)?);
    }

    let count = read_u32(r)? as usize;
    let mut types = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let name = read_string(r)?;
        let decl = match read_u8(r)? {
            DECL_STRUCT => {
                let field_count = read_u32(r)? as usize;
                let mut fields = Vec::with_capacity(field_count.min(1024));
                for _ in 0..field_count {
                    let field_name = read_string(r)?;
                    fields.push((field_name, read_wire_type(r, 0)?));
                }
                WireDecl::Struct(fields)
            }
            DECL_ALIAS => WireDecl::Alias(read_wire_type(r, 0)?),
            tag => {
                return Err(BytecodeError::InvalidTag {
                    what: "declared type",
                    tag,
                });
            }
        };
        types.push((name, decl));
    }

    let count = read_u32(r)? as usize;
    let mut globals = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let name = read_string(r)?;
        globals.push((name, read_wire_type(r, 0)?));
    }

    let blob = read_bytes(r)?;

    Ok(ModuleImage {
        name,
        module_refs,
        type_refs,
        function_refs,
        strings,
        types,
        globals,
        blob,
    })
}

/// Construct modules, ref tables, types and globals from phase-1 images.
fn build_modules(ctx: &mut Context, images: &[ModuleImage]) -> Result<Vec<ModuleId>, BytecodeError> {
    let mut ids = Vec::with_capacity(images.len());
    for image in images {
        ids.push(ctx.add_module(&image.name)?);
    }

    for (image, &id) in images.iter().zip(&ids) {
        let module = ctx
            .module_mut(id)
            .ok_or_else(|| IlError::ModuleNotFound(image.name.clone()))?;
        for name in &image.module_refs {
            module.module_refs.intern(name.clone());
        }
        for desc in &image.type_refs {
            module.type_refs.intern(desc.clone());
        }
        for desc in &image.function_refs {
            module.function_refs.intern(desc.clone());
        }
        for s in &image.strings {
            module.intern_string(s);
        }
    }

    // Every declared name gets its id before any field type is resolved.
    for (image, &id) in images.iter().zip(&ids) {
        for (name, decl) in &image.types {
            match decl {
                WireDecl::Struct(_) => {
                    ctx.declare_struct(id, name)?;
                }
                WireDecl::Alias(_) => {
                    ctx.define_alias(id, name, Type::Boolean)?;
                }
            }
        }
    }

    let mut structs = Vec::new();
    for (image, &id) in images.iter().zip(&ids) {
        for (index, (_, decl)) in image.types.iter().enumerate() {
            match decl {
                WireDecl::Struct(fields) => {
                    let fields = fields
                        .iter()
                        .map(|(name, wire)| Ok((name.clone(), resolve_wire_type(ctx, id, wire)?)))
                        .collect::<Result<Vec<_>, IlError>>()?;
                    let decl = DeclId {
                        module: id,
                        index: index as u32,
                    };
                    ctx.set_struct_fields(decl, fields)?;
                    structs.push(decl);
                }
                WireDecl::Alias(wire) => {
                    let ty = resolve_wire_type(ctx, id, wire)?;
                    ctx.set_alias(id, index as u32, ty)?;
                }
            }
        }
    }

    for decl in structs {
        ctx.layout_struct(decl)?;
    }

    for (image, &id) in images.iter().zip(&ids) {
        for (name, wire) in &image.globals {
            let ty = resolve_wire_type(ctx, id, wire)?;
            ctx.add_global(id, name, ty)?;
        }
    }
    Ok(ids)
}

fn resolve_wire_type(ctx: &Context, module: ModuleId, wire: &WireType) -> Result<Type, IlError> {
    Ok(match wire {
        WireType::Int { width, signed } => Type::int(*width, *signed),
        WireType::Float(width) => Type::Float(*width),
        WireType::Bool => Type::Boolean,
        WireType::Char => Type::Char,
        WireType::String => Type::String,
        WireType::Struct { module_ref, id } => {
            let owner = ctx.resolve_module_ref(module, *module_ref)?;
            let decl = DeclId {
                module: owner,
                index: *id,
            };
            ctx.struct_def(decl)?;
            Type::Struct(decl)
        }
        WireType::Static(count, element) => {
            Type::array(resolve_wire_type(ctx, module, element)?, *count)
        }
        WireType::Dynamic(element) => Type::dynamic_array(resolve_wire_type(ctx, module, element)?),
        WireType::Pointer(inner) => Type::pointer(resolve_wire_type(ctx, module, inner)?),
        WireType::Reference(inner) => Type::reference(resolve_wire_type(ctx, module, inner)?),
        WireType::Vector(count, element) => {
            Type::vector(resolve_wire_type(ctx, module, element)?, *count)
        }
    })
}

fn read_type_ref<R: Read>(r: &mut R) -> Result<TypeRefDesc, BytecodeError> {
    let module_ref = read_u32(r)?;
    let declared = read_u32(r)?;
    let count = read_u8(r)? as usize;
    if count > MAX_TYPE_DEPTH {
        return Err(BytecodeError::NestingTooDeep);
    }
    let mut wrappers = Vec::with_capacity(count);
    for _ in 0..count {
        wrappers.push(match read_u8(r)? {
            WRAP_POINTER => Wrapper::Pointer,
            WRAP_REFERENCE => Wrapper::Reference,
            WRAP_STATIC => Wrapper::StaticArray(read_u32(r)?),
            WRAP_DYNAMIC => Wrapper::DynamicArray,
            WRAP_VECTOR => Wrapper::Vector(read_u32(r)?),
            tag => return Err(BytecodeError::InvalidTag { what: "wrapper", tag }),
        });
    }
    Ok(TypeRefDesc {
        module_ref,
        declared,
        wrappers,
    })
}

fn read_wire_type<R: Read>(r: &mut R, depth: usize) -> Result<WireType, BytecodeError> {
    if depth > MAX_TYPE_DEPTH {
        return Err(BytecodeError::NestingTooDeep);
    }
    let tag = read_u8(r)?;
    Ok(match tag {
        TYPE_INT => {
            let bits = read_u8(r)?;
            let width = IntWidth::from_bytes(bits as u32 / 8)
                .filter(|_| bits % 8 == 0)
                .ok_or(BytecodeError::InvalidTag {
                    what: "integer width",
                    tag: bits,
                })?;
            WireType::Int {
                width,
                signed: read_u8(r)? != 0,
            }
        }
        TYPE_FLOAT => {
            let bits = read_u8(r)?;
            let width = FloatWidth::from_bytes(bits as u32 / 8)
                .filter(|_| bits % 8 == 0)
                .ok_or(BytecodeError::InvalidTag {
                    what: "float width",
                    tag: bits,
                })?;
            WireType::Float(width)
        }
        TYPE_BOOL => WireType::Bool,
        TYPE_CHAR => WireType::Char,
        TYPE_STRING => WireType::String,
        TYPE_STRUCT => WireType::Struct {
            module_ref: read_u32(r)?,
            id: read_u32(r)?,
        },
        TYPE_STATIC => {
            let count = read_u32(r)?;
            WireType::Static(count, Box::new(read_wire_type(r, depth + 1)?))
        }
        TYPE_DYNAMIC => WireType::Dynamic(Box::new(read_wire_type(r, depth + 1)?)),
        TYPE_POINTER => WireType::Pointer(Box::new(read_wire_type(r, depth + 1)?)),
        TYPE_REFERENCE => WireType::Reference(Box::new(read_wire_type(r, depth + 1)?)),
        TYPE_VECTOR => {
            let count = read_u32(r)?;
            WireType::Vector(count, Box::new(read_wire_type(r, depth + 1)?))
        }
        tag => return Err(BytecodeError::InvalidTag { what: "type", tag }),
    })
}

fn read_signature_type<R: Read>(
    r: &mut R,
    ctx: &Context,
    module: ModuleId,
) -> Result<Type, BytecodeError> {
    let id = TypeRefId(read_u32(r)?);
    Ok(ctx.resolve_type_ref(module, id)?.ty.clone())
}

fn read_function<R: Read>(
    r: &mut R,
    ctx: &Context,
    module: ModuleId,
) -> Result<Function, BytecodeError> {
    let name = read_string(r)?;
    let ret = read_u32(r)?;
    let return_type = if ret == VOID_TYPE_REF {
        None
    } else {
        Some(ctx.resolve_type_ref(module, TypeRefId(ret))?.ty.clone())
    };

    let count = read_u32(r)? as usize;
    let mut params = Vec::with_capacity(count.min(256));
    for _ in 0..count {
        let param_name = read_string(r)?;
        params.push((param_name, read_signature_type(r, ctx, module)?));
    }

    let count = read_u32(r)? as usize;
    let mut locals = Vec::with_capacity(count.min(256));
    for _ in 0..count {
        locals.push(read_signature_type(r, ctx, module)?);
    }

    let count = read_u32(r)? as usize;
    let mut blocks = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let len = read_u32(r)? as usize;
        let mut instrs = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            let mut bytes = [0u8; RawInstr::SIZE];
            r.read_exact(&mut bytes)
                .map_err(|_| BytecodeError::UnexpectedEof)?;
            instrs.push(Instr::try_from(RawInstr::from_bytes(&bytes))?);
        }
        blocks.push(Block::from_instrs(instrs));
    }

    Ok(Function::from_parts(name, return_type, params, locals, blocks))
}

// ============================================================================
// Primitives
// ============================================================================

fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, BytecodeError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)
        .map_err(|_| BytecodeError::UnexpectedEof)?;
    Ok(buf[0])
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, BytecodeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|_| BytecodeError::UnexpectedEof)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

/// Read a u32-length-prefixed byte run without trusting the length for
/// the allocation.
fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>, BytecodeError> {
    let len = read_u32(r)? as usize;
    let mut buf = Vec::new();
    r.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(BytecodeError::UnexpectedEof);
    }
    Ok(buf)
}

fn read_string<R: Read>(r: &mut R) -> Result<String, BytecodeError> {
    let buf = read_bytes(r)?;
    String::from_utf8(buf).map_err(|_| BytecodeError::InvalidUtf8)
}
