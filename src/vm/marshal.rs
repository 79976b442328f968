//! Static-type driven views of raw bytes: copy widths, collector tracing
//! and printing.

use super::error::VmError;
use super::heap::{Heap, SlotKind, Tracer};
use super::value::{Handle, NativeValue, Pointer, Slice};
use crate::il::context::Context;
use crate::il::error::IlError;
use crate::il::types::{ARRAY_HEADER_SIZE, FloatWidth, IntWidth, Type};

/// How a load or store moves a value of some static type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    /// Integer, float, boolean or char of the given width.
    Scalar(u32),
    /// `(handle, offset, length)` descriptor.
    Slice,
    /// `(handle, offset)` descriptor.
    Address,
    /// Struct or fixed-size array copied as a raw byte range.
    Aggregate(u32),
}

impl CopyKind {
    pub fn width(self) -> u32 {
        match self {
            CopyKind::Scalar(n) | CopyKind::Aggregate(n) => n,
            CopyKind::Slice => Slice::SIZE,
            CopyKind::Address => Pointer::SIZE,
        }
    }
}

pub fn copy_kind(ctx: &Context, ty: &Type) -> Result<CopyKind, IlError> {
    Ok(match ty {
        Type::Integer { width, .. } => CopyKind::Scalar(width.bytes()),
        Type::Float(width) => CopyKind::Scalar(width.bytes()),
        Type::Boolean => CopyKind::Scalar(bool::SIZE),
        Type::Char => CopyKind::Scalar(char::SIZE),
        Type::String | Type::DynamicArray(_) => CopyKind::Slice,
        Type::Pointer(_) | Type::Reference(_) => CopyKind::Address,
        Type::Struct(_) | Type::StaticArray { .. } | Type::Vector { .. } => {
            CopyKind::Aggregate(ctx.size_of(ty)?)
        }
    })
}

/// Number of bytes a load or store of `ty` moves.
pub fn copy_width(ctx: &Context, ty: &Type) -> Result<u32, IlError> {
    copy_kind(ctx, ty).map(CopyKind::width)
}

// -----------------------------------------------------------------------------
// Tracing
// -----------------------------------------------------------------------------

/// Push the handles held by a value of `ty` stored at `memory[offset..]`.
/// Raw pointers are never followed.
pub fn scan_value(ctx: &Context, ty: &Type, memory: &[u8], offset: usize, out: &mut Vec<Handle>) {
    match ty {
        Type::Reference(_) | Type::DynamicArray(_) | Type::String => {
            if let Some(bytes) = memory.get(offset..offset + Handle::SIZE as usize) {
                let handle = Handle::read(bytes);
                if !handle.is_null() {
                    out.push(handle);
                }
            }
        }
        Type::Struct(decl) => {
            if !ctx.contains_references(ty) {
                return;
            }
            if let Ok(def) = ctx.struct_def(*decl) {
                for field in &def.fields {
                    scan_value(ctx, &field.ty, memory, offset + field.offset as usize, out);
                }
            }
        }
        Type::StaticArray { element, count } | Type::Vector { element, count } => {
            scan_elements(ctx, element, memory, offset, *count, out);
        }
        Type::Integer { .. }
        | Type::Float(_)
        | Type::Boolean
        | Type::Char
        | Type::Pointer(_) => {}
    }
}

fn scan_elements(
    ctx: &Context,
    element: &Type,
    memory: &[u8],
    offset: usize,
    count: u32,
    out: &mut Vec<Handle>,
) {
    if !ctx.contains_references(element) {
        return;
    }
    let Ok(size) = ctx.size_of(element) else {
        return;
    };
    for i in 0..count as usize {
        scan_value(ctx, element, memory, offset + i * size as usize, out);
    }
}

impl Tracer for Context {
    fn trace(&self, kind: &SlotKind, memory: &[u8], out: &mut Vec<Handle>) {
        match kind {
            SlotKind::Value(ty) => scan_value(self, ty, memory, 0, out),
            SlotKind::Array(element) => {
                let len = memory
                    .get(..ARRAY_HEADER_SIZE as usize)
                    .map(u32::read)
                    .unwrap_or(0);
                scan_elements(self, element, memory, ARRAY_HEADER_SIZE as usize, len, out);
            }
            SlotKind::Globals(module) => {
                if let Some(module) = self.module(*module) {
                    for global in module.globals() {
                        scan_value(self, &global.ty, memory, global.offset as usize, out);
                    }
                }
            }
            // Frames are scanned by the interpreter when it gathers roots.
            SlotKind::Stack => {}
        }
    }
}

// -----------------------------------------------------------------------------
// Printing
// -----------------------------------------------------------------------------

/// Render a value of `ty` whose bytes are `bytes`, following slices into
/// the heap.
pub fn format_value(
    ctx: &Context,
    heap: &Heap,
    ty: &Type,
    bytes: &[u8],
) -> Result<String, VmError> {
    Ok(match ty {
        Type::Integer { width, signed } => format_int(bytes, *width, *signed),
        Type::Float(FloatWidth::F32) => f32::read(bytes).to_string(),
        Type::Float(FloatWidth::F64) => f64::read(bytes).to_string(),
        Type::Boolean => bool::read(bytes).to_string(),
        Type::Char => char::read(bytes).to_string(),
        Type::String => {
            let slice = Slice::read(bytes);
            if slice.is_null() {
                String::new()
            } else {
                heap.read_string(slice)?
            }
        }
        Type::DynamicArray(element) => {
            let slice = Slice::read(bytes);
            let size = ctx.size_of(element)?;
            let mut items = Vec::with_capacity(slice.len as usize);
            if !slice.is_null() && slice.len > 0 {
                let body = heap.read(Pointer::new(slice.handle, slice.offset), slice.len * size)?;
                for chunk in body.chunks_exact(size.max(1) as usize) {
                    items.push(format_value(ctx, heap, element, chunk)?);
                }
            }
            format!("[{}]", items.join(", "))
        }
        Type::StaticArray { element, .. } | Type::Vector { element, .. } => {
            let size = ctx.size_of(element)?.max(1) as usize;
            let items = bytes
                .chunks_exact(size)
                .map(|chunk| format_value(ctx, heap, element, chunk))
                .collect::<Result<Vec<_>, _>>()?;
            if matches!(ty, Type::Vector { .. }) {
                format!("<{}>", items.join(", "))
            } else {
                format!("[{}]", items.join(", "))
            }
        }
        Type::Struct(decl) => {
            let def = ctx.struct_def(*decl)?;
            let mut fields = Vec::with_capacity(def.fields.len());
            for field in &def.fields {
                let size = ctx.size_of(&field.ty)? as usize;
                let start = field.offset as usize;
                let value = format_value(ctx, heap, &field.ty, &bytes[start..start + size])?;
                fields.push(format!("{}: {}", field.name, value));
            }
            format!("{} {{ {} }}", ctx.type_name(ty), fields.join(", "))
        }
        Type::Pointer(_) | Type::Reference(_) => Pointer::read(bytes).to_string(),
    })
}

fn format_int(bytes: &[u8], width: IntWidth, signed: bool) -> String {
    match (width, signed) {
        (IntWidth::W8, true) => i8::read(bytes).to_string(),
        (IntWidth::W16, true) => i16::read(bytes).to_string(),
        (IntWidth::W32, true) => i32::read(bytes).to_string(),
        (IntWidth::W64, true) => i64::read(bytes).to_string(),
        (IntWidth::W8, false) => u8::read(bytes).to_string(),
        (IntWidth::W16, false) => u16::read(bytes).to_string(),
        (IntWidth::W32, false) => u32::read(bytes).to_string(),
        (IntWidth::W64, false) => u64::read(bytes).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::types::ModuleId;

    fn node_context() -> (Context, Type) {
        let mut ctx = Context::new();
        let m = ctx.add_module("main").unwrap();
        let decl = ctx.declare_struct(m, "Node").unwrap();
        let node = Type::Struct(decl);
        ctx.define_struct_fields(
            decl,
            vec![
                ("value".into(), Type::i32()),
                ("next".into(), Type::reference(node.clone())),
                ("raw".into(), Type::pointer(node.clone())),
                ("name".into(), Type::String),
            ],
        )
        .unwrap();
        (ctx, node)
    }

    #[test]
    fn test_copy_kinds() {
        let (ctx, node) = node_context();
        assert_eq!(copy_kind(&ctx, &Type::u16()).unwrap(), CopyKind::Scalar(2));
        assert_eq!(copy_width(&ctx, &Type::String).unwrap(), 12);
        assert_eq!(copy_kind(&ctx, &Type::pointer(Type::i8())).unwrap(), CopyKind::Address);
        assert_eq!(copy_kind(&ctx, &node).unwrap(), CopyKind::Aggregate(32));
        assert_eq!(
            copy_width(&ctx, &Type::array(Type::i32(), 5)).unwrap(),
            20
        );
    }

    #[test]
    fn test_scan_skips_raw_pointers() {
        let (ctx, node) = node_context();
        let mut bytes = vec![0u8; 32];
        bytes[4..8].copy_from_slice(&5u32.to_le_bytes());
        bytes[12..16].copy_from_slice(&6u32.to_le_bytes());
        bytes[20..24].copy_from_slice(&7u32.to_le_bytes());
        let mut out = Vec::new();
        scan_value(&ctx, &node, &bytes, 0, &mut out);
        assert_eq!(out, vec![Handle(5), Handle(7)]);
    }

    #[test]
    fn test_trace_arrays_and_globals() {
        let (mut ctx, _) = node_context();
        let m = ModuleId(0);
        ctx.add_global(m, "counter", Type::i64()).unwrap();
        ctx.add_global(m, "names", Type::dynamic_array(Type::String)).unwrap();

        let mut globals = vec![0u8; 20];
        globals[8..12].copy_from_slice(&3u32.to_le_bytes());
        let mut out = Vec::new();
        ctx.trace(&SlotKind::Globals(m), &globals, &mut out);
        assert_eq!(out, vec![Handle(3)]);

        let mut array = 2u32.to_le_bytes().to_vec();
        array.extend_from_slice(&Slice::new(Handle(8), 4, 1).to_bytes());
        array.extend_from_slice(&Slice::EMPTY.to_bytes());
        out.clear();
        ctx.trace(&SlotKind::Array(Type::String), &array, &mut out);
        assert_eq!(out, vec![Handle(8)]);

        out.clear();
        ctx.trace(&SlotKind::Array(Type::i32()), &array, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_format_values() {
        let mut ctx = Context::new();
        let m = ctx.add_module("main").unwrap();
        let point = ctx
            .define_struct(m, "Point", vec![("x".into(), Type::i32()), ("y".into(), Type::i32())])
            .unwrap();
        let mut heap = Heap::new(1024, true);

        assert_eq!(
            format_value(&ctx, &heap, &Type::i8(), &[0xff]).unwrap(),
            "-1"
        );
        let text = heap.alloc_string("hi").unwrap();
        assert_eq!(
            format_value(&ctx, &heap, &Type::String, &text.to_bytes()).unwrap(),
            "hi"
        );

        let ints = heap.alloc_array(Type::i32(), 4, 3).unwrap();
        for i in 0..3 {
            heap.write_value(ints.element(i, 4).unwrap(), i as i32 * 2).unwrap();
        }
        assert_eq!(
            format_value(&ctx, &heap, &Type::dynamic_array(Type::i32()), &ints.to_bytes()).unwrap(),
            "[0, 2, 4]"
        );

        let mut bytes = 3i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(-4i32).to_le_bytes());
        assert_eq!(
            format_value(&ctx, &heap, &Type::Struct(point), &bytes).unwrap(),
            "Point { x: 3, y: -4 }"
        );
        assert_eq!(
            format_value(&ctx, &heap, &Type::pointer(Type::i32()), &Pointer::NULL.to_bytes())
                .unwrap(),
            "null"
        );
    }
}
