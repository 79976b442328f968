use std::collections::HashMap;
use std::io::{self, Write};

use super::error::VmError;
use super::heap::{GcStats, Heap, HeapStats, SlotKind};
use super::marshal::{self, copy_width};
use super::ops::{self, BinOp, CmpOp};
use super::stack::OperandStack;
use super::value::{Handle, Pointer, Slice};
use crate::config::RuntimeConfig;
use crate::il::context::Context;
use crate::il::error::IlError;
use crate::il::function::{CONTINUATION_SIZE, Function, FunctionId};
use crate::il::instr::{BlockId, Instr};
use crate::il::refs::{GlobalRef, StringId, TypeRefId};
use crate::il::types::{ModuleId, NumKind, Type};

/// A logical window onto the operand stack for one active call.
#[derive(Debug, Clone, Copy)]
struct Frame {
    function: FunctionId,
    /// Stack position just above the saved continuation; locals start here.
    base: u32,
    param_size: u32,
    locals_size: u32,
}

/// The stil interpreter.
///
/// Holds execution state only. The program lives in a `Context` passed to
/// every call, so one context may be shared by several machines.
pub struct Vm {
    heap: Heap,
    stack: OperandStack,
    frames: Vec<Frame>,
    block: u32,
    pc: u32,
    /// Per-module globals slots, allocated on first touch.
    globals: HashMap<ModuleId, Handle>,
    /// Interned string literals, pinned until released.
    literals: HashMap<(ModuleId, StringId), Slice>,
    /// Output stream for `print`
    output: Box<dyn Write>,
}

impl Vm {
    pub fn new(config: &RuntimeConfig) -> Result<Self, VmError> {
        Self::with_output(config, Box::new(io::stdout()))
    }

    pub fn with_output(config: &RuntimeConfig, output: Box<dyn Write>) -> Result<Self, VmError> {
        let mut heap = Heap::new(config.heap_capacity, config.gc_enabled);
        let stack = OperandStack::new(&mut heap, config.stack_size)?;
        Ok(Self {
            heap,
            stack,
            frames: Vec::new(),
            block: 0,
            pc: 0,
            globals: HashMap::new(),
            literals: HashMap::new(),
            output,
        })
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    pub fn gc_stats(&self) -> GcStats {
        self.heap.gc_stats()
    }

    pub fn stack_depth(&self) -> u32 {
        self.stack.sp()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn flush(&mut self) -> Result<(), VmError> {
        self.output.flush()?;
        Ok(())
    }

    /// Run `function` with `args` already laid out in stack order (last
    /// parameter lowest) and return the bytes of its result.
    ///
    /// On failure the operand stack, frames and cursor are restored to
    /// their state before the call.
    pub fn call(
        &mut self,
        ctx: &Context,
        function: FunctionId,
        args: &[u8],
    ) -> Result<Vec<u8>, VmError> {
        let (sp, depth, block, pc) = (self.stack.sp(), self.frames.len(), self.block, self.pc);
        let result = self.call_inner(ctx, function, args, depth);
        if let Err(err) = &result {
            tracing::debug!(error = %err, "invocation aborted");
            self.stack.truncate(sp);
            self.frames.truncate(depth);
            self.block = block;
            self.pc = pc;
        }
        result
    }

    fn call_inner(
        &mut self,
        ctx: &Context,
        function: FunctionId,
        args: &[u8],
        depth: usize,
    ) -> Result<Vec<u8>, VmError> {
        let ret_size = return_size(ctx, lookup(ctx, function)?)?;
        self.stack.push_bytes(&mut self.heap, args)?;
        self.enter(ctx, function)?;
        self.run(ctx, depth)?;
        self.stack.pop_bytes(&self.heap, ret_size)
    }

    /// Collect now, outside any allocation checkpoint.
    pub fn collect_garbage(&mut self, ctx: &Context) -> Result<usize, VmError> {
        let roots = self.gather_roots(ctx)?;
        Ok(self.heap.collect(&roots, ctx))
    }

    /// Unpin every interned literal. Returns how many were released.
    pub fn release_literals(&mut self) -> usize {
        let released = self.literals.len();
        for (_, slice) in self.literals.drain() {
            // A literal slot is pinned for its whole life, so it is live here.
            let _ = self.heap.unpin(slice.handle);
        }
        released
    }

    // =========================================================================
    // Calling convention
    // =========================================================================

    fn enter(&mut self, ctx: &Context, id: FunctionId) -> Result<(), VmError> {
        let func = lookup(ctx, id)?;
        let param_size = func.param_size();
        if self.stack.sp() < param_size {
            return Err(VmError::StackUnderflow);
        }
        self.stack.push(&mut self.heap, self.block)?;
        self.stack.push(&mut self.heap, self.pc)?;
        let base = self.stack.sp();
        self.stack.push_zeroed(&mut self.heap, func.locals_size())?;
        self.frames.push(Frame {
            function: id,
            base,
            param_size,
            locals_size: func.locals_size(),
        });
        self.block = 0;
        self.pc = 0;
        tracing::trace!(function = %func.name, base, depth = self.frames.len(), "enter");
        Ok(())
    }

    fn leave(&mut self, ctx: &Context) -> Result<(), VmError> {
        let frame = self.frames.pop().ok_or(VmError::StackUnderflow)?;
        let ret_size = return_size(ctx, lookup(ctx, frame.function)?)?;
        let value = self.stack.pop_bytes(&self.heap, ret_size)?;
        if self.stack.sp() < frame.base + frame.locals_size {
            return Err(VmError::StackUnderflow);
        }
        // Temporaries left above the locals go with them.
        self.stack.truncate(frame.base);
        self.pc = self.stack.pop(&self.heap)?;
        self.block = self.stack.pop(&self.heap)?;
        self.stack.discard(frame.param_size)?;
        self.stack.push_bytes(&mut self.heap, &value)
    }

    fn run(&mut self, ctx: &Context, depth: usize) -> Result<(), VmError> {
        while self.frames.len() > depth {
            let Some(frame) = self.frames.last().copied() else {
                break;
            };
            let func = lookup(ctx, frame.function)?;
            let instr = func
                .block(BlockId(self.block))
                .and_then(|block| block.instrs().get(self.pc as usize))
                .copied();
            let Some(instr) = instr else {
                return Err(VmError::UnterminatedBlock {
                    function: func.name.clone(),
                    block: self.block,
                });
            };
            self.pc += 1;
            self.execute(ctx, frame, func, instr)?;
        }
        Ok(())
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    fn execute(
        &mut self,
        ctx: &Context,
        frame: Frame,
        func: &Function,
        instr: Instr,
    ) -> Result<(), VmError> {
        let module = frame.function.module;
        match instr {
            Instr::PushInt { kind, value } => self.push_num(kind, value)?,
            Instr::PushFloat { width, bits } => self.push_num(NumKind::Float(width), bits)?,
            Instr::PushBool(b) => self.stack.push(&mut self.heap, b)?,
            Instr::PushChar(c) => self.stack.push(&mut self.heap, c)?,
            Instr::PushNull => self.stack.push(&mut self.heap, Pointer::NULL)?,
            Instr::PushDefault(t) => {
                let size = resolve(ctx, module, t)?.1;
                self.stack.push_zeroed(&mut self.heap, size)?;
            }
            Instr::PushString(s) => {
                let slice = self.literal(ctx, module, s)?;
                self.stack.push(&mut self.heap, slice)?;
            }

            Instr::Pop(t) => self.stack.discard(resolve(ctx, module, t)?.1)?,
            Instr::Dup(t) => self.stack.dup(&mut self.heap, resolve(ctx, module, t)?.1)?,

            Instr::LoadLocal(i) => {
                let (at, width) = local_slot(ctx, frame, func, i)?;
                let src = self.stack.address(at);
                self.stack.push_from(&mut self.heap, src, width)?;
            }
            Instr::StoreLocal(i) => {
                let (at, width) = local_slot(ctx, frame, func, i)?;
                let dst = self.stack.address(at);
                self.stack.pop_into(&mut self.heap, dst, width)?;
            }
            Instr::LocalAddr(i) => {
                let (at, _) = local_slot(ctx, frame, func, i)?;
                let ptr = self.stack.address(at);
                self.stack.push(&mut self.heap, ptr)?;
            }
            Instr::LoadArg(i) => {
                let (at, width) = arg_slot(ctx, frame, func, i)?;
                let src = self.stack.address(at);
                self.stack.push_from(&mut self.heap, src, width)?;
            }
            Instr::StoreArg(i) => {
                let (at, width) = arg_slot(ctx, frame, func, i)?;
                let dst = self.stack.address(at);
                self.stack.pop_into(&mut self.heap, dst, width)?;
            }
            Instr::ArgAddr(i) => {
                let (at, _) = arg_slot(ctx, frame, func, i)?;
                let ptr = self.stack.address(at);
                self.stack.push(&mut self.heap, ptr)?;
            }
            Instr::LoadGlobal(g) => {
                let (ptr, width) = self.global_slot(ctx, module, g)?;
                self.stack.push_from(&mut self.heap, ptr, width)?;
            }
            Instr::StoreGlobal(g) => {
                let (ptr, width) = self.global_slot(ctx, module, g)?;
                self.stack.pop_into(&mut self.heap, ptr, width)?;
            }
            Instr::GlobalAddr(g) => {
                let (ptr, _) = self.global_slot(ctx, module, g)?;
                self.stack.push(&mut self.heap, ptr)?;
            }

            Instr::Load(t) => {
                let size = resolve(ctx, module, t)?.1;
                let ptr = self.pop_address()?;
                self.stack.push_from(&mut self.heap, ptr, size)?;
            }
            Instr::Store(t) => {
                let size = resolve(ctx, module, t)?.1;
                let value = self.stack.pop_bytes(&self.heap, size)?;
                let ptr = self.pop_address()?;
                self.heap.write(ptr, &value)?;
            }
            Instr::FieldPtr { ty, field } => {
                let (offset, _) = field_slot(ctx, module, ty, field)?;
                let ptr = self.pop_address()?;
                let field_ptr = ptr.offset_by(offset).ok_or(VmError::PointerOutOfRange)?;
                self.stack.push(&mut self.heap, field_ptr)?;
            }
            Instr::LoadField { ty, field } => {
                let (offset, width) = field_slot(ctx, module, ty, field)?;
                let ptr = self.pop_address()?;
                let src = ptr.offset_by(offset).ok_or(VmError::PointerOutOfRange)?;
                self.stack.push_from(&mut self.heap, src, width)?;
            }
            Instr::StoreField { ty, field } => {
                let (offset, width) = field_slot(ctx, module, ty, field)?;
                let value = self.stack.pop_bytes(&self.heap, width)?;
                let ptr = self.pop_address()?;
                let dst = ptr.offset_by(offset).ok_or(VmError::PointerOutOfRange)?;
                self.heap.write(dst, &value)?;
            }
            Instr::ElementPtr(t) => {
                let container = &resolve(ctx, module, t)?.0;
                let ptr = self.element_address(ctx, container)?;
                self.stack.push(&mut self.heap, ptr)?;
            }
            Instr::LoadElement(t) => {
                let container = &resolve(ctx, module, t)?.0;
                let width = element_size(ctx, container)?;
                let ptr = self.element_address(ctx, container)?;
                self.stack.push_from(&mut self.heap, ptr, width)?;
            }
            Instr::StoreElement(t) => {
                let container = &resolve(ctx, module, t)?.0;
                let width = element_size(ctx, container)?;
                let value = self.stack.pop_bytes(&self.heap, width)?;
                let ptr = self.element_address(ctx, container)?;
                self.heap.write(ptr, &value)?;
            }
            Instr::ArrayLength(t) => {
                let container = &resolve(ctx, module, t)?.0;
                let len = match container {
                    Type::StaticArray { count, .. } | Type::Vector { count, .. } => {
                        self.stack.pop::<Pointer>(&self.heap)?;
                        *count
                    }
                    Type::DynamicArray(_) | Type::String => {
                        self.stack.pop::<Slice>(&self.heap)?.len
                    }
                    other => return Err(not_indexable("len", ctx, other)),
                };
                self.stack.push(&mut self.heap, len as i32)?;
            }
            Instr::SliceRange(t) => {
                let container = &resolve(ctx, module, t)?.0;
                let width = element_size(ctx, container)?;
                let end = self.stack.pop::<i32>(&self.heap)?;
                let start = self.stack.pop::<i32>(&self.heap)?;
                let slice = self.stack.pop::<Slice>(&self.heap)?;
                let narrowed = u32::try_from(start)
                    .ok()
                    .zip(u32::try_from(end).ok())
                    .and_then(|(s, e)| slice.narrow(s, e, width))
                    .ok_or(VmError::IndexOutOfRange {
                        index: i64::from(if start < 0 { start } else { end }),
                        length: slice.len,
                    })?;
                self.stack.push(&mut self.heap, narrowed)?;
            }
            Instr::PtrOffset(t) => {
                let size = resolve(ctx, module, t)?.1;
                let count = self.stack.pop::<i64>(&self.heap)?;
                let ptr = self.pop_address()?;
                let moved = count
                    .checked_mul(i64::from(size))
                    .and_then(|delta| ptr.offset_by(delta))
                    .ok_or(VmError::PointerOutOfRange)?;
                self.stack.push(&mut self.heap, moved)?;
            }
            Instr::IsNull => {
                let ptr = self.stack.pop::<Pointer>(&self.heap)?;
                self.stack.push(&mut self.heap, ptr.is_null())?;
            }

            Instr::New(t) => {
                let (ty, size) = resolve(ctx, module, t)?;
                self.checkpoint(ctx)?;
                let handle = self.heap.malloc(SlotKind::Value(ty.clone()), size as usize)?;
                self.stack.push(&mut self.heap, Pointer::new(handle, 0))?;
            }
            Instr::NewArray(t) => {
                let (element, size) = resolve(ctx, module, t)?;
                let len = self.stack.pop::<i32>(&self.heap)?;
                if len < 0 {
                    return Err(VmError::NegativeLength(len));
                }
                self.checkpoint(ctx)?;
                let slice = self.heap.alloc_array(element.clone(), size, len as u32)?;
                self.stack.push(&mut self.heap, slice)?;
            }

            Instr::Add(k) => self.binary(BinOp::Add, k)?,
            Instr::Sub(k) => self.binary(BinOp::Sub, k)?,
            Instr::Mul(k) => self.binary(BinOp::Mul, k)?,
            Instr::Div(k) => self.binary(BinOp::Div, k)?,
            Instr::Rem(k) => self.binary(BinOp::Rem, k)?,
            Instr::And(k) => self.binary(BinOp::And, k)?,
            Instr::Or(k) => self.binary(BinOp::Or, k)?,
            Instr::Xor(k) => self.binary(BinOp::Xor, k)?,
            Instr::Shl(k) => self.binary(BinOp::Shl, k)?,
            Instr::Shr(k) => self.binary(BinOp::Shr, k)?,
            Instr::Neg(k) => {
                let a = self.pop_num(k)?;
                self.push_num(k, ops::negate(k, a)?)?;
            }
            Instr::BitNot(k) => {
                let a = self.pop_num(k)?;
                self.push_num(k, ops::bit_not(k, a)?)?;
            }
            Instr::Not => {
                let b = self.stack.pop::<bool>(&self.heap)?;
                self.stack.push(&mut self.heap, !b)?;
            }

            Instr::Eq(k) => self.compare(CmpOp::Eq, k)?,
            Instr::Ne(k) => self.compare(CmpOp::Ne, k)?,
            Instr::Lt(k) => self.compare(CmpOp::Lt, k)?,
            Instr::Le(k) => self.compare(CmpOp::Le, k)?,
            Instr::Gt(k) => self.compare(CmpOp::Gt, k)?,
            Instr::Ge(k) => self.compare(CmpOp::Ge, k)?,

            Instr::Convert { from, to } => {
                let a = self.pop_num(from)?;
                self.push_num(to, ops::convert(from, to, a)?)?;
            }

            Instr::Jump(target) => self.jump(target),
            Instr::JumpIfFalse(target) => {
                if !self.stack.pop::<bool>(&self.heap)? {
                    self.jump(target);
                }
            }
            Instr::Call(f) => {
                let target = ctx.resolve_function_ref(module, f)?;
                self.enter(ctx, target)?;
            }
            Instr::Return => self.leave(ctx)?,

            Instr::Print(t) => {
                let (ty, size) = resolve(ctx, module, t)?;
                let bytes = self.stack.pop_bytes(&self.heap, size)?;
                let text = marshal::format_value(ctx, &self.heap, ty, &bytes)?;
                writeln!(self.output, "{}", text)?;
            }
        }
        Ok(())
    }

    fn jump(&mut self, target: BlockId) {
        self.block = target.0;
        self.pc = 0;
    }

    fn pop_num(&mut self, kind: NumKind) -> Result<u64, VmError> {
        let bytes = self.stack.pop_bytes(&self.heap, kind.size())?;
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn push_num(&mut self, kind: NumKind, bits: u64) -> Result<(), VmError> {
        let bytes = bits.to_le_bytes();
        self.stack
            .push_bytes(&mut self.heap, &bytes[..kind.size() as usize])
    }

    fn binary(&mut self, op: BinOp, kind: NumKind) -> Result<(), VmError> {
        let b = self.pop_num(kind)?;
        let a = self.pop_num(kind)?;
        self.push_num(kind, ops::binary(op, kind, a, b)?)
    }

    fn compare(&mut self, op: CmpOp, kind: NumKind) -> Result<(), VmError> {
        let b = self.pop_num(kind)?;
        let a = self.pop_num(kind)?;
        self.stack
            .push(&mut self.heap, ops::compare(op, kind, a, b))
    }

    /// Pop a pointer or reference that is about to be dereferenced.
    fn pop_address(&mut self) -> Result<Pointer, VmError> {
        let ptr = self.stack.pop::<Pointer>(&self.heap)?;
        if ptr.is_null() {
            return Err(VmError::NullDereference);
        }
        Ok(ptr)
    }

    /// Pop an index and its container, returning the element's address.
    fn element_address(&mut self, ctx: &Context, container: &Type) -> Result<Pointer, VmError> {
        let width = element_size(ctx, container)?;
        let index = self.stack.pop::<i32>(&self.heap)?;
        match container {
            Type::StaticArray { count, .. } | Type::Vector { count, .. } => {
                let base = self.pop_address()?;
                if index < 0 || index as u32 >= *count {
                    return Err(VmError::IndexOutOfRange {
                        index: i64::from(index),
                        length: *count,
                    });
                }
                base.offset_by(i64::from(index) * i64::from(width))
                    .ok_or(VmError::PointerOutOfRange)
            }
            Type::DynamicArray(_) | Type::String => {
                let slice = self.stack.pop::<Slice>(&self.heap)?;
                if slice.is_null() {
                    return Err(VmError::NullDereference);
                }
                u32::try_from(index)
                    .ok()
                    .and_then(|i| slice.element(i, width))
                    .ok_or(VmError::IndexOutOfRange {
                        index: i64::from(index),
                        length: slice.len,
                    })
            }
            other => Err(not_indexable("element", ctx, other)),
        }
    }

    fn global_slot(
        &mut self,
        ctx: &Context,
        module: ModuleId,
        global: GlobalRef,
    ) -> Result<(Pointer, u32), VmError> {
        let (owner, global) = ctx.resolve_global(module, global)?;
        let width = copy_width(ctx, &global.ty)?;
        let handle = match self.globals.get(&owner) {
            Some(handle) => *handle,
            None => {
                let size = ctx.module(owner).map_or(0, |m| m.globals_size());
                let handle = self.alloc_pinned(ctx, SlotKind::Globals(owner), size as usize)?;
                self.globals.insert(owner, handle);
                handle
            }
        };
        Ok((Pointer::new(handle, global.offset), width))
    }

    fn literal(&mut self, ctx: &Context, module: ModuleId, id: StringId) -> Result<Slice, VmError> {
        if let Some(slice) = self.literals.get(&(module, id)) {
            return Ok(*slice);
        }
        let text = ctx.string(module, id)?;
        self.checkpoint(ctx)?;
        let slice = self.heap.alloc_string(text)?;
        self.heap.pin(slice.handle)?;
        self.literals.insert((module, id), slice);
        tracing::trace!(module = module.0, id = id.0, handle = slice.handle.0, "interned literal");
        Ok(slice)
    }

    fn alloc_pinned(
        &mut self,
        ctx: &Context,
        kind: SlotKind,
        size: usize,
    ) -> Result<Handle, VmError> {
        self.checkpoint(ctx)?;
        let handle = self.heap.malloc(kind, size)?;
        self.heap.pin(handle)?;
        Ok(handle)
    }

    // =========================================================================
    // Garbage collection
    // =========================================================================

    /// Runs before every engine allocation.
    fn checkpoint(&mut self, ctx: &Context) -> Result<(), VmError> {
        if self.heap.needs_collection() {
            let roots = self.gather_roots(ctx)?;
            self.heap.collect(&roots, ctx);
        }
        self.heap.grow_if_full();
        Ok(())
    }

    /// Params and locals of every live frame are scanned by static type;
    /// the temporaries between frames have no recorded type and are
    /// scanned conservatively.
    fn gather_roots(&self, ctx: &Context) -> Result<Vec<Handle>, VmError> {
        let memory = self.stack.memory(&self.heap)?;
        let mut roots = Vec::new();
        let mut cursor = 0usize;
        for frame in &self.frames {
            let func = lookup(ctx, frame.function)?;
            let args_start = frame
                .base
                .saturating_sub(CONTINUATION_SIZE + frame.param_size) as usize;
            if let Some(temps) = memory.get(cursor..args_start) {
                self.heap.conservative_roots(temps, &mut roots);
            }
            for param in func.params() {
                let at = i64::from(frame.base) + i64::from(param.offset);
                marshal::scan_value(ctx, &param.ty, memory, at as usize, &mut roots);
            }
            for local in func.locals() {
                let at = (frame.base + local.offset) as usize;
                marshal::scan_value(ctx, &local.ty, memory, at, &mut roots);
            }
            cursor = (frame.base + frame.locals_size) as usize;
        }
        if let Some(temps) = memory.get(cursor..) {
            self.heap.conservative_roots(temps, &mut roots);
        }
        Ok(roots)
    }
}

fn lookup(ctx: &Context, id: FunctionId) -> Result<&Function, VmError> {
    ctx.function(id).ok_or_else(|| {
        VmError::Il(IlError::FunctionNotFound {
            module: ctx
                .module(id.module)
                .map_or_else(|| format!("#{}", id.module.0), |m| m.name().to_string()),
            function: format!("#{}", id.index),
        })
    })
}

fn return_size(ctx: &Context, func: &Function) -> Result<u32, VmError> {
    match &func.return_type {
        Some(ty) => Ok(copy_width(ctx, ty)?),
        None => Ok(0),
    }
}

fn resolve(ctx: &Context, module: ModuleId, id: TypeRefId) -> Result<(&Type, u32), VmError> {
    let resolved = ctx.resolve_type_ref(module, id)?;
    Ok((&resolved.ty, resolved.size))
}

fn local_slot(
    ctx: &Context,
    frame: Frame,
    func: &Function,
    index: u32,
) -> Result<(u32, u32), VmError> {
    let local = func.local(index).ok_or_else(|| IlError::UnresolvedLocal {
        function: func.name.clone(),
        index,
    })?;
    Ok((frame.base + local.offset, copy_width(ctx, &local.ty)?))
}

fn arg_slot(
    ctx: &Context,
    frame: Frame,
    func: &Function,
    index: u32,
) -> Result<(u32, u32), VmError> {
    let param = func.param(index).ok_or_else(|| VmError::ArgumentIndex {
        function: func.name.clone(),
        index,
        count: func.params().len(),
    })?;
    let at = i64::from(frame.base) + i64::from(param.offset);
    let at = u32::try_from(at).map_err(|_| VmError::StackUnderflow)?;
    Ok((at, copy_width(ctx, &param.ty)?))
}

/// Byte offset and width of field `field` of the struct named by `ty`.
fn field_slot(
    ctx: &Context,
    module: ModuleId,
    ty: TypeRefId,
    field: u16,
) -> Result<(i64, u32), VmError> {
    let (ty, _) = resolve(ctx, module, ty)?;
    let field = ctx.field(ty, u32::from(field))?;
    Ok((i64::from(field.offset), copy_width(ctx, &field.ty)?))
}

fn element_size(ctx: &Context, container: &Type) -> Result<u32, VmError> {
    let element = container
        .element()
        .ok_or_else(|| not_indexable("element", ctx, container))?;
    Ok(ctx.size_of(&element)?)
}

fn not_indexable(op: &'static str, ctx: &Context, ty: &Type) -> VmError {
    VmError::TypeMismatch {
        op,
        kind: ctx.type_name(ty),
    }
}
