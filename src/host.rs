//! Embedding surface: load a module graph, invoke functions with native
//! arguments, and work with heap objects before and after a call.

use std::io::{self, Write};
use std::path::Path;

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::il::bytecode;
use crate::il::{Context, Function, FunctionId, Type};
use crate::vm::heap::{GcStats, HeapStats, SlotKind};
use crate::vm::marshal::copy_width;
use crate::vm::{Handle, NativeValue, Pointer, Slice, Vm, VmError};

/// A pending call. Collects arguments until handed to `invoke`.
#[derive(Debug, Clone)]
pub struct Invocation {
    function: FunctionId,
    args: Vec<Option<Vec<u8>>>,
}

impl Invocation {
    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn pushed(&self) -> usize {
        self.args.iter().filter(|a| a.is_some()).count()
    }
}

/// A committed context together with the machine that runs it.
pub struct Runtime {
    context: Context,
    vm: Vm,
}

impl Runtime {
    pub fn new(context: Context, config: &RuntimeConfig) -> Result<Self> {
        Self::with_output(context, config, Box::new(io::stdout()))
    }

    pub fn with_output(
        mut context: Context,
        config: &RuntimeConfig,
        output: Box<dyn Write>,
    ) -> Result<Self> {
        context.commit()?;
        let vm = Vm::with_output(config, output)?;
        Ok(Self { context, vm })
    }

    pub fn from_image(bytes: &[u8], config: &RuntimeConfig) -> Result<Self> {
        Self::new(bytecode::deserialize(bytes)?, config)
    }

    pub fn load_file(path: &Path, config: &RuntimeConfig) -> Result<Self> {
        Self::new(bytecode::load_from_file(path)?, config)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    fn function(&self, id: FunctionId) -> Result<&Function, VmError> {
        self.context.function(id).ok_or_else(|| {
            VmError::Il(crate::il::IlError::FunctionNotFound {
                module: format!("#{}", id.module.0),
                function: format!("#{}", id.index),
            })
        })
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    pub fn begin_invoke(&self, module: &str, function: &str) -> Result<Invocation, VmError> {
        let id = self.context.find_function(module, function)?;
        let params = self.function(id)?.params().len();
        Ok(Invocation {
            function: id,
            args: vec![None; params],
        })
    }

    pub fn push_argument<T: NativeValue>(
        &self,
        invocation: &mut Invocation,
        value: T,
        index: u32,
    ) -> Result<(), VmError> {
        self.push_argument_bytes(invocation, &value.to_bytes(), index)
    }

    /// Set argument `index` from raw bytes; the length must equal the
    /// declared parameter size.
    pub fn push_argument_bytes(
        &self,
        invocation: &mut Invocation,
        bytes: &[u8],
        index: u32,
    ) -> Result<(), VmError> {
        let func = self.function(invocation.function)?;
        let param = func.param(index).ok_or_else(|| VmError::ArgumentIndex {
            function: func.name.clone(),
            index,
            count: func.params().len(),
        })?;
        let declared = copy_width(&self.context, &param.ty)?;
        if declared as usize != bytes.len() {
            return Err(VmError::SignatureMismatch {
                what: format!("parameter '{}' of '{}'", param.name, func.name),
                declared,
                native: bytes.len() as u32,
            });
        }
        invocation.args[index as usize] = Some(bytes.to_vec());
        Ok(())
    }

    pub fn invoke<R: NativeValue>(&mut self, invocation: Invocation) -> Result<R, VmError> {
        let bytes = self.invoke_raw(invocation, R::SIZE)?;
        Ok(R::read(&bytes))
    }

    pub fn invoke_void(&mut self, invocation: Invocation) -> Result<(), VmError> {
        self.invoke_raw(invocation, 0).map(|_| ())
    }

    /// Run the invocation and return the raw result bytes.
    ///
    /// Fails before executing anything if an argument is missing or
    /// `native_size` differs from the declared return size (0 for void).
    pub fn invoke_raw(
        &mut self,
        invocation: Invocation,
        native_size: u32,
    ) -> Result<Vec<u8>, VmError> {
        let func = self.function(invocation.function)?;
        let pushed = invocation.pushed();
        if pushed != invocation.args.len() {
            return Err(VmError::ArgumentCount {
                function: func.name.clone(),
                expected: invocation.args.len(),
                actual: pushed,
            });
        }
        let declared = match &func.return_type {
            Some(ty) => copy_width(&self.context, ty)?,
            None => 0,
        };
        if declared != native_size {
            return Err(VmError::SignatureMismatch {
                what: format!("return value of '{}'", func.name),
                declared,
                native: native_size,
            });
        }
        tracing::debug!(function = %func.name, args = pushed, "invoke");

        // Stack order: the last parameter sits lowest.
        let args: Vec<u8> = invocation.args.iter().rev().flatten().flatten().copied().collect();
        self.vm.call(&self.context, invocation.function, &args)
    }

    // =========================================================================
    // Heap helpers
    // =========================================================================
    //
    // Host allocations grow the heap but never collect, so handles the host
    // holds between calls stay valid until the next invocation allocates.

    pub fn alloc_object(&mut self, ty: &Type) -> Result<Pointer, VmError> {
        let size = self.context.size_of(ty)?;
        let heap = self.vm.heap_mut();
        heap.grow_if_full();
        let handle = heap.malloc(SlotKind::Value(ty.clone()), size as usize)?;
        Ok(Pointer::new(handle, 0))
    }

    pub fn alloc_array(&mut self, element: &Type, len: u32) -> Result<Slice, VmError> {
        let size = self.context.size_of(element)?;
        let heap = self.vm.heap_mut();
        heap.grow_if_full();
        Ok(heap.alloc_array(element.clone(), size, len)?)
    }

    pub fn alloc_string(&mut self, text: &str) -> Result<Slice, VmError> {
        let heap = self.vm.heap_mut();
        heap.grow_if_full();
        Ok(heap.alloc_string(text)?)
    }

    pub fn read_string(&self, slice: Slice) -> Result<String, VmError> {
        if slice.is_null() {
            return Err(VmError::NullDereference);
        }
        Ok(self.vm.heap().read_string(slice)?)
    }

    pub fn pin(&mut self, handle: Handle) -> Result<(), VmError> {
        Ok(self.vm.heap_mut().pin(handle)?)
    }

    pub fn unpin(&mut self, handle: Handle) -> Result<(), VmError> {
        Ok(self.vm.heap_mut().unpin(handle)?)
    }

    /// Address and width of element `index` of an array slice.
    fn element_slot(&self, array: Slice, index: u32) -> Result<(Pointer, u32), VmError> {
        let slot = self.vm.heap().get(array.handle)?;
        let SlotKind::Array(element) = &slot.kind else {
            return Err(VmError::TypeMismatch {
                op: "element",
                kind: "non-array slot".to_string(),
            });
        };
        let width = self.context.size_of(element)?;
        let ptr = array
            .element(index, width)
            .ok_or(VmError::IndexOutOfRange {
                index: i64::from(index),
                length: array.len,
            })?;
        Ok((ptr, width))
    }

    pub fn get_element_bytes(&self, array: Slice, index: u32) -> Result<Vec<u8>, VmError> {
        let (ptr, width) = self.element_slot(array, index)?;
        Ok(self.vm.heap().read(ptr, width)?.to_vec())
    }

    pub fn set_element_bytes(
        &mut self,
        array: Slice,
        index: u32,
        bytes: &[u8],
    ) -> Result<(), VmError> {
        let (ptr, width) = self.element_slot(array, index)?;
        check_native("array element", width, bytes.len())?;
        Ok(self.vm.heap_mut().write(ptr, bytes)?)
    }

    pub fn get_element<T: NativeValue>(&self, array: Slice, index: u32) -> Result<T, VmError> {
        let (ptr, width) = self.element_slot(array, index)?;
        check_native("array element", width, T::SIZE as usize)?;
        Ok(self.vm.heap().read_value(ptr)?)
    }

    pub fn set_element<T: NativeValue>(
        &mut self,
        array: Slice,
        index: u32,
        value: T,
    ) -> Result<(), VmError> {
        self.set_element_bytes(array, index, &value.to_bytes())
    }

    /// Address and width of field `field` of the struct object at `object`.
    fn field_slot(&self, object: Pointer, field: u32) -> Result<(Pointer, u32), VmError> {
        if object.is_null() {
            return Err(VmError::NullDereference);
        }
        let slot = self.vm.heap().get(object.handle)?;
        let def = match &slot.kind {
            SlotKind::Value(Type::Struct(decl)) if object.offset == 0 => {
                self.context.struct_def(*decl)?
            }
            _ => {
                return Err(VmError::TypeMismatch {
                    op: "field",
                    kind: "non-struct object".to_string(),
                });
            }
        };
        let field_def = def.field(field).ok_or(VmError::IndexOutOfRange {
            index: i64::from(field),
            length: def.fields.len() as u32,
        })?;
        let width = copy_width(&self.context, &field_def.ty)?;
        let ptr = object
            .offset_by(i64::from(field_def.offset))
            .ok_or(VmError::PointerOutOfRange)?;
        Ok((ptr, width))
    }

    pub fn get_field_bytes(&self, object: Pointer, field: u32) -> Result<Vec<u8>, VmError> {
        let (ptr, width) = self.field_slot(object, field)?;
        Ok(self.vm.heap().read(ptr, width)?.to_vec())
    }

    pub fn set_field_bytes(
        &mut self,
        object: Pointer,
        field: u32,
        bytes: &[u8],
    ) -> Result<(), VmError> {
        let (ptr, width) = self.field_slot(object, field)?;
        check_native("field", width, bytes.len())?;
        Ok(self.vm.heap_mut().write(ptr, bytes)?)
    }

    pub fn get_field<T: NativeValue>(&self, object: Pointer, field: u32) -> Result<T, VmError> {
        let (ptr, width) = self.field_slot(object, field)?;
        check_native("field", width, T::SIZE as usize)?;
        Ok(self.vm.heap().read_value(ptr)?)
    }

    pub fn set_field<T: NativeValue>(
        &mut self,
        object: Pointer,
        field: u32,
        value: T,
    ) -> Result<(), VmError> {
        self.set_field_bytes(object, field, &value.to_bytes())
    }

    /// Collect with only pinned slots as roots.
    pub fn collect_garbage(&mut self) -> Result<usize, VmError> {
        self.vm.collect_garbage(&self.context)
    }

    pub fn release_literals(&mut self) -> usize {
        self.vm.release_literals()
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.vm.heap_stats()
    }

    pub fn gc_stats(&self) -> GcStats {
        self.vm.gc_stats()
    }

    pub fn flush(&mut self) -> Result<(), VmError> {
        self.vm.flush()
    }
}

fn check_native(what: &str, declared: u32, native: usize) -> Result<(), VmError> {
    if declared as usize != native {
        return Err(VmError::SignatureMismatch {
            what: what.to_string(),
            declared,
            native: native as u32,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{BlockId, Instr, NumKind};

    fn runtime() -> Runtime {
        let mut ctx = Context::new();
        let m = ctx.add_module("main").unwrap();
        ctx.define_struct(m, "Pair", vec![("a".into(), Type::i32()), ("b".into(), Type::f64())])
            .unwrap();
        let mut f = Function::new("sub", Some(Type::i32()));
        f.add_param("a", Type::i32());
        f.add_param("b", Type::i32());
        for instr in [
            Instr::LoadArg(0),
            Instr::LoadArg(1),
            Instr::Sub(NumKind::I32),
            Instr::Return,
        ] {
            f.emit(BlockId::ENTRY, instr).unwrap();
        }
        ctx.add_function(m, f).unwrap();
        Runtime::with_output(ctx, &RuntimeConfig::default(), Box::new(io::sink())).unwrap()
    }

    #[test]
    fn test_invoke_sub() {
        let mut rt = runtime();
        let mut inv = rt.begin_invoke("main", "sub").unwrap();
        rt.push_argument(&mut inv, 10i32, 0).unwrap();
        rt.push_argument(&mut inv, 3i32, 1).unwrap();
        assert_eq!(rt.invoke::<i32>(inv).unwrap(), 7);
    }

    #[test]
    fn test_engine_errors_propagate_as_library_errors() {
        fn subtract(rt: &mut Runtime, a: i32, b: i32) -> Result<i32> {
            let mut inv = rt.begin_invoke("main", "sub")?;
            rt.push_argument(&mut inv, a, 0)?;
            rt.push_argument(&mut inv, b, 1)?;
            Ok(rt.invoke(inv)?)
        }

        let mut rt = runtime();
        assert_eq!(subtract(&mut rt, 9, 4).unwrap(), 5);

        let missing = || -> Result<Invocation> { Ok(rt.begin_invoke("main", "nope")?) };
        assert!(matches!(missing(), Err(crate::Error::Vm(_))));
    }

    #[test]
    fn test_arguments_may_be_pushed_in_any_order() {
        let mut rt = runtime();
        let mut inv = rt.begin_invoke("main", "sub").unwrap();
        rt.push_argument(&mut inv, 3i32, 1).unwrap();
        rt.push_argument(&mut inv, 10i32, 0).unwrap();
        assert_eq!(rt.invoke::<i32>(inv).unwrap(), 7);
    }

    #[test]
    fn test_missing_argument_fails_before_execution() {
        let mut rt = runtime();
        let mut inv = rt.begin_invoke("main", "sub").unwrap();
        rt.push_argument(&mut inv, 10i32, 0).unwrap();
        let err = rt.invoke::<i32>(inv).unwrap_err();
        assert!(matches!(
            err,
            VmError::ArgumentCount {
                expected: 2,
                actual: 1,
                ..
            }
        ));
        assert_eq!(rt.vm().stack_depth(), 0);
    }

    #[test]
    fn test_signature_checks() {
        let mut rt = runtime();
        let mut inv = rt.begin_invoke("main", "sub").unwrap();
        assert!(matches!(
            rt.push_argument(&mut inv, 10i64, 0),
            Err(VmError::SignatureMismatch {
                declared: 4,
                native: 8,
                ..
            })
        ));
        assert!(matches!(
            rt.push_argument(&mut inv, 1i32, 2),
            Err(VmError::ArgumentIndex { index: 2, .. })
        ));
        rt.push_argument(&mut inv, 1i32, 0).unwrap();
        rt.push_argument(&mut inv, 1i32, 1).unwrap();
        assert!(matches!(
            rt.invoke::<f64>(inv),
            Err(VmError::SignatureMismatch { native: 8, .. })
        ));
    }

    #[test]
    fn test_unknown_function() {
        let rt = runtime();
        assert!(matches!(
            rt.begin_invoke("main", "nope"),
            Err(VmError::Il(crate::il::IlError::FunctionNotFound { .. }))
        ));
    }

    #[test]
    fn test_struct_fields() {
        let mut rt = runtime();
        let pair = rt.context().get_type(crate::il::ModuleId(0), "Pair").unwrap();
        let obj = rt.alloc_object(&pair).unwrap();
        rt.set_field(obj, 1, 2.5f64).unwrap();
        rt.set_field(obj, 0, -1i32).unwrap();
        assert_eq!(rt.get_field::<f64>(obj, 1).unwrap(), 2.5);
        assert_eq!(rt.get_field::<i32>(obj, 0).unwrap(), -1);
        assert!(matches!(
            rt.get_field::<i64>(obj, 0),
            Err(VmError::SignatureMismatch { .. })
        ));
        assert!(matches!(
            rt.get_field::<i32>(obj, 2),
            Err(VmError::IndexOutOfRange { index: 2, length: 2 })
        ));
        assert!(matches!(
            rt.get_field::<i32>(Pointer::NULL, 0),
            Err(VmError::NullDereference)
        ));
    }

    #[test]
    fn test_array_elements() {
        let mut rt = runtime();
        let arr = rt.alloc_array(&Type::u16(), 3).unwrap();
        rt.set_element(arr, 2, 513u16).unwrap();
        assert_eq!(rt.get_element::<u16>(arr, 2).unwrap(), 513);
        assert_eq!(rt.get_element::<u16>(arr, 0).unwrap(), 0);
        assert!(matches!(
            rt.get_element::<u16>(arr, 3),
            Err(VmError::IndexOutOfRange { index: 3, length: 3 })
        ));
        assert!(matches!(
            rt.get_element::<u32>(arr, 0),
            Err(VmError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_pinning_controls_survival() {
        let mut rt = runtime();
        let text = rt.alloc_string("keep me").unwrap();
        let other = rt.alloc_string("drop me").unwrap();
        rt.pin(text.handle).unwrap();
        rt.collect_garbage().unwrap();
        assert_eq!(rt.read_string(text).unwrap(), "keep me");
        assert!(rt.read_string(other).is_err());

        rt.unpin(text.handle).unwrap();
        rt.collect_garbage().unwrap();
        assert!(rt.read_string(text).is_err());
    }

    #[test]
    fn test_host_allocation_grows_without_collecting() {
        let ctx = Context::new();
        let config = RuntimeConfig {
            heap_capacity: 64,
            stack_size: 32,
            ..RuntimeConfig::default()
        };
        let mut rt = Runtime::with_output(ctx, &config, Box::new(io::sink())).unwrap();
        let first = rt.alloc_array(&Type::i64(), 8).unwrap();
        for _ in 0..4 {
            rt.alloc_array(&Type::i64(), 8).unwrap();
        }
        assert_eq!(rt.gc_stats().cycles, 0);
        assert!(rt.heap_stats().capacity > rt.heap_stats().used);
        assert!(rt.get_element::<i64>(first, 0).is_ok());
    }
}
