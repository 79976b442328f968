use super::error::VmError;
use super::heap::{Heap, SlotKind};
use super::value::{Handle, NativeValue, Pointer};

/// Operand stack stored in a single pinned heap slot, so addresses of
/// locals and arguments are ordinary `(handle, offset)` pointers.
///
/// Every method takes the heap explicitly; the stack only owns its cursor.
#[derive(Debug)]
pub struct OperandStack {
    handle: Handle,
    sp: u32,
    size: u32,
}

impl OperandStack {
    pub fn new(heap: &mut Heap, size: u32) -> Result<Self, VmError> {
        let handle = heap.malloc(SlotKind::Stack, size as usize)?;
        heap.pin(handle)?;
        Ok(Self {
            handle,
            sp: 0,
            size,
        })
    }

    pub fn sp(&self) -> u32 {
        self.sp
    }

    /// Address of an absolute stack position.
    pub fn address(&self, at: u32) -> Pointer {
        Pointer::new(self.handle, at)
    }

    /// Live bytes `[0, sp)`.
    pub fn memory<'h>(&self, heap: &'h Heap) -> Result<&'h [u8], VmError> {
        Ok(heap.read(self.address(0), self.sp)?)
    }

    fn grow(&mut self, len: u32) -> Result<u32, VmError> {
        let at = self.sp;
        let end = at.checked_add(len).ok_or(VmError::StackOverflow)?;
        if end > self.size {
            return Err(VmError::StackOverflow);
        }
        self.sp = end;
        Ok(at)
    }

    fn shrink(&mut self, len: u32) -> Result<u32, VmError> {
        self.sp = self.sp.checked_sub(len).ok_or(VmError::StackUnderflow)?;
        Ok(self.sp)
    }

    pub fn push_bytes(&mut self, heap: &mut Heap, bytes: &[u8]) -> Result<(), VmError> {
        let len = u32::try_from(bytes.len()).map_err(|_| VmError::StackOverflow)?;
        let at = self.grow(len)?;
        heap.write(self.address(at), bytes)?;
        Ok(())
    }

    /// Push `len` zero bytes.
    pub fn push_zeroed(&mut self, heap: &mut Heap, len: u32) -> Result<(), VmError> {
        let at = self.grow(len)?;
        heap.write(self.address(at), &vec![0u8; len as usize])?;
        Ok(())
    }

    /// Push a copy of `len` bytes found at `src`, which may be on the stack.
    pub fn push_from(&mut self, heap: &mut Heap, src: Pointer, len: u32) -> Result<(), VmError> {
        let at = self.grow(len)?;
        heap.copy(self.address(at), src, len)?;
        Ok(())
    }

    pub fn pop_bytes(&mut self, heap: &Heap, len: u32) -> Result<Vec<u8>, VmError> {
        let at = self.shrink(len)?;
        Ok(heap.read(self.address(at), len)?.to_vec())
    }

    /// Pop `len` bytes straight into `dst`.
    pub fn pop_into(&mut self, heap: &mut Heap, dst: Pointer, len: u32) -> Result<(), VmError> {
        let at = self.shrink(len)?;
        heap.copy(dst, self.address(at), len)?;
        Ok(())
    }

    pub fn discard(&mut self, len: u32) -> Result<(), VmError> {
        self.shrink(len).map(|_| ())
    }

    /// Duplicate the top `len` bytes.
    pub fn dup(&mut self, heap: &mut Heap, len: u32) -> Result<(), VmError> {
        let at = self.sp.checked_sub(len).ok_or(VmError::StackUnderflow)?;
        self.push_from(heap, self.address(at), len)
    }

    pub fn push<T: NativeValue>(&mut self, heap: &mut Heap, value: T) -> Result<(), VmError> {
        let at = self.grow(T::SIZE)?;
        heap.write_value(self.address(at), value)?;
        Ok(())
    }

    pub fn pop<T: NativeValue>(&mut self, heap: &Heap) -> Result<T, VmError> {
        let at = self.shrink(T::SIZE)?;
        Ok(heap.read_value(self.address(at))?)
    }

    /// Reset to an earlier depth. Never grows the stack.
    pub fn truncate(&mut self, sp: u32) {
        self.sp = self.sp.min(sp);
    }
}
