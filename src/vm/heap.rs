use std::time::Instant;

use thiserror::Error;

use super::value::{Handle, NativeValue, Pointer, Slice};
use crate::il::types::{ARRAY_HEADER_SIZE, ModuleId, Type};

// =============================================================================
// Slots
// =============================================================================

/// What a slot holds. Decides how the collector traces its bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotKind {
    /// A single value of the given type.
    Value(Type),
    /// `[u32 length][elements]` of the given element type.
    Array(Type),
    /// Global variables of one module.
    Globals(ModuleId),
    /// The interpreter's operand stack. Traced through frame roots only.
    Stack,
}

#[derive(Debug, Clone)]
pub struct HeapValue {
    pub kind: SlotKind,
    pub memory: Vec<u8>,
    pub marked: bool,
    pub pinned: bool,
}

impl HeapValue {
    pub fn size(&self) -> usize {
        self.memory.len()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("null handle dereferenced")]
    NullDereference,
    #[error("handle {0} does not name a live slot")]
    InvalidHandle(u32),
    #[error("access of {len} bytes at offset {offset} exceeds slot {handle} ({size} bytes)")]
    OutOfBounds {
        handle: u32,
        offset: u32,
        len: u32,
        size: usize,
    },
    #[error("allocation of {0} bytes failed")]
    AllocationFailed(u64),
    #[error("slot table exhausted")]
    TooManySlots,
}

/// Collector bookkeeping, reported by `--gc-stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub cycles: u64,
    pub total_pause_us: u64,
    pub max_pause_us: u64,
    pub freed_slots: u64,
    pub freed_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub slots: usize,
    pub live_slots: usize,
    pub pinned_slots: usize,
    pub used: usize,
    pub capacity: usize,
}

/// Enumerates the handles held directly inside a slot's bytes.
pub trait Tracer {
    fn trace(&self, kind: &SlotKind, memory: &[u8], out: &mut Vec<Handle>);
}

// =============================================================================
// Heap
// =============================================================================

/// Handle-indirected heap. Freed slots are tombstoned in place and reused
/// by later allocations.
pub struct Heap {
    slots: Vec<Option<HeapValue>>,
    used: usize,
    capacity: usize,
    gc_enabled: bool,
    stats: GcStats,
}

impl Heap {
    pub fn new(capacity: usize, gc_enabled: bool) -> Self {
        Self {
            slots: Vec::new(),
            used: 0,
            capacity: capacity.max(1),
            gc_enabled,
            stats: GcStats::default(),
        }
    }

    /// Allocate `size` zeroed bytes. Reuses the first tombstone if any.
    pub fn malloc(&mut self, kind: SlotKind, size: usize) -> Result<Handle, HeapError> {
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(size)
            .map_err(|_| HeapError::AllocationFailed(size as u64))?;
        memory.resize(size, 0);

        let value = HeapValue {
            kind,
            memory,
            marked: false,
            pinned: false,
        };

        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(value);
                index
            }
            None => {
                self.slots.push(Some(value));
                self.slots.len() - 1
            }
        };
        self.used += size;
        Handle::from_slot(index).ok_or(HeapError::TooManySlots)
    }

    /// Allocate a length-prefixed array and return a slice over all of it.
    pub fn alloc_array(
        &mut self,
        element: Type,
        element_size: u32,
        len: u32,
    ) -> Result<Slice, HeapError> {
        let body = u64::from(element_size) * u64::from(len);
        let total = body + u64::from(ARRAY_HEADER_SIZE);
        let size = usize::try_from(total).map_err(|_| HeapError::AllocationFailed(total))?;
        let handle = self.malloc(SlotKind::Array(element), size)?;
        self.write_value(Pointer::new(handle, 0), len)?;
        Ok(Slice::new(handle, ARRAY_HEADER_SIZE, len))
    }

    /// Strings are arrays of 4-byte chars.
    pub fn alloc_string(&mut self, text: &str) -> Result<Slice, HeapError> {
        let len = u32::try_from(text.chars().count())
            .map_err(|_| HeapError::AllocationFailed(text.len() as u64))?;
        let slice = self.alloc_array(Type::Char, char::SIZE, len)?;
        for (i, c) in text.chars().enumerate() {
            let at = slice.offset + (i as u32) * char::SIZE;
            self.write_value(Pointer::new(slice.handle, at), c)?;
        }
        Ok(slice)
    }

    pub fn read_string(&self, slice: Slice) -> Result<String, HeapError> {
        if slice.len == 0 {
            return Ok(String::new());
        }
        let bytes = self.read(Pointer::new(slice.handle, slice.offset), slice.len * char::SIZE)?;
        Ok(bytes
            .chunks_exact(char::SIZE as usize)
            .map(char::read)
            .collect())
    }

    pub fn get(&self, handle: Handle) -> Result<&HeapValue, HeapError> {
        let index = handle.slot().ok_or(HeapError::NullDereference)?;
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(HeapError::InvalidHandle(handle.0))
    }

    fn get_mut(&mut self, handle: Handle) -> Result<&mut HeapValue, HeapError> {
        let index = handle.slot().ok_or(HeapError::NullDereference)?;
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(HeapError::InvalidHandle(handle.0))
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.get(handle).is_ok()
    }

    pub fn pin(&mut self, handle: Handle) -> Result<(), HeapError> {
        self.get_mut(handle)?.pinned = true;
        Ok(())
    }

    pub fn unpin(&mut self, handle: Handle) -> Result<(), HeapError> {
        self.get_mut(handle)?.pinned = false;
        Ok(())
    }

    pub fn is_pinned(&self, handle: Handle) -> bool {
        self.get(handle).is_ok_and(|v| v.pinned)
    }

    /// Borrow `len` bytes at `ptr`.
    pub fn read(&self, ptr: Pointer, len: u32) -> Result<&[u8], HeapError> {
        let value = self.get(ptr.handle)?;
        let range = byte_range(ptr, len, value.size())?;
        Ok(&value.memory[range])
    }

    pub fn write(&mut self, ptr: Pointer, bytes: &[u8]) -> Result<(), HeapError> {
        let len = u32::try_from(bytes.len()).map_err(|_| HeapError::OutOfBounds {
            handle: ptr.handle.0,
            offset: ptr.offset,
            len: u32::MAX,
            size: 0,
        })?;
        let value = self.get_mut(ptr.handle)?;
        let range = byte_range(ptr, len, value.size())?;
        value.memory[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy `len` bytes between two addresses, possibly in the same slot.
    pub fn copy(&mut self, dst: Pointer, src: Pointer, len: u32) -> Result<(), HeapError> {
        if dst.handle == src.handle {
            let value = self.get_mut(dst.handle)?;
            let size = value.size();
            let from = byte_range(src, len, size)?;
            let to = byte_range(dst, len, size)?;
            value.memory.copy_within(from, to.start);
            return Ok(());
        }
        let bytes = self.read(src, len)?.to_vec();
        self.write(dst, &bytes)
    }

    pub fn read_value<T: NativeValue>(&self, ptr: Pointer) -> Result<T, HeapError> {
        Ok(T::read(self.read(ptr, T::SIZE)?))
    }

    pub fn write_value<T: NativeValue>(&mut self, ptr: Pointer, value: T) -> Result<(), HeapError> {
        let value_slot = self.get_mut(ptr.handle)?;
        let range = byte_range(ptr, T::SIZE, value_slot.size())?;
        value.write(&mut value_slot.memory[range]);
        Ok(())
    }

    /// Physical element count stored in an array's header.
    pub fn array_length(&self, handle: Handle) -> Result<u32, HeapError> {
        self.read_value(Pointer::new(handle, 0))
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn gc_enabled(&self) -> bool {
        self.gc_enabled
    }

    pub fn gc_stats(&self) -> GcStats {
        self.stats
    }

    pub fn stats(&self) -> HeapStats {
        let live = self.slots.iter().flatten();
        HeapStats {
            slots: self.slots.len(),
            live_slots: live.clone().count(),
            pinned_slots: live.filter(|v| v.pinned).count(),
            used: self.used,
            capacity: self.capacity,
        }
    }

    /// Whether the next engine allocation should collect first.
    pub fn needs_collection(&self) -> bool {
        self.gc_enabled && self.used >= self.capacity
    }

    /// Double capacity until it exceeds usage. Never shrinks.
    pub fn grow_if_full(&mut self) {
        if self.used < self.capacity {
            return;
        }
        let before = self.capacity;
        while self.capacity <= self.used {
            self.capacity = self.capacity.saturating_mul(2).max(1);
            if self.capacity == usize::MAX {
                break;
            }
        }
        tracing::debug!(before, after = self.capacity, used = self.used, "heap capacity grown");
    }

    /// Push every live handle named by a 4-byte window of `bytes`, starting
    /// at every byte offset. Stack values are packed without padding, so a
    /// handle may begin at any offset.
    pub fn conservative_roots(&self, bytes: &[u8], out: &mut Vec<Handle>) {
        for window in bytes.windows(Handle::SIZE as usize) {
            let handle = Handle::read(window);
            if !handle.is_null() && self.is_live(handle) {
                out.push(handle);
            }
        }
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Mark from pinned slots and `roots`, then sweep. Returns freed slots.
    pub fn collect(&mut self, roots: &[Handle], tracer: &dyn Tracer) -> usize {
        let start = Instant::now();

        for value in self.slots.iter_mut().flatten() {
            value.marked = false;
        }

        let mut worklist: Vec<Handle> = roots.to_vec();
        worklist.extend(
            self.slots
                .iter()
                .enumerate()
                .filter(|(_, v)| v.as_ref().is_some_and(|v| v.pinned))
                .filter_map(|(i, _)| Handle::from_slot(i)),
        );
        self.mark(worklist, tracer);
        let (freed, freed_bytes) = self.sweep();

        let pause_us = start.elapsed().as_micros() as u64;
        self.stats.cycles += 1;
        self.stats.total_pause_us += pause_us;
        self.stats.max_pause_us = self.stats.max_pause_us.max(pause_us);
        self.stats.freed_slots += freed as u64;
        self.stats.freed_bytes += freed_bytes as u64;

        tracing::debug!(
            cycle = self.stats.cycles,
            freed,
            freed_bytes,
            used = self.used,
            pause_us,
            "gc cycle"
        );
        freed
    }

    fn mark(&mut self, mut worklist: Vec<Handle>, tracer: &dyn Tracer) {
        while let Some(handle) = worklist.pop() {
            let Some(index) = handle.slot() else {
                continue;
            };
            let Some(Some(value)) = self.slots.get_mut(index) else {
                continue;
            };
            if value.marked {
                continue;
            }
            value.marked = true;
            tracer.trace(&value.kind, &value.memory, &mut worklist);
        }
    }

    fn sweep(&mut self) -> (usize, usize) {
        let mut freed = 0;
        let mut freed_bytes = 0;
        for slot in self.slots.iter_mut() {
            let dead = slot.as_ref().is_some_and(|v| !v.marked && !v.pinned);
            if dead {
                if let Some(value) = slot.take() {
                    freed += 1;
                    freed_bytes += value.size();
                }
            } else if let Some(value) = slot.as_mut() {
                value.marked = false;
            }
        }
        self.used -= freed_bytes;
        (freed, freed_bytes)
    }
}

fn byte_range(ptr: Pointer, len: u32, size: usize) -> Result<std::ops::Range<usize>, HeapError> {
    let start = ptr.offset as usize;
    let end = start + len as usize;
    if end > size {
        return Err(HeapError::OutOfBounds {
            handle: ptr.handle.0,
            offset: ptr.offset,
            len,
            size,
        });
    }
    Ok(start..end)
}
