use std::fmt;

/// 1-based index of a heap slot. `Handle::NULL` (0) never names a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Handle(pub u32);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Index into the slot table, or `None` for null.
    pub fn slot(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }

    pub fn from_slot(index: usize) -> Option<Handle> {
        u32::try_from(index + 1).ok().map(Handle)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Address descriptor shared by `Pointer<T>` and `Reference<T>` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct Pointer {
    pub handle: Handle,
    pub offset: u32,
}

impl Pointer {
    pub const NULL: Pointer = Pointer {
        handle: Handle::NULL,
        offset: 0,
    };

    pub fn new(handle: Handle, offset: u32) -> Self {
        Self { handle, offset }
    }

    pub fn is_null(self) -> bool {
        self.handle.is_null()
    }

    /// Same handle, offset moved by `delta` bytes.
    pub fn offset_by(self, delta: i64) -> Option<Pointer> {
        let offset = i64::from(self.offset).checked_add(delta)?;
        Some(Pointer {
            handle: self.handle,
            offset: u32::try_from(offset).ok()?,
        })
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}+{}", self.handle, self.offset)
        }
    }
}

/// Window onto a length-prefixed array allocation. Strings and dynamic
/// arrays are passed around as slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct Slice {
    pub handle: Handle,
    pub offset: u32,
    pub len: u32,
}

impl Slice {
    pub const EMPTY: Slice = Slice {
        handle: Handle::NULL,
        offset: 0,
        len: 0,
    };

    pub fn new(handle: Handle, offset: u32, len: u32) -> Self {
        Self {
            handle,
            offset,
            len,
        }
    }

    pub fn is_null(self) -> bool {
        self.handle.is_null()
    }

    /// Address of element `index`, bounds-checked against the window.
    pub fn element(self, index: u32, element_size: u32) -> Option<Pointer> {
        if index >= self.len {
            return None;
        }
        let offset = self.offset.checked_add(index.checked_mul(element_size)?)?;
        Some(Pointer::new(self.handle, offset))
    }

    /// Narrow the window to `[start, end)` without touching the allocation.
    pub fn narrow(self, start: u32, end: u32, element_size: u32) -> Option<Slice> {
        if start > end || end > self.len {
            return None;
        }
        let offset = self.offset.checked_add(start.checked_mul(element_size)?)?;
        Some(Slice::new(self.handle, offset, end - start))
    }
}

/// A Rust value with a fixed IL byte representation. Used to marshal
/// arguments, return values and heap elements across the host boundary.
///
/// `read` expects at least `SIZE` bytes; callers slice exactly.
pub trait NativeValue: Sized + Copy {
    const SIZE: u32;

    fn write(&self, out: &mut [u8]);

    fn read(bytes: &[u8]) -> Self;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::SIZE as usize];
        self.write(&mut out);
        out
    }
}

macro_rules! native_number {
    ($($ty:ty),*) => {
        $(
            impl NativeValue for $ty {
                const SIZE: u32 = std::mem::size_of::<$ty>() as u32;

                fn write(&self, out: &mut [u8]) {
                    out[..Self::SIZE as usize].copy_from_slice(&self.to_le_bytes());
                }

                fn read(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE as usize]);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )*
    };
}

native_number!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl NativeValue for bool {
    const SIZE: u32 = 1;

    fn write(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn read(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl NativeValue for char {
    const SIZE: u32 = 4;

    fn write(&self, out: &mut [u8]) {
        (*self as u32).write(out);
    }

    fn read(bytes: &[u8]) -> Self {
        char::from_u32(u32::read(bytes)).unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

impl NativeValue for Handle {
    const SIZE: u32 = 4;

    fn write(&self, out: &mut [u8]) {
        self.0.write(out);
    }

    fn read(bytes: &[u8]) -> Self {
        Handle(u32::read(bytes))
    }
}

impl NativeValue for Pointer {
    const SIZE: u32 = 8;

    fn write(&self, out: &mut [u8]) {
        self.handle.write(&mut out[0..4]);
        self.offset.write(&mut out[4..8]);
    }

    fn read(bytes: &[u8]) -> Self {
        Pointer {
            handle: Handle::read(&bytes[0..4]),
            offset: u32::read(&bytes[4..8]),
        }
    }
}

impl NativeValue for Slice {
    const SIZE: u32 = 12;

    fn write(&self, out: &mut [u8]) {
        self.handle.write(&mut out[0..4]);
        self.offset.write(&mut out[4..8]);
        self.len.write(&mut out[8..12]);
    }

    fn read(bytes: &[u8]) -> Self {
        Slice {
            handle: Handle::read(&bytes[0..4]),
            offset: u32::read(&bytes[4..8]),
            len: u32::read(&bytes[8..12]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::types::{POINTER_SIZE, SLICE_SIZE};

    #[test]
    fn test_handle_slots() {
        assert!(Handle::NULL.is_null());
        assert_eq!(Handle::NULL.slot(), None);
        assert_eq!(Handle(1).slot(), Some(0));
        assert_eq!(Handle::from_slot(4), Some(Handle(5)));
    }

    #[test]
    fn test_descriptor_sizes_match_layout() {
        assert_eq!(Pointer::SIZE, POINTER_SIZE);
        assert_eq!(Slice::SIZE, SLICE_SIZE);
    }

    #[test]
    fn test_slice_bytes() {
        let s = Slice::new(Handle(3), 4, 10);
        let bytes = s.to_bytes();
        assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &10u32.to_le_bytes());
        assert_eq!(Slice::read(&bytes), s);
    }

    #[test]
    fn test_slice_element_bounds() {
        let s = Slice::new(Handle(1), 4, 3);
        assert_eq!(s.element(2, 4), Some(Pointer::new(Handle(1), 12)));
        assert_eq!(s.element(3, 4), None);
    }

    #[test]
    fn test_slice_narrow() {
        let s = Slice::new(Handle(1), 4, 10);
        assert_eq!(s.narrow(2, 5, 4), Some(Slice::new(Handle(1), 12, 3)));
        assert_eq!(s.narrow(5, 2, 4), None);
        assert_eq!(s.narrow(0, 11, 4), None);
    }

    #[test]
    fn test_pointer_offset_by() {
        let p = Pointer::new(Handle(2), 8);
        assert_eq!(p.offset_by(-8), Some(Pointer::new(Handle(2), 0)));
        assert_eq!(p.offset_by(-9), None);
    }

    #[test]
    fn test_invalid_char_reads_as_replacement() {
        let bytes = 0xD800u32.to_le_bytes();
        assert_eq!(char::read(&bytes), char::REPLACEMENT_CHARACTER);
    }
}
