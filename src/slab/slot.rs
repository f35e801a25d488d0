//! Slot addresses handed out by the bucket allocator

use std::fmt;
use std::ptr::NonNull;

/// Address of the first byte of a slot
///
/// Returned by allocation and accepted back by `free`/`reallocate`. A
/// `SlotPtr` carries no lifetime: it stays a plain address after the slot
/// is released, which is exactly what ownership tests operate on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotPtr(NonNull<u8>);

impl SlotPtr {
    pub(crate) fn new(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// Wrap a pointer obtained elsewhere, `None` if it is null
    pub fn from_raw(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Raw pointer to the slot's first byte
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Numeric address
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for SlotPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotPtr({:#x})", self.addr())
    }
}

impl fmt::Display for SlotPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr())
    }
}
